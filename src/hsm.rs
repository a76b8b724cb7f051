//! HART state machine: the seven states a HART can occupy and the CAS
//! transitions the HSM SBI extension (`sbi_hsm_hart_start`/`_stop`/
//! `_suspend`) drives it through. Grounded in the reference firmware's
//! `sbi_hsm_hart_start`/`sbi_hsm_hart_stop`/`sbi_hsm_exit`, extended with
//! the `SUSPENDED`/`SUSPENDING`/`RESUMING` states for the non-retentive
//! suspend path those functions' callers (`sbi_hsm_hart_suspend`) drive
//! but this trimmed-down reference source doesn't itself define.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::SbiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HartState {
    Stopped = 0,
    Stopping = 1,
    Starting = 2,
    Started = 3,
    Suspending = 4,
    Suspended = 5,
    Resuming = 6,
}

impl HartState {
    fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => HartState::Stopped,
            1 => HartState::Stopping,
            2 => HartState::Starting,
            3 => HartState::Started,
            4 => HartState::Suspending,
            5 => HartState::Suspended,
            6 => HartState::Resuming,
            _ => return None,
        })
    }

    /// Status code returned by the HSM extension's `hart_get_status`,
    /// which uses a different numbering than the internal state enum.
    pub fn status_code(self) -> u32 {
        match self {
            HartState::Started => 0,
            HartState::Stopped => 1,
            HartState::Starting => 2,
            HartState::Stopping => 3,
            HartState::Suspended => 4,
            HartState::Suspending => 5,
            HartState::Resuming => 6,
        }
    }
}

/// Per-HART atomic state cell, one instance lives in each HART's
/// [`crate::scratch::Scratch`] extra-space arena.
pub struct HsmCell {
    state: AtomicU32,
}

impl HsmCell {
    pub const fn new(initial: HartState) -> Self {
        HsmCell { state: AtomicU32::new(initial as u32) }
    }

    pub fn get(&self) -> HartState {
        HartState::from_u32(self.state.load(Ordering::Acquire)).unwrap_or(HartState::Stopped)
    }

    fn cas(&self, from: HartState, to: HartState) -> Result<(), HartState> {
        self.state
            .compare_exchange(from as u32, to as u32, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|old| HartState::from_u32(old).unwrap_or(HartState::Stopped))
    }

    /// `sbi_hsm_hart_start`'s transition: `STOPPED -> STARTING`. Returns
    /// `AlreadyStarted` if the HART is already up, `InvalidState` for
    /// any other in-flight transition.
    pub fn begin_start(&self) -> Result<(), SbiError> {
        match self.cas(HartState::Stopped, HartState::Starting) {
            Ok(()) => Ok(()),
            Err(HartState::Started) => Err(SbiError::AlreadyStarted),
            Err(_) => Err(SbiError::InvalidParam),
        }
    }

    /// Called by the newly started HART itself once it reaches the
    /// point where it is safe to start taking SBI calls:
    /// `STARTING -> STARTED`. A mismatch here means the HART reached
    /// this point without ever being started, which is a firmware bug
    /// rather than a guest-triggerable condition, so it hangs rather
    /// than return an error nobody can observe.
    pub fn complete_start(&self) {
        if self.cas(HartState::Starting, HartState::Started).is_err() {
            loop {
                crate::privileged::wfi();
            }
        }
    }

    /// `sbi_hsm_hart_stop`'s transition: `STARTED -> STOPPING`.
    pub fn begin_stop(&self) -> Result<(), SbiError> {
        self.cas(HartState::Started, HartState::Stopping).map_err(|_| SbiError::Denied)
    }

    /// `sbi_hsm_exit`'s transition: `STOPPING -> STOPPED`.
    pub fn complete_stop(&self) -> Result<(), SbiError> {
        self.cas(HartState::Stopping, HartState::Stopped).map_err(|_| SbiError::Failed)
    }

    pub fn begin_suspend(&self) -> Result<(), SbiError> {
        self.cas(HartState::Started, HartState::Suspending).map_err(|_| SbiError::Denied)
    }

    pub fn complete_suspend(&self) -> Result<(), SbiError> {
        self.cas(HartState::Suspending, HartState::Suspended).map_err(|_| SbiError::Failed)
    }

    /// Entered by the resuming HART's interrupt path:
    /// `SUSPENDED -> RESUMING`.
    pub fn begin_resume(&self) -> Result<(), SbiError> {
        self.cas(HartState::Suspended, HartState::Resuming).map_err(|_| SbiError::Failed)
    }

    /// Force-sets the state without a CAS, used only once per HART
    /// during cold boot to seed the initial STARTED/STOPPED split
    /// before any HART could possibly be racing a transition.
    pub fn reset_for_cold_boot(&self, state: HartState) {
        self.state.store(state as u32, Ordering::Release);
    }

    pub fn complete_resume(&self) {
        if self.cas(HartState::Resuming, HartState::Started).is_err() {
            loop {
                crate::privileged::wfi();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_lifecycle() {
        let cell = HsmCell::new(HartState::Stopped);
        cell.begin_start().unwrap();
        assert_eq!(cell.get(), HartState::Starting);
        cell.complete_start();
        assert_eq!(cell.get(), HartState::Started);
        cell.begin_stop().unwrap();
        assert_eq!(cell.get(), HartState::Stopping);
        cell.complete_stop().unwrap();
        assert_eq!(cell.get(), HartState::Stopped);
    }

    #[test]
    fn starting_an_already_started_hart_is_rejected() {
        let cell = HsmCell::new(HartState::Started);
        assert_eq!(cell.begin_start(), Err(SbiError::AlreadyStarted));
    }

    #[test]
    fn stopping_a_non_started_hart_is_denied() {
        let cell = HsmCell::new(HartState::Stopped);
        assert_eq!(cell.begin_stop(), Err(SbiError::Denied));
    }

    #[test]
    fn suspend_resume_lifecycle() {
        let cell = HsmCell::new(HartState::Started);
        cell.begin_suspend().unwrap();
        cell.complete_suspend().unwrap();
        assert_eq!(cell.get(), HartState::Suspended);
        cell.begin_resume().unwrap();
        cell.complete_resume();
        assert_eq!(cell.get(), HartState::Started);
    }
}
