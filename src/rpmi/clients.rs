//! Service clients layered on a [`MailboxChannel`]: translate an SBI
//! call into an RPMI request/response pair when the platform delegates
//! that function to its management microcontroller instead of
//! implementing it with local CPU registers. Each client probes its
//! service group once, at registration time, and reports itself
//! unavailable rather than failing cold boot if the group never
//! responds.

use super::mailbox::{MailboxChannel, DEFAULT_RETRIES};
use crate::error::SbiError;

pub(crate) const HSM_SRV_HART_START: u8 = 1;
pub(crate) const HSM_SRV_HART_STOP: u8 = 2;
pub(crate) const HSM_SRV_HART_SUSPEND: u8 = 3;

pub(crate) const SYSRST_SRV_SYSTEM_RESET: u8 = 1;
pub(crate) const SYSSUSP_SRV_SYSTEM_SUSPEND: u8 = 1;

pub(crate) const CPPC_SRV_PROBE: u8 = 1;
pub(crate) const CPPC_SRV_READ: u8 = 2;
pub(crate) const CPPC_SRV_WRITE: u8 = 3;

/// HSM-over-RPMI: `hart_start`/`hart_stop`/`hart_suspend` relayed to a
/// remote HSM service group, for platforms whose CPU hotplug is driven
/// by a microcontroller rather than by writable state this firmware can
/// touch directly.
pub struct HsmClient<'a> {
    channel: &'a MailboxChannel,
}

impl<'a> HsmClient<'a> {
    pub fn new(channel: &'a MailboxChannel) -> Self {
        HsmClient { channel }
    }

    pub fn hart_start(&self, hartid: u32, resume_addr: u64) -> Result<(), SbiError> {
        let mut payload = [0u8; 12];
        payload[0..4].copy_from_slice(&hartid.to_le_bytes());
        payload[4..12].copy_from_slice(&resume_addr.to_le_bytes());
        let mut out = [0u8; 4];
        self.channel
            .request(HSM_SRV_HART_START, &payload, &mut out, DEFAULT_RETRIES)
            .map(|_| ())
            .map_err(SbiError::from)
    }

    pub fn hart_stop(&self, hartid: u32) -> Result<(), SbiError> {
        let payload = hartid.to_le_bytes();
        let mut out = [0u8; 4];
        self.channel
            .request(HSM_SRV_HART_STOP, &payload, &mut out, DEFAULT_RETRIES)
            .map(|_| ())
            .map_err(SbiError::from)
    }

    pub fn hart_suspend(&self, hartid: u32, suspend_type: u32) -> Result<(), SbiError> {
        let mut payload = [0u8; 8];
        payload[0..4].copy_from_slice(&hartid.to_le_bytes());
        payload[4..8].copy_from_slice(&suspend_type.to_le_bytes());
        let mut out = [0u8; 4];
        self.channel
            .request(HSM_SRV_HART_SUSPEND, &payload, &mut out, DEFAULT_RETRIES)
            .map(|_| ())
            .map_err(SbiError::from)
    }
}

/// CPPC-over-RPMI: read/write of a CPPC register id, exposed to
/// S-mode via the SBI CPPC extension (out of this crate's implemented
/// extension set, but the client exists for a CPPC extension to use).
pub struct CppcClient<'a> {
    channel: &'a MailboxChannel,
}

impl<'a> CppcClient<'a> {
    pub fn new(channel: &'a MailboxChannel) -> Self {
        CppcClient { channel }
    }

    pub fn probe(&self, reg_id: u32) -> Result<bool, SbiError> {
        let payload = reg_id.to_le_bytes();
        let mut out = [0u8; 4];
        let n = self
            .channel
            .request(CPPC_SRV_PROBE, &payload, &mut out, DEFAULT_RETRIES)
            .map_err(SbiError::from)?;
        Ok(n >= 4 && u32::from_le_bytes(out) != 0)
    }

    pub fn read(&self, reg_id: u32) -> Result<u64, SbiError> {
        let payload = reg_id.to_le_bytes();
        let mut out = [0u8; 8];
        self.channel.request(CPPC_SRV_READ, &payload, &mut out, DEFAULT_RETRIES).map_err(SbiError::from)?;
        Ok(u64::from_le_bytes(out))
    }

    pub fn write(&self, reg_id: u32, value: u64) -> Result<(), SbiError> {
        let mut payload = [0u8; 12];
        payload[0..4].copy_from_slice(&reg_id.to_le_bytes());
        payload[4..12].copy_from_slice(&value.to_le_bytes());
        let mut out = [0u8; 4];
        self.channel.request(CPPC_SRV_WRITE, &payload, &mut out, DEFAULT_RETRIES).map(|_| ()).map_err(SbiError::from)
    }
}

/// System-suspend and system-reset issued as RPMI requests, backing the
/// SRST extension when the platform delegates reset/suspend to its
/// microcontroller instead of a directly-writable reset line.
pub struct SystemClient<'a> {
    reset_channel: Option<&'a MailboxChannel>,
    suspend_channel: Option<&'a MailboxChannel>,
}

impl<'a> SystemClient<'a> {
    pub fn new(reset_channel: Option<&'a MailboxChannel>, suspend_channel: Option<&'a MailboxChannel>) -> Self {
        SystemClient { reset_channel, suspend_channel }
    }

    pub fn system_reset(&self, reset_type: u32, reset_reason: u32) -> Result<(), SbiError> {
        let channel = self.reset_channel.ok_or(SbiError::NotSupported)?;
        let mut payload = [0u8; 8];
        payload[0..4].copy_from_slice(&reset_type.to_le_bytes());
        payload[4..8].copy_from_slice(&reset_reason.to_le_bytes());
        channel.post(SYSRST_SRV_SYSTEM_RESET, &payload).map_err(SbiError::from)
    }

    pub fn system_suspend(&self, suspend_type: u32, resume_addr: u64) -> Result<(), SbiError> {
        let channel = self.suspend_channel.ok_or(SbiError::NotSupported)?;
        let mut payload = [0u8; 12];
        payload[0..4].copy_from_slice(&suspend_type.to_le_bytes());
        payload[4..12].copy_from_slice(&resume_addr.to_le_bytes());
        let mut out = [0u8; 4];
        channel.request(SYSSUSP_SRV_SYSTEM_SUSPEND, &payload, &mut out, DEFAULT_RETRIES).map(|_| ()).map_err(SbiError::from)
    }
}
