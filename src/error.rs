//! Error codes returned across the two boundaries this firmware crosses:
//! the SBI ecall ABI (negative values placed in `a0`) and the RPMI wire
//! protocol (negative values placed in a response message's status
//! field). They are kept as two distinct enums on purpose: a caller that
//! conflated them would silently mistranslate a wire error into the
//! wrong SBI error whenever the numeric spaces happen to overlap.

use core::fmt;

/// SBI error codes, `#[repr(isize)]` so a handler can return one directly
/// as the value placed in `a0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(isize)]
pub enum SbiError {
    Success = 0,
    Failed = -1,
    NotSupported = -2,
    InvalidParam = -3,
    Denied = -4,
    InvalidAddress = -5,
    AlreadyAvailable = -6,
    AlreadyStarted = -7,
    AlreadyStopped = -8,
    NoShmem = -9,
    InvalidState = -10,
    BadRange = -11,
    Timeout = -12,
    Io = -13,
    DeniedLocked = -14,
}

impl SbiError {
    pub const fn code(self) -> isize {
        self as isize
    }
}

impl TryFrom<isize> for SbiError {
    type Error = ();

    fn try_from(v: isize) -> Result<Self, ()> {
        use SbiError::*;
        Ok(match v {
            0 => Success,
            -1 => Failed,
            -2 => NotSupported,
            -3 => InvalidParam,
            -4 => Denied,
            -5 => InvalidAddress,
            -6 => AlreadyAvailable,
            -7 => AlreadyStarted,
            -8 => AlreadyStopped,
            -9 => NoShmem,
            -10 => InvalidState,
            -11 => BadRange,
            -12 => Timeout,
            -13 => Io,
            -14 => DeniedLocked,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for SbiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SbiError::Success => "success",
            SbiError::Failed => "failed",
            SbiError::NotSupported => "not supported",
            SbiError::InvalidParam => "invalid parameter",
            SbiError::Denied => "denied",
            SbiError::InvalidAddress => "invalid address",
            SbiError::AlreadyAvailable => "already available",
            SbiError::AlreadyStarted => "already started",
            SbiError::AlreadyStopped => "already stopped",
            SbiError::NoShmem => "shared memory not available",
            SbiError::InvalidState => "invalid state",
            SbiError::BadRange => "bad range",
            SbiError::Timeout => "timed out",
            SbiError::Io => "i/o error",
            SbiError::DeniedLocked => "denied, locked",
        };
        f.write_str(s)
    }
}

impl core::error::Error for SbiError {}

/// RPMI message-level status codes, a separate negative-integer space
/// from [`SbiError`]. Values follow the wire protocol's reserved
/// assignments; `From<RpmiError> for SbiError` is the only sanctioned
/// conversion, applied at the MPXY boundary where an RPMI response is
/// translated back into an SBI return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(isize)]
pub enum RpmiError {
    Success = 0,
    NotSupported = -1,
    InvalidParam = -2,
    Denied = -3,
    InvalidAddress = -4,
    AlreadyStarted = -5,
    AlreadyStopped = -6,
    InvalidState = -7,
    BadRange = -8,
    Timeout = -9,
    Io = -10,
    NoData = -14,
    Busy = -15,
}

impl TryFrom<isize> for RpmiError {
    type Error = ();

    fn try_from(v: isize) -> Result<Self, ()> {
        use RpmiError::*;
        Ok(match v {
            0 => Success,
            -1 => NotSupported,
            -2 => InvalidParam,
            -3 => Denied,
            -4 => InvalidAddress,
            -5 => AlreadyStarted,
            -6 => AlreadyStopped,
            -7 => InvalidState,
            -8 => BadRange,
            -9 => Timeout,
            -10 => Io,
            -14 => NoData,
            -15 => Busy,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for RpmiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpmiError::Success => "success",
            RpmiError::NotSupported => "not supported",
            RpmiError::InvalidParam => "invalid parameter",
            RpmiError::Denied => "denied",
            RpmiError::InvalidAddress => "invalid address",
            RpmiError::AlreadyStarted => "already started",
            RpmiError::AlreadyStopped => "already stopped",
            RpmiError::InvalidState => "invalid state",
            RpmiError::BadRange => "bad range",
            RpmiError::Timeout => "timed out",
            RpmiError::Io => "i/o error",
            RpmiError::NoData => "no data",
            RpmiError::Busy => "queue full",
        };
        f.write_str(s)
    }
}

impl core::error::Error for RpmiError {}

impl From<RpmiError> for SbiError {
    fn from(e: RpmiError) -> Self {
        match e {
            RpmiError::Success => SbiError::Success,
            RpmiError::NotSupported => SbiError::NotSupported,
            RpmiError::InvalidParam => SbiError::InvalidParam,
            RpmiError::Denied => SbiError::Denied,
            RpmiError::InvalidAddress => SbiError::InvalidAddress,
            RpmiError::AlreadyStarted => SbiError::AlreadyStarted,
            RpmiError::AlreadyStopped => SbiError::AlreadyStopped,
            RpmiError::InvalidState => SbiError::InvalidState,
            RpmiError::BadRange => SbiError::BadRange,
            RpmiError::Timeout => SbiError::Timeout,
            RpmiError::Io => SbiError::Io,
            RpmiError::NoData => SbiError::Failed,
            RpmiError::Busy => SbiError::Failed,
        }
    }
}

pub type SbiResult<T> = Result<T, SbiError>;
pub type RpmiResult<T> = Result<T, RpmiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_codes() {
        for code in -15isize..=0 {
            if let Ok(e) = SbiError::try_from(code) {
                assert_eq!(e.code(), code);
            }
        }
    }

    #[test]
    fn rpmi_to_sbi_preserves_success() {
        assert_eq!(SbiError::from(RpmiError::Success), SbiError::Success);
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(SbiError::try_from(42).is_err());
    }
}
