//! The System Reset extension (`EID_SRST = 0x53525354`, "SRST"): a
//! single `system_reset(reset_type, reset_reason)` call, routed to the
//! platform's reset hook. Does not return on success; a handler that
//! returns at all means the platform declined the request.

use super::{SbiExtension, SbiRet};
use crate::error::SbiError;

pub const EID_SRST: usize = 0x53525354;
const FID_SYSTEM_RESET: usize = 0;

const RESET_TYPE_SHUTDOWN: u32 = 0;
const RESET_TYPE_COLD_REBOOT: u32 = 1;
const RESET_TYPE_WARM_REBOOT: u32 = 2;

pub struct SrstExtension;

impl SbiExtension for SrstExtension {
    fn extid_range(&self) -> (usize, usize) {
        (EID_SRST, EID_SRST)
    }

    fn probe(&self, fid: usize) -> bool {
        fid == FID_SYSTEM_RESET
    }

    fn handle(&self, fid: usize, args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
        if fid != FID_SYSTEM_RESET {
            return Err(SbiError::NotSupported);
        }
        let reset_type = args[0] as u32;
        let reset_reason = args[1] as u32;
        if !matches!(reset_type, RESET_TYPE_SHUTDOWN | RESET_TYPE_COLD_REBOOT | RESET_TYPE_WARM_REBOOT) {
            return Err(SbiError::InvalidParam);
        }
        ret.value = 0;
        crate::platform::current().system_reset(reset_type, reset_reason);
    }
}

pub static SRST: SrstExtension = SrstExtension;
