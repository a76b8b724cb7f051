//! The Timer extension (`EID_TIME = 0x54494D45`, "TIME" in ASCII): a
//! single function, `set_timer`, backed by each HART's
//! [`crate::timer::TimerCell`] and the platform's comparator hook.

use super::{SbiExtension, SbiRet};
use crate::error::SbiError;

pub const EID_TIME: usize = 0x54494D45;
const FID_SET_TIMER: usize = 0;

pub struct TimerExtension;

impl SbiExtension for TimerExtension {
    fn extid_range(&self) -> (usize, usize) {
        (EID_TIME, EID_TIME)
    }

    fn probe(&self, fid: usize) -> bool {
        fid == FID_SET_TIMER
    }

    fn handle(&self, fid: usize, args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
        if fid != FID_SET_TIMER {
            return Err(SbiError::NotSupported);
        }
        let stime_value = args[0] as u64;
        let hartindex = crate::init::current_hartindex();
        crate::init::timer_cell(hartindex).set(hartindex, Some(stime_value));
        ret.value = 0;
        Ok(())
    }
}

pub static TIMER: TimerExtension = TimerExtension;
