//! The two pre-v0.2 legacy console extensions, kept only because real
//! bootloaders and very old Linux builds still call them directly
//! instead of routing console I/O through a driver: `sbi_console_putchar`
//! (`EID 0x01`) and `sbi_console_getchar` (`EID 0x02`). Both route
//! through [`crate::console::Console`], the same sink the `debug!`
//! family uses. Each legacy call is a whole extension unto itself (one
//! function, no `fid` to switch on), so each gets its own single-id
//! registration rather than sharing a combined range.

use super::{SbiExtension, SbiRet};
use crate::console::Console;
use crate::error::SbiError;

pub const EID_CONSOLE_PUTCHAR: usize = 0x01;
pub const EID_CONSOLE_GETCHAR: usize = 0x02;

pub struct PutcharExtension;

impl SbiExtension for PutcharExtension {
    fn extid_range(&self) -> (usize, usize) {
        (EID_CONSOLE_PUTCHAR, EID_CONSOLE_PUTCHAR)
    }

    fn probe(&self, _fid: usize) -> bool {
        true
    }

    fn handle(&self, _fid: usize, args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
        Console::putc(args[0] as u8);
        ret.value = 0;
        Ok(())
    }
}

pub struct GetcharExtension;

impl SbiExtension for GetcharExtension {
    fn extid_range(&self) -> (usize, usize) {
        (EID_CONSOLE_GETCHAR, EID_CONSOLE_GETCHAR)
    }

    fn probe(&self, _fid: usize) -> bool {
        true
    }

    fn handle(&self, _fid: usize, _args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
        ret.value = Console::getc().map(|b| b as isize).unwrap_or(-1) as usize;
        Ok(())
    }
}

pub static PUTCHAR: PutcharExtension = PutcharExtension;
pub static GETCHAR: GetcharExtension = GetcharExtension;
