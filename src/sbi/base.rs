//! The Base extension (`EID_BASE = 0x10`), mandatory for every SBI
//! implementation: spec version, implementation id/version, the
//! probe-extension call every other extension's presence is discovered
//! through, and the machine vendor/arch/impl ids forwarded from `mvendorid`/
//! `marchid`/`mimpid`.

use super::{SbiExtension, SbiRet};
use crate::error::SbiError;

pub const EID_BASE: usize = 0x10;

const FID_GET_SPEC_VERSION: usize = 0;
const FID_GET_IMPL_ID: usize = 1;
const FID_GET_IMPL_VERSION: usize = 2;
const FID_PROBE_EXTENSION: usize = 3;
const FID_GET_MVENDORID: usize = 4;
const FID_GET_MARCHID: usize = 5;
const FID_GET_MIMPID: usize = 6;

/// This firmware's self-assigned SBI implementation id, distinct from
/// any upstream implementation so a guest's quirks table can tell them
/// apart.
const IMPL_ID: usize = 0xae0000;

pub struct BaseExtension;

impl SbiExtension for BaseExtension {
    fn extid_range(&self) -> (usize, usize) {
        (EID_BASE, EID_BASE)
    }

    fn probe(&self, fid: usize) -> bool {
        fid <= FID_GET_MIMPID
    }

    fn handle(&self, fid: usize, args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
        ret.value = match fid {
            FID_GET_SPEC_VERSION => crate::SBI_SPEC_VERSION as usize,
            FID_GET_IMPL_ID => IMPL_ID,
            FID_GET_IMPL_VERSION => {
                ((crate::FW_VERSION_MAJOR as usize) << 16) | crate::FW_VERSION_MINOR as usize
            }
            FID_PROBE_EXTENSION => super::extension_present(args[0]) as usize,
            FID_GET_MVENDORID => read_csr("mvendorid"),
            FID_GET_MARCHID => read_csr("marchid"),
            FID_GET_MIMPID => read_csr("mimpid"),
            _ => return Err(SbiError::NotSupported),
        };
        Ok(())
    }
}

fn read_csr(name: &str) -> usize {
    // Safety: all three are read-only CSRs, mandated present on every
    // RISC-V hart this firmware targets.
    unsafe {
        let v: usize;
        match name {
            "mvendorid" => core::arch::asm!("csrr {0}, mvendorid", out(reg) v),
            "marchid" => core::arch::asm!("csrr {0}, marchid", out(reg) v),
            _ => core::arch::asm!("csrr {0}, mimpid", out(reg) v),
        }
        v
    }
}

pub static BASE: BaseExtension = BaseExtension;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_extension_reports_base_itself_present() {
        super::super::register_builtin_extensions();
        let mut ret = SbiRet::default();
        let args = [EID_BASE, 0, 0, 0, 0, 0];
        BASE.handle(FID_PROBE_EXTENSION, &args, &mut ret).unwrap();
        assert_eq!(ret.value, 1);
    }

    #[test]
    fn unknown_function_is_not_supported() {
        let mut ret = SbiRet::default();
        let args = [0usize; 6];
        assert_eq!(BASE.handle(99, &args, &mut ret), Err(SbiError::NotSupported));
    }
}
