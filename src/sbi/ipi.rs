//! The IPI extension (`EID_IPI = 0x735049`, "sPI"): lets a supervisor
//! ask for a supervisor-software-interrupt to be raised on a set of
//! remote HARTs. A single function, `send_ipi`, backed by the
//! [`crate::ipi`] fabric's dedicated `Supervisor` relay event: the
//! handler's only job is setting the target's `SSIP` bit, which M-mode
//! is permitted to write directly.

use super::{SbiExtension, SbiRet};
use crate::error::SbiError;
use crate::hartmask::{HartMask, MAX_HARTS};
use crate::ipi::{self, IpiEvent};
use crate::privileged::{self, mip_bits};

pub const EID_IPI: usize = 0x735049;
const FID_SEND_IPI: usize = 0;

struct RelayHandler;
impl ipi::IpiHandler for RelayHandler {
    fn handle(&self, _sender_hartindex: Option<usize>) {
        unsafe { privileged::set_mip(mip_bits::SSIP) };
    }
}

static RELAY: RelayHandler = RelayHandler;

/// Registers the `Supervisor` relay handler. Call once during cold
/// boot, before any HART can call `send_ipi`.
///
/// # Safety
/// Must only be called from the cold-boot HART before any other HART is
/// released.
pub unsafe fn register() {
    unsafe { ipi::register_handler(IpiEvent::Supervisor, &RELAY) };
}

pub struct IpiExtension;

impl SbiExtension for IpiExtension {
    fn extid_range(&self) -> (usize, usize) {
        (EID_IPI, EID_IPI)
    }

    fn probe(&self, fid: usize) -> bool {
        fid == FID_SEND_IPI
    }

    fn handle(&self, fid: usize, args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
        if fid != FID_SEND_IPI {
            return Err(SbiError::NotSupported);
        }
        let hart_mask = args[0];
        let hart_mask_base = args[1];
        let targets = decode_hart_mask(hart_mask, hart_mask_base)?;
        ipi::send_many(&targets, IpiEvent::Supervisor, crate::init::ipi_cell)?;
        ret.value = 0;
        Ok(())
    }
}

/// Decodes the SBI ABI's `(hart_mask, hart_mask_base)` pair into a
/// [`HartMask`]: `hart_mask_base == usize::MAX` means "every hart the
/// platform brought up", otherwise `hart_mask`'s bit `i` selects hart
/// `hart_mask_base + i`.
pub fn decode_hart_mask(hart_mask: usize, hart_mask_base: usize) -> Result<HartMask, SbiError> {
    let mut m = HartMask::empty();
    if hart_mask_base == usize::MAX {
        let hart_count = crate::platform::current().hart_count();
        for h in 0..hart_count.min(MAX_HARTS) {
            m.set(h);
        }
        return Ok(m);
    }
    for bit in 0..usize::BITS as usize {
        if hart_mask & (1 << bit) != 0 {
            let hartindex = hart_mask_base.checked_add(bit).ok_or(SbiError::InvalidParam)?;
            if hartindex >= MAX_HARTS {
                return Err(SbiError::InvalidParam);
            }
            m.set(hartindex);
        }
    }
    Ok(m)
}

pub static IPI: IpiExtension = IpiExtension;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_mask() {
        let m = decode_hart_mask(0b101, 0).unwrap();
        assert!(m.is_set(0));
        assert!(!m.is_set(1));
        assert!(m.is_set(2));
    }

    #[test]
    fn rejects_out_of_range_hart() {
        assert!(decode_hart_mask(1, MAX_HARTS).is_err());
    }
}
