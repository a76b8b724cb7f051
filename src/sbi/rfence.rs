//! The RFENCE extension (`EID_RFENCE = 0x52464E43`, "RFNC"): remote
//! `fence.i`/`sfence.vma`/`sfence.vma.asid` requests, queued on each
//! target HART's [`crate::tlb::TlbFifo`] and fanned out over the IPI
//! fabric's `Fence` event.

use super::{SbiExtension, SbiRet};
use crate::error::SbiError;
use crate::ipi::{self, IpiEvent};
use crate::tlb::{FenceKind, FenceRequest};

pub const EID_RFENCE: usize = 0x52464E43;

const FID_REMOTE_FENCE_I: usize = 0;
const FID_REMOTE_SFENCE_VMA: usize = 1;
const FID_REMOTE_SFENCE_VMA_ASID: usize = 2;

pub struct RfenceExtension;

impl SbiExtension for RfenceExtension {
    fn extid_range(&self) -> (usize, usize) {
        (EID_RFENCE, EID_RFENCE)
    }

    fn probe(&self, fid: usize) -> bool {
        fid <= FID_REMOTE_SFENCE_VMA_ASID
    }

    fn handle(&self, fid: usize, args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
        let hart_mask = args[0];
        let hart_mask_base = args[1];
        let targets = super::ipi::decode_hart_mask(hart_mask, hart_mask_base)?;

        let req = match fid {
            FID_REMOTE_FENCE_I => FenceRequest::whole_address_space(FenceKind::LocalFenceI, None),
            FID_REMOTE_SFENCE_VMA => FenceRequest {
                start: args[2] as u64,
                size: args[3] as u64,
                asid: None,
                kind: FenceKind::Vma,
            },
            FID_REMOTE_SFENCE_VMA_ASID => FenceRequest {
                start: args[2] as u64,
                size: args[3] as u64,
                asid: Some(args[4] as u32),
                kind: FenceKind::VmaAsid,
            },
            _ => return Err(SbiError::NotSupported),
        };

        for hartindex in targets.iter() {
            if !crate::init::tlb_fifo(hartindex).push(req) {
                // Coalescing failed to make room; fall back to a full
                // local fence on that hart rather than dropping work.
                let full = FenceRequest::whole_address_space(req.kind, req.asid);
                let _ = crate::init::tlb_fifo(hartindex).push(full);
            }
        }
        ipi::send_many(&targets, IpiEvent::Fence, crate::init::ipi_cell)?;
        ret.value = 0;
        Ok(())
    }
}

pub static RFENCE: RfenceExtension = RfenceExtension;
