//! TLB shootdown: the RFENCE SBI extension's remote `sfence.vma`/
//! `sfence.vma.asid`/local-fence requests, queued per-HART and coalesced
//! so a storm of overlapping requests collapses to one flush instead of
//! replaying every individual range. Grounded in the reference
//! firmware's `sbi_tlb_fifo` "next request subsumes a pending one"
//! dedup rule.

use heapless::spsc::Queue;
use spin::Mutex;

use crate::ipi::IpiHandler;

pub const FIFO_CAPACITY: usize = 8;

/// A single remote fence request. `None` address/size means "the whole
/// address space"; `asid: None` means "every ASID".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceRequest {
    pub start: u64,
    pub size: u64,
    pub asid: Option<u32>,
    pub kind: FenceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceKind {
    Vma,
    VmaAsid,
    LocalFenceI,
}

impl FenceRequest {
    pub const fn whole_address_space(kind: FenceKind, asid: Option<u32>) -> Self {
        FenceRequest { start: 0, size: u64::MAX, asid, kind }
    }

    fn covers(&self, other: &FenceRequest) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if self.asid != other.asid {
            return false;
        }
        let self_end = self.start.saturating_add(self.size);
        let other_end = other.start.saturating_add(other.size);
        self.start <= other.start && other_end <= self_end
    }
}

/// Per-HART fence request queue. A push that finds an already-queued
/// request covering the new one is dropped as redundant work; one that
/// finds the new request covering an already-queued one replaces it.
pub struct TlbFifo {
    queue: Mutex<Queue<FenceRequest, FIFO_CAPACITY>>,
}

impl TlbFifo {
    pub const fn new() -> Self {
        TlbFifo { queue: Mutex::new(Queue::new()) }
    }

    /// Enqueues `req`, coalescing against whatever is already pending.
    /// Returns `false` if the queue is full and the request could not
    /// be coalesced away, signalling the caller should fall back to a
    /// full local fence instead of a targeted one it can no longer
    /// guarantee gets replayed.
    pub fn push(&self, req: FenceRequest) -> bool {
        let mut q = self.queue.lock();
        // heapless::spsc::Queue has no retain/remove; rebuild in place.
        let mut items: heapless::Vec<FenceRequest, FIFO_CAPACITY> = heapless::Vec::new();
        let mut absorbed = false;
        while let Some(existing) = q.dequeue() {
            if existing.covers(&req) {
                absorbed = true;
                let _ = items.push(existing);
            } else if req.covers(&existing) {
                // superseded, drop it
            } else {
                let _ = items.push(existing);
            }
        }
        if !absorbed {
            if items.push(req).is_err() {
                for it in items {
                    let _ = q.enqueue(it);
                }
                return false;
            }
        }
        for it in items {
            let _ = q.enqueue(it);
        }
        true
    }

    pub fn drain_and_apply(&self) {
        let mut q = self.queue.lock();
        while let Some(req) = q.dequeue() {
            apply(&req);
        }
    }
}

impl Default for TlbFifo {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(req: &FenceRequest) {
    use crate::privileged::*;
    match req.kind {
        FenceKind::LocalFenceI => fence_i(),
        FenceKind::Vma => {
            if req.size == u64::MAX {
                sfence_vma_all();
            } else {
                sfence_vma_addr(req.start as usize);
            }
        }
        FenceKind::VmaAsid => {
            let asid = req.asid.unwrap_or(0) as usize;
            if req.size == u64::MAX {
                sfence_vma_asid(asid);
            } else {
                sfence_vma_addr_asid(req.start as usize, asid);
            }
        }
    }
}

/// Registered as the IPI fabric's `Fence` event handler: drains and
/// applies this HART's queued fence requests.
pub struct FenceIpiHandler {
    pub fifo: &'static TlbFifo,
}

impl IpiHandler for FenceIpiHandler {
    fn handle(&self, _sender_hartindex: Option<usize>) {
        self.fifo.drain_and_apply();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_space_request_absorbs_narrow_one() {
        let fifo = TlbFifo::new();
        assert!(fifo.push(FenceRequest::whole_address_space(FenceKind::Vma, None)));
        assert!(fifo.push(FenceRequest { start: 0x1000, size: 0x1000, asid: None, kind: FenceKind::Vma }));
        let mut q = fifo.queue.lock();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn narrow_request_is_superseded_by_wider_one() {
        let fifo = TlbFifo::new();
        assert!(fifo.push(FenceRequest { start: 0x1000, size: 0x1000, asid: None, kind: FenceKind::Vma }));
        assert!(fifo.push(FenceRequest::whole_address_space(FenceKind::Vma, None)));
        let mut q = fifo.queue.lock();
        assert_eq!(q.len(), 1);
        assert_eq!(q.dequeue().unwrap().size, u64::MAX);
    }
}
