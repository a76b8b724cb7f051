//! Shared-memory queue pair: the physical transport underneath RPMI's
//! request/acknowledgment (and optional notification) channels.
//!
//! A queue is `N` slots of `slot_size` bytes; slot 0 holds the head
//! index, slot 1 the tail index, and slots `2..N` each carry one
//! message (`MSG_HDR_SIZE` header followed by payload). Grounded in
//! §4.4's `smq_tx`/`smq_rx` description: reject-if-full on send, scan
//! from head to the token's slot on receive (swapping it to the head
//! position so FIFO order holds for whoever reads next).

use spin::Mutex;

use super::{MessageHeader, MSG_HDR_SIZE};
use crate::error::RpmiError;

const HEAD_SLOT: usize = 0;
const TAIL_SLOT: usize = 1;
const HEADER_SLOTS: usize = 2;

/// A single shared-memory queue: raw byte access to a region the
/// caller guarantees is exclusively owned by this queue for its
/// lifetime, plus a spinlock serializing concurrent producers/
/// consumers on this HART's side (the microcontroller side
/// synchronizes on its own).
pub struct ShmemQueue {
    base: usize,
    slot_size: usize,
    slot_count: usize,
    lock: Mutex<()>,
}

impl ShmemQueue {
    /// # Safety
    /// `base` must point to a region at least `slot_count * slot_size`
    /// bytes, exclusively reserved for this queue, for as long as the
    /// returned value is used.
    pub unsafe fn new(base: usize, slot_size: usize, slot_count: usize) -> Self {
        ShmemQueue { base, slot_size, slot_count, lock: Mutex::new(()) }
    }

    fn slot_ptr(&self, index: usize) -> *mut u8 {
        (self.base + index * self.slot_size) as *mut u8
    }

    fn read_index(&self, slot: usize) -> usize {
        unsafe { core::ptr::read_volatile(self.slot_ptr(slot) as *const u32) as usize }
    }

    fn write_index(&self, slot: usize, value: usize) {
        unsafe { core::ptr::write_volatile(self.slot_ptr(slot) as *mut u32, value as u32) };
    }

    fn capacity(&self) -> usize {
        self.slot_count - HEADER_SLOTS
    }

    /// Largest payload one slot can carry, after the wire header.
    pub fn slot_payload_capacity(&self) -> usize {
        self.slot_size - MSG_HDR_SIZE
    }

    /// Sends one message, composing the header from `servicegroup_id`/
    /// `service_id`/`msg_type`/`token` and copying `payload` into the
    /// slot after it. Fails with [`RpmiError::Busy`] if the queue is
    /// full, or [`RpmiError::InvalidParam`] if `payload` doesn't fit.
    pub fn send(&self, header: MessageHeader, payload: &[u8]) -> Result<(), RpmiError> {
        if payload.len() + MSG_HDR_SIZE > self.slot_size {
            return Err(RpmiError::InvalidParam);
        }
        let _guard = self.lock.lock();
        let tail = self.read_index(TAIL_SLOT);
        let head = self.read_index(HEAD_SLOT);
        let next_tail = (tail + 1) % self.capacity();
        if next_tail == head {
            return Err(RpmiError::Busy);
        }
        let slot = HEADER_SLOTS + tail;
        let encoded = header.encode();
        unsafe {
            let dst = self.slot_ptr(slot);
            core::ptr::copy_nonoverlapping(encoded.as_ptr(), dst, MSG_HDR_SIZE);
            core::ptr::copy_nonoverlapping(payload.as_ptr(), dst.add(MSG_HDR_SIZE), payload.len());
        }
        crate::privileged::fence_release();
        self.write_index(TAIL_SLOT, next_tail);
        Ok(())
    }

    /// Scans from head to tail for a slot whose token matches
    /// `expect_token`, copies its payload into `out`, and advances head
    /// past it. If the matching slot is not at head, it is swapped with
    /// the head slot first so the remaining queue stays FIFO.
    pub fn recv(&self, expect_token: u16, out: &mut [u8]) -> Result<usize, RpmiError> {
        let _guard = self.lock.lock();
        let head = self.read_index(HEAD_SLOT);
        let tail = self.read_index(TAIL_SLOT);
        if head == tail {
            return Err(RpmiError::NoData);
        }
        let cap = self.capacity();
        let mut pos = head;
        let mut found = None;
        while pos != tail {
            let hdr = self.read_header(HEADER_SLOTS + pos)?;
            if hdr.token == expect_token {
                found = Some(pos);
                break;
            }
            pos = (pos + 1) % cap;
        }
        let pos = found.ok_or(RpmiError::NoData)?;
        if pos != head {
            self.swap_slots(HEADER_SLOTS + pos, HEADER_SLOTS + head);
        }
        let hdr = self.read_header(HEADER_SLOTS + head)?;
        let n = (hdr.datalen as usize).min(out.len());
        unsafe {
            let src = self.slot_ptr(HEADER_SLOTS + head).add(MSG_HDR_SIZE);
            core::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), n);
        }
        crate::privileged::fence_acquire();
        self.write_index(HEAD_SLOT, (head + 1) % cap);
        Ok(n)
    }

    /// Drains the oldest pending message regardless of its token, for
    /// unsolicited queues (notifications) where there is no outstanding
    /// request to match a response against.
    pub fn recv_any(&self, out: &mut [u8]) -> Result<usize, RpmiError> {
        let _guard = self.lock.lock();
        let head = self.read_index(HEAD_SLOT);
        let tail = self.read_index(TAIL_SLOT);
        if head == tail {
            return Err(RpmiError::NoData);
        }
        let hdr = self.read_header(HEADER_SLOTS + head)?;
        let n = (hdr.datalen as usize).min(out.len());
        unsafe {
            let src = self.slot_ptr(HEADER_SLOTS + head).add(MSG_HDR_SIZE);
            core::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), n);
        }
        crate::privileged::fence_acquire();
        self.write_index(HEAD_SLOT, (head + 1) % self.capacity());
        Ok(n)
    }

    fn read_header(&self, slot: usize) -> Result<MessageHeader, RpmiError> {
        let mut buf = [0u8; MSG_HDR_SIZE];
        unsafe { core::ptr::copy_nonoverlapping(self.slot_ptr(slot), buf.as_mut_ptr(), MSG_HDR_SIZE) };
        MessageHeader::decode(&buf)
    }

    fn swap_slots(&self, a: usize, b: usize) {
        let mut tmp = alloc::vec![0u8; self.slot_size];
        unsafe {
            core::ptr::copy_nonoverlapping(self.slot_ptr(a), tmp.as_mut_ptr(), self.slot_size);
            core::ptr::copy_nonoverlapping(self.slot_ptr(b), self.slot_ptr(a), self.slot_size);
            core::ptr::copy_nonoverlapping(tmp.as_ptr(), self.slot_ptr(b), self.slot_size);
        }
    }
}

unsafe impl Send for ShmemQueue {}
unsafe impl Sync for ShmemQueue {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpmi::{MessageType, ServiceGroup};

    fn backing_queue(slot_count: usize, slot_size: usize) -> (alloc::vec::Vec<u8>, ShmemQueue) {
        let mut buf = alloc::vec![0u8; slot_count * slot_size];
        let base = buf.as_mut_ptr() as usize;
        let q = unsafe { ShmemQueue::new(base, slot_size, slot_count) };
        (buf, q)
    }

    #[test]
    fn send_then_recv_round_trips_payload() {
        let (_buf, q) = backing_queue(4, 64);
        let hdr = MessageHeader {
            servicegroup_id: ServiceGroup::Hsm as u16,
            service_id: 0,
            msg_type: MessageType::NormalRequest,
            datalen: 4,
            token: 7,
        };
        q.send(hdr, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        let n = q.recv(7, &mut out).unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn recv_with_unknown_token_reports_no_data() {
        let (_buf, q) = backing_queue(4, 64);
        let mut out = [0u8; 4];
        assert_eq!(q.recv(1, &mut out), Err(RpmiError::NoData));
    }

    #[test]
    fn full_queue_rejects_another_send() {
        let (_buf, q) = backing_queue(3, 64);
        let hdr = MessageHeader {
            servicegroup_id: ServiceGroup::Hsm as u16,
            service_id: 0,
            msg_type: MessageType::NormalRequest,
            datalen: 0,
            token: 1,
        };
        q.send(hdr, &[]).unwrap();
        let hdr2 = MessageHeader { token: 2, ..hdr };
        assert_eq!(q.send(hdr2, &[]), Err(RpmiError::Busy));
    }

    #[test]
    fn recv_any_drains_head_regardless_of_token() {
        let (_buf, q) = backing_queue(4, 64);
        let hdr = MessageHeader {
            servicegroup_id: ServiceGroup::Hsm as u16,
            service_id: 0,
            msg_type: MessageType::Notification,
            datalen: 2,
            token: 99,
        };
        q.send(hdr, &[5, 6]).unwrap();
        let mut out = [0u8; 2];
        let n = q.recv_any(&mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(out, [5, 6]);
        assert_eq!(q.recv_any(&mut out), Err(RpmiError::NoData));
    }
}
