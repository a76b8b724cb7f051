//! Mailbox controller/channel abstraction: the seam MPXY and the RPMI
//! service clients go through to reach a [`ShmemQueue`] pair without
//! knowing which physical transport backs it. Grounded in the reference
//! firmware's `mbox_controller`/`mbox_chan`/`mbox_xfer`.

use core::sync::atomic::{AtomicU16, Ordering};

use super::queue::ShmemQueue;
use super::{MessageHeader, MessageType, ServiceGroup};
use crate::error::RpmiError;

/// One request/acknowledgment queue pair bound to a service group.
/// Notification queues are a possible extension this crate's Non-goals
/// don't ask for; only the request/ack pair is wired up.
pub struct MailboxChannel {
    tx: ShmemQueue,
    rx: ShmemQueue,
    servicegroup_id: u16,
    next_token: AtomicU16,
}

impl MailboxChannel {
    /// # Safety
    /// `tx`/`rx` must each point at an exclusively-owned queue region
    /// as required by [`ShmemQueue::new`].
    pub unsafe fn new(tx: ShmemQueue, rx: ShmemQueue, group: ServiceGroup) -> Self {
        MailboxChannel { tx, rx, servicegroup_id: group as u16, next_token: AtomicU16::new(0) }
    }

    fn next_token(&self) -> u16 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Largest request payload this channel's queue pair can carry,
    /// reported to S-mode as part of `FID_READ_ATTRS`'s `msg_data_maxlen`.
    pub fn tx_payload_capacity(&self) -> usize {
        self.tx.slot_payload_capacity()
    }

    pub fn rx_payload_capacity(&self) -> usize {
        self.rx.slot_payload_capacity()
    }

    /// Sends `payload` as a normal request to `service_id` and blocks
    /// (bounded by `retries` queue polls) for the matching
    /// acknowledgment, copying its payload into `out`.
    pub fn request(&self, service_id: u8, payload: &[u8], out: &mut [u8], retries: u32) -> Result<usize, RpmiError> {
        let token = self.next_token();
        let header = MessageHeader {
            servicegroup_id: self.servicegroup_id,
            service_id,
            msg_type: MessageType::NormalRequest,
            datalen: payload.len() as u16,
            token,
        };
        self.tx.send(header, payload)?;
        for _ in 0..retries {
            match self.rx.recv(token, out) {
                Ok(n) => return Ok(n),
                Err(RpmiError::NoData) => crate::privileged::wfi(),
                Err(e) => return Err(e),
            }
        }
        Err(RpmiError::Timeout)
    }

    /// Sends `payload` as a posted request with no expectation of an
    /// acknowledgment (used by e.g. `system_reset`, which doesn't return
    /// control to the caller on success anyway).
    pub fn post(&self, service_id: u8, payload: &[u8]) -> Result<(), RpmiError> {
        let header = MessageHeader {
            servicegroup_id: self.servicegroup_id,
            service_id,
            msg_type: MessageType::PostedRequest,
            datalen: payload.len() as u16,
            token: self.next_token(),
        };
        self.tx.send(header, payload)
    }
}

/// Default number of queue polls a blocking request waits before giving
/// up, matching the reference firmware's `RPMI_DEF_TX_TIMEOUT`-style
/// default of roughly 20 attempts.
pub const DEFAULT_RETRIES: u32 = 20;
