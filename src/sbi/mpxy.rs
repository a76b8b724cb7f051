//! The MPXY extension (`EID_MPXY`, a vendor-allocated range): the
//! channel-oriented message-proxy calls described in §4.4 — a
//! supervisor registers a shared-memory buffer once with `set_shmem`,
//! then uses `send_message_with_response`/`send_message_without_
//! response` to talk to whichever RPMI service group a channel id is
//! bound to. A channel request for an unbound id reports
//! `NOT_SUPPORTED` rather than failing cold boot (§8's "RPMI probe of
//! absent group").
//!
//! Each channel additionally carries a per-service-id size table
//! (`min_tx`/`max_tx`/`min_rx`/`max_rx`), an optional group-specific
//! transfer hook run before the mailbox submit, and a set of attributes
//! read back from the mailbox controller at registration time —
//! grounded in `sbi_mpxy_send_message`/`sbi_mpxy_read_attrs` in
//! `original_source/lib/sbi/sbi_mpxy.c`.

use heapless::Vec;
use spin::Once;

use super::{SbiExtension, SbiRet};
use crate::error::{RpmiError, SbiError};
use crate::hartmask::MAX_HARTS;
use crate::rpmi::clients::{
    CPPC_SRV_PROBE, CPPC_SRV_READ, CPPC_SRV_WRITE, HSM_SRV_HART_START, HSM_SRV_HART_STOP,
    HSM_SRV_HART_SUSPEND, SYSRST_SRV_SYSTEM_RESET, SYSSUSP_SRV_SYSTEM_SUSPEND,
};
use crate::rpmi::mailbox::{MailboxChannel, DEFAULT_RETRIES};
use crate::rpmi::queue::ShmemQueue;
use crate::rpmi::ServiceGroup;

/// Vendor-allocated extension id range this firmware claims for MPXY.
/// Matches the reference firmware's own reserved vendor range rather
/// than inventing an id that collides with another implementation's
/// choice.
pub const EID_MPXY: usize = 0x4d505859;

const FID_GET_SHMEM_SIZE: usize = 0;
const FID_SET_SHMEM: usize = 1;
const FID_SEND_MESSAGE_WITH_RESPONSE: usize = 2;
const FID_SEND_MESSAGE_WITHOUT_RESPONSE: usize = 3;
const FID_GET_NOTIFICATIONS: usize = 4;
const FID_READ_ATTRS: usize = 5;

/// Per-HART shared-memory buffer registered via `set_shmem`, used as
/// the scratch area `send_message*` reads the outgoing payload from and
/// writes the response into. Unset is represented as `(0, 0)`.
struct ShmemSlot {
    addr: core::sync::atomic::AtomicUsize,
    size: core::sync::atomic::AtomicUsize,
}

impl ShmemSlot {
    const fn new() -> Self {
        ShmemSlot { addr: core::sync::atomic::AtomicUsize::new(0), size: core::sync::atomic::AtomicUsize::new(0) }
    }

    fn set(&self, addr: usize, size: usize) {
        self.addr.store(addr, core::sync::atomic::Ordering::Release);
        self.size.store(size, core::sync::atomic::Ordering::Release);
    }

    fn get(&self) -> Option<(usize, usize)> {
        let addr = self.addr.load(core::sync::atomic::Ordering::Acquire);
        let size = self.size.load(core::sync::atomic::Ordering::Acquire);
        if size == 0 {
            None
        } else {
            Some((addr, size))
        }
    }
}

static SHMEM_SLOTS: [ShmemSlot; MAX_HARTS] = {
    const SLOT: ShmemSlot = ShmemSlot::new();
    [SLOT; MAX_HARTS]
};

/// Maximum payload size `send_message*` will move through a registered
/// shmem buffer, also reported back by `get_shmem_size`.
pub const MPXY_SHMEM_SIZE: usize = 4096;

pub const MAX_CHANNELS: usize = 4;

/// Per-service-id transfer-size bounds a channel enforces ahead of a
/// mailbox submit, matching the size validation `sbi_mpxy_send_message`
/// performs against `channel->attrs.msg_data_maxlen` and the message
/// protocol driver's own per-service expectations.
#[derive(Clone, Copy)]
struct ServiceBounds {
    service_id: u8,
    min_tx: u16,
    max_tx: u16,
    min_rx: u16,
    max_rx: u16,
}

const fn sb(service_id: u8, min_tx: u16, max_tx: u16, min_rx: u16, max_rx: u16) -> ServiceBounds {
    ServiceBounds { service_id, min_tx, max_tx, min_rx, max_rx }
}

/// HSM-over-RPMI request shapes: `hart_start` carries a hart id plus a
/// 64-bit resume address, `hart_stop` just the hart id, `hart_suspend`
/// the hart id plus a 32-bit suspend type; every service acks with a
/// single `u32` status word, matching [`crate::rpmi::clients::HsmClient`].
const HSM_BOUNDS: &[ServiceBounds] = &[
    sb(HSM_SRV_HART_START, 12, 12, 4, 4),
    sb(HSM_SRV_HART_STOP, 4, 4, 4, 4),
    sb(HSM_SRV_HART_SUSPEND, 8, 8, 4, 4),
];

const SYSRST_BOUNDS: &[ServiceBounds] = &[sb(SYSRST_SRV_SYSTEM_RESET, 8, 8, 0, 0)];
const SYSSUSP_BOUNDS: &[ServiceBounds] = &[sb(SYSSUSP_SRV_SYSTEM_SUSPEND, 12, 12, 4, 4)];
const CPPC_BOUNDS: &[ServiceBounds] =
    &[sb(CPPC_SRV_PROBE, 4, 4, 4, 4), sb(CPPC_SRV_READ, 4, 4, 8, 8), sb(CPPC_SRV_WRITE, 12, 12, 4, 4)];

fn bounds_for_group(group: ServiceGroup) -> &'static [ServiceBounds] {
    match group {
        ServiceGroup::Hsm => HSM_BOUNDS,
        ServiceGroup::SystemReset => SYSRST_BOUNDS,
        ServiceGroup::SystemSuspend => SYSSUSP_BOUNDS,
        ServiceGroup::Cppc => CPPC_BOUNDS,
        ServiceGroup::Base => &[],
    }
}

fn find_bounds(table: &[ServiceBounds], service_id: u8) -> Option<&ServiceBounds> {
    table.iter().find(|b| b.service_id == service_id)
}

/// Group-specific transfer hook, run after bounds validation and before
/// the mailbox submit. Lets a service group enforce checks no generic
/// size bound can express — the reference firmware's system-MSI group
/// uses this same seam to reject denied MSI indices; this firmware's
/// HSM group uses it to reject a target hart id this platform never
/// brought up, the same bound [`crate::sbi::hsm`] applies to the direct
/// (non-RPMI) `hart_start`/`hart_stop` path.
type XferHook = fn(service_id: u8, tx: &[u8]) -> Result<(), SbiError>;

fn hsm_xfer_hook(service_id: u8, tx: &[u8]) -> Result<(), SbiError> {
    let carries_hart_id =
        matches!(service_id, HSM_SRV_HART_START | HSM_SRV_HART_STOP | HSM_SRV_HART_SUSPEND) && tx.len() >= 4;
    if carries_hart_id {
        let hartid = u32::from_le_bytes([tx[0], tx[1], tx[2], tx[3]]) as usize;
        if hartid >= crate::platform::current().hart_count() {
            return Err(SbiError::InvalidParam);
        }
    }
    Ok(())
}

fn xfer_hook_for_group(group: ServiceGroup) -> Option<XferHook> {
    match group {
        ServiceGroup::Hsm => Some(hsm_xfer_hook),
        _ => None,
    }
}

/// This firmware's RPMI message-header wire format id/version (the
/// 8-byte layout [`crate::rpmi::MessageHeader`] encodes/decodes), and
/// this firmware's own MPXY implementation id/version, reported back
/// through `FID_READ_ATTRS` the way `sbi_mpxy_read_attrs` reports
/// `msg_proto_id`/`msg_proto_version` and an implementation identity.
const RPMI_MSG_PROTOCOL_ID: u32 = 1;
const RPMI_MSG_PROTOCOL_VERSION: u32 = 1;
const MPXY_IMPL_ID: u32 = 1;
const MPXY_IMPL_VERSION: u32 = 1;

/// Attributes exposed to S-mode via `FID_READ_ATTRS`: maximum message
/// data length, per-transfer timeouts, message-protocol id/version, and
/// service-group/implementation id/version. Computed once from the
/// mailbox's own queue capacity at `register_channels` time rather than
/// a live RPMI round trip, since this crate doesn't implement an RPMI
/// Base service-group client to query a remote controller's identity
/// through.
#[derive(Clone, Copy)]
struct ChannelAttrs {
    msg_proto_id: u32,
    msg_proto_version: u32,
    msg_data_maxlen: u32,
    msg_send_timeout_ms: u32,
    msg_completion_timeout_ms: u32,
    servicegroup_version: u32,
    impl_id: u32,
    impl_version: u32,
}

impl ChannelAttrs {
    fn for_channel(mailbox: &MailboxChannel) -> Self {
        let maxlen = mailbox.tx_payload_capacity().min(mailbox.rx_payload_capacity()) as u32;
        ChannelAttrs {
            msg_proto_id: RPMI_MSG_PROTOCOL_ID,
            msg_proto_version: RPMI_MSG_PROTOCOL_VERSION,
            msg_data_maxlen: maxlen,
            msg_send_timeout_ms: DEFAULT_RETRIES,
            msg_completion_timeout_ms: DEFAULT_RETRIES,
            servicegroup_version: 1,
            impl_id: MPXY_IMPL_ID,
            impl_version: MPXY_IMPL_VERSION,
        }
    }

    fn to_words(self) -> [u32; 8] {
        [
            self.msg_proto_id,
            self.msg_proto_version,
            self.msg_data_maxlen,
            self.msg_send_timeout_ms,
            self.msg_completion_timeout_ms,
            self.servicegroup_version,
            self.impl_id,
            self.impl_version,
        ]
    }
}

struct ChannelEntry {
    channel_id: u32,
    mailbox: MailboxChannel,
    bounds: &'static [ServiceBounds],
    xfer_group: Option<XferHook>,
    attrs: ChannelAttrs,
    /// Reverse queue for platform-initiated notifications. Only present
    /// when the FDT's RPMI reservation was large enough to carve out a
    /// second pair beyond the request/ack queues (§4.4's "optionally the
    /// reverse pair for platform-initiated notifications").
    notify_rx: Option<ShmemQueue>,
}

struct ChannelRegistry {
    channels: Vec<ChannelEntry, MAX_CHANNELS>,
}

static CHANNELS: Once<ChannelRegistry> = Once::new();

/// Builds the channel registry from the FDT's RPMI shared-memory
/// reservation, if any. A reservation large enough for four equal
/// quarters gets request, ack, and a notification pair; one only large
/// enough for two gets just the request/ack pair and reports
/// `NOT_SUPPORTED` on `get_notifications`. All channels here bind to
/// channel id 0's HSM service group; a platform with no RPMI
/// reservation (e.g. `virt` with no microcontroller) ends up with an
/// empty registry, and every channel request reports `NOT_SUPPORTED`.
///
/// # Safety
/// `rpmi_shmem`, if present, must describe a physical region exclusively
/// reserved for this queue pair for the remainder of firmware execution.
pub unsafe fn register_channels(rpmi_shmem: Option<(u64, u64)>) {
    CHANNELS.call_once(|| {
        let mut channels: Vec<ChannelEntry, MAX_CHANNELS> = Vec::new();
        if let Some((base, size)) = rpmi_shmem {
            const SLOT_SIZE: usize = 64;
            let want_notify_pair = (size / 4) as usize / SLOT_SIZE >= 3;
            let quarters: u64 = if want_notify_pair { 4 } else { 2 };
            let chunk = (size / quarters) as usize;
            let slot_count = chunk / SLOT_SIZE;
            if slot_count >= 3 {
                let tx = unsafe { ShmemQueue::new(base as usize, SLOT_SIZE, slot_count) };
                let rx = unsafe { ShmemQueue::new(base as usize + chunk, SLOT_SIZE, slot_count) };
                let notify_rx = if want_notify_pair {
                    Some(unsafe { ShmemQueue::new(base as usize + 3 * chunk, SLOT_SIZE, slot_count) })
                } else {
                    None
                };
                let mailbox = unsafe { MailboxChannel::new(tx, rx, ServiceGroup::Hsm) };
                let attrs = ChannelAttrs::for_channel(&mailbox);
                let _ = channels.push(ChannelEntry {
                    channel_id: 0,
                    mailbox,
                    bounds: bounds_for_group(ServiceGroup::Hsm),
                    xfer_group: xfer_hook_for_group(ServiceGroup::Hsm),
                    attrs,
                    notify_rx,
                });
            }
        }
        ChannelRegistry { channels }
    });
}

fn channel_entry(channel_id: u32) -> Option<&'static ChannelEntry> {
    CHANNELS.get().and_then(|r| r.channels.iter().find(|c| c.channel_id == channel_id))
}

pub struct MpxyExtension;

impl SbiExtension for MpxyExtension {
    fn extid_range(&self) -> (usize, usize) {
        (EID_MPXY, EID_MPXY)
    }

    fn probe(&self, fid: usize) -> bool {
        fid <= FID_READ_ATTRS
    }

    fn handle(&self, fid: usize, args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
        match fid {
            FID_GET_SHMEM_SIZE => {
                ret.value = MPXY_SHMEM_SIZE;
                Ok(())
            }
            FID_SET_SHMEM => {
                let hartindex = crate::init::current_hartindex();
                SHMEM_SLOTS[hartindex].set(args[0], args[1]);
                ret.value = 0;
                Ok(())
            }
            FID_SEND_MESSAGE_WITH_RESPONSE => send_message(args, ret, true),
            FID_SEND_MESSAGE_WITHOUT_RESPONSE => send_message(args, ret, false),
            FID_GET_NOTIFICATIONS => get_notifications(args, ret),
            FID_READ_ATTRS => read_attrs(args, ret),
            _ => Err(SbiError::NotSupported),
        }
    }
}

fn send_message(args: &[usize; 6], ret: &mut SbiRet, want_response: bool) -> Result<(), SbiError> {
    let channel_id = args[0] as u32;
    let service_id = args[1] as u8;
    let tx_len = args[2];

    let hartindex = crate::init::current_hartindex();
    let (shmem_addr, shmem_size) = SHMEM_SLOTS[hartindex].get().ok_or(SbiError::NoShmem)?;
    let entry = channel_entry(channel_id).ok_or(SbiError::NotSupported)?;

    let bounds = find_bounds(entry.bounds, service_id).ok_or(SbiError::InvalidParam)?;
    if tx_len < bounds.min_tx as usize || tx_len > bounds.max_tx as usize {
        return Err(SbiError::InvalidParam);
    }
    if tx_len > shmem_size || tx_len > MPXY_SHMEM_SIZE {
        return Err(SbiError::InvalidParam);
    }

    let tx = unsafe { core::slice::from_raw_parts(shmem_addr as *const u8, tx_len) };
    if let Some(hook) = entry.xfer_group {
        hook(service_id, tx)?;
    }

    if want_response {
        let rx = unsafe { core::slice::from_raw_parts_mut(shmem_addr as *mut u8, shmem_size) };
        let n = entry.mailbox.request(service_id, tx, rx, DEFAULT_RETRIES)?;
        if n < bounds.min_rx as usize || n > bounds.max_rx as usize {
            return Err(SbiError::Failed);
        }
        ret.value = n;
    } else {
        entry.mailbox.post(service_id, tx)?;
        ret.value = 0;
    }
    Ok(())
}

fn get_notifications(args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
    let channel_id = args[0] as u32;
    let hartindex = crate::init::current_hartindex();
    let (shmem_addr, shmem_size) = SHMEM_SLOTS[hartindex].get().ok_or(SbiError::NoShmem)?;
    let entry = channel_entry(channel_id).ok_or(SbiError::NotSupported)?;
    let notify = entry.notify_rx.as_ref().ok_or(SbiError::NotSupported)?;

    let out = unsafe { core::slice::from_raw_parts_mut(shmem_addr as *mut u8, shmem_size) };
    match notify.recv_any(out) {
        Ok(n) => {
            ret.value = n;
            Ok(())
        }
        Err(RpmiError::NoData) => {
            ret.value = 0;
            Ok(())
        }
        Err(e) => Err(SbiError::from(e)),
    }
}

fn read_attrs(args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
    let channel_id = args[0] as u32;
    let hartindex = crate::init::current_hartindex();
    let (shmem_addr, shmem_size) = SHMEM_SLOTS[hartindex].get().ok_or(SbiError::NoShmem)?;
    let entry = channel_entry(channel_id).ok_or(SbiError::NotSupported)?;

    let words = entry.attrs.to_words();
    let bytes_needed = words.len() * 4;
    if shmem_size < bytes_needed {
        return Err(SbiError::Failed);
    }
    let out = unsafe { core::slice::from_raw_parts_mut(shmem_addr as *mut u8, bytes_needed) };
    for (i, w) in words.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
    }
    ret.value = words.len();
    Ok(())
}

pub static MPXY: MpxyExtension = MpxyExtension;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsm_bounds_cover_all_three_services() {
        assert!(find_bounds(HSM_BOUNDS, HSM_SRV_HART_START).is_some());
        assert!(find_bounds(HSM_BOUNDS, HSM_SRV_HART_STOP).is_some());
        assert!(find_bounds(HSM_BOUNDS, HSM_SRV_HART_SUSPEND).is_some());
        assert!(find_bounds(HSM_BOUNDS, 0xff).is_none());
    }

    #[test]
    fn hsm_xfer_hook_rejects_out_of_range_hart() {
        let hart_count = crate::platform::current().hart_count() as u32;
        let tx = (hart_count + 1).to_le_bytes();
        assert_eq!(hsm_xfer_hook(HSM_SRV_HART_STOP, &tx), Err(SbiError::InvalidParam));
    }
}
