//! RPMI (Platform Management Interface) transport: a shared-memory
//! queue-pair protocol spoken with an off-board management
//! microcontroller, plus the clients layered on it that let SBI
//! extensions delegate HSM/CPPC/system-suspend work to that
//! microcontroller instead of implementing it locally.
//!
//! Grounded in the reference firmware's `rpmi_msgprot.h` wire format and
//! `mailbox.h`'s controller/channel/transfer abstraction.

pub mod clients;
pub mod mailbox;
pub mod queue;

use crate::error::RpmiError;

/// Minimum queue slot size the wire format allows; a queue whose
/// `slot_size` is smaller cannot hold even an empty-payload message.
pub const SLOT_SIZE_MIN: usize = 64;
/// Size of [`MessageHeader`] on the wire.
pub const MSG_HDR_SIZE: usize = 8;

/// RPMI message types, carried in the header's flags field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    NormalRequest = 0,
    PostedRequest = 1,
    Acknowledgement = 2,
    Notification = 3,
}

/// Service group identifiers this firmware knows how to speak to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ServiceGroup {
    Base = 0x0001,
    SystemReset = 0x0002,
    SystemSuspend = 0x0003,
    Hsm = 0x0009,
    Cppc = 0x000a,
}

/// The 8-byte RPMI message header: service group, service id within the
/// group, flags (message type in bits 0-2), payload length, and a
/// token used to match a response to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub servicegroup_id: u16,
    pub service_id: u8,
    pub msg_type: MessageType,
    pub datalen: u16,
    pub token: u16,
}

impl MessageHeader {
    pub fn encode(&self) -> [u8; MSG_HDR_SIZE] {
        let mut buf = [0u8; MSG_HDR_SIZE];
        buf[0..2].copy_from_slice(&self.servicegroup_id.to_le_bytes());
        buf[2] = self.service_id;
        buf[3] = self.msg_type as u8;
        buf[4..6].copy_from_slice(&self.datalen.to_le_bytes());
        buf[6..8].copy_from_slice(&self.token.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; MSG_HDR_SIZE]) -> Result<Self, RpmiError> {
        let msg_type = match buf[3] & 0x7 {
            0 => MessageType::NormalRequest,
            1 => MessageType::PostedRequest,
            2 => MessageType::Acknowledgement,
            3 => MessageType::Notification,
            _ => return Err(RpmiError::InvalidParam),
        };
        Ok(MessageHeader {
            servicegroup_id: u16::from_le_bytes([buf[0], buf[1]]),
            service_id: buf[2],
            msg_type,
            datalen: u16::from_le_bytes([buf[4], buf[5]]),
            token: u16::from_le_bytes([buf[6], buf[7]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = MessageHeader {
            servicegroup_id: ServiceGroup::Hsm as u16,
            service_id: 3,
            msg_type: MessageType::NormalRequest,
            datalen: 16,
            token: 42,
        };
        let decoded = MessageHeader::decode(&h.encode()).unwrap();
        assert_eq!(decoded, h);
    }
}
