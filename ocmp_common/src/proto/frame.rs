//! Frame model and codec.
//!
//! A frame is header + message. The header records the ingress interface,
//! sequence number and timestamp; the message head addresses a subsystem,
//! component and action and carries the 16-bit parameter bitmap. The codec
//! is bit-exact: see the offset table below.
//!
//! ```text
//! off  size  field
//!   0     1  start-of-frame marker (0x55)
//!   1     1  payload length
//!   2     1  interface tag
//!   3     4  sequence number (LE)
//!   7     4  timestamp (LE)
//!  11     1  subsystem id (signed byte)
//!  12     1  component id
//!  13     1  message kind
//!  14     1  action
//!  15     2  parameter bitmap (LE)
//!  17     n  payload
//! ```

use heapless::Vec as HVec;
use static_assertions::const_assert;
use thiserror::Error;

use super::ids::{Action, Interface, MsgType, Subsystem};

/// Start-of-frame marker.
pub const SOF: u8 = 0x55;
/// Encoded header size in bytes.
pub const HEADER_LEN: usize = 11;
/// Encoded message head size in bytes (excluding payload).
pub const MESSAGE_HEAD_LEN: usize = 6;
/// Hard cap on the encoded frame size.
pub const FRAME_MAX: usize = 64;
/// Maximum payload size a frame can carry.
pub const PAYLOAD_MAX: usize = FRAME_MAX - HEADER_LEN - MESSAGE_HEAD_LEN;

const_assert!(PAYLOAD_MAX == 47);
const_assert!(HEADER_LEN + MESSAGE_HEAD_LEN + PAYLOAD_MAX <= FRAME_MAX);

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Requested payload exceeds frame capacity.
    #[error("no frame memory for {requested} payload bytes (max {PAYLOAD_MAX})")]
    NoMemory { requested: usize },

    /// Buffer too short to contain a frame.
    #[error("frame truncated: need {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },

    /// First byte is not the start-of-frame marker.
    #[error("bad start-of-frame marker 0x{0:02x}")]
    BadSof(u8),

    /// Header length field disagrees with the buffer.
    #[error("payload length mismatch: header says {declared}, buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unknown interface tag 0x{0:02x}")]
    UnknownInterface(u8),

    #[error("unknown message kind 0x{0:02x}")]
    UnknownMsgType(u8),

    #[error("unknown action 0x{0:02x}")]
    UnknownAction(u8),

    #[error("unknown subsystem id 0x{0:02x}")]
    UnknownSubsystem(u8),
}

/// Frame header: envelope metadata, no addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub interface: Interface,
    pub seq: u32,
    pub timestamp: u32,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            interface: Interface::Uart,
            seq: 0,
            timestamp: 0,
        }
    }
}

/// Message head + payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subsystem: Subsystem,
    pub component_id: u8,
    pub kind: MsgType,
    pub action: Action,
    /// Parameter bitmap: bit *i* selects the *i*-th schema-ordered parameter.
    pub parameters: u16,
    pub payload: HVec<u8, PAYLOAD_MAX>,
}

/// A complete OCMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub message: Message,
}

impl Frame {
    /// Allocate a frame with a zeroed payload of `payload_len` bytes.
    ///
    /// The encoded length field always reflects the payload actually
    /// allocated. Oversize requests fail with [`FrameError::NoMemory`].
    pub fn alloc(payload_len: usize) -> Result<Self, FrameError> {
        if payload_len > PAYLOAD_MAX {
            return Err(FrameError::NoMemory {
                requested: payload_len,
            });
        }
        let mut payload = HVec::new();
        payload
            .resize_default(payload_len)
            .map_err(|_| FrameError::NoMemory {
                requested: payload_len,
            })?;
        Ok(Self {
            header: FrameHeader::default(),
            message: Message {
                subsystem: Subsystem::System,
                component_id: 0,
                kind: MsgType::Internal,
                action: Action::Get,
                parameters: 0,
                payload,
            },
        })
    }

    /// Build a fully addressed request frame with a zeroed payload.
    pub fn request(
        subsystem: Subsystem,
        kind: MsgType,
        action: Action,
        component_id: u8,
        parameters: u16,
        payload_len: usize,
    ) -> Result<Self, FrameError> {
        let mut frame = Self::alloc(payload_len)?;
        frame.message.subsystem = subsystem;
        frame.message.kind = kind;
        frame.message.action = action;
        frame.message.component_id = component_id;
        frame.message.parameters = parameters;
        Ok(frame)
    }

    /// Build an alert frame from the event frame that triggered it.
    ///
    /// Header fields are carried over from the source; the kind is forced
    /// to [`MsgType::Alert`] and the payload re-zeroed to `payload_len`.
    pub fn alert_from_event(
        event: &Frame,
        component_id: u8,
        parameters: u16,
        payload_len: usize,
    ) -> Result<Self, FrameError> {
        let mut frame = Self::alloc(payload_len)?;
        frame.header = event.header.clone();
        frame.message.subsystem = event.message.subsystem;
        frame.message.kind = MsgType::Alert;
        frame.message.action = Action::Active;
        frame.message.component_id = component_id;
        frame.message.parameters = parameters;
        Ok(frame)
    }

    /// Encoded size of this frame in bytes.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + MESSAGE_HEAD_LEN + self.message.payload.len()
    }

    /// Encode into wire bytes.
    pub fn encode(&self) -> HVec<u8, FRAME_MAX> {
        let mut buf: HVec<u8, FRAME_MAX> = HVec::new();
        // Capacity is guaranteed: payload is bounded by PAYLOAD_MAX.
        let _ = buf.push(SOF);
        let _ = buf.push(self.message.payload.len() as u8);
        let _ = buf.push(self.header.interface as u8);
        let _ = buf.extend_from_slice(&self.header.seq.to_le_bytes());
        let _ = buf.extend_from_slice(&self.header.timestamp.to_le_bytes());
        let _ = buf.push(self.message.subsystem.to_wire());
        let _ = buf.push(self.message.component_id);
        let _ = buf.push(self.message.kind as u8);
        let _ = buf.push(self.message.action as u8);
        let _ = buf.extend_from_slice(&self.message.parameters.to_le_bytes());
        let _ = buf.extend_from_slice(&self.message.payload);
        buf
    }

    /// Decode a frame from wire bytes.
    ///
    /// The buffer must contain exactly one frame; trailing bytes beyond the
    /// declared payload length are a [`FrameError::LengthMismatch`].
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let head = HEADER_LEN + MESSAGE_HEAD_LEN;
        if bytes.len() < head {
            return Err(FrameError::TooShort {
                need: head,
                got: bytes.len(),
            });
        }
        if bytes[0] != SOF {
            return Err(FrameError::BadSof(bytes[0]));
        }
        let declared = bytes[1] as usize;
        if declared > PAYLOAD_MAX {
            return Err(FrameError::NoMemory {
                requested: declared,
            });
        }
        let actual = bytes.len() - head;
        if declared != actual {
            return Err(FrameError::LengthMismatch { declared, actual });
        }

        let interface = Interface::from_wire(bytes[2])?;
        let seq = u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]);
        let timestamp = u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]);
        let subsystem = Subsystem::from_wire(bytes[11])?;
        let component_id = bytes[12];
        let kind = MsgType::from_wire(bytes[13])?;
        let action = Action::from_wire(bytes[14])?;
        let parameters = u16::from_le_bytes([bytes[15], bytes[16]]);

        let mut payload = HVec::new();
        payload
            .extend_from_slice(&bytes[head..])
            .map_err(|_| FrameError::NoMemory { requested: actual })?;

        Ok(Self {
            header: FrameHeader {
                interface,
                seq,
                timestamp,
            },
            message: Message {
                subsystem,
                component_id,
                kind,
                action,
                parameters,
                payload,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let frame = Frame::request(
            Subsystem::Power,
            MsgType::Status,
            Action::Get,
            2,
            0b0000_0101,
            8,
        )
        .unwrap();
        let bytes = frame.encode();
        let decoded = Frame::decode(&bytes).unwrap();

        assert_eq!(decoded.message.subsystem, Subsystem::Power);
        assert_eq!(decoded.message.kind, MsgType::Status);
        assert_eq!(decoded.message.action, Action::Get);
        assert_eq!(decoded.message.component_id, 2);
        assert_eq!(decoded.message.parameters, 0b0000_0101);
        assert_eq!(decoded.message.payload.len(), 8);
        assert!(decoded.message.payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn alloc_sets_length_to_payload_size() {
        let frame = Frame::alloc(17).unwrap();
        assert_eq!(frame.message.payload.len(), 17);
        let bytes = frame.encode();
        assert_eq!(bytes[1], 17);
        assert_eq!(bytes.len(), HEADER_LEN + MESSAGE_HEAD_LEN + 17);
    }

    #[test]
    fn alloc_over_capacity_is_no_memory() {
        assert!(matches!(
            Frame::alloc(PAYLOAD_MAX + 1),
            Err(FrameError::NoMemory { requested }) if requested == PAYLOAD_MAX + 1
        ));
    }

    #[test]
    fn max_payload_frame_fits_the_cap() {
        let frame = Frame::alloc(PAYLOAD_MAX).unwrap();
        assert_eq!(frame.encoded_len(), FRAME_MAX);
        assert_eq!(frame.encode().len(), FRAME_MAX);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(matches!(
            Frame::decode(&[SOF, 0, 1]),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn decode_rejects_bad_sof() {
        let mut bytes = Frame::alloc(0).unwrap().encode();
        bytes[0] = 0xAA;
        assert!(matches!(Frame::decode(&bytes), Err(FrameError::BadSof(0xAA))));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let mut bytes = Frame::alloc(4).unwrap().encode();
        bytes[1] = 2;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::LengthMismatch {
                declared: 2,
                actual: 4
            })
        ));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let mut bytes = Frame::alloc(0).unwrap().encode();
        bytes[13] = 0x7E;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::UnknownMsgType(0x7E))
        ));
    }

    #[test]
    fn alert_from_event_copies_header_and_forces_kind() {
        let mut event = Frame::request(
            Subsystem::Bms,
            MsgType::Status,
            Action::Get,
            1,
            0,
            0,
        )
        .unwrap();
        event.header.interface = Interface::Ethernet;
        event.header.seq = 41;
        event.header.timestamp = 99;

        let alert = Frame::alert_from_event(&event, 3, 0b1000, 4).unwrap();
        assert_eq!(alert.header, event.header);
        assert_eq!(alert.message.subsystem, Subsystem::Bms);
        assert_eq!(alert.message.kind, MsgType::Alert);
        assert_eq!(alert.message.action, Action::Active);
        assert_eq!(alert.message.component_id, 3);
        assert_eq!(alert.message.parameters, 0b1000);
        assert_eq!(alert.message.payload.len(), 4);
    }
}
