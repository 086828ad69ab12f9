//! OCMP wire protocol.
//!
//! The protocol is a compact binary envelope: an 11-byte header, a 6-byte
//! message head and up to [`frame::PAYLOAD_MAX`] payload bytes, capped at
//! [`frame::FRAME_MAX`] bytes total. Multi-byte fields are little-endian,
//! matching the packed-struct layout the EC hardware ships.

pub mod cursor;
pub mod frame;
pub mod ids;

pub use cursor::{CursorError, PayloadCursor};
pub use frame::{Frame, FrameError, FrameHeader, Message, FRAME_MAX, PAYLOAD_MAX};
pub use ids::{Action, Interface, MsgType, Subsystem};
