//! Protocol enumerations and their wire discriminants.
//!
//! Values 1..=4 of [`Action`] (get/set/reply/active) are fixed by the
//! deployed host middleware; the remaining discriminants are assigned
//! consecutively and must never be reordered.

use serde::{Deserialize, Serialize};

use super::frame::FrameError;

/// Physical interface a frame arrived on or must leave through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Interface {
    /// UART link to the application processor.
    Uart = 0x01,
    /// Ethernet management port.
    Ethernet = 0x02,
    /// Satellite (short-burst-data) modem.
    Sbd = 0x03,
    /// USB debug console.
    Usb = 0x04,
}

impl Interface {
    pub fn from_wire(raw: u8) -> Result<Self, FrameError> {
        match raw {
            0x01 => Ok(Interface::Uart),
            0x02 => Ok(Interface::Ethernet),
            0x03 => Ok(Interface::Sbd),
            0x04 => Ok(Interface::Usb),
            _ => Err(FrameError::UnknownInterface(raw)),
        }
    }
}

/// Message kind carried in the message head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MsgType {
    Config = 0x01,
    Status = 0x02,
    Command = 0x03,
    Alert = 0x04,
    Watchdog = 0x05,
    Debug = 0x06,
    EventInfo = 0x07,
    Internal = 0x08,
    Post = 0x09,
}

impl MsgType {
    pub fn from_wire(raw: u8) -> Result<Self, FrameError> {
        match raw {
            0x01 => Ok(MsgType::Config),
            0x02 => Ok(MsgType::Status),
            0x03 => Ok(MsgType::Command),
            0x04 => Ok(MsgType::Alert),
            0x05 => Ok(MsgType::Watchdog),
            0x06 => Ok(MsgType::Debug),
            0x07 => Ok(MsgType::EventInfo),
            0x08 => Ok(MsgType::Internal),
            0x09 => Ok(MsgType::Post),
            _ => Err(FrameError::UnknownMsgType(raw)),
        }
    }
}

/// Action requested by (or reported to) the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    Get = 0x01,
    Set = 0x02,
    Reply = 0x03,
    Active = 0x04,
    Clear = 0x05,
    Reset = 0x06,
    Enable = 0x07,
    Disable = 0x08,
    RegisterRead = 0x09,
    RegisterWrite = 0x0A,
    Echo = 0x0B,
}

impl Action {
    pub fn from_wire(raw: u8) -> Result<Self, FrameError> {
        match raw {
            0x01 => Ok(Action::Get),
            0x02 => Ok(Action::Set),
            0x03 => Ok(Action::Reply),
            0x04 => Ok(Action::Active),
            0x05 => Ok(Action::Clear),
            0x06 => Ok(Action::Reset),
            0x07 => Ok(Action::Enable),
            0x08 => Ok(Action::Disable),
            0x09 => Ok(Action::RegisterRead),
            0x0A => Ok(Action::RegisterWrite),
            0x0B => Ok(Action::Echo),
            _ => Err(FrameError::UnknownAction(raw)),
        }
    }
}

/// Target subsystem of a message.
///
/// The id travels as a signed byte. `Kernel` is a reserved sentinel for
/// messages handled by the routing kernel itself (POST activation and the
/// terminal POST report); it owns no worker and never appears in the
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum Subsystem {
    Kernel = -1,
    System = 0,
    Power = 1,
    Bms = 2,
    Hci = 3,
    Ethernet = 4,
    Gpp = 5,
    Sdr = 6,
    Rf = 7,
    Sync = 8,
    TestModule = 9,
}

impl Subsystem {
    pub fn from_wire(raw: u8) -> Result<Self, FrameError> {
        match raw as i8 {
            -1 => Ok(Subsystem::Kernel),
            0 => Ok(Subsystem::System),
            1 => Ok(Subsystem::Power),
            2 => Ok(Subsystem::Bms),
            3 => Ok(Subsystem::Hci),
            4 => Ok(Subsystem::Ethernet),
            5 => Ok(Subsystem::Gpp),
            6 => Ok(Subsystem::Sdr),
            7 => Ok(Subsystem::Rf),
            8 => Ok(Subsystem::Sync),
            9 => Ok(Subsystem::TestModule),
            _ => Err(FrameError::UnknownSubsystem(raw)),
        }
    }

    pub fn to_wire(self) -> u8 {
        self as i8 as u8
    }
}
