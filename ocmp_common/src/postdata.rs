//! Power-on self-test result types.
//!
//! Each probed device contributes one [`PostData`] record per boot. Records
//! are kept in a bounded table and can be packed into the 8-byte wire
//! layout the host's `post get` query expects.

use serde::{Deserialize, Serialize};

use crate::proto::Subsystem;

/// Bound on the POST record table: one slot per probe-able device.
pub const POST_RECORDS: usize = 40;

/// Outcome of probing or initializing a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PostCode {
    /// Device did not answer its probe.
    DevMissing = 0x00,
    /// Device answered its probe.
    DevFound = 0x01,
    /// Device was initialized and configured.
    ConfigDone = 0x02,
    /// Device answered but carries no configuration step.
    NoConfig = 0x03,
    /// Device answered but failed initialization.
    DevFaulty = 0x04,
}

impl PostCode {
    /// Whether this code counts as a passing self-test result.
    pub fn passed(self) -> bool {
        matches!(
            self,
            PostCode::DevFound | PostCode::ConfigDone | PostCode::NoConfig
        )
    }
}

/// Identification read back from a device during probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub bus: u8,
    pub addr: u8,
    pub manufacturer_id: u16,
    pub device_id: u16,
}

/// One POST table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostData {
    pub subsystem: Subsystem,
    /// Device serial number within the boot, starting at 1. Increments per
    /// probed device, independent of subsystem.
    pub serial: u8,
    pub bus: u8,
    pub addr: u8,
    pub manufacturer_id: u16,
    pub device_id: u16,
    pub status: PostCode,
}

impl PostData {
    /// Packed wire size of one record.
    pub const WIRE_SIZE: usize = 8;

    /// Fresh record for a device that has not answered yet: identification
    /// fields carry the all-ones placeholders.
    pub fn missing(subsystem: Subsystem, serial: u8) -> Self {
        Self {
            subsystem,
            serial,
            bus: 0xFF,
            addr: 0xFF,
            manufacturer_id: 0xFFFF,
            device_id: 0xFFFF,
            status: PostCode::DevMissing,
        }
    }

    /// Fill in identification read back from the device.
    pub fn record_info(&mut self, info: &DeviceInfo) {
        self.bus = info.bus;
        self.addr = info.addr;
        self.manufacturer_id = info.manufacturer_id;
        self.device_id = info.device_id;
    }

    /// Pack into the 8-byte record layout (LE multi-byte fields).
    pub fn pack(&self) -> [u8; Self::WIRE_SIZE] {
        let man = self.manufacturer_id.to_le_bytes();
        let dev = self.device_id.to_le_bytes();
        [
            self.subsystem.to_wire(),
            self.serial,
            self.bus,
            self.addr,
            man[0],
            man[1],
            dev[0],
            dev[1],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_record_has_placeholder_ids() {
        let rec = PostData::missing(Subsystem::Power, 3);
        assert_eq!(rec.bus, 0xFF);
        assert_eq!(rec.addr, 0xFF);
        assert_eq!(rec.manufacturer_id, 0xFFFF);
        assert_eq!(rec.device_id, 0xFFFF);
        assert_eq!(rec.status, PostCode::DevMissing);
    }

    #[test]
    fn pack_layout() {
        let mut rec = PostData::missing(Subsystem::Bms, 7);
        rec.record_info(&DeviceInfo {
            bus: 2,
            addr: 0x48,
            manufacturer_id: 0x1131,
            device_id: 0xA801,
        });
        rec.status = PostCode::ConfigDone;
        assert_eq!(rec.pack(), [2, 7, 2, 0x48, 0x31, 0x11, 0x01, 0xA8]);
    }

    #[test]
    fn pass_fail_split() {
        assert!(PostCode::DevFound.passed());
        assert!(PostCode::ConfigDone.passed());
        assert!(PostCode::NoConfig.passed());
        assert!(!PostCode::DevMissing.passed());
        assert!(!PostCode::DevFaulty.passed());
    }
}
