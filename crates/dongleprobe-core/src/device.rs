//! Device records and handles exchanged with the vendor library.

use std::fmt;
use std::os::raw::c_ulong;

/// One enumerated dongle, laid out exactly as the vendor library writes it.
///
/// The harness never interprets these fields beyond display.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Firmware version
    pub version: u16,
    /// Product type
    pub kind: u16,
    /// Manufacturing date bytes
    pub birthday: [u8; 8],
    /// Agent (reseller) id
    pub agent_id: c_ulong,
    /// Product id
    pub product_id: c_ulong,
    /// User id
    pub user_id: c_ulong,
    /// Hardware id
    pub hardware_id: [u8; 8],
    /// Non-zero for a mother (master) dongle
    pub is_mother: c_ulong,
    /// Device type
    pub device_type: c_ulong,
}

impl DeviceInfo {
    /// True when the record is flagged as a mother dongle
    pub fn is_mother(&self) -> bool {
        self.is_mother != 0
    }
}

/// Opaque handle for one opened dongle.
///
/// Zero means "not open" and is never passed to read or close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    /// The "not open" handle
    pub const CLOSED: Self = Self(0);

    /// Wraps a raw handle value
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw handle value as passed across the foreign boundary
    pub fn as_raw(self) -> usize {
        self.0
    }

    /// True for any non-zero handle
    pub fn is_open(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_handle() {
        assert!(!DeviceHandle::CLOSED.is_open());
        assert!(!DeviceHandle::default().is_open());
        assert!(DeviceHandle::from_raw(1).is_open());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(DeviceHandle::from_raw(0x1F).to_string(), "0x1F");
    }

    #[test]
    fn test_default_record_is_zeroed() {
        let info = DeviceInfo::default();
        assert_eq!(info.birthday, [0; 8]);
        assert!(!info.is_mother());
    }
}
