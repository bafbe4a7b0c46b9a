//! Status codes returned by the vendor library.
//!
//! Every foreign entry point returns a 32-bit status. `0x00000000` is the
//! only success value; [`StatusKind`] classifies the rest.

use std::fmt;

/// Classification of a [`ResultCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// Call succeeded
    Success,
    /// No dongle attached or visible
    DeviceNotFound,
    /// Handle is zero or stale
    InvalidHandle,
    /// An argument was rejected
    InvalidParameter,
    /// Operation not permitted
    AccessDenied,
    /// Index past the last enumerated device
    NoMoreDevices,
    /// Open was called before enumeration
    EnumerationRequired,
    /// Wrong PIN
    InvalidPassword,
    /// Device id not recognised
    InvalidDeviceId,
    /// Null or empty buffer
    InvalidBuffer,
    /// File id not present on the device
    InvalidFileId,
    /// Offset outside the file
    InvalidOffset,
    /// Length outside the file
    InvalidSize,
    /// Catch-all vendor error
    Unknown,
    /// Value not in the table
    Unrecognized,
}

/// A raw 32-bit status value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u32);

impl ResultCode {
    /// Success
    pub const SUCCESS: Self = Self(0x0000_0000);
    /// Device not found
    pub const NOT_FOUND: Self = Self(0xF000_0001);
    /// Invalid handle
    pub const INVALID_HANDLE: Self = Self(0xF000_0002);
    /// Invalid parameter
    pub const INVALID_PARAMETER: Self = Self(0xF000_0003);
    /// Access denied
    pub const ACCESS_DENIED: Self = Self(0xF000_0004);
    /// No more devices
    pub const NO_MORE_DEVICES: Self = Self(0xF000_0005);
    /// Enumeration must precede open
    pub const ENUM_REQUIRED: Self = Self(0xF000_0006);
    /// Invalid password
    pub const INVALID_PASSWORD: Self = Self(0xF000_0007);
    /// Invalid device id
    pub const INVALID_DEVICE_ID: Self = Self(0xF000_0008);
    /// Invalid buffer
    pub const INVALID_BUFFER: Self = Self(0xF000_0009);
    /// Invalid file id
    pub const INVALID_FILE_ID: Self = Self(0xF000_000A);
    /// Invalid offset
    pub const INVALID_OFFSET: Self = Self(0xF000_000B);
    /// Invalid size
    pub const INVALID_SIZE: Self = Self(0xF000_000C);
    /// Unknown error sentinel
    pub const UNKNOWN: Self = Self(0xFFFF_FFFF);

    /// Raw value
    pub fn value(self) -> u32 {
        self.0
    }

    /// True only for `0x00000000`
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Classifies the code
    pub fn kind(self) -> StatusKind {
        match self {
            Self::SUCCESS => StatusKind::Success,
            Self::NOT_FOUND => StatusKind::DeviceNotFound,
            Self::INVALID_HANDLE => StatusKind::InvalidHandle,
            Self::INVALID_PARAMETER => StatusKind::InvalidParameter,
            Self::ACCESS_DENIED => StatusKind::AccessDenied,
            Self::NO_MORE_DEVICES => StatusKind::NoMoreDevices,
            Self::ENUM_REQUIRED => StatusKind::EnumerationRequired,
            Self::INVALID_PASSWORD => StatusKind::InvalidPassword,
            Self::INVALID_DEVICE_ID => StatusKind::InvalidDeviceId,
            Self::INVALID_BUFFER => StatusKind::InvalidBuffer,
            Self::INVALID_FILE_ID => StatusKind::InvalidFileId,
            Self::INVALID_OFFSET => StatusKind::InvalidOffset,
            Self::INVALID_SIZE => StatusKind::InvalidSize,
            Self::UNKNOWN => StatusKind::Unknown,
            _ => StatusKind::Unrecognized,
        }
    }

    /// Human-readable description; total over all `u32` values
    pub fn description(self) -> String {
        let text = match self.kind() {
            StatusKind::Success => "success",
            StatusKind::DeviceNotFound => "device not found",
            StatusKind::InvalidHandle => "invalid handle",
            StatusKind::InvalidParameter => "invalid parameter",
            StatusKind::AccessDenied => "access denied",
            StatusKind::NoMoreDevices => "no more devices",
            StatusKind::EnumerationRequired => "enumerate devices first",
            StatusKind::InvalidPassword => "invalid password",
            StatusKind::InvalidDeviceId => "invalid device id",
            StatusKind::InvalidBuffer => "invalid buffer",
            StatusKind::InvalidFileId => "invalid file id",
            StatusKind::InvalidOffset => "invalid offset",
            StatusKind::InvalidSize => "invalid size",
            StatusKind::Unknown => "unknown error",
            StatusKind::Unrecognized => {
                return format!("unrecognized status 0x{:08X}", self.0);
            }
        };
        text.to_string()
    }

    /// Actionable hints for the common failure cases
    pub fn hints(self) -> &'static [&'static str] {
        match self.kind() {
            StatusKind::DeviceNotFound => &[
                "check that the dongle is plugged in and visible in `lsusb`",
                "check udev rules grant the current user access to the USB device",
                "try re-plugging the dongle or a different USB port",
            ],
            StatusKind::Unknown => &[
                "the library may not match this CPU architecture",
                "run with --sysinfo to check group membership and loaded modules",
                "try running as root to rule out permission problems",
            ],
            _ => &[],
        }
    }
}

impl From<u32> for ResultCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} ({})", self.0, self.description())
    }
}
