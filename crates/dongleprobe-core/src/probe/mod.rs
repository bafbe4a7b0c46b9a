//! Call-signature probing for foreign entry points.
//!
//! The vendor library's ABI is not documented, so each logical operation
//! carries an ordered list of candidate signatures. [`probe`] invokes the
//! entry point under each candidate in turn and stops at the first one that
//! returns success. If none succeeds, the last status is surfaced.
//!
//! Only the read operation has more than one candidate today:
//!
//! 1. `Dongle_ReadFile(handle, file_id, offset, buffer, size)`
//! 2. `Dongle_ReadFile(handle, file_type, file_id, offset, buffer, size)`
//!
//! The second form's `file_type` is [`DATA_FILE_TYPE`] unless configured
//! otherwise; the value is an assumption, not something the vendor states.
//!
//! ## Extensibility
//!
//! [`ForeignEntry`] is the seam between the prober and the actual call. The
//! native implementation lives on [`Symbol`](crate::symbol::Symbol); tests
//! substitute recording stubs.

#[allow(unsafe_code)]
mod native;

use crate::device::{DeviceHandle, DeviceInfo};
use crate::error::{Error, Result};
use crate::status::ResultCode;
use std::fmt;
use std::os::raw::c_int;
use tracing::trace;

/// File-type discriminator passed by the six-parameter read form
pub const DATA_FILE_TYPE: u16 = 1;

/// The four logical operations exported by the vendor library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `Dongle_Enum`
    Enumerate,
    /// `Dongle_Open`
    Open,
    /// `Dongle_ReadFile`
    Read,
    /// `Dongle_Close`
    Close,
}

impl Operation {
    /// All operations in lifecycle order
    pub const ALL: [Operation; 4] = [Self::Enumerate, Self::Open, Self::Read, Self::Close];

    /// Exported symbol name
    pub fn symbol_name(self) -> &'static str {
        match self {
            Self::Enumerate => "Dongle_Enum",
            Self::Open => "Dongle_Open",
            Self::Read => "Dongle_ReadFile",
            Self::Close => "Dongle_Close",
        }
    }

    /// Close may be missing from the library; the rest may not
    pub fn is_required(self) -> bool {
        !matches!(self, Self::Close)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enumerate => "enumerate",
            Self::Open => "open",
            Self::Read => "read",
            Self::Close => "close",
        })
    }
}

/// One candidate parameter layout for a foreign function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSignature {
    /// `(DeviceInfo*, int* count)`
    Enumerate,
    /// `(handle* out, int index)`
    Open,
    /// `(handle, file_id, offset, buffer*, size)`
    ReadDirect,
    /// `(handle, file_type, file_id, offset, buffer*, size)`
    ReadTyped {
        /// Discriminator inserted before the file id
        file_type: u16,
    },
    /// `(handle)`
    Close,
}

impl CallSignature {
    /// Read candidates in probing order
    pub fn read_candidates(file_type: u16) -> [CallSignature; 2] {
        [Self::ReadDirect, Self::ReadTyped { file_type }]
    }

    /// Operation this signature belongs to
    pub fn operation(self) -> Operation {
        match self {
            Self::Enumerate => Operation::Enumerate,
            Self::Open => Operation::Open,
            Self::ReadDirect | Self::ReadTyped { .. } => Operation::Read,
            Self::Close => Operation::Close,
        }
    }

    /// Number of foreign parameters
    pub fn arity(self) -> usize {
        match self {
            Self::Enumerate | Self::Open => 2,
            Self::ReadDirect => 5,
            Self::ReadTyped { .. } => 6,
            Self::Close => 1,
        }
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.operation().symbol_name();
        match self {
            Self::Enumerate => write!(f, "{}(info*, count*)", name),
            Self::Open => write!(f, "{}(handle*, index)", name),
            Self::ReadDirect => write!(f, "{}(handle, file_id, offset, buffer*, size)", name),
            Self::ReadTyped { file_type } => write!(
                f,
                "{}(handle, file_type={}, file_id, offset, buffer*, size)",
                name, file_type
            ),
            Self::Close => write!(f, "{}(handle)", name),
        }
    }
}

/// Arguments for one foreign call, grouped by operation
#[derive(Debug)]
pub enum CallArgs<'a> {
    /// `records` is `None` for the count query
    Enumerate {
        /// Output array, sized by a prior count query
        records: Option<&'a mut [DeviceInfo]>,
        /// Device count cell
        count: &'a mut c_int,
    },
    /// Written only on success
    Open {
        /// Output handle
        handle: &'a mut DeviceHandle,
        /// Zero-based device index
        index: c_int,
    },
    /// Read a span of a device file into `buffer`
    Read {
        /// Open device
        handle: DeviceHandle,
        /// File on the device
        file_id: u16,
        /// Byte offset into the file
        offset: u16,
        /// Destination; its length is the requested size
        buffer: &'a mut [u8],
    },
    /// Release a device
    Close {
        /// Device to release
        handle: DeviceHandle,
    },
}

impl CallArgs<'_> {
    /// Operation these arguments belong to
    pub fn operation(&self) -> Operation {
        match self {
            Self::Enumerate { .. } => Operation::Enumerate,
            Self::Open { .. } => Operation::Open,
            Self::Read { .. } => Operation::Read,
            Self::Close { .. } => Operation::Close,
        }
    }
}

/// Something that can be called under a [`CallSignature`]
pub trait ForeignEntry {
    /// Performs one call and returns the raw status.
    ///
    /// Errors are reserved for host-side problems such as a signature that
    /// does not fit the arguments; foreign failures come back as status codes.
    fn invoke(&self, signature: CallSignature, args: &mut CallArgs<'_>) -> Result<ResultCode>;
}

/// Result of probing an entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Signature of the last attempt (the successful one, if any)
    pub signature: CallSignature,
    /// Status of the last attempt
    pub code: ResultCode,
    /// Every attempt in order
    pub attempts: Vec<(CallSignature, ResultCode)>,
}

impl ProbeOutcome {
    /// True when some candidate returned success
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

/// Invokes `entry` under each candidate until one returns success
pub fn probe<E: ForeignEntry + ?Sized>(
    entry: &E,
    candidates: &[CallSignature],
    args: &mut CallArgs<'_>,
) -> Result<ProbeOutcome> {
    let operation = args.operation();
    let mut attempts = Vec::with_capacity(candidates.len());

    for &signature in candidates {
        if signature.operation() != operation {
            return Err(Error::SignatureMismatch {
                signature: signature.to_string(),
                operation,
            });
        }

        let code = entry.invoke(signature, args)?;
        trace!("{} returned {}", signature, code);
        attempts.push((signature, code));

        if code.is_success() {
            break;
        }
    }

    let Some(&(signature, code)) = attempts.last() else {
        return Err(Error::NoCandidates(operation));
    };

    Ok(ProbeOutcome {
        signature,
        code,
        attempts,
    })
}
