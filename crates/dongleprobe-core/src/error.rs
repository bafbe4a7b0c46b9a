//! Error types for the dongleprobe-core library.
//!
//! Foreign calls report failure only through their 32-bit [`ResultCode`];
//! those codes are carried verbatim inside [`Error::Status`]. Everything else
//! (missing files, loader failures, absent symbols) is a host-side failure
//! with its own variant.

use crate::probe::Operation;
use crate::status::ResultCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dongleprobe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all dongleprobe operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No library is known for this operating system
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system name
        os: String,
        /// CPU architecture name
        arch: String,
    },

    /// The shared library file does not exist
    #[error("library file not found: '{path}'")]
    LibraryNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// Failed to stat the shared library file
    #[error("failed to inspect '{path}': {source}")]
    LibraryMetadata {
        /// Path that was inspected
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file exists but the dynamic loader rejected it
    #[error("failed to load library '{path}': {source}")]
    LibraryLoad {
        /// Path passed to the loader
        path: PathBuf,
        /// Loader error
        #[source]
        source: libloading::Error,
    },

    /// The library was already released
    #[error("library handle {0} is closed")]
    LibraryClosed(u64),

    /// Neither the plain nor the underscore-prefixed name is exported
    #[error("symbol '{name}' not found (also tried '_{name}')")]
    SymbolNotFound {
        /// Requested symbol name
        name: String,
    },

    /// The foreign library returned a non-success status
    #[error("{operation} failed: {code}")]
    Status {
        /// Logical operation that failed
        operation: Operation,
        /// Status returned by the foreign call
        code: ResultCode,
    },

    /// The call was refused before reaching the foreign library
    #[error("{operation} rejected locally: {code}")]
    Rejected {
        /// Logical operation that was refused
        operation: Operation,
        /// Taxonomy code describing why
        code: ResultCode,
    },

    /// A call signature was paired with arguments of another operation
    #[error("signature {signature} cannot take {operation} arguments")]
    SignatureMismatch {
        /// Description of the signature
        signature: String,
        /// Operation the arguments belong to
        operation: Operation,
    },

    /// A probe was started with an empty candidate list
    #[error("no call signatures defined for {0}")]
    NoCandidates(Operation),

    /// The harness was driven out of order
    #[error("cannot {action} in state {state}")]
    InvalidState {
        /// Attempted action
        action: &'static str,
        /// State the harness was in
        state: String,
    },

    /// Failed to run an external diagnostic utility
    #[error("failed to run '{command}': {source}")]
    Command {
        /// Command name
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write diagnostic output
    #[error("failed to write report: {0}")]
    Output(#[from] std::io::Error),
}

impl Error {
    /// Creates a new unsupported platform error
    pub fn unsupported_platform(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Creates a new library metadata error
    pub fn library_metadata(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LibraryMetadata {
            path: path.into(),
            source,
        }
    }

    /// Creates a new library load error
    pub fn library_load(path: impl Into<PathBuf>, source: libloading::Error) -> Self {
        Self::LibraryLoad {
            path: path.into(),
            source,
        }
    }

    /// Creates a new symbol lookup error
    pub fn symbol_not_found(name: impl Into<String>) -> Self {
        Self::SymbolNotFound { name: name.into() }
    }

    /// Creates a new foreign status error
    pub fn status(operation: Operation, code: ResultCode) -> Self {
        Self::Status { operation, code }
    }

    /// Creates a new local rejection error
    pub fn rejected(operation: Operation, code: ResultCode) -> Self {
        Self::Rejected { operation, code }
    }

    /// Creates a new invalid state error
    pub fn invalid_state(action: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            action,
            state: state.to_string(),
        }
    }

    /// Creates a new external command error
    pub fn command(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Command {
            command: command.into(),
            source,
        }
    }

    /// Returns the taxonomy code for status-bearing errors
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            Self::Status { code, .. } | Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the run may continue with the next independent step
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Status { .. }
                | Self::Rejected { .. }
                | Self::SymbolNotFound { .. }
                | Self::Command { .. }
        )
    }
}
