//! # dongleprobe-core
//!
//! A library for loading a hardware dongle vendor's shared library at run time
//! and exercising its entry points without static linking.
//!
//! This crate provides the core functionality for:
//! - Picking the vendor library for the host OS and CPU architecture
//! - Loading it lazily and resolving `Dongle_*` exports by name
//! - Calling each export under candidate signatures until one succeeds
//! - Driving a device through enumerate, open, read and close
//!
//! ## Architecture
//!
//! The library is organized into several modules, leaf first:
//!
//! - [`platform`]: (OS, architecture) to library path
//! - [`loader`]: loading and unloading the shared library
//! - [`symbol`]: export lookup with underscore fallback
//! - [`probe`]: call signatures and the probing loop
//! - [`harness`]: the device lifecycle and run modes
//! - [`report`]: hex dumps, device listings and failure text
//! - [`status`]: the vendor status code taxonomy
//! - [`system`]: external host inspection utilities
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use dongleprobe_core::{run, HarnessConfig, RunMode};
//!
//! let config = HarnessConfig::new().lib_root("/opt/vendor");
//! let summary = run(RunMode::Cycle, &config, std::io::stdout().lock())?;
//! if !summary.is_success() {
//!     eprintln!("{} step(s) failed", summary.failures);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! [`ForeignEntry`] abstracts a callable entry point. [`Session`] and
//! [`run_entries`] accept any implementation, so entry points bound some other
//! way can reuse the lifecycle and reporting.
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod device;
pub mod error;
pub mod harness;
#[allow(unsafe_code)]
pub mod loader;
pub mod platform;
pub mod probe;
pub mod report;
pub mod status;
#[allow(unsafe_code)]
pub mod symbol;
pub mod system;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use device::{DeviceHandle, DeviceInfo};
pub use error::{Error, Result};
pub use harness::{
    run, run_entries, EntryPoints, Enumeration, HarnessConfig, RunMode, RunSummary, Session, State,
};
pub use loader::{LibraryHandle, LoadedLibrary};
pub use platform::{Arch, Os, PlatformPolicy};
pub use probe::{CallArgs, CallSignature, ForeignEntry, Operation, ProbeOutcome, DATA_FILE_TYPE};
pub use report::Reporter;
pub use status::{ResultCode, StatusKind};
pub use symbol::{Symbol, SymbolAddress};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
