//! Host platform detection and library path selection.
//!
//! The vendor ships one shared library per (OS, architecture) pair. This
//! module maps the pair to a path relative to the library root; it never
//! touches the filesystem except in [`discover`], which only runs to
//! produce hints after a lookup has already failed.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Base name shared by every build of the vendor library
pub const LIBRARY_STEM: &str = "RockeyARM";

/// Operating system family
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Os {
    /// Linux
    Linux,
    /// macOS
    Darwin,
    /// Windows
    Windows,
    /// Anything else, by its reported name
    Other(String),
}

impl Os {
    /// The OS this binary was compiled for
    pub fn current() -> Self {
        Self::parse(std::env::consts::OS)
    }

    /// Parses an OS name as reported by `std::env::consts::OS` or `uname`
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "linux" => Self::Linux,
            "macos" | "darwin" => Self::Darwin,
            "windows" => Self::Windows,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => f.write_str("linux"),
            Self::Darwin => f.write_str("darwin"),
            Self::Windows => f.write_str("windows"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// CPU architecture
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 64-bit ARM
    Aarch64,
    /// LoongArch 64
    LoongArch64,
    /// x86-64
    X86_64,
    /// Anything else, by its reported name
    Other(String),
}

impl Arch {
    /// The architecture this binary was compiled for
    pub fn current() -> Self {
        Self::parse(std::env::consts::ARCH)
    }

    /// Parses an architecture name, accepting the common aliases
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "aarch64" | "arm64" => Self::Aarch64,
            "loongarch64" | "loong64" => Self::LoongArch64,
            "x86_64" | "amd64" | "x64" => Self::X86_64,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aarch64 => f.write_str("aarch64"),
            Self::LoongArch64 => f.write_str("loongarch64"),
            Self::X86_64 => f.write_str("x86_64"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Which operating systems are accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlatformPolicy {
    /// Linux, macOS and Windows
    #[default]
    Generic,
    /// Linux only; other systems are refused before any load attempt
    LinuxOnly,
}

/// Maps an (OS, architecture) pair to the library path relative to the root.
///
/// Pure: identical inputs always produce the identical path.
pub fn resolve(os: &Os, arch: &Arch, policy: PlatformPolicy) -> Result<PathBuf> {
    let relative = match (os, policy) {
        (Os::Linux, _) => {
            let dir = match arch {
                Arch::Aarch64 => "arm64",
                Arch::LoongArch64 => "loongarch64",
                // x86-64 is also the fallback for anything unlisted
                Arch::X86_64 | Arch::Other(_) => "x64",
            };
            format!("lib/linux/{}/lib{}.so", dir, LIBRARY_STEM)
        }
        (Os::Darwin, PlatformPolicy::Generic) => format!("lib/darwin/lib{}.dylib", LIBRARY_STEM),
        (Os::Windows, PlatformPolicy::Generic) => {
            let dir = match arch {
                Arch::X86_64 | Arch::Aarch64 => "x64",
                _ => "x86",
            };
            format!("lib/windows/{}/{}.dll", dir, LIBRARY_STEM)
        }
        _ => return Err(Error::unsupported_platform(os.to_string(), arch.to_string())),
    };

    debug!("Resolved {}/{} to {}", os, arch, relative);
    Ok(PathBuf::from(relative))
}

/// Resolves the library for the host this binary runs on
pub fn resolve_current(policy: PlatformPolicy) -> Result<PathBuf> {
    resolve(&Os::current(), &Arch::current(), policy)
}

/// Lists shared libraries under `root` whose name mentions the vendor stem.
///
/// Used only to suggest alternatives when the expected file is missing.
pub fn discover(root: &Path) -> Vec<PathBuf> {
    let stem = LIBRARY_STEM.to_ascii_lowercase();
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .max_depth(6)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_ascii_lowercase();
            name.contains(&stem) && is_shared_library_name(&name)
        })
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

fn is_shared_library_name(name: &str) -> bool {
    name.ends_with(".dylib") || name.ends_with(".dll") || name.contains(".so")
}
