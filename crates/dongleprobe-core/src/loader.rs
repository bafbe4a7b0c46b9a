//! Run-time loading of the vendor shared library.
//!
//! [`open`] stats the file first so a missing library is reported apart from
//! one the dynamic loader refuses. Loading uses lazy binding on Unix: symbols
//! the library itself cannot resolve do not fail the load.
//!
//! [`LoadedLibrary`] releases the library when dropped, so every early return
//! in the caller still unloads it. [`LoadedLibrary::close`] may be called any
//! number of times.

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque id of one loaded library; never zero and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryHandle(u64);

impl LibraryHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// File facts gathered before the load attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryMetadata {
    /// Size in bytes
    pub size: u64,
    /// Unix permission bits, when the platform has them
    pub mode: Option<u32>,
}

impl LibraryMetadata {
    /// Stats `path`, mapping a missing file to [`Error::LibraryNotFound`]
    pub fn inspect(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::LibraryNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::library_metadata(path, e),
        })?;

        if !meta.is_file() {
            return Err(Error::LibraryNotFound {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            size: meta.len(),
            mode: permission_bits(&meta),
        })
    }

    /// Permission bits rendered as `rwxr-xr-x`, or `n/a`
    pub fn permissions(&self) -> String {
        let Some(mode) = self.mode else {
            return "n/a".to_string();
        };
        let mut out = String::with_capacity(9);
        for shift in [6, 3, 0] {
            let bits = (mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> Option<u32> {
    None
}

/// A shared library mapped into the process
pub struct LoadedLibrary {
    handle: LibraryHandle,
    path: PathBuf,
    metadata: LibraryMetadata,
    library: Option<libloading::Library>,
}

impl fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedLibrary")
            .field("handle", &self.handle)
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Loads the library at `path`
pub fn open(path: impl AsRef<Path>) -> Result<LoadedLibrary> {
    let path = path.as_ref();
    let metadata = LibraryMetadata::inspect(path)?;
    debug!(
        "Loading {} ({} bytes, {})",
        path.display(),
        metadata.size,
        metadata.permissions()
    );

    let library = load_lazy(path).map_err(|e| Error::library_load(path, e))?;
    let handle = LibraryHandle::next();
    debug!("Loaded {} as library {}", path.display(), handle);

    Ok(LoadedLibrary {
        handle,
        path: path.to_path_buf(),
        metadata,
        library: Some(library),
    })
}

#[cfg(unix)]
fn load_lazy(path: &Path) -> std::result::Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_LAZY, RTLD_LOCAL};
    // SAFETY: running the library's initialisers is the point of loading it;
    // the vendor library is trusted to the same degree as any linked code.
    let library = unsafe { Library::open(Some(path), RTLD_LAZY | RTLD_LOCAL) }?;
    Ok(library.into())
}

#[cfg(not(unix))]
fn load_lazy(path: &Path) -> std::result::Result<libloading::Library, libloading::Error> {
    // SAFETY: see the Unix variant.
    unsafe { libloading::Library::new(path) }
}

impl LoadedLibrary {
    /// Id assigned at load time
    pub fn handle(&self) -> LibraryHandle {
        self.handle
    }

    /// Path the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File facts gathered before loading
    pub fn metadata(&self) -> &LibraryMetadata {
        &self.metadata
    }

    /// False once [`close`](Self::close) has run
    pub fn is_open(&self) -> bool {
        self.library.is_some()
    }

    /// The live library, or [`Error::LibraryClosed`]
    pub(crate) fn library(&self) -> Result<&libloading::Library> {
        self.library
            .as_ref()
            .ok_or(Error::LibraryClosed(self.handle.id()))
    }

    /// Unloads the library; later calls are no-ops
    pub fn close(&mut self) {
        if let Some(library) = self.library.take() {
            match library.close() {
                Ok(()) => debug!("Unloaded library {}", self.handle),
                Err(e) => warn!("Unloading library {} reported: {}", self.handle, e),
            }
        }
    }
}

impl Drop for LoadedLibrary {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// A system library that is safe to load and unload in tests
    pub(crate) fn system_library() -> Option<PathBuf> {
        [
            "/lib/x86_64-linux-gnu/libc.so.6",
            "/lib/aarch64-linux-gnu/libc.so.6",
            "/lib/loongarch64-linux-gnu/libc.so.6",
            "/usr/lib64/libc.so.6",
            "/lib64/libc.so.6",
            "/usr/lib/libc.so.6",
            "/usr/lib/libSystem.B.dylib",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = open(dir.path().join("libRockeyARM.so")).unwrap_err();
        assert!(matches!(err, Error::LibraryNotFound { .. }));
    }

    #[test]
    fn test_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::LibraryNotFound { .. }));
    }

    #[test]
    fn test_corrupt_file_is_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("libRockeyARM.so");
        fs::write(&path, b"this is not an ELF object").unwrap();

        let err = open(&path).unwrap_err();
        assert!(matches!(err, Error::LibraryLoad { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_metadata_reports_size_and_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lib.so");
        fs::write(&path, [0u8; 100]).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        let meta = LibraryMetadata::inspect(&path).unwrap();
        assert_eq!(meta.size, 100);
        assert_eq!(meta.mode, Some(0o755));
        assert_eq!(meta.permissions(), "rwxr-xr-x");
    }

    #[test]
    fn test_close_is_idempotent() {
        let Some(path) = system_library() else {
            return;
        };
        let mut lib = open(&path).unwrap();
        assert!(lib.is_open());
        lib.close();
        lib.close();
        assert!(!lib.is_open());
        assert!(matches!(lib.library(), Err(Error::LibraryClosed(_))));
    }

    #[test]
    fn test_handles_are_distinct() {
        let Some(path) = system_library() else {
            return;
        };
        let a = open(&path).unwrap();
        let b = open(&path).unwrap();
        assert_ne!(a.handle(), b.handle());
        assert_ne!(a.handle().id(), 0);
    }
}
