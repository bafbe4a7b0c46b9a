//! Exported symbol lookup.
//!
//! Names are tried verbatim first and then with a single leading underscore,
//! which some toolchains prepend to C symbols.

use crate::error::{Error, Result};
use crate::loader::{LibraryHandle, LoadedLibrary};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Entry address of a resolved foreign function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(usize);

impl SymbolAddress {
    /// Raw address
    pub fn value(self) -> usize {
        self.0
    }
}

impl fmt::Display for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Outcome of a name lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Name that was asked for
    pub requested: String,
    /// Name that actually matched (possibly underscore-prefixed)
    pub matched: String,
    /// Entry address
    pub address: SymbolAddress,
}

impl Resolution {
    /// True when only the underscore-prefixed alias was exported
    pub fn used_alias(&self) -> bool {
        self.requested != self.matched
    }
}

/// A resolved symbol, valid only while its library stays loaded
#[derive(Debug, Clone)]
pub struct Symbol<'lib> {
    library: Option<LibraryHandle>,
    resolution: Resolution,
    _library: PhantomData<&'lib LoadedLibrary>,
}

impl Symbol<'static> {
    /// Wraps an address that outlives the program, such as a function item.
    ///
    /// # Safety
    ///
    /// `address` must be the entry point of a function whose signature matches
    /// every [`CallSignature`](crate::probe::CallSignature) it will be invoked
    /// with.
    pub unsafe fn from_raw(name: impl Into<String>, address: usize) -> Self {
        let name = name.into();
        Self {
            library: None,
            resolution: Resolution {
                requested: name.clone(),
                matched: name,
                address: SymbolAddress(address),
            },
            _library: PhantomData,
        }
    }
}

impl Symbol<'_> {
    /// Library the symbol came from; `None` for in-process functions
    pub fn library(&self) -> Option<LibraryHandle> {
        self.library
    }

    /// Lookup details
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Entry address
    pub fn address(&self) -> SymbolAddress {
        self.resolution.address
    }

    /// Name that matched
    pub fn name(&self) -> &str {
        &self.resolution.matched
    }
}

/// Looks up `name` in `library`, falling back to `_name`
pub fn resolve<'lib>(library: &'lib LoadedLibrary, name: &str) -> Result<Symbol<'lib>> {
    let live = library.library()?;
    let resolution = resolve_with(name, |candidate| lookup(live, candidate))?;
    debug!(
        "Resolved {} as {} at {} in library {}",
        name,
        resolution.matched,
        resolution.address,
        library.handle()
    );

    Ok(Symbol {
        library: Some(library.handle()),
        resolution,
        _library: PhantomData,
    })
}

fn lookup(library: &libloading::Library, name: &str) -> Option<usize> {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);

    // SAFETY: the symbol is read as a plain address; nothing is called here.
    let symbol: libloading::Symbol<'_, *const c_void> = unsafe { library.get(&bytes) }.ok()?;
    let address = *symbol as usize;
    (address != 0).then_some(address)
}

/// Applies the exact-then-underscore lookup order to any lookup function
pub(crate) fn resolve_with(
    name: &str,
    mut lookup: impl FnMut(&str) -> Option<usize>,
) -> Result<Resolution> {
    let alias = format!("_{}", name);
    for candidate in [name, alias.as_str()] {
        trace!("Looking up {}", candidate);
        if let Some(address) = lookup(candidate) {
            return Ok(Resolution {
                requested: name.to_string(),
                matched: candidate.to_string(),
                address: SymbolAddress(address),
            });
        }
    }
    Err(Error::symbol_not_found(name))
}
