//! Resolution of native entry points by name.
//!
//! Where the exports come from is outside the bridge: an injected agent gets
//! a module base and an export directory from its own module discovery, while
//! a host process simply opens the Mono shared library. Both are modelled as
//! an [`ExportSource`].
use crate::error::{BridgeError, Result};
use enum_dispatch::enum_dispatch;
use libloading::Library;
use mono_utils::{sync::Mutex, NativePtr};
use std::{
    collections::HashMap,
    ffi::c_void,
    path::{Path, PathBuf},
};
use tracing::{trace, warn};

#[enum_dispatch]
pub trait ExportSource {
    /// Address of the export called `name`, if present.
    fn lookup(&self, name: &str) -> Option<NativePtr>;

    fn describe(&self) -> String;
}

/// Exports of a module that is already mapped: base address, image size and
/// the export directory as name → RVA.
#[derive(Debug, Clone)]
pub struct ExportTable {
    base: NativePtr,
    size: usize,
    entries: HashMap<String, usize>,
}

impl ExportTable {
    pub fn new(base: NativePtr, size: usize) -> Self {
        Self {
            base,
            size,
            entries: HashMap::new(),
        }
    }

    /// A table whose entries are absolute addresses.
    pub fn absolute() -> Self {
        Self::new(NativePtr::NULL, usize::MAX)
    }

    pub fn insert(&mut self, name: impl Into<String>, rva: usize) {
        self.entries.insert(name.into(), rva);
    }

    pub fn with_entry(mut self, name: impl Into<String>, rva: usize) -> Self {
        self.insert(name, rva);
        self
    }

    /// Registers an export by absolute address. The address must fall inside
    /// the module image.
    pub fn insert_address(&mut self, name: impl Into<String>, address: NativePtr) -> Result<()> {
        let name = name.into();
        if address < self.base || address - self.base >= self.size {
            return Err(BridgeError::validation(format!(
                "export {name} at {address} lies outside module {}+{:#x}",
                self.base, self.size
            )));
        }
        let rva = address - self.base;
        self.entries.insert(name, rva);
        Ok(())
    }

    pub fn base(&self) -> NativePtr {
        self.base
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExportSource for ExportTable {
    fn lookup(&self, name: &str) -> Option<NativePtr> {
        let rva = *self.entries.get(name)?;
        if rva >= self.size {
            warn!(name, rva, size = self.size, "export RVA outside module image");
            return None;
        }
        self.base.checked_add(rva)
    }

    fn describe(&self) -> String {
        format!("export table at {} ({} entries)", self.base, self.entries.len())
    }
}

/// Exports of a shared library opened by this process.
#[derive(Debug)]
pub struct LibraryExports {
    path: PathBuf,
    library: Library,
}

impl LibraryExports {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let library = unsafe { Library::new(&path) }.map_err(|e| {
            BridgeError::not_found("library", path.display().to_string(), e.to_string())
        })?;
        Ok(Self { path, library })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExportSource for LibraryExports {
    fn lookup(&self, name: &str) -> Option<NativePtr> {
        let symbol = unsafe { self.library.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        Some(NativePtr::from(*symbol)).and_then(NativePtr::non_null)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[enum_dispatch(ExportSource)]
#[derive(Debug)]
pub enum Exports {
    ExportTable,
    LibraryExports,
}

/// Resolves entry points against an export source, remembering which names
/// the source has and which alias stood in for a missing primary name.
#[derive(Debug)]
pub struct SymbolResolver {
    source: Exports,
    availability: Mutex<HashMap<String, Option<NativePtr>>>,
    aliases: Mutex<HashMap<String, String>>,
}

impl SymbolResolver {
    pub fn new(source: impl Into<Exports>) -> Self {
        Self {
            source: source.into(),
            availability: Mutex::new(HashMap::new()),
            aliases: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up exactly `name`. Outcomes are cached per name.
    fn lookup(&self, name: &str) -> Option<NativePtr> {
        if let Some(known) = self.availability.lock().get(name) {
            return *known;
        }
        let found = self.source.lookup(name);
        match found {
            Some(address) => trace!(name, %address, "resolved"),
            None => trace!(name, "not exported"),
        }
        self.availability.lock().insert(name.to_string(), found);
        found
    }

    /// Tries `name`, then each alias in order.
    pub fn resolve(&self, name: &str, aliases: &[&str]) -> Option<NativePtr> {
        if let Some(address) = self.lookup(name) {
            return Some(address);
        }
        let (alias, address) = aliases
            .iter()
            .find_map(|alias| Some((*alias, self.lookup(alias)?)))?;
        trace!(name, alias, %address, "resolved through alias");
        self.aliases.lock().insert(name.to_string(), alias.to_string());
        Some(address)
    }

    /// Whether the source exports exactly `name`. Aliases do not count.
    pub fn has_export(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// The alias that satisfied `name`, if it was resolved through one.
    pub fn resolved_alias(&self, name: &str) -> Option<String> {
        self.aliases.lock().get(name).cloned()
    }

    /// Every name looked up so far with its availability, sorted by name.
    pub fn availability(&self) -> Vec<(String, bool)> {
        let mut all: Vec<_> = self
            .availability
            .lock()
            .iter()
            .map(|(name, addr)| (name.clone(), addr.is_some()))
            .collect();
        all.sort();
        all
    }

    pub fn source(&self) -> &Exports {
        &self.source
    }
}
