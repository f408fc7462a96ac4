use crate::{
    api::{MonoApi, Ptr, REQUIRED_EXPORTS},
    catalog::domain::MonoDomain,
    config::BridgeConfig,
    error::{BridgeError, Result},
    exports::{Exports, LibraryExports, SymbolResolver},
};
use mono_types::PointerWidth;
use mono_utils::{memory, sync::Mutex, LruCache, NativePtr};
use std::{
    collections::HashSet,
    ffi::{c_char, CString},
    fmt::{self, Debug, Formatter},
    path::Path,
    sync::Arc,
};
use tracing::{debug, trace};

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct ClassKey {
    pub image: NativePtr,
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct MethodKey {
    pub class: NativePtr,
    pub name: String,
    pub arity: i32,
}

/// Interned managed string: the GC handle that keeps it alive.
type InternCache = LruCache<String, u32>;

pub(crate) struct RuntimeCaches {
    pub classes: Mutex<LruCache<ClassKey, NativePtr>>,
    pub methods: Mutex<LruCache<MethodKey, NativePtr>>,
    /// Unmanaged thunks of delegate `Invoke` methods, keyed by delegate class.
    pub thunks: Mutex<LruCache<NativePtr, NativePtr>>,
    pub strings: Option<Mutex<InternCache>>,
    pub initialized: Mutex<HashSet<NativePtr>>,
}

/// The bridge's view of one Mono runtime: the resolved export table, the
/// configuration and the lookup caches. Every handle holds an `Arc` to it.
pub struct MonoRuntime {
    api: MonoApi,
    resolver: SymbolResolver,
    config: BridgeConfig,
    pub(crate) caches: RuntimeCaches,
}

impl Debug for MonoRuntime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonoRuntime")
            .field("source", &self.resolver.source())
            .field("api", &self.api)
            .field("config", &self.config)
            .finish()
    }
}

impl MonoRuntime {
    /// Resolves the Mono exports from `source`. Fails with
    /// [`BridgeError::NotSupported`] when a required export is missing.
    pub fn new(source: impl Into<Exports>, config: BridgeConfig) -> Result<Arc<Self>> {
        let resolver = SymbolResolver::new(source);
        let api = MonoApi::resolve(&resolver);

        let missing = api.missing(REQUIRED_EXPORTS);
        if !missing.is_empty() {
            return Err(BridgeError::NotSupported(format!(
                "{} lacks required exports: {}",
                crate::exports::ExportSource::describe(resolver.source()),
                missing.join(", ")
            )));
        }

        let strings = config.string_intern_capacity.map(|capacity| {
            let free = api.mono_gchandle_free().ok();
            Mutex::new(InternCache::with_eviction(capacity, move |text, handle| {
                trace!(text, handle, "evicting interned string");
                if let Some(free) = free {
                    unsafe { free(handle) };
                }
            }))
        });

        let caches = RuntimeCaches {
            classes: Mutex::new(LruCache::new(config.class_cache_capacity)),
            methods: Mutex::new(LruCache::new(config.method_cache_capacity)),
            thunks: Mutex::new(LruCache::new(config.thunk_cache_capacity)),
            strings,
            initialized: Mutex::new(HashSet::new()),
        };

        debug!(?api, "mono runtime bound");
        Ok(Arc::new(Self {
            api,
            resolver,
            config,
            caches,
        }))
    }

    pub fn from_library(path: impl AsRef<Path>, config: BridgeConfig) -> Result<Arc<Self>> {
        Self::new(LibraryExports::open(path)?, config)
    }

    pub fn api(&self) -> &MonoApi {
        &self.api
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn resolver(&self) -> &SymbolResolver {
        &self.resolver
    }

    pub fn has_export(&self, name: &str) -> bool {
        self.api.has(name) || self.resolver.has_export(name)
    }

    /// The bridge runs inside the target process, so the target's pointer
    /// width is the host's.
    pub fn pointer_width(&self) -> PointerWidth {
        PointerWidth::host()
    }

    pub fn root_domain(self: &Arc<Self>) -> Result<MonoDomain> {
        let _guard = self.attach()?;
        let domain = unsafe { self.api.mono_get_root_domain()?() };
        MonoDomain::non_null(self, domain)
            .ok_or_else(|| BridgeError::NotSupported("runtime has no root domain yet".into()))
    }

    /// Boots a JIT domain in this process. Only meaningful when the bridge
    /// hosts the runtime itself rather than living inside an existing one.
    pub fn init_jit(self: &Arc<Self>, domain_name: &str) -> Result<MonoDomain> {
        let name = c_string(domain_name)?;
        let domain = unsafe { self.api.mono_jit_init()?(name.as_ptr()) };
        debug!(domain_name, domain = %NativePtr::from(domain), "jit initialized");
        MonoDomain::non_null(self, domain)
            .ok_or_else(|| BridgeError::NotSupported(format!("mono_jit_init({domain_name}) failed")))
    }

    /// Creates a managed string, reusing an interned instance when the intern
    /// cache is enabled.
    pub fn managed_string(&self, text: &str) -> Result<NativePtr> {
        let _guard = self.attach()?;
        let Some(strings) = &self.caches.strings else {
            return self.new_string(text);
        };

        let cached = strings.lock().get(&text.to_string()).copied();
        if let Some(handle) = cached {
            let target = NativePtr::from(unsafe { self.api.mono_gchandle_get_target()?(handle) });
            if !target.is_null() {
                return Ok(target);
            }
            strings.lock().delete(&text.to_string());
        }

        let string = self.new_string(text)?;
        let handle = unsafe { self.api.mono_gchandle_new()?(string.as_void(), 0) };
        debug!(text, handle, "interned managed string");
        strings.lock().set(text.to_string(), handle);
        Ok(string)
    }

    pub fn interned_strings(&self) -> usize {
        self.caches.strings.as_ref().map_or(0, |s| s.lock().len())
    }

    /// Allocates a fresh managed string in the root domain.
    pub fn new_string(&self, text: &str) -> Result<NativePtr> {
        let _guard = self.attach()?;
        let domain = unsafe { self.api.mono_get_root_domain()?() };
        let string = if text.contains('\0') {
            let units = memory::encode_utf16(text);
            let len = i32::try_from(units.len())
                .map_err(|_| BridgeError::validation("string too long for the runtime"))?;
            unsafe { self.api.mono_string_new_utf16()?(domain, units.as_ptr(), len) }
        } else {
            let c = c_string(text)?;
            unsafe { self.api.mono_string_new()?(domain, c.as_ptr()) }
        };
        NativePtr::from(string)
            .non_null()
            .ok_or_else(|| BridgeError::Memory(format!("mono_string_new failed for {text:?}")))
    }

    pub(crate) fn mark_initialized(&self, class: NativePtr) {
        self.caches.initialized.lock().insert(class);
    }

    pub(crate) fn is_initialized(&self, class: NativePtr) -> bool {
        self.caches.initialized.lock().contains(&class)
    }

    /// Copies a runtime-allocated C string and releases it with `mono_free`.
    pub(crate) fn take_c_string(&self, raw: *mut c_char) -> Option<String> {
        let text = unsafe { memory::read_c_string(NativePtr::from_mut(raw)) };
        if !raw.is_null() {
            match self.api.mono_free() {
                Ok(free) => unsafe { free(raw as Ptr) },
                Err(_) => trace!("mono_free missing, leaking runtime string"),
            }
        }
        text
    }

    /// Drops every cached lookup. Interned strings are released.
    pub fn clear_caches(&self) {
        self.caches.classes.lock().clear();
        self.caches.methods.lock().clear();
        self.caches.thunks.lock().clear();
        if let Some(strings) = &self.caches.strings {
            strings.lock().drain_with_callback();
        }
    }
}

impl Drop for MonoRuntime {
    fn drop(&mut self) {
        if let Some(strings) = &self.caches.strings {
            let mut strings = strings.lock();
            if !strings.is_empty() {
                debug!(count = strings.len(), "releasing interned strings");
                strings.drain_with_callback();
            }
        }
    }
}

pub(crate) fn c_string(text: &str) -> Result<CString> {
    CString::new(text).map_err(|_| BridgeError::validation(format!("{text:?} contains a NUL byte")))
}
