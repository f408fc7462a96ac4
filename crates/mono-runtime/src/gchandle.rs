//! Explicit GC handles onto managed objects.
use crate::{
    error::{BridgeError, Result},
    marshal,
    object::ObjectRef,
    runtime::MonoRuntime,
    value::Value,
};
use mono_utils::{sync::Mutex, NativePtr};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcHandleKind {
    Strong,
    Pinned,
    Weak,
    WeakTrackResurrection,
}

impl GcHandleKind {
    pub fn is_weak(self) -> bool {
        matches!(self, GcHandleKind::Weak | GcHandleKind::WeakTrackResurrection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcHandle {
    id: u32,
    kind: GcHandleKind,
    target: NativePtr,
}

impl GcHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> GcHandleKind {
        self.kind
    }

    /// The object address when the handle was created. A pinned or strong
    /// target stays put; a weak one may have been collected since.
    pub fn initial_target(&self) -> NativePtr {
        self.target
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcPoolStats {
    pub strong: usize,
    pub pinned: usize,
    pub weak: usize,
    pub weak_track_resurrection: usize,
    /// Weak handles whose target was null when the stats were taken.
    pub collected: usize,
}

impl GcPoolStats {
    pub fn total(&self) -> usize {
        self.strong + self.pinned + self.weak + self.weak_track_resurrection
    }
}

/// Bookkeeping for the handles a host allocates. Every handle must be
/// passed back to [`GcHandlePool::release`]; whatever is left when the pool
/// is dropped is released then.
pub struct GcHandlePool {
    runtime: Arc<MonoRuntime>,
    handles: Mutex<HashMap<u32, GcHandle>>,
}

impl fmt::Debug for GcHandlePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcHandlePool")
            .field("len", &self.handles.lock().len())
            .finish()
    }
}

impl GcHandlePool {
    pub fn new(runtime: Arc<MonoRuntime>) -> Self {
        Self {
            runtime,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn track(&self, id: u32, kind: GcHandleKind, target: NativePtr) -> Result<GcHandle> {
        if id == 0 {
            return Err(BridgeError::Memory(format!("runtime refused a {kind:?} handle for {target}")));
        }
        let handle = GcHandle { id, kind, target };
        trace!(id, ?kind, %target, "gc handle created");
        self.handles.lock().insert(id, handle);
        Ok(handle)
    }

    pub fn create(&self, object: &ObjectRef, pinned: bool) -> Result<GcHandle> {
        let _guard = self.runtime.attach()?;
        let id = unsafe { self.runtime.api().mono_gchandle_new()?(object.address().as_void(), pinned as i32) };
        let kind = if pinned {
            GcHandleKind::Pinned
        } else {
            GcHandleKind::Strong
        };
        self.track(id, kind, object.address())
    }

    pub fn create_weak(&self, object: &ObjectRef, track_resurrection: bool) -> Result<GcHandle> {
        let _guard = self.runtime.attach()?;
        let id = unsafe {
            self.runtime.api().mono_gchandle_new_weakref()?(object.address().as_void(), track_resurrection as i32)
        };
        let kind = if track_resurrection {
            GcHandleKind::WeakTrackResurrection
        } else {
            GcHandleKind::Weak
        };
        self.track(id, kind, object.address())
    }

    fn known(&self, handle: &GcHandle) -> Result<()> {
        if self.handles.lock().contains_key(&handle.id) {
            Ok(())
        } else {
            Err(BridgeError::validation(format!("gc handle {} is not owned by this pool", handle.id)))
        }
    }

    /// Frees `handle`. If the runtime cannot free it right now the pool
    /// keeps tracking it, so the release can be retried.
    pub fn release(&self, handle: GcHandle) -> Result<()> {
        self.known(&handle)?;
        let _guard = self.runtime.attach()?;
        let free = self.runtime.api().mono_gchandle_free()?;
        let Some(owned) = self.handles.lock().remove(&handle.id) else {
            return Err(BridgeError::validation(format!("gc handle {} is not owned by this pool", handle.id)));
        };
        unsafe { free(owned.id) };
        trace!(id = owned.id, "gc handle released");
        Ok(())
    }

    /// Releases every outstanding handle and returns how many there were.
    pub fn release_all(&self) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let _guard = self.runtime.attach()?;
        let free = self.runtime.api().mono_gchandle_free()?;
        let drained: Vec<GcHandle> = self.handles.lock().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            unsafe { free(handle.id) };
        }
        debug!(count = drained.len(), "released all gc handles");
        Ok(drained.len())
    }

    fn target_address(&self, handle: &GcHandle) -> Result<NativePtr> {
        self.known(handle)?;
        let _guard = self.runtime.attach()?;
        let raw = unsafe { self.runtime.api().mono_gchandle_get_target()?(handle.id) };
        Ok(NativePtr::from(raw))
    }

    /// The current target, or [`Value::Absent`] once a weak target is gone.
    pub fn target(&self, handle: &GcHandle) -> Result<Value> {
        let address = self.target_address(handle)?;
        marshal::object_value(&self.runtime, address)
    }

    /// Whether the target is null right now. Only a snapshot; the collector
    /// may run again before the answer is used.
    pub fn is_collected(&self, handle: &GcHandle) -> Result<bool> {
        Ok(self.target_address(handle)?.is_null())
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    pub fn stats(&self) -> Result<GcPoolStats> {
        let handles: Vec<GcHandle> = self.handles.lock().values().copied().collect();
        let mut stats = GcPoolStats::default();
        for handle in &handles {
            match handle.kind {
                GcHandleKind::Strong => stats.strong += 1,
                GcHandleKind::Pinned => stats.pinned += 1,
                GcHandleKind::Weak => stats.weak += 1,
                GcHandleKind::WeakTrackResurrection => stats.weak_track_resurrection += 1,
            }
            if handle.kind.is_weak() && self.is_collected(handle)? {
                stats.collected += 1;
            }
        }
        Ok(stats)
    }
}

impl Drop for GcHandlePool {
    fn drop(&mut self) {
        let outstanding = self.len();
        if outstanding == 0 {
            return;
        }
        warn!(outstanding, "gc handle pool dropped with live handles");
        if let Err(e) = self.release_all() {
            warn!(error = %e, "failed to release gc handles");
        }
    }
}
