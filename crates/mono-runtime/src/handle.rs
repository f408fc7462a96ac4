//! Addressable handles onto runtime entities.
//!
//! A handle is an address plus the runtime it belongs to. Two handles with
//! the same address denote the same entity no matter what either has
//! memoized. The bridge never frees the entities behind handles.
use crate::runtime::MonoRuntime;
use mono_utils::NativePtr;
use std::{
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

/// A property computed at most once per handle instance.
///
/// Only for facts that cannot change for the lifetime of the entity, such as
/// a class name or a type code. Runtime-mutable state must be read fresh.
pub struct Memo<T>(OnceLock<T>);

impl<T> Memo<T> {
    pub const fn new() -> Self {
        Memo(OnceLock::new())
    }

    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        self.0.get_or_init(init)
    }

    /// A failed initialization is not cached; the next call retries.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        if let Some(v) = self.0.get() {
            return Ok(v);
        }
        let value = init()?;
        Ok(self.0.get_or_init(|| value))
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Memo(self.0.clone())
    }
}

impl<T: Debug> Debug for Memo<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(v) => write!(f, "Memo({v:?})"),
            None => write!(f, "Memo(<unset>)"),
        }
    }
}

pub trait Handle {
    fn address(&self) -> NativePtr;

    fn runtime(&self) -> &Arc<MonoRuntime>;

    fn is_null(&self) -> bool {
        self.address().is_null()
    }
}

/// A handle with no knowledge of what it points at.
#[derive(Clone)]
pub struct RawHandle {
    address: NativePtr,
    runtime: Arc<MonoRuntime>,
}

impl RawHandle {
    pub fn new(runtime: Arc<MonoRuntime>, address: NativePtr) -> Self {
        Self { address, runtime }
    }
}

impl Handle for RawHandle {
    fn address(&self) -> NativePtr {
        self.address
    }

    fn runtime(&self) -> &Arc<MonoRuntime> {
        &self.runtime
    }
}

impl PartialEq for RawHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}
impl Eq for RawHandle {}

impl Hash for RawHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state)
    }
}

impl Debug for RawHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({})", self.address)
    }
}

/// Declares a handle type with address equality and a set of memoized
/// properties.
macro_rules! mono_handle {
    ($(#[$meta:meta])* $vis:vis struct $name:ident { $($memo:ident: $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            address: mono_utils::NativePtr,
            runtime: std::sync::Arc<$crate::runtime::MonoRuntime>,
            $($memo: $crate::handle::Memo<$ty>,)*
        }

        impl $name {
            /// Wraps `address` without checking it. Prefer the catalog
            /// accessors, which never hand out null handles.
            pub fn from_raw(
                runtime: std::sync::Arc<$crate::runtime::MonoRuntime>,
                address: mono_utils::NativePtr,
            ) -> Self {
                Self {
                    address,
                    runtime,
                    $($memo: $crate::handle::Memo::new(),)*
                }
            }

            pub(crate) fn non_null(
                runtime: &std::sync::Arc<$crate::runtime::MonoRuntime>,
                address: impl Into<mono_utils::NativePtr>,
            ) -> Option<Self> {
                let address = address.into();
                (!address.is_null()).then(|| Self::from_raw(runtime.clone(), address))
            }

            pub fn address(&self) -> mono_utils::NativePtr {
                self.address
            }

            pub fn runtime(&self) -> &std::sync::Arc<$crate::runtime::MonoRuntime> {
                &self.runtime
            }

            pub fn is_null(&self) -> bool {
                self.address.is_null()
            }

            pub fn as_raw(&self) -> $crate::handle::RawHandle {
                $crate::handle::RawHandle::new(self.runtime.clone(), self.address)
            }

            #[allow(dead_code)]
            pub(crate) fn ptr(&self) -> $crate::api::Ptr {
                self.address.as_void()
            }
        }

        impl $crate::handle::Handle for $name {
            fn address(&self) -> mono_utils::NativePtr {
                self.address
            }

            fn runtime(&self) -> &std::sync::Arc<$crate::runtime::MonoRuntime> {
                &self.runtime
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.address == other.address
            }
        }
        impl Eq for $name {}

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.address.hash(state)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.address)
            }
        }
    };
}

pub(crate) use mono_handle;
