//! Lock primitives for the bridge's shared caches.
//!
//! The bridge is meant to be driven from one attached thread at a time, so by
//! default the "locks" are `RefCell` wrappers that only catch reentrancy bugs.
//! Enabling the `multithreading` feature swaps them for `parking_lot` locks,
//! which is the external locking a multi-threaded host has to opt into.
#[cfg(not(feature = "multithreading"))]
pub mod compat {
    use std::cell::{RefCell, RefMut};
    use std::ops::{Deref, DerefMut};

    #[derive(Debug, Default)]
    pub struct Mutex<T>(RefCell<T>);
    impl<T> Mutex<T> {
        pub fn new(t: T) -> Self {
            Self(RefCell::new(t))
        }
        pub fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(self.0.borrow_mut())
        }
        pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
            self.0.try_borrow_mut().ok().map(MutexGuard)
        }
        pub fn into_inner(self) -> T {
            self.0.into_inner()
        }
    }

    pub struct MutexGuard<'a, T>(RefMut<'a, T>);
    impl<T> Deref for MutexGuard<'_, T> {
        type Target = T;
        fn deref(&self) -> &T {
            &self.0
        }
    }
    impl<T> DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            &mut self.0
        }
    }
}

pub use std::sync::Arc;

#[cfg(feature = "multithreading")]
pub use parking_lot::{Mutex, MutexGuard};

#[cfg(not(feature = "multithreading"))]
pub use compat::*;
