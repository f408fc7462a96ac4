use std::ffi::c_void;
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::{Add, Sub};

/// An address inside the current process, usually pointing into memory owned
/// by the Mono runtime.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NativePtr(pub usize);

impl NativePtr {
    pub const NULL: Self = NativePtr(0);

    pub const fn new(address: usize) -> Self {
        NativePtr(address)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        NativePtr(ptr as usize)
    }

    pub fn from_mut<T>(ptr: *mut T) -> Self {
        NativePtr(ptr as usize)
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns `None` for the null address.
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    pub fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    pub fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    pub fn as_void(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn checked_add(self, offset: usize) -> Option<Self> {
        self.0.checked_add(offset).map(NativePtr)
    }
}

impl Display for NativePtr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Debug for NativePtr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "NativePtr({:#x})", self.0)
    }
}

impl From<usize> for NativePtr {
    fn from(address: usize) -> Self {
        NativePtr(address)
    }
}

impl From<NativePtr> for usize {
    fn from(ptr: NativePtr) -> Self {
        ptr.0
    }
}

impl From<*mut c_void> for NativePtr {
    fn from(ptr: *mut c_void) -> Self {
        NativePtr(ptr as usize)
    }
}

impl From<*const c_void> for NativePtr {
    fn from(ptr: *const c_void) -> Self {
        NativePtr(ptr as usize)
    }
}

impl Add<usize> for NativePtr {
    type Output = Self;
    fn add(self, rhs: usize) -> Self {
        NativePtr(self.0 + rhs)
    }
}

impl Sub<NativePtr> for NativePtr {
    type Output = usize;
    fn sub(self, rhs: NativePtr) -> usize {
        self.0 - rhs.0
    }
}
