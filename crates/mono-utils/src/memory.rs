//! Primitive reads and writes at raw addresses.
//!
//! Everything here operates on addresses inside the current process. The
//! functions are `unsafe` because the caller vouches that the address is
//! mapped and large enough for the requested width. All accesses are
//! unaligned-safe, since Mono packs fields of value types without padding
//! guarantees that the host compiler would assume.
use crate::NativePtr;
use std::{ffi::CStr, mem::size_of};
use widestring::{U16Str, U16String};

/// Width and interpretation of a primitive slot in target memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scalar {
    /// One byte, 0 = false.
    Bool,
    /// UTF-16 code unit.
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Host pointer width.
    Pointer,
}

impl Scalar {
    pub const fn size(self) -> usize {
        match self {
            Scalar::Bool | Scalar::I8 | Scalar::U8 => 1,
            Scalar::Char | Scalar::I16 | Scalar::U16 => 2,
            Scalar::I32 | Scalar::U32 | Scalar::F32 => 4,
            Scalar::I64 | Scalar::U64 | Scalar::F64 => 8,
            Scalar::Pointer => size_of::<usize>(),
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Scalar::F32 | Scalar::F64)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Char(u16),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Pointer(NativePtr),
}

impl ScalarValue {
    pub fn scalar(&self) -> Scalar {
        match self {
            ScalarValue::Bool(_) => Scalar::Bool,
            ScalarValue::Char(_) => Scalar::Char,
            ScalarValue::I8(_) => Scalar::I8,
            ScalarValue::U8(_) => Scalar::U8,
            ScalarValue::I16(_) => Scalar::I16,
            ScalarValue::U16(_) => Scalar::U16,
            ScalarValue::I32(_) => Scalar::I32,
            ScalarValue::U32(_) => Scalar::U32,
            ScalarValue::I64(_) => Scalar::I64,
            ScalarValue::U64(_) => Scalar::U64,
            ScalarValue::F32(_) => Scalar::F32,
            ScalarValue::F64(_) => Scalar::F64,
            ScalarValue::Pointer(_) => Scalar::Pointer,
        }
    }

    /// Exact integer view of integral values. Floats yield `None`.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            ScalarValue::Bool(b) => b as i128,
            ScalarValue::Char(c) => c as i128,
            ScalarValue::I8(v) => v as i128,
            ScalarValue::U8(v) => v as i128,
            ScalarValue::I16(v) => v as i128,
            ScalarValue::U16(v) => v as i128,
            ScalarValue::I32(v) => v as i128,
            ScalarValue::U32(v) => v as i128,
            ScalarValue::I64(v) => v as i128,
            ScalarValue::U64(v) => v as i128,
            ScalarValue::Pointer(p) => p.as_usize() as i128,
            ScalarValue::F32(_) | ScalarValue::F64(_) => return None,
        })
    }

    /// Host-number view. Lossy for 64-bit integers above 2^53.
    pub fn as_f64(&self) -> f64 {
        match *self {
            ScalarValue::F32(v) => v as f64,
            ScalarValue::F64(v) => v,
            other => other.as_i128().unwrap_or_default() as f64,
        }
    }
}

macro_rules! typed_access {
    ($($read:ident, $write:ident: $t:ty;)*) => {
        $(
            /// # Safety
            ///
            /// `addr` must be valid for a read of this width.
            pub unsafe fn $read(addr: NativePtr) -> $t {
                std::ptr::read_unaligned(addr.as_ptr::<$t>())
            }

            /// # Safety
            ///
            /// `addr` must be valid for a write of this width.
            pub unsafe fn $write(addr: NativePtr, value: $t) {
                std::ptr::write_unaligned(addr.as_mut_ptr::<$t>(), value)
            }
        )*
    };
}

typed_access! {
    read_i8, write_i8: i8;
    read_u8, write_u8: u8;
    read_i16, write_i16: i16;
    read_u16, write_u16: u16;
    read_i32, write_i32: i32;
    read_u32, write_u32: u32;
    read_i64, write_i64: i64;
    read_u64, write_u64: u64;
    read_f32, write_f32: f32;
    read_f64, write_f64: f64;
}

/// # Safety
///
/// `addr` must be valid for a one-byte read.
pub unsafe fn read_bool(addr: NativePtr) -> bool {
    read_u8(addr) != 0
}

/// # Safety
///
/// `addr` must be valid for a one-byte write.
pub unsafe fn write_bool(addr: NativePtr, value: bool) {
    write_u8(addr, value as u8)
}

/// # Safety
///
/// `addr` must be valid for a pointer-sized read.
pub unsafe fn read_ptr(addr: NativePtr) -> NativePtr {
    NativePtr(std::ptr::read_unaligned(addr.as_ptr::<usize>()))
}

/// # Safety
///
/// `addr` must be valid for a pointer-sized write.
pub unsafe fn write_ptr(addr: NativePtr, value: NativePtr) {
    std::ptr::write_unaligned(addr.as_mut_ptr::<usize>(), value.as_usize())
}

/// Reads a signed 64-bit value as a host number, losing precision above 2^53.
///
/// # Safety
///
/// `addr` must be valid for an eight-byte read.
pub unsafe fn read_i64_as_f64(addr: NativePtr) -> f64 {
    read_i64(addr) as f64
}

/// # Safety
///
/// `addr` must be valid for an eight-byte read.
pub unsafe fn read_u64_as_f64(addr: NativePtr) -> f64 {
    read_u64(addr) as f64
}

/// # Safety
///
/// `addr` must be valid for a read of `scalar.size()` bytes.
pub unsafe fn read(addr: NativePtr, scalar: Scalar) -> ScalarValue {
    match scalar {
        Scalar::Bool => ScalarValue::Bool(read_bool(addr)),
        Scalar::Char => ScalarValue::Char(read_u16(addr)),
        Scalar::I8 => ScalarValue::I8(read_i8(addr)),
        Scalar::U8 => ScalarValue::U8(read_u8(addr)),
        Scalar::I16 => ScalarValue::I16(read_i16(addr)),
        Scalar::U16 => ScalarValue::U16(read_u16(addr)),
        Scalar::I32 => ScalarValue::I32(read_i32(addr)),
        Scalar::U32 => ScalarValue::U32(read_u32(addr)),
        Scalar::I64 => ScalarValue::I64(read_i64(addr)),
        Scalar::U64 => ScalarValue::U64(read_u64(addr)),
        Scalar::F32 => ScalarValue::F32(read_f32(addr)),
        Scalar::F64 => ScalarValue::F64(read_f64(addr)),
        Scalar::Pointer => ScalarValue::Pointer(read_ptr(addr)),
    }
}

/// # Safety
///
/// `addr` must be valid for a write of `value.scalar().size()` bytes.
pub unsafe fn write(addr: NativePtr, value: ScalarValue) {
    match value {
        ScalarValue::Bool(v) => write_bool(addr, v),
        ScalarValue::Char(v) => write_u16(addr, v),
        ScalarValue::I8(v) => write_i8(addr, v),
        ScalarValue::U8(v) => write_u8(addr, v),
        ScalarValue::I16(v) => write_i16(addr, v),
        ScalarValue::U16(v) => write_u16(addr, v),
        ScalarValue::I32(v) => write_i32(addr, v),
        ScalarValue::U32(v) => write_u32(addr, v),
        ScalarValue::I64(v) => write_i64(addr, v),
        ScalarValue::U64(v) => write_u64(addr, v),
        ScalarValue::F32(v) => write_f32(addr, v),
        ScalarValue::F64(v) => write_f64(addr, v),
        ScalarValue::Pointer(v) => write_ptr(addr, v),
    }
}

/// Decodes a NUL-terminated UTF-8 string. Invalid sequences are replaced.
///
/// # Safety
///
/// A non-null `addr` must point to a NUL-terminated byte string.
pub unsafe fn read_c_string(addr: NativePtr) -> Option<String> {
    if addr.is_null() {
        return None;
    }
    Some(
        CStr::from_ptr(addr.as_ptr())
            .to_string_lossy()
            .into_owned(),
    )
}

/// Decodes `len` UTF-16 code units. Unpaired surrogates are replaced.
///
/// # Safety
///
/// `addr` must be valid for `len * 2` bytes.
pub unsafe fn read_utf16(addr: NativePtr, len: usize) -> String {
    if len == 0 || addr.is_null() {
        return String::new();
    }
    U16Str::from_ptr(addr.as_ptr::<u16>(), len).to_string_lossy()
}

pub fn encode_utf16(text: &str) -> Vec<u16> {
    U16String::from_str(text).into_vec()
}

/// Writes `text` as UTF-16 without a terminator and returns the unit count.
///
/// # Safety
///
/// `addr` must be valid for `encode_utf16(text).len() * 2` bytes.
pub unsafe fn write_utf16(addr: NativePtr, text: &str) -> usize {
    let units = encode_utf16(text);
    std::ptr::copy_nonoverlapping(units.as_ptr(), addr.as_mut_ptr::<u16>(), units.len());
    units.len()
}

/// Zeroed, 8-byte aligned host storage handed to native entry points that
/// read a value through a pointer (e.g. `mono_value_box`).
///
/// The buffer is never smaller than a pointer, so that entry points which
/// always copy a full word stay inside the allocation even for one-byte
/// values.
#[derive(Debug, Clone)]
pub struct ScratchBuffer {
    words: Vec<u64>,
    len: usize,
}

impl ScratchBuffer {
    pub fn new(len: usize) -> Self {
        let len = len.max(size_of::<usize>());
        Self {
            words: vec![0; len.div_ceil(8)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> NativePtr {
        NativePtr::from_ptr(self.words.as_ptr())
    }

    pub fn as_mut_ptr(&mut self) -> NativePtr {
        NativePtr::from_mut(self.words.as_mut_ptr())
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the words vector owns at least `len` initialized bytes.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.len) }
    }
}
