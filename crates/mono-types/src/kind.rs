//! The Mono type-code taxonomy.
//!
//! Codes follow `MonoTypeEnum` (ECMA-335 II.23.1.16 element types plus the
//! Mono-internal extensions). Classification is a pure function of the code;
//! the category sets below are static tables indexed by code.
use crate::error::KindError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    End,
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    Ptr,
    ByRef,
    ValueType,
    Class,
    /// Generic parameter of a type.
    Var,
    /// Multi-dimensional array.
    Array,
    GenericInst,
    TypedByRef,
    /// Native-sized signed integer (`System.IntPtr`).
    I,
    /// Native-sized unsigned integer (`System.UIntPtr`).
    U,
    FnPtr,
    Object,
    /// Single-dimensional, zero-based array.
    SzArray,
    /// Generic parameter of a method.
    MVar,
    CModReqd,
    CModOpt,
    Internal,
    Modifier,
    Sentinel,
    Pinned,
    Enum,
    Unknown(u32),
}

const fn flag_table(codes: &[u32]) -> [bool; 0x56] {
    let mut table = [false; 0x56];
    let mut i = 0;
    while i < codes.len() {
        table[codes[i] as usize] = true;
        i += 1;
    }
    table
}

// Reference-shaped kinds: the slot holds an address, never inline content.
static POINTER_LIKE: [bool; 0x56] =
    flag_table(&[0x0e, 0x0f, 0x10, 0x12, 0x14, 0x1b, 0x1c, 0x1d]);
static NUMERIC: [bool; 0x56] = flag_table(&[
    0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x18, 0x19,
]);
static INTEGRAL: [bool; 0x56] = flag_table(&[
    0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x18, 0x19,
]);
static VALUE_TYPE: [bool; 0x56] = flag_table(&[
    0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x11, 0x16, 0x18,
    0x19, 0x55,
]);
static ARRAY: [bool; 0x56] = flag_table(&[0x14, 0x1d]);

/// Byte sizes of the fixed-width kinds. Zero means "not fixed".
static FIXED_SIZE: [u8; 0x56] = {
    let mut t = [0u8; 0x56];
    t[0x02] = 1;
    t[0x03] = 2;
    t[0x04] = 1;
    t[0x05] = 1;
    t[0x06] = 2;
    t[0x07] = 2;
    t[0x08] = 4;
    t[0x09] = 4;
    t[0x0a] = 8;
    t[0x0b] = 8;
    t[0x0c] = 4;
    t[0x0d] = 8;
    t
};

impl TypeKind {
    pub const fn from_code(code: u32) -> Self {
        match code {
            0x00 => TypeKind::End,
            0x01 => TypeKind::Void,
            0x02 => TypeKind::Boolean,
            0x03 => TypeKind::Char,
            0x04 => TypeKind::I1,
            0x05 => TypeKind::U1,
            0x06 => TypeKind::I2,
            0x07 => TypeKind::U2,
            0x08 => TypeKind::I4,
            0x09 => TypeKind::U4,
            0x0a => TypeKind::I8,
            0x0b => TypeKind::U8,
            0x0c => TypeKind::R4,
            0x0d => TypeKind::R8,
            0x0e => TypeKind::String,
            0x0f => TypeKind::Ptr,
            0x10 => TypeKind::ByRef,
            0x11 => TypeKind::ValueType,
            0x12 => TypeKind::Class,
            0x13 => TypeKind::Var,
            0x14 => TypeKind::Array,
            0x15 => TypeKind::GenericInst,
            0x16 => TypeKind::TypedByRef,
            0x18 => TypeKind::I,
            0x19 => TypeKind::U,
            0x1b => TypeKind::FnPtr,
            0x1c => TypeKind::Object,
            0x1d => TypeKind::SzArray,
            0x1e => TypeKind::MVar,
            0x1f => TypeKind::CModReqd,
            0x20 => TypeKind::CModOpt,
            0x21 => TypeKind::Internal,
            0x40 => TypeKind::Modifier,
            0x41 => TypeKind::Sentinel,
            0x45 => TypeKind::Pinned,
            0x55 => TypeKind::Enum,
            other => TypeKind::Unknown(other),
        }
    }

    pub const fn code(self) -> u32 {
        match self {
            TypeKind::End => 0x00,
            TypeKind::Void => 0x01,
            TypeKind::Boolean => 0x02,
            TypeKind::Char => 0x03,
            TypeKind::I1 => 0x04,
            TypeKind::U1 => 0x05,
            TypeKind::I2 => 0x06,
            TypeKind::U2 => 0x07,
            TypeKind::I4 => 0x08,
            TypeKind::U4 => 0x09,
            TypeKind::I8 => 0x0a,
            TypeKind::U8 => 0x0b,
            TypeKind::R4 => 0x0c,
            TypeKind::R8 => 0x0d,
            TypeKind::String => 0x0e,
            TypeKind::Ptr => 0x0f,
            TypeKind::ByRef => 0x10,
            TypeKind::ValueType => 0x11,
            TypeKind::Class => 0x12,
            TypeKind::Var => 0x13,
            TypeKind::Array => 0x14,
            TypeKind::GenericInst => 0x15,
            TypeKind::TypedByRef => 0x16,
            TypeKind::I => 0x18,
            TypeKind::U => 0x19,
            TypeKind::FnPtr => 0x1b,
            TypeKind::Object => 0x1c,
            TypeKind::SzArray => 0x1d,
            TypeKind::MVar => 0x1e,
            TypeKind::CModReqd => 0x1f,
            TypeKind::CModOpt => 0x20,
            TypeKind::Internal => 0x21,
            TypeKind::Modifier => 0x40,
            TypeKind::Sentinel => 0x41,
            TypeKind::Pinned => 0x45,
            TypeKind::Enum => 0x55,
            TypeKind::Unknown(code) => code,
        }
    }

    fn lookup(self, table: &[bool; 0x56]) -> bool {
        table.get(self.code() as usize).copied().unwrap_or(false)
    }

    /// Kinds whose slot holds an address rather than inline content.
    pub fn is_pointer_like(self) -> bool {
        self.lookup(&POINTER_LIKE)
    }

    pub fn is_numeric(self) -> bool {
        self.lookup(&NUMERIC)
    }

    pub fn is_integral(self) -> bool {
        self.lookup(&INTEGRAL)
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeKind::R4 | TypeKind::R8)
    }

    pub fn is_value_type(self) -> bool {
        self.lookup(&VALUE_TYPE)
    }

    pub fn is_array(self) -> bool {
        self.lookup(&ARRAY)
    }

    /// Booleans, chars, fixed-width numbers and native integers.
    pub fn is_primitive(self) -> bool {
        self == TypeKind::Boolean || self.is_numeric()
    }

    pub fn is_generic_parameter(self) -> bool {
        matches!(self, TypeKind::Var | TypeKind::MVar)
    }

    /// Storage size of a primitive or pointer-shaped slot.
    ///
    /// `I`, `U` and every pointer-like kind take the pointer width of the
    /// target process; a fixed constant would be wrong for one of the two
    /// bitnesses.
    pub fn primitive_size(self, width: PointerWidth) -> Option<usize> {
        if matches!(self, TypeKind::I | TypeKind::U) || self.is_pointer_like() {
            return Some(width.bytes());
        }
        match FIXED_SIZE.get(self.code() as usize) {
            Some(&0) | None => None,
            Some(&size) => Some(size as usize),
        }
    }

    /// Signed-ness and bit range of integral kinds, as inclusive bounds.
    pub fn integral_range(self, width: PointerWidth) -> Option<(i128, i128)> {
        Some(match self {
            TypeKind::I1 => (i8::MIN as i128, i8::MAX as i128),
            TypeKind::U1 => (0, u8::MAX as i128),
            TypeKind::I2 => (i16::MIN as i128, i16::MAX as i128),
            TypeKind::U2 | TypeKind::Char => (0, u16::MAX as i128),
            TypeKind::I4 => (i32::MIN as i128, i32::MAX as i128),
            TypeKind::U4 => (0, u32::MAX as i128),
            TypeKind::I8 => (i64::MIN as i128, i64::MAX as i128),
            TypeKind::U8 => (0, u64::MAX as i128),
            TypeKind::I => match width {
                PointerWidth::Bits32 => (i32::MIN as i128, i32::MAX as i128),
                PointerWidth::Bits64 => (i64::MIN as i128, i64::MAX as i128),
            },
            TypeKind::U => match width {
                PointerWidth::Bits32 => (0, u32::MAX as i128),
                PointerWidth::Bits64 => (0, u64::MAX as i128),
            },
            _ => return None,
        })
    }

    /// Corlib class name for primitive kinds.
    pub fn corlib_name(self) -> Option<&'static str> {
        Some(match self {
            TypeKind::Void => "System.Void",
            TypeKind::Boolean => "System.Boolean",
            TypeKind::Char => "System.Char",
            TypeKind::I1 => "System.SByte",
            TypeKind::U1 => "System.Byte",
            TypeKind::I2 => "System.Int16",
            TypeKind::U2 => "System.UInt16",
            TypeKind::I4 => "System.Int32",
            TypeKind::U4 => "System.UInt32",
            TypeKind::I8 => "System.Int64",
            TypeKind::U8 => "System.UInt64",
            TypeKind::R4 => "System.Single",
            TypeKind::R8 => "System.Double",
            TypeKind::String => "System.String",
            TypeKind::I => "System.IntPtr",
            TypeKind::U => "System.UIntPtr",
            TypeKind::Object => "System.Object",
            TypeKind::TypedByRef => "System.TypedReference",
            _ => return None,
        })
    }
}

impl From<u32> for TypeKind {
    fn from(code: u32) -> Self {
        TypeKind::from_code(code)
    }
}

/// Pointer width of the target process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    pub const fn host() -> Self {
        if std::mem::size_of::<usize>() == 4 {
            PointerWidth::Bits32
        } else {
            PointerWidth::Bits64
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }
}

impl TryFrom<usize> for PointerWidth {
    type Error = KindError;

    fn try_from(bytes: usize) -> Result<Self, Self::Error> {
        match bytes {
            4 => Ok(PointerWidth::Bits32),
            8 => Ok(PointerWidth::Bits64),
            other => Err(KindError::InvalidPointerWidth(other)),
        }
    }
}
