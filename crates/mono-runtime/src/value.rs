//! Host-side values passed to and returned from the runtime.
use crate::object::ObjectRef;
use mono_utils::NativePtr;
use std::fmt::{self, Display, Formatter};

/// A primitive in host form. `Int` and `UInt` keep full 64-bit precision;
/// `Float` is the host number type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Primitive {
    /// Exact integer view. Floats only convert when integral and finite.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Primitive::Bool(_) => None,
            Primitive::Int(v) => Some(v as i128),
            Primitive::UInt(v) => Some(v as i128),
            Primitive::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                // saturating; range checks happen on the i128
                Some(f as i128)
            }
            Primitive::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Primitive::Bool(_) => None,
            Primitive::Int(v) => Some(v as f64),
            Primitive::UInt(v) => Some(v as f64),
            Primitive::Float(f) => Some(f),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Primitive::Bool(_) => "bool",
            Primitive::Int(_) => "int",
            Primitive::UInt(_) => "uint",
            Primitive::Float(_) => "float",
        }
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Bool(v) => write!(f, "{v}"),
            Primitive::Int(v) => write!(f, "{v}"),
            Primitive::UInt(v) => write!(f, "{v}"),
            Primitive::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value: a null argument, a `void` return or a null reference.
    Absent,
    ForeignRef(ObjectRef),
    Primitive(Primitive),
    StringLiteral(String),
    /// An address passed through untouched.
    RawHandle(NativePtr),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::ForeignRef(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Value::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::StringLiteral(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_primitive()?.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_primitive()?.as_f64()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.as_primitive()? {
            Primitive::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::ForeignRef(_) => "object",
            Value::Primitive(p) => p.type_name(),
            Value::StringLiteral(_) => "string",
            Value::RawHandle(_) => "raw handle",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "null"),
            Value::ForeignRef(obj) => write!(f, "{obj:?}"),
            Value::Primitive(p) => write!(f, "{p}"),
            Value::StringLiteral(s) => write!(f, "{s:?}"),
            Value::RawHandle(p) => write!(f, "{p}"),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Primitive(Primitive::$variant(v as $conv))
                }
            }
        )*
    };
}

value_from! {
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    isize => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    usize => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Primitive(Primitive::Bool(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::StringLiteral(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::StringLiteral(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::ForeignRef(v)
    }
}

impl From<NativePtr> for Value {
    fn from(v: NativePtr) -> Self {
        Value::RawHandle(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Absent, Into::into)
    }
}
