//! Conversion between host [`Value`]s and the runtime's native layouts.
//!
//! `mono_runtime_invoke` takes a `void **params` array in which reference
//! arguments are object pointers and value-type arguments are pointers to
//! the unboxed data. Field stores take a pointer to the slot content in both
//! cases. [`argument`] and [`stage_slot`] build those two shapes, keeping
//! every temporary alive in a [`Frame`] until the native call returns.
use crate::{
    catalog::{class::MonoClass, method::Parameter},
    error::{BridgeError, Result},
    object::{MonoString, ObjectRef},
    runtime::MonoRuntime,
    types::MonoType,
    value::{Primitive, Value},
};
use mono_types::{PointerWidth, TypeKind};
use mono_utils::{
    memory::{self, Scalar, ScalarValue, ScratchBuffer},
    NativePtr,
};
use std::sync::Arc;
use tracing::{trace, warn};

/// Scalar layout of a primitive or pointer-shaped kind.
pub fn scalar_for(kind: TypeKind, width: PointerWidth) -> Option<Scalar> {
    Some(match kind {
        TypeKind::Boolean => Scalar::Bool,
        TypeKind::Char => Scalar::Char,
        TypeKind::I1 => Scalar::I8,
        TypeKind::U1 => Scalar::U8,
        TypeKind::I2 => Scalar::I16,
        TypeKind::U2 => Scalar::U16,
        TypeKind::I4 => Scalar::I32,
        TypeKind::U4 => Scalar::U32,
        TypeKind::I8 => Scalar::I64,
        TypeKind::U8 => Scalar::U64,
        TypeKind::R4 => Scalar::F32,
        TypeKind::R8 => Scalar::F64,
        TypeKind::I => match width {
            PointerWidth::Bits32 => Scalar::I32,
            PointerWidth::Bits64 => Scalar::I64,
        },
        TypeKind::U => match width {
            PointerWidth::Bits32 => Scalar::U32,
            PointerWidth::Bits64 => Scalar::U64,
        },
        k if k.is_pointer_like() => Scalar::Pointer,
        _ => return None,
    })
}

fn rejected(kind: TypeKind, value: Primitive, why: &str) -> BridgeError {
    BridgeError::validation(format!("cannot store {} {value} as {kind:?}: {why}", value.type_name()))
}

/// Validates `value` against `kind` and converts it to the exact scalar
/// stored in memory. Nothing is written here, so a rejected value never
/// reaches the target.
pub fn encode_primitive(kind: TypeKind, value: Primitive, width: PointerWidth) -> Result<ScalarValue> {
    if kind == TypeKind::Boolean {
        return match value {
            Primitive::Bool(b) => Ok(ScalarValue::Bool(b)),
            other => match other.as_f64() {
                Some(n) if n == 0.0 => Ok(ScalarValue::Bool(false)),
                Some(n) if n == 1.0 => Ok(ScalarValue::Bool(true)),
                _ => Err(rejected(kind, value, "only 0 and 1 convert to a boolean")),
            },
        };
    }

    if let Primitive::Bool(_) = value {
        return Err(rejected(kind, value, "booleans only convert to Boolean"));
    }

    if kind.is_float() {
        let n = value.as_f64().unwrap_or_default();
        return Ok(match kind {
            TypeKind::R4 => {
                if n.is_finite() && n.abs() > f32::MAX as f64 {
                    return Err(rejected(kind, value, "out of single-precision range"));
                }
                ScalarValue::F32(n as f32)
            }
            _ => ScalarValue::F64(n),
        });
    }

    let Some((min, max)) = kind.integral_range(width) else {
        return Err(BridgeError::validation(format!("{kind:?} is not a primitive kind")));
    };
    if let Primitive::Float(f) = value {
        if !f.is_finite() {
            return Err(rejected(kind, value, "not a finite number"));
        }
        if f.fract() != 0.0 {
            return Err(rejected(kind, value, "not an integer"));
        }
    }
    let n = value
        .as_i128()
        .ok_or_else(|| rejected(kind, value, "not an integer"))?;
    if n < min || n > max {
        return Err(rejected(kind, value, "out of range"));
    }

    let scalar = scalar_for(kind, width)
        .ok_or_else(|| BridgeError::validation(format!("{kind:?} has no scalar layout")))?;
    Ok(match scalar {
        Scalar::Char => ScalarValue::Char(n as u16),
        Scalar::I8 => ScalarValue::I8(n as i8),
        Scalar::U8 => ScalarValue::U8(n as u8),
        Scalar::I16 => ScalarValue::I16(n as i16),
        Scalar::U16 => ScalarValue::U16(n as u16),
        Scalar::I32 => ScalarValue::I32(n as i32),
        Scalar::U32 => ScalarValue::U32(n as u32),
        Scalar::I64 => ScalarValue::I64(n as i64),
        Scalar::U64 => ScalarValue::U64(n as u64),
        other => {
            return Err(BridgeError::validation(format!(
                "{kind:?} maps to non-integral scalar {other:?}"
            )))
        }
    })
}

pub fn decode_scalar(value: ScalarValue) -> Primitive {
    match value {
        ScalarValue::Bool(b) => Primitive::Bool(b),
        ScalarValue::Char(v) => Primitive::UInt(v as u64),
        ScalarValue::I8(v) => Primitive::Int(v as i64),
        ScalarValue::U8(v) => Primitive::UInt(v as u64),
        ScalarValue::I16(v) => Primitive::Int(v as i64),
        ScalarValue::U16(v) => Primitive::UInt(v as u64),
        ScalarValue::I32(v) => Primitive::Int(v as i64),
        ScalarValue::U32(v) => Primitive::UInt(v as u64),
        ScalarValue::I64(v) => Primitive::Int(v),
        ScalarValue::U64(v) => Primitive::UInt(v),
        ScalarValue::F32(v) => Primitive::Float(v as f64),
        ScalarValue::F64(v) => Primitive::Float(v),
        ScalarValue::Pointer(p) => Primitive::UInt(p.as_usize() as u64),
    }
}

/// Boxes `value` into a new instance of the primitive (or enum) value type
/// `class`.
pub fn box_primitive(class: &MonoClass, value: Primitive) -> Result<ObjectRef> {
    let runtime = class.runtime();
    let width = runtime.pointer_width();
    let kind = class.mono_type()?.effective_kind()?;
    if !kind.is_primitive() {
        return Err(BridgeError::validation(format!(
            "cannot box {} {value} into {}: not a primitive value type",
            value.type_name(),
            class.display_name()
        )));
    }

    let encoded = encode_primitive(kind, value, width)?;
    let size = kind.primitive_size(width).unwrap_or(encoded.scalar().size());
    let mut scratch = ScratchBuffer::new(size);
    unsafe { memory::write(scratch.as_mut_ptr(), encoded) };

    class.ensure_initialized()?;
    let _guard = runtime.attach()?;
    let domain = runtime.root_domain()?;
    let boxed = NativePtr::from(unsafe {
        runtime.api().mono_value_box()?(domain.ptr(), class.ptr(), scratch.as_mut_ptr().as_void())
    });
    if boxed.is_null() {
        return Err(BridgeError::Memory(format!(
            "mono_value_box failed for {}",
            class.display_name()
        )));
    }
    trace!(class = %class.address(), %boxed, %value, "boxed primitive");
    Ok(ObjectRef::with_class(boxed, class.clone()))
}

/// Reads a boxed primitive back.
pub fn unbox(object: &ObjectRef, kind: TypeKind) -> Result<Primitive> {
    let width = object.runtime().pointer_width();
    let scalar = scalar_for(kind, width)
        .filter(|_| kind.is_primitive())
        .ok_or_else(|| BridgeError::validation(format!("cannot unbox {kind:?} as a primitive")))?;
    let payload = object.unboxed_address()?;
    Ok(decode_scalar(unsafe { memory::read(payload, scalar) }))
}

/// Converts an object pointer into a host value: null is `Absent`, strings
/// are copied out, everything else stays a reference.
pub(crate) fn object_value(runtime: &Arc<MonoRuntime>, address: NativePtr) -> Result<Value> {
    if address.is_null() {
        return Ok(Value::Absent);
    }
    let object = ObjectRef::from_address(runtime, address)?;
    if object.class().mono_type()?.kind()? == TypeKind::String {
        return Ok(Value::StringLiteral(MonoString::from_object(object)?.read()?));
    }
    Ok(Value::ForeignRef(object))
}

fn is_raw_pointer(ty: &MonoType, kind: TypeKind) -> bool {
    ty.is_byref().unwrap_or(false) || matches!(kind, TypeKind::Ptr | TypeKind::FnPtr | TypeKind::ByRef)
}

/// Reads the value stored in a slot of type `ty` at `addr`.
pub(crate) fn read_slot(runtime: &Arc<MonoRuntime>, ty: &MonoType, addr: NativePtr) -> Result<Value> {
    let kind = ty.effective_kind()?;
    let width = runtime.pointer_width();

    if is_raw_pointer(ty, kind) {
        return Ok(Value::RawHandle(unsafe { memory::read_ptr(addr) }));
    }
    if kind.is_primitive() {
        if let Some(scalar) = scalar_for(kind, width) {
            return Ok(Value::Primitive(decode_scalar(unsafe { memory::read(addr, scalar) })));
        }
    }
    if kind.is_pointer_like() {
        return object_value(runtime, unsafe { memory::read_ptr(addr) });
    }

    let class = ty
        .class()?
        .ok_or_else(|| BridgeError::NotSupported(format!("cannot read a {kind:?} slot")))?;
    if !class.is_value_type()? {
        return object_value(runtime, unsafe { memory::read_ptr(addr) });
    }
    let _guard = runtime.attach()?;
    let domain = runtime.root_domain()?;
    let boxed = unsafe { runtime.api().mono_value_box()?(domain.ptr(), class.ptr(), addr.as_void()) };
    object_value(runtime, NativePtr::from(boxed))
}

/// Temporaries that must outlive a native call: scratch storage and pinned
/// GC handles on every object created for the call. The params array holds
/// interior pointers the collector never scans, so those objects must not
/// move either.
pub(crate) struct Frame<'a> {
    runtime: &'a MonoRuntime,
    scratch: Vec<ScratchBuffer>,
    pins: Vec<u32>,
}

impl<'a> Frame<'a> {
    pub fn new(runtime: &'a MonoRuntime) -> Self {
        Self {
            runtime,
            scratch: vec![],
            pins: vec![],
        }
    }

    fn pointer_slot(&mut self, value: NativePtr) -> NativePtr {
        let mut buffer = ScratchBuffer::new(std::mem::size_of::<usize>());
        let slot = buffer.as_mut_ptr();
        unsafe { memory::write_ptr(slot, value) };
        self.scratch.push(buffer);
        slot
    }

    fn scalar_slot(&mut self, value: ScalarValue) -> NativePtr {
        let mut buffer = ScratchBuffer::new(value.scalar().size());
        let slot = buffer.as_mut_ptr();
        unsafe { memory::write(slot, value) };
        self.scratch.push(buffer);
        slot
    }

    fn pin(&mut self, object: NativePtr) -> Result<()> {
        let handle = unsafe { self.runtime.api().mono_gchandle_new()?(object.as_void(), 1) };
        if handle == 0 {
            return Err(BridgeError::Memory(format!("runtime refused to pin {object}")));
        }
        self.pins.push(handle);
        Ok(())
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        if self.pins.is_empty() {
            return;
        }
        match self.runtime.api().mono_gchandle_free() {
            Ok(free) => {
                for handle in self.pins.drain(..) {
                    unsafe { free(handle) };
                }
            }
            Err(_) => warn!(count = self.pins.len(), "cannot release argument GC handles"),
        }
    }
}

fn is_reference_kind(kind: TypeKind) -> bool {
    matches!(
        kind,
        TypeKind::String | TypeKind::Class | TypeKind::Object | TypeKind::Array | TypeKind::SzArray
    )
}

/// Whether slots of `ty` hold object references, resolving generic
/// instances through their class.
fn holds_reference(ty: &MonoType, kind: TypeKind) -> Result<bool> {
    if is_reference_kind(kind) {
        return Ok(true);
    }
    if kind == TypeKind::GenericInst {
        if let Some(class) = ty.class()? {
            return Ok(!class.is_value_type()?);
        }
    }
    Ok(false)
}

fn check_assignable(ty: &MonoType, object: &ObjectRef) -> Result<()> {
    let Some(declared) = ty.class()? else {
        return Ok(());
    };
    if declared.is_assignable_from(object.class())? {
        return Ok(());
    }
    Err(BridgeError::validation(format!(
        "{} is not assignable to {}",
        object.class().display_name(),
        declared.display_name()
    )))
}

fn accepts_string(kind: TypeKind) -> bool {
    matches!(kind, TypeKind::String | TypeKind::Object)
}

/// Builds the `params[i]` entry for one declared parameter.
pub(crate) fn argument(frame: &mut Frame<'_>, param: &Parameter, value: &Value) -> Result<NativePtr> {
    let ty = &param.ty;
    if param.is_out {
        return match value {
            Value::Absent => Ok(NativePtr::NULL),
            Value::RawHandle(addr) => Ok(*addr),
            other => Err(BridgeError::validation(format!(
                "out parameter takes a raw handle or nothing, not {}",
                other.kind_name()
            ))),
        };
    }

    let kind = ty.kind()?;
    match value {
        Value::Absent => Ok(NativePtr::NULL),
        Value::RawHandle(addr) => Ok(*addr),
        Value::StringLiteral(text) => {
            if !accepts_string(kind) {
                return Err(BridgeError::validation(format!(
                    "string argument for a {kind:?} parameter"
                )));
            }
            let string = frame.runtime.managed_string(text)?;
            frame.pin(string)?;
            Ok(string)
        }
        Value::ForeignRef(object) => {
            check_assignable(ty, object)?;
            if holds_reference(ty, kind)? || is_raw_pointer(ty, kind) {
                Ok(object.address())
            } else {
                object.unboxed_address()
            }
        }
        Value::Primitive(p) => {
            if is_raw_pointer(ty, kind) || kind.is_pointer_like() {
                return Err(BridgeError::validation(format!(
                    "primitive {p} for a {kind:?} parameter; pass an object instead"
                )));
            }
            let class = ty.class()?.ok_or_else(|| {
                BridgeError::validation(format!("parameter of kind {kind:?} has no class to box into"))
            })?;
            let boxed = box_primitive(&class, *p)?;
            frame.pin(boxed.address())?;
            boxed.unboxed_address()
        }
    }
}

/// Writes `value` into temporary storage shaped like a slot of `ty` and
/// returns its address, for field and array stores.
pub(crate) fn stage_slot(frame: &mut Frame<'_>, ty: &MonoType, value: &Value) -> Result<NativePtr> {
    let kind = ty.effective_kind()?;
    let width = frame.runtime.pointer_width();
    let reference = holds_reference(ty, kind)?;

    match value {
        Value::Absent if reference || is_raw_pointer(ty, kind) => Ok(frame.pointer_slot(NativePtr::NULL)),
        Value::Absent => Err(BridgeError::validation(format!("cannot store null in a {kind:?} slot"))),
        Value::RawHandle(addr) if reference || is_raw_pointer(ty, kind) => Ok(frame.pointer_slot(*addr)),
        // Points at existing value-type data to copy from.
        Value::RawHandle(addr) => Ok(*addr),
        Value::Primitive(p) => {
            if !kind.is_primitive() {
                return Err(BridgeError::validation(format!(
                    "primitive {p} for a {kind:?} slot"
                )));
            }
            let encoded = encode_primitive(kind, *p, width)?;
            Ok(frame.scalar_slot(encoded))
        }
        Value::StringLiteral(text) => {
            if !accepts_string(ty.kind()?) {
                return Err(BridgeError::validation(format!("string for a {kind:?} slot")));
            }
            let string = frame.runtime.managed_string(text)?;
            frame.pin(string)?;
            Ok(frame.pointer_slot(string))
        }
        Value::ForeignRef(object) => {
            check_assignable(ty, object)?;
            if reference {
                Ok(frame.pointer_slot(object.address()))
            } else {
                object.unboxed_address()
            }
        }
    }
}
