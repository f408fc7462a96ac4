//! References to managed objects, arrays and strings.
use crate::{
    api::Ptr,
    catalog::class::MonoClass,
    error::{BridgeError, Result},
    invoke::describe_exception,
    marshal::{self, Frame},
    runtime::MonoRuntime,
    value::{Primitive, Value},
};
use mono_types::TypeKind;
use mono_utils::{memory, NativePtr};
use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};
use tracing::{trace, warn};

/// A managed object: its address and its runtime class.
///
/// The address is only stable while something keeps the object reachable
/// and the collector does not move it; hold a
/// [`GcHandle`](crate::gchandle::GcHandle) across calls that may collect.
#[derive(Clone)]
pub struct ObjectRef {
    address: NativePtr,
    class: MonoClass,
}

impl ObjectRef {
    pub fn from_address(runtime: &Arc<MonoRuntime>, address: NativePtr) -> Result<Self> {
        if address.is_null() {
            return Err(BridgeError::validation("null object reference"));
        }
        let _guard = runtime.attach()?;
        let class = unsafe { runtime.api().mono_object_get_class()?(address.as_void()) };
        let class = MonoClass::non_null(runtime, class)
            .ok_or_else(|| BridgeError::Memory(format!("object {address} has no class")))?;
        Ok(Self { address, class })
    }

    pub(crate) fn with_class(address: NativePtr, class: MonoClass) -> Self {
        Self { address, class }
    }

    pub fn address(&self) -> NativePtr {
        self.address
    }

    pub fn class(&self) -> &MonoClass {
        &self.class
    }

    pub fn runtime(&self) -> &Arc<MonoRuntime> {
        self.class.runtime()
    }

    pub fn is_value_type(&self) -> Result<bool> {
        self.class.is_value_type()
    }

    pub fn is_instance_of(&self, class: &MonoClass) -> Result<bool> {
        class.is_assignable_from(&self.class)
    }

    /// Address of the payload of a boxed value type.
    pub fn unboxed_address(&self) -> Result<NativePtr> {
        let _guard = self.runtime().attach()?;
        let payload = unsafe { self.runtime().api().mono_object_unbox()?(self.address.as_void()) };
        NativePtr::from(payload)
            .non_null()
            .ok_or_else(|| BridgeError::Memory(format!("cannot unbox {}", self.address)))
    }

    /// The `this` pointer methods of this object's class expect.
    pub fn this_pointer(&self) -> Result<NativePtr> {
        if self.is_value_type()? {
            self.unboxed_address()
        } else {
            Ok(self.address)
        }
    }

    /// Reads a boxed primitive or enum.
    pub fn unbox(&self) -> Result<Primitive> {
        let kind = self.class.mono_type()?.effective_kind()?;
        marshal::unbox(self, kind)
    }

    /// Reads a field, searching the class hierarchy.
    pub fn field(&self, name: &str) -> Result<Value> {
        let field = self.class.get_field(name)?;
        field.get_value(Some(self))
    }

    pub fn set_field(&self, name: &str, value: &Value) -> Result<()> {
        let field = self.class.get_field(name)?;
        field.set_value(Some(self), value)
    }

    /// Calls `ToString()`. A managed exception thrown by it is returned as
    /// [`BridgeError::ForeignException`].
    pub fn to_managed_string(&self) -> Result<String> {
        let runtime = self.runtime();
        let _guard = runtime.attach()?;
        let Ok(to_string) = runtime.api().mono_object_to_string() else {
            return match self.invoke("ToString", &[])? {
                Value::StringLiteral(s) => Ok(s),
                Value::Absent => Ok(String::new()),
                other => Err(BridgeError::validation(format!(
                    "ToString returned {}",
                    other.kind_name()
                ))),
            };
        };

        let mut exc: Ptr = std::ptr::null_mut();
        let string = unsafe { to_string(self.address.as_void(), &mut exc) };
        if !exc.is_null() {
            return Err(describe_exception(runtime, NativePtr::from(exc)));
        }
        MonoString::read_at(runtime, NativePtr::from(string))
    }

    /// `ToString()` for display purposes. Falls back to the class name when
    /// the call fails, logging what was swallowed.
    pub fn display_string(&self) -> String {
        match self.to_managed_string() {
            Ok(s) => s,
            Err(e) => {
                let fallback = self.class.display_name();
                warn!(object = %self.address, error = %e, "ToString failed, using class name");
                fallback
            }
        }
    }

    /// Clones this object and, recursively, every object reachable through
    /// its reference fields and reference array elements, up to `max_depth`
    /// levels. References deeper than that stay shared with the source.
    /// Cycles and shared references are preserved.
    pub fn deep_clone(&self, max_depth: usize) -> Result<ObjectRef> {
        let _guard = self.runtime().attach()?;
        let mut visited = HashMap::new();
        clone_into(self, max_depth, &mut visited)
    }
}

fn shallow_clone(object: &ObjectRef) -> Result<ObjectRef> {
    let runtime = object.runtime();
    let copy = unsafe { runtime.api().mono_object_clone()?(object.address.as_void()) };
    let copy = NativePtr::from(copy)
        .non_null()
        .ok_or_else(|| BridgeError::Memory(format!("mono_object_clone failed for {}", object.address)))?;
    Ok(ObjectRef::with_class(copy, object.class.clone()))
}

fn clone_into(
    source: &ObjectRef,
    depth: usize,
    visited: &mut HashMap<NativePtr, ObjectRef>,
) -> Result<ObjectRef> {
    if let Some(done) = visited.get(&source.address) {
        return Ok(done.clone());
    }
    let copy = shallow_clone(source)?;
    visited.insert(source.address, copy.clone());
    trace!(source = %source.address, copy = %copy.address, depth, "cloned object");
    if depth == 0 {
        return Ok(copy);
    }

    let runtime = source.runtime().clone();
    if matches!(copy.class.mono_type()?.kind()?, TypeKind::SzArray | TypeKind::Array) {
        let array = ArrayRef::from_object(copy.clone())?;
        if array.holds_references()? {
            for i in 0..array.len() as i64 {
                let slot = array.element_address(i)?;
                let child = unsafe { memory::read_ptr(slot) };
                if let Some(replacement) = clone_child(&runtime, child, depth, visited)? {
                    array.store_reference(slot, replacement)?;
                }
            }
        }
        return Ok(copy);
    }

    for class in copy.class.hierarchy()? {
        for field in class.fields()? {
            if field.is_static()? {
                continue;
            }
            let ty = field.field_type()?;
            let kind = ty.kind()?;
            if !matches!(kind, TypeKind::Class | TypeKind::Object | TypeKind::SzArray | TypeKind::Array) {
                continue;
            }
            let slot = copy.address + field.offset()?;
            let child = unsafe { memory::read_ptr(slot) };
            if let Some(replacement) = clone_child(&runtime, child, depth, visited)? {
                field.set_value(Some(&copy), &Value::RawHandle(replacement))?;
            }
        }
    }
    Ok(copy)
}

/// Clones one referenced child. Returns the address to store in place of
/// `child`, or `None` to leave the slot untouched.
fn clone_child(
    runtime: &Arc<MonoRuntime>,
    child: NativePtr,
    depth: usize,
    visited: &mut HashMap<NativePtr, ObjectRef>,
) -> Result<Option<NativePtr>> {
    if child.is_null() {
        return Ok(None);
    }
    let child = ObjectRef::from_address(runtime, child)?;
    if child.class.mono_type()?.kind()? == TypeKind::String {
        return Ok(None);
    }
    Ok(Some(clone_into(&child, depth - 1, visited)?.address))
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}
impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state)
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}: {})", self.address, self.class.display_name())
    }
}

/// A single-dimensional managed array.
#[derive(Debug, Clone)]
pub struct ArrayRef {
    object: ObjectRef,
    element_class: MonoClass,
    element_size: usize,
    len: usize,
    base: NativePtr,
}

impl ArrayRef {
    pub fn new(element_class: &MonoClass, len: usize) -> Result<Self> {
        let runtime = element_class.runtime();
        let _guard = runtime.attach()?;
        let domain = runtime.root_domain()?;
        let array = unsafe { runtime.api().mono_array_new()?(domain.ptr(), element_class.ptr(), len) };
        if array.is_null() {
            return Err(BridgeError::Memory(format!(
                "allocation of {}[{len}] failed",
                element_class.display_name()
            )));
        }
        Self::from_object(ObjectRef::from_address(runtime, NativePtr::from(array))?)
    }

    pub fn from_object(object: ObjectRef) -> Result<Self> {
        let runtime = object.runtime().clone();
        let _guard = runtime.attach()?;
        let element_class = object.class().element_class()?.ok_or_else(|| {
            BridgeError::validation(format!("{} is not an array", object.class().display_name()))
        })?;
        let api = runtime.api();
        let element_size = unsafe { api.mono_class_array_element_size()?(element_class.ptr()) };
        let element_size = usize::try_from(element_size)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| BridgeError::Memory(format!("bad element size {element_size}")))?;
        let len = unsafe { api.mono_array_length()?(object.address().as_void()) };
        let base = NativePtr::from(unsafe {
            api.mono_array_addr_with_size()?(object.address().as_void(), element_size as i32, 0)
        } as Ptr);
        Ok(Self {
            object,
            element_class,
            element_size,
            len,
            base,
        })
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn element_class(&self) -> &MonoClass {
        &self.element_class
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn index(&self, index: i64) -> Result<usize> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < self.len)
            .ok_or_else(|| {
                BridgeError::validation(format!(
                    "index {index} out of bounds for array of length {}",
                    self.len
                ))
            })
    }

    pub fn element_address(&self, index: i64) -> Result<NativePtr> {
        let i = self.index(index)?;
        Ok(self.base + i * self.element_size)
    }

    fn holds_references(&self) -> Result<bool> {
        Ok(!self.element_class.is_value_type()?)
    }

    pub fn get(&self, index: i64) -> Result<Value> {
        let slot = self.element_address(index)?;
        let ty = self.element_class.mono_type()?;
        marshal::read_slot(self.object.runtime(), &ty, slot)
    }

    pub fn set(&self, index: i64, value: &Value) -> Result<()> {
        let slot = self.element_address(index)?;
        let runtime = self.object.runtime();
        let ty = self.element_class.mono_type()?;
        let _guard = runtime.attach()?;
        let mut frame = Frame::new(runtime);
        let source = marshal::stage_slot(&mut frame, &ty, value)?;

        if self.holds_references()? {
            let reference = unsafe { memory::read_ptr(source) };
            return self.store_reference(slot, reference);
        }
        unsafe {
            std::ptr::copy(
                source.as_ptr::<u8>(),
                slot.as_mut_ptr::<u8>(),
                self.element_size,
            )
        };
        Ok(())
    }

    /// Stores an object reference into an element slot, through the write
    /// barrier when the runtime has one.
    fn store_reference(&self, slot: NativePtr, reference: NativePtr) -> Result<()> {
        match self.object.runtime().api().mono_gc_wbarrier_set_arrayref() {
            Ok(barrier) => unsafe {
                barrier(self.object.address().as_void(), slot.as_void(), reference.as_void())
            },
            Err(_) => unsafe { memory::write_ptr(slot, reference) },
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Result<Vec<Value>> {
        (0..self.len as i64).map(|i| self.get(i)).collect()
    }
}

/// A managed `System.String`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonoString(ObjectRef);

impl MonoString {
    pub fn new(runtime: &Arc<MonoRuntime>, text: &str) -> Result<Self> {
        let _guard = runtime.attach()?;
        let address = runtime.new_string(text)?;
        Self::from_object(ObjectRef::from_address(runtime, address)?)
    }

    pub fn from_object(object: ObjectRef) -> Result<Self> {
        if object.class().mono_type()?.kind()? != TypeKind::String {
            return Err(BridgeError::validation(format!(
                "{} is not a string",
                object.class().display_name()
            )));
        }
        Ok(MonoString(object))
    }

    /// Reads the string at `address`; null reads as empty.
    pub fn read_at(runtime: &Arc<MonoRuntime>, address: NativePtr) -> Result<String> {
        if address.is_null() {
            return Ok(String::new());
        }
        Self::from_object(ObjectRef::from_address(runtime, address)?)?.read()
    }

    pub fn object(&self) -> &ObjectRef {
        &self.0
    }

    pub fn len(&self) -> Result<usize> {
        let _guard = self.0.runtime().attach()?;
        let len = unsafe { self.0.runtime().api().mono_string_length()?(self.0.address().as_void()) };
        Ok(len.max(0) as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn read(&self) -> Result<String> {
        let runtime = self.0.runtime();
        let _guard = runtime.attach()?;
        let api = runtime.api();
        if let Ok(chars) = api.mono_string_chars() {
            let units = unsafe { chars(self.0.address().as_void()) };
            let len = self.len()?;
            return Ok(unsafe { memory::read_utf16(NativePtr::from_mut(units), len) });
        }
        let utf8 = unsafe { api.mono_string_to_utf8()?(self.0.address().as_void()) };
        Ok(runtime.take_c_string(utf8).unwrap_or_default())
    }
}
