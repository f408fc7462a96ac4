use crate::{
    catalog::{
        collect_iter, field::MonoField, image::MonoImage, method::MonoMethod,
        property::MonoProperty, read_name,
    },
    error::{BridgeError, Result},
    handle::mono_handle,
    object::ObjectRef,
    runtime::{c_string, MethodKey},
    types::MonoType,
};
use mono_types::attrs::type_attributes;
use mono_utils::NativePtr;
use std::collections::HashSet;
use tracing::{debug, trace};

mono_handle! {
    /// A class (`MonoClass*`).
    pub struct MonoClass {
        name: String,
        namespace: String,
        flags: u32,
        value_type: bool,
        is_enum: bool,
        parent: Option<NativePtr>,
        mono_type: MonoType,
    }
}

impl MonoClass {
    pub fn name(&self) -> Result<&str> {
        self.name
            .get_or_try_init(|| {
                self.runtime.with_thread(|| {
                    Ok(read_name(unsafe { self.runtime.api().mono_class_get_name()?(self.ptr()) }))
                })
            })
            .map(String::as_str)
    }

    pub fn namespace(&self) -> Result<&str> {
        self.namespace
            .get_or_try_init(|| {
                self.runtime.with_thread(|| {
                    Ok(read_name(unsafe { self.runtime.api().mono_class_get_namespace()?(self.ptr()) }))
                })
            })
            .map(String::as_str)
    }

    /// `Namespace.Name`, or just `Name` in the global namespace.
    pub fn full_name(&self) -> Result<String> {
        let namespace = self.namespace()?;
        let name = self.name()?;
        Ok(if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        })
    }

    pub fn image(&self) -> Result<MonoImage> {
        let _guard = self.runtime.attach()?;
        let image = unsafe { self.runtime.api().mono_class_get_image()?(self.ptr()) };
        MonoImage::non_null(&self.runtime, image)
            .ok_or_else(|| BridgeError::Memory(format!("class {} has no image", self.address)))
    }

    pub fn mono_type(&self) -> Result<MonoType> {
        self.mono_type
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                let ty = unsafe { self.runtime.api().mono_class_get_type()?(self.ptr()) };
                MonoType::non_null(&self.runtime, ty).ok_or_else(|| {
                    BridgeError::Memory(format!("class {} has no type", self.address))
                })
            })
            .cloned()
    }

    pub fn flags(&self) -> Result<u32> {
        self.flags
            .get_or_try_init(|| {
                self.runtime
                    .with_thread(|| Ok(unsafe { self.runtime.api().mono_class_get_flags()?(self.ptr()) }))
            })
            .copied()
    }

    pub fn is_abstract(&self) -> Result<bool> {
        Ok(self.flags()? & type_attributes::ABSTRACT != 0)
    }

    pub fn is_interface(&self) -> Result<bool> {
        Ok(self.flags()? & type_attributes::INTERFACE != 0)
    }

    pub fn is_value_type(&self) -> Result<bool> {
        self.value_type
            .get_or_try_init(|| {
                self.runtime
                    .with_thread(|| Ok(unsafe { self.runtime.api().mono_class_is_valuetype()?(self.ptr()) } != 0))
            })
            .copied()
    }

    pub fn is_enum(&self) -> Result<bool> {
        self.is_enum
            .get_or_try_init(|| {
                self.runtime
                    .with_thread(|| Ok(unsafe { self.runtime.api().mono_class_is_enum()?(self.ptr()) } != 0))
            })
            .copied()
    }

    /// The underlying integer type of an enum.
    pub fn enum_base_type(&self) -> Result<Option<MonoType>> {
        if !self.is_enum()? {
            return Ok(None);
        }
        let _guard = self.runtime.attach()?;
        let ty = unsafe { self.runtime.api().mono_class_enum_basetype()?(self.ptr()) };
        Ok(MonoType::non_null(&self.runtime, ty))
    }

    /// Element class of an array or pointer class.
    pub fn element_class(&self) -> Result<Option<MonoClass>> {
        let _guard = self.runtime.attach()?;
        let element = unsafe { self.runtime.api().mono_class_get_element_class()?(self.ptr()) };
        Ok(MonoClass::non_null(&self.runtime, element).filter(|e| e != self))
    }

    pub fn parent(&self) -> Result<Option<MonoClass>> {
        let parent = self.parent.get_or_try_init(|| {
            self.runtime.with_thread(|| {
                let parent = unsafe { self.runtime.api().mono_class_get_parent()?(self.ptr()) };
                Ok(NativePtr::from(parent).non_null())
            })
        })?;
        Ok(parent.map(|address| MonoClass::from_raw(self.runtime.clone(), address)))
    }

    /// This class followed by its ancestors, nearest first.
    pub fn hierarchy(&self) -> Result<Vec<MonoClass>> {
        let mut chain = vec![self.clone()];
        let mut seen = HashSet::from([self.address]);
        while let Some(parent) = chain.last().map(|c| c.parent()).transpose()?.flatten() {
            if !seen.insert(parent.address) {
                return Err(BridgeError::Memory(format!(
                    "cyclic parent chain at {}",
                    parent.address
                )));
            }
            chain.push(parent);
        }
        Ok(chain)
    }

    pub fn methods(&self) -> Result<Vec<MonoMethod>> {
        let _guard = self.runtime.attach()?;
        let next = self.runtime.api().mono_class_get_methods()?;
        Ok(collect_iter(|iter| unsafe { next(self.ptr(), iter) })
            .into_iter()
            .map(|m| MonoMethod::from_raw(self.runtime.clone(), m))
            .collect())
    }

    pub fn fields(&self) -> Result<Vec<MonoField>> {
        let _guard = self.runtime.attach()?;
        let next = self.runtime.api().mono_class_get_fields()?;
        Ok(collect_iter(|iter| unsafe { next(self.ptr(), iter) })
            .into_iter()
            .map(|f| MonoField::from_raw(self.runtime.clone(), f))
            .collect())
    }

    pub fn properties(&self) -> Result<Vec<MonoProperty>> {
        let _guard = self.runtime.attach()?;
        let next = self.runtime.api().mono_class_get_properties()?;
        Ok(collect_iter(|iter| unsafe { next(self.ptr(), iter) })
            .into_iter()
            .map(|p| MonoProperty::from_raw(self.runtime.clone(), p))
            .collect())
    }

    /// Interfaces declared directly on this class.
    pub fn interfaces(&self) -> Result<Vec<MonoClass>> {
        let _guard = self.runtime.attach()?;
        let next = self.runtime.api().mono_class_get_interfaces()?;
        Ok(collect_iter(|iter| unsafe { next(self.ptr(), iter) })
            .into_iter()
            .map(|i| MonoClass::from_raw(self.runtime.clone(), i))
            .collect())
    }

    /// A method declared on this class. `arity` of `-1` takes the first
    /// method with a matching name.
    pub fn method(&self, name: &str, arity: i32) -> Result<Option<MonoMethod>> {
        let key = MethodKey {
            class: self.address,
            name: name.to_string(),
            arity,
        };
        let cached = self.runtime.caches.methods.lock().get(&key).copied();
        if let Some(method) = cached {
            return Ok(Some(MonoMethod::from_raw(self.runtime.clone(), method)));
        }

        let _guard = self.runtime.attach()?;
        let c_name = c_string(name)?;
        let method = NativePtr::from(unsafe {
            self.runtime.api().mono_class_get_method_from_name()?(self.ptr(), c_name.as_ptr(), arity)
        });
        if method.is_null() {
            return Ok(None);
        }
        debug!(name, arity, %method, "method cache miss");
        self.runtime.caches.methods.lock().set(key, method);
        Ok(Some(MonoMethod::from_raw(self.runtime.clone(), method)))
    }

    /// Like [`MonoClass::method`], then up the parent chain.
    pub fn find_method(&self, name: &str, arity: i32) -> Result<Option<MonoMethod>> {
        for class in self.hierarchy()? {
            if let Some(method) = class.method(name, arity)? {
                return Ok(Some(method));
            }
        }
        Ok(None)
    }

    pub fn get_method(&self, name: &str, arity: i32) -> Result<MonoMethod> {
        self.find_method(name, arity)?.ok_or_else(|| {
            let member = if arity < 0 {
                name.to_string()
            } else {
                format!("{name}/{arity}")
            };
            BridgeError::not_found("method", member, self.display_name())
        })
    }

    pub fn field(&self, name: &str) -> Result<Option<MonoField>> {
        let _guard = self.runtime.attach()?;
        let c_name = c_string(name)?;
        let field = unsafe { self.runtime.api().mono_class_get_field_from_name()?(self.ptr(), c_name.as_ptr()) };
        Ok(MonoField::non_null(&self.runtime, field))
    }

    pub fn find_field(&self, name: &str) -> Result<Option<MonoField>> {
        for class in self.hierarchy()? {
            if let Some(field) = class.field(name)? {
                return Ok(Some(field));
            }
        }
        Ok(None)
    }

    pub fn get_field(&self, name: &str) -> Result<MonoField> {
        self.find_field(name)?
            .ok_or_else(|| BridgeError::not_found("field", name, self.display_name()))
    }

    pub fn property(&self, name: &str) -> Result<Option<MonoProperty>> {
        let _guard = self.runtime.attach()?;
        let c_name = c_string(name)?;
        let property = unsafe { self.runtime.api().mono_class_get_property_from_name()?(self.ptr(), c_name.as_ptr()) };
        Ok(MonoProperty::non_null(&self.runtime, property))
    }

    pub fn find_property(&self, name: &str) -> Result<Option<MonoProperty>> {
        for class in self.hierarchy()? {
            if let Some(property) = class.property(name)? {
                return Ok(Some(property));
            }
        }
        Ok(None)
    }

    pub fn get_property(&self, name: &str) -> Result<MonoProperty> {
        self.find_property(name)?
            .ok_or_else(|| BridgeError::not_found("property", name, self.display_name()))
    }

    /// Whether a value of class `other` can be stored in a location of this
    /// class.
    pub fn is_assignable_from(&self, other: &MonoClass) -> Result<bool> {
        if self == other {
            return Ok(true);
        }
        if let Ok(check) = self.runtime.api().mono_class_is_assignable_from() {
            let _guard = self.runtime.attach()?;
            return Ok(unsafe { check(self.ptr(), other.ptr()) } != 0);
        }
        other.derives_from(self)
    }

    /// Strict subclass or implementer test: `self` derives from `other`.
    pub fn is_subclass_of(&self, other: &MonoClass) -> Result<bool> {
        if self == other {
            return Ok(false);
        }
        self.derives_from(other)
    }

    /// Reflexive walk over the parent chain and the interfaces declared along
    /// it, including interfaces inherited by interfaces.
    fn derives_from(&self, target: &MonoClass) -> Result<bool> {
        let mut pending = self.hierarchy()?;
        let mut seen = HashSet::new();
        while let Some(class) = pending.pop() {
            if &class == target {
                return Ok(true);
            }
            if !seen.insert(class.address) {
                continue;
            }
            pending.extend(class.interfaces()?);
        }
        Ok(false)
    }

    /// Size of an instance including the object header.
    pub fn instance_size(&self) -> Result<usize> {
        let _guard = self.runtime.attach()?;
        let size = unsafe { self.runtime.api().mono_class_instance_size()?(self.ptr()) };
        usize::try_from(size).map_err(|_| BridgeError::Memory(format!("negative instance size {size}")))
    }

    /// Unboxed size and alignment of a value type.
    pub fn value_size(&self) -> Result<(usize, usize)> {
        let _guard = self.runtime.attach()?;
        let mut align = 0u32;
        let size = unsafe { self.runtime.api().mono_class_value_size()?(self.ptr(), &mut align) };
        let size = usize::try_from(size).map_err(|_| BridgeError::Memory(format!("negative value size {size}")))?;
        Ok((size, (align as usize).max(1)))
    }

    /// Runs the static constructor if it has not run yet.
    pub fn ensure_initialized(&self) -> Result<()> {
        if self.runtime.is_initialized(self.address) {
            return Ok(());
        }
        let _guard = self.runtime.attach()?;
        let domain = self.runtime.root_domain()?;
        let vtable = self.vtable_in(domain.address())?;
        match self.runtime.api().mono_runtime_class_init() {
            Ok(init) => unsafe { init(vtable.as_void()) },
            // mono_class_vtable already ran the cctor on runtimes without it
            Err(_) => trace!(class = %self.address, "mono_runtime_class_init missing"),
        }
        self.runtime.mark_initialized(self.address);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.is_initialized(self.address)
    }

    pub(crate) fn vtable_in(&self, domain: NativePtr) -> Result<NativePtr> {
        let _guard = self.runtime.attach()?;
        let vtable = unsafe { self.runtime.api().mono_class_vtable()?(domain.as_void(), self.ptr()) };
        NativePtr::from(vtable).non_null().ok_or_else(|| {
            BridgeError::Memory(format!("no vtable for {}", self.display_name()))
        })
    }

    /// Allocates an instance without running a constructor.
    pub fn new_object(&self) -> Result<ObjectRef> {
        let _guard = self.runtime.attach()?;
        let domain = self.runtime.root_domain()?;
        let object = unsafe { self.runtime.api().mono_object_new()?(domain.ptr(), self.ptr()) };
        if object.is_null() {
            return Err(BridgeError::Memory(format!(
                "allocation of {} failed",
                self.display_name()
            )));
        }
        Ok(ObjectRef::with_class(NativePtr::from(object), self.clone()))
    }

    /// Allocates an instance and runs its parameterless constructor.
    pub fn instantiate(&self) -> Result<ObjectRef> {
        let _guard = self.runtime.attach()?;
        let object = self.new_object()?;
        unsafe { self.runtime.api().mono_runtime_object_init()?(object.address().as_void()) };
        Ok(object)
    }

    /// Name for messages; never fails.
    pub(crate) fn display_name(&self) -> String {
        self.full_name()
            .unwrap_or_else(|_| format!("<class {}>", self.address))
    }
}
