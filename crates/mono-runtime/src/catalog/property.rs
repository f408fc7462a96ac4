use crate::{
    catalog::{class::MonoClass, method::MonoMethod, read_name},
    error::{BridgeError, Result},
    handle::mono_handle,
    object::ObjectRef,
    value::Value,
};

mono_handle! {
    pub struct MonoProperty {
        name: String,
    }
}

impl MonoProperty {
    pub fn name(&self) -> Result<&str> {
        self.name
            .get_or_try_init(|| {
                self.runtime.with_thread(|| {
                    Ok(read_name(unsafe { self.runtime.api().mono_property_get_name()?(self.ptr()) }))
                })
            })
            .map(String::as_str)
    }

    pub fn parent(&self) -> Result<MonoClass> {
        let _guard = self.runtime.attach()?;
        let parent = unsafe { self.runtime.api().mono_property_get_parent()?(self.ptr()) };
        MonoClass::non_null(&self.runtime, parent)
            .ok_or_else(|| BridgeError::Memory(format!("property {} has no parent", self.address)))
    }

    pub fn getter(&self) -> Result<Option<MonoMethod>> {
        let _guard = self.runtime.attach()?;
        let method = unsafe { self.runtime.api().mono_property_get_get_method()?(self.ptr()) };
        Ok(MonoMethod::non_null(&self.runtime, method))
    }

    pub fn setter(&self) -> Result<Option<MonoMethod>> {
        let _guard = self.runtime.attach()?;
        let method = unsafe { self.runtime.api().mono_property_get_set_method()?(self.ptr()) };
        Ok(MonoMethod::non_null(&self.runtime, method))
    }

    pub fn get(&self, receiver: Option<&ObjectRef>) -> Result<Value> {
        let getter = self.getter()?.ok_or_else(|| {
            BridgeError::NotSupported(format!("property {} has no getter", self.name().unwrap_or("?")))
        })?;
        getter.invoke(receiver, &[])
    }

    pub fn set(&self, receiver: Option<&ObjectRef>, value: Value) -> Result<()> {
        let setter = self.setter()?.ok_or_else(|| {
            BridgeError::NotSupported(format!("property {} has no setter", self.name().unwrap_or("?")))
        })?;
        setter.invoke(receiver, &[value]).map(|_| ())
    }
}
