use crate::{
    catalog::{class::MonoClass, read_name},
    error::{BridgeError, Result},
    handle::mono_handle,
    marshal::{self, Frame},
    object::ObjectRef,
    types::MonoType,
    value::Value,
};
use mono_types::attrs::field_attributes;
use mono_utils::memory::ScratchBuffer;

mono_handle! {
    /// A field (`MonoClassField*`).
    pub struct MonoField {
        name: String,
        field_type: MonoType,
        parent: MonoClass,
        offset: usize,
        flags: u32,
    }
}

impl MonoField {
    pub fn name(&self) -> Result<&str> {
        self.name
            .get_or_try_init(|| {
                self.runtime.with_thread(|| {
                    Ok(read_name(unsafe { self.runtime.api().mono_field_get_name()?(self.ptr()) }))
                })
            })
            .map(String::as_str)
    }

    pub fn field_type(&self) -> Result<MonoType> {
        self.field_type
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                let ty = unsafe { self.runtime.api().mono_field_get_type()?(self.ptr()) };
                MonoType::non_null(&self.runtime, ty)
                    .ok_or_else(|| BridgeError::Memory(format!("field {} has no type", self.address)))
            })
            .cloned()
    }

    pub fn parent(&self) -> Result<MonoClass> {
        self.parent
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                let class = unsafe { self.runtime.api().mono_field_get_parent()?(self.ptr()) };
                MonoClass::non_null(&self.runtime, class)
                    .ok_or_else(|| BridgeError::Memory(format!("field {} has no parent", self.address)))
            })
            .cloned()
    }

    /// Offset from the start of the object, header included.
    pub fn offset(&self) -> Result<usize> {
        self.offset
            .get_or_try_init(|| {
                self.runtime
                    .with_thread(|| Ok(unsafe { self.runtime.api().mono_field_get_offset()?(self.ptr()) } as usize))
            })
            .copied()
    }

    pub fn flags(&self) -> Result<u32> {
        self.flags
            .get_or_try_init(|| {
                self.runtime
                    .with_thread(|| Ok(unsafe { self.runtime.api().mono_field_get_flags()?(self.ptr()) }))
            })
            .copied()
    }

    pub fn is_static(&self) -> Result<bool> {
        Ok(self.flags()? & field_attributes::STATIC != 0)
    }

    pub fn is_literal(&self) -> Result<bool> {
        Ok(self.flags()? & field_attributes::LITERAL != 0)
    }

    /// Reads the field. Instance fields need the owning object; static
    /// fields ignore `receiver`.
    pub fn get_value(&self, receiver: Option<&ObjectRef>) -> Result<Value> {
        let ty = self.field_type()?;
        let _guard = self.runtime.attach()?;
        if self.is_static()? {
            let (size, _) = ty.size_and_alignment()?;
            let mut buffer = ScratchBuffer::new(size);
            let vtable = self.static_vtable()?;
            unsafe {
                self.runtime.api().mono_field_static_get_value()?(
                    vtable.as_void(),
                    self.ptr(),
                    buffer.as_mut_ptr().as_void(),
                )
            };
            return marshal::read_slot(&self.runtime, &ty, buffer.as_ptr());
        }

        let receiver = self.require_receiver(receiver)?;
        let slot = receiver.address() + self.offset()?;
        marshal::read_slot(&self.runtime, &ty, slot)
    }

    pub fn set_value(&self, receiver: Option<&ObjectRef>, value: &Value) -> Result<()> {
        let ty = self.field_type()?;
        let _guard = self.runtime.attach()?;
        let mut frame = Frame::new(&self.runtime);
        let source = marshal::stage_slot(&mut frame, &ty, value)?;

        if self.is_static()? {
            let vtable = self.static_vtable()?;
            unsafe {
                self.runtime.api().mono_field_static_set_value()?(vtable.as_void(), self.ptr(), source.as_void())
            };
            return Ok(());
        }

        let receiver = self.require_receiver(receiver)?;
        unsafe {
            self.runtime.api().mono_field_set_value()?(receiver.address().as_void(), self.ptr(), source.as_void())
        };
        Ok(())
    }

    fn require_receiver<'a>(&self, receiver: Option<&'a ObjectRef>) -> Result<&'a ObjectRef> {
        receiver.ok_or_else(|| {
            BridgeError::validation(format!(
                "instance field {} needs an object",
                self.name().unwrap_or("<field>")
            ))
        })
    }

    fn static_vtable(&self) -> Result<mono_utils::NativePtr> {
        let parent = self.parent()?;
        parent.ensure_initialized()?;
        let domain = self.runtime.root_domain()?;
        parent.vtable_in(domain.address())
    }
}
