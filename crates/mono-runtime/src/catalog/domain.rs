use crate::{
    api::Ptr,
    catalog::{assembly::MonoAssembly, class::MonoClass, image::MonoImage},
    error::{BridgeError, OptionalExt, Result},
    handle::mono_handle,
    runtime::c_string,
};
use mono_utils::NativePtr;
use std::path::Path;
use tracing::debug;

mono_handle! {
    /// An application domain (`MonoDomain*`).
    pub struct MonoDomain {}
}

unsafe extern "C" fn push_assembly(assembly: Ptr, user_data: Ptr) {
    let sink = &mut *(user_data as *mut Vec<NativePtr>);
    sink.push(NativePtr::from(assembly));
}

impl MonoDomain {
    /// Every assembly loaded into the runtime, in load order.
    pub fn assemblies(&self) -> Result<Vec<MonoAssembly>> {
        let _guard = self.runtime.attach()?;
        let foreach = self.runtime.api().mono_assembly_foreach()?;
        let mut found: Vec<NativePtr> = vec![];
        unsafe { foreach(push_assembly, &mut found as *mut Vec<NativePtr> as Ptr) };
        Ok(found
            .into_iter()
            .filter_map(|a| MonoAssembly::non_null(&self.runtime, a))
            .collect())
    }

    pub fn open_assembly(&self, path: impl AsRef<Path>) -> Result<MonoAssembly> {
        let path = path.as_ref();
        let _guard = self.runtime.attach()?;
        let raw = c_string(&path.to_string_lossy())?;
        let assembly = unsafe { self.runtime.api().mono_domain_assembly_open()?(self.ptr(), raw.as_ptr()) };
        debug!(path = %path.display(), assembly = %NativePtr::from(assembly), "opened assembly");
        MonoAssembly::non_null(&self.runtime, assembly)
            .ok_or_else(|| BridgeError::not_found("assembly", path.display().to_string(), "domain"))
    }

    /// A loaded image by assembly name (`Assembly-CSharp`, `mscorlib`, ...).
    pub fn image_by_name(&self, name: &str) -> Result<MonoImage> {
        let _guard = self.runtime.attach()?;
        let raw = c_string(name)?;
        let image = unsafe { self.runtime.api().mono_image_loaded()?(raw.as_ptr()) };
        MonoImage::non_null(&self.runtime, image)
            .ok_or_else(|| BridgeError::not_found("image", name, "loaded images"))
    }

    pub fn try_image_by_name(&self, name: &str) -> Result<Option<MonoImage>> {
        self.image_by_name(name).optional()
    }

    pub fn corlib(&self) -> Result<MonoImage> {
        let _guard = self.runtime.attach()?;
        let image = unsafe { self.runtime.api().mono_get_corlib()?() };
        MonoImage::non_null(&self.runtime, image)
            .ok_or_else(|| BridgeError::not_found("image", "corlib", "runtime"))
    }

    /// Searches every loaded image for `Namespace.Name`.
    pub fn class_by_full_name(&self, full_name: &str) -> Result<MonoClass> {
        self.try_class_by_full_name(full_name)?
            .ok_or_else(|| BridgeError::not_found("class", full_name.trim(), "loaded assemblies"))
    }

    pub fn try_class_by_full_name(&self, full_name: &str) -> Result<Option<MonoClass>> {
        if full_name.trim().is_empty() {
            return Ok(None);
        }
        for assembly in self.assemblies()? {
            if let Some(class) = assembly.image()?.try_class_by_full_name(full_name)? {
                return Ok(Some(class));
            }
        }
        Ok(None)
    }
}
