use crate::{
    catalog::{image::MonoImage, read_name},
    error::{BridgeError, Result},
    handle::mono_handle,
};

mono_handle! {
    pub struct MonoAssembly {
        image: MonoImage,
        name: String,
    }
}

impl MonoAssembly {
    pub fn image(&self) -> Result<MonoImage> {
        self.image
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                let image = unsafe { self.runtime.api().mono_assembly_get_image()?(self.ptr()) };
                MonoImage::non_null(&self.runtime, image).ok_or_else(|| {
                    BridgeError::Memory(format!("assembly {} has no image", self.address))
                })
            })
            .cloned()
    }

    /// The simple assembly name, falling back to the image name.
    pub fn name(&self) -> Result<&str> {
        self.name
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                let api = self.runtime.api();
                if let (Ok(get_name), Ok(name_of)) =
                    (api.mono_assembly_get_name(), api.mono_assembly_name_get_name())
                {
                    let aname = unsafe { get_name(self.ptr()) };
                    if !aname.is_null() {
                        return Ok(read_name(unsafe { name_of(aname) }));
                    }
                }
                Ok(self.image()?.name()?.to_string())
            })
            .map(String::as_str)
    }
}
