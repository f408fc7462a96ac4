use crate::{
    catalog::{class::MonoClass, read_name, split_full_name},
    error::{BridgeError, Result},
    handle::mono_handle,
    runtime::{c_string, ClassKey},
};
use mono_types::{MetadataTable, Token};
use mono_utils::NativePtr;
use tracing::{debug, trace};

mono_handle! {
    /// A loaded metadata image (`MonoImage*`).
    pub struct MonoImage {
        name: String,
    }
}

impl MonoImage {
    pub fn name(&self) -> Result<&str> {
        self.name
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                let raw = unsafe { self.runtime.api().mono_image_get_name()?(self.ptr()) };
                Ok(read_name(raw))
            })
            .map(String::as_str)
    }

    pub fn filename(&self) -> Result<Option<String>> {
        let _guard = self.runtime.attach()?;
        let raw = unsafe { self.runtime.api().mono_image_get_filename()?(self.ptr()) };
        Ok(Some(read_name(raw)).filter(|s| !s.is_empty()))
    }

    pub fn class_by_name(&self, namespace: &str, name: &str) -> Result<MonoClass> {
        if name.trim().is_empty() {
            return Err(BridgeError::validation("class name must not be empty"));
        }
        self.try_class_by_name(namespace, name)?.ok_or_else(|| {
            let full = if namespace.is_empty() {
                name.to_string()
            } else {
                format!("{namespace}.{name}")
            };
            BridgeError::not_found("class", full, self.name().unwrap_or("<image>").to_string())
        })
    }

    pub fn try_class_by_name(&self, namespace: &str, name: &str) -> Result<Option<MonoClass>> {
        if name.trim().is_empty() {
            return Ok(None);
        }
        let key = ClassKey {
            image: self.address,
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        let cached = self.runtime.caches.classes.lock().get(&key).copied();
        if let Some(class) = cached {
            return Ok(Some(MonoClass::from_raw(self.runtime.clone(), class)));
        }

        let _guard = self.runtime.attach()?;
        let c_namespace = c_string(namespace)?;
        let c_name = c_string(name)?;
        let class = NativePtr::from(unsafe {
            self.runtime.api().mono_class_from_name()?(self.ptr(), c_namespace.as_ptr(), c_name.as_ptr())
        });
        if class.is_null() {
            trace!(namespace, name, image = %self.address, "class lookup missed");
            return Ok(None);
        }
        debug!(namespace, name, %class, "class cache miss");
        self.runtime.caches.classes.lock().set(key, class);
        Ok(Some(MonoClass::from_raw(self.runtime.clone(), class)))
    }

    /// Looks up `Namespace.Name`, splitting on the last dot.
    pub fn class_by_full_name(&self, full_name: &str) -> Result<MonoClass> {
        let (namespace, name) = split_full_name(full_name)?;
        self.class_by_name(namespace, name)
    }

    pub fn try_class_by_full_name(&self, full_name: &str) -> Result<Option<MonoClass>> {
        match split_full_name(full_name) {
            Ok((namespace, name)) => self.try_class_by_name(namespace, name),
            Err(_) => Ok(None),
        }
    }

    /// Number of rows in the `TypeDef` table, or `None` when the runtime does
    /// not export the table accessors.
    pub fn type_def_rows(&self) -> Result<Option<u32>> {
        let api = self.runtime.api();
        let (Ok(table_info), Ok(rows)) = (api.mono_image_get_table_info(), api.mono_table_info_get_rows()) else {
            return Ok(None);
        };
        let _guard = self.runtime.attach()?;
        let table = unsafe { table_info(self.ptr(), MetadataTable::TypeDef.index() as i32) };
        if table.is_null() {
            return Ok(Some(0));
        }
        Ok(Some(unsafe { rows(table) }.max(0) as u32))
    }

    /// Every class defined in this image, by walking the `TypeDef` table.
    /// Rows the runtime cannot resolve are skipped. Not cached: each call
    /// rescans the table.
    pub fn enumerate_classes(&self) -> Result<Vec<MonoClass>> {
        let _guard = self.runtime.attach()?;
        let Some(rows) = self.type_def_rows()? else {
            debug!(image = %self.address, "table info exports missing, no classes enumerated");
            return Ok(vec![]);
        };
        let class_get = self.runtime.api().mono_class_get()?;

        let mut classes = Vec::with_capacity(rows as usize);
        for row in 1..=rows {
            let token = Token::type_def(row)?;
            let class = unsafe { class_get(self.ptr(), token.value()) };
            match MonoClass::non_null(&self.runtime, class) {
                Some(class) => classes.push(class),
                None => trace!(%token, "typedef row did not resolve"),
            }
        }
        Ok(classes)
    }
}
