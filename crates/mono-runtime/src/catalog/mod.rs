//! Domains, assemblies, images and their members.
use crate::{api::Ptr, error::{BridgeError, Result}};
use mono_utils::{memory, NativePtr};
use std::ffi::c_char;

pub mod assembly;
pub mod class;
pub mod domain;
pub mod field;
pub mod image;
pub mod method;
pub mod property;

pub use assembly::MonoAssembly;
pub use class::MonoClass;
pub use domain::MonoDomain;
pub use field::MonoField;
pub use image::MonoImage;
pub use method::{MethodSignature, MonoMethod, Parameter};
pub use property::MonoProperty;

pub(crate) fn read_name(raw: *const c_char) -> String {
    unsafe { memory::read_c_string(NativePtr::from_ptr(raw)) }.unwrap_or_default()
}

/// Drains one of Mono's `gpointer *iter` style enumerators.
pub(crate) fn collect_iter(mut next: impl FnMut(*mut Ptr) -> Ptr) -> Vec<NativePtr> {
    let mut iter: Ptr = std::ptr::null_mut();
    let mut items = vec![];
    loop {
        let item = next(&mut iter);
        if item.is_null() {
            break;
        }
        items.push(NativePtr::from(item));
    }
    items
}

/// Splits `Namespace.Name` on the last dot. A name without a dot lives in
/// the global namespace.
pub(crate) fn split_full_name(full_name: &str) -> Result<(&str, &str)> {
    let full_name = full_name.trim();
    if full_name.is_empty() {
        return Err(BridgeError::validation("class name must not be empty"));
    }
    let (namespace, name) = full_name.rsplit_once('.').unwrap_or(("", full_name));
    if name.is_empty() {
        return Err(BridgeError::validation(format!(
            "class name {full_name:?} ends with a dot"
        )));
    }
    Ok((namespace, name))
}
