//! Typed table of the Mono embedding exports the bridge calls.
//!
//! Every entry is resolved once when the table is built. Missing exports are
//! kept as `None`; calling the accessor of a missing export returns
//! [`BridgeError::NotSupported`], so optional features can call
//! [`MonoApi::has`] first.
use crate::{
    error::{BridgeError, Result},
    exports::SymbolResolver,
};
use std::ffi::{c_char, c_void};

pub type Ptr = *mut c_void;
pub type CStr = *const c_char;
pub type GFunc = unsafe extern "C" fn(Ptr, Ptr);

macro_rules! mono_api {
    ($(
        $name:ident $([$($alias:literal),*])? : fn($($arg:ty),*) $(-> $ret:ty)?;
    )*) => {
        pub struct MonoApi {
            $($name: Option<unsafe extern "C" fn($($arg),*) $(-> $ret)?>,)*
        }

        impl MonoApi {
            pub fn resolve(resolver: &SymbolResolver) -> Self {
                Self {
                    $($name: resolver
                        .resolve(stringify!($name), &[$($($alias),*)?])
                        .map(|address| unsafe {
                            std::mem::transmute::<usize, unsafe extern "C" fn($($arg),*) $(-> $ret)?>(
                                address.as_usize(),
                            )
                        }),)*
                }
            }

            /// Whether the named export was resolved.
            pub fn has(&self, name: &str) -> bool {
                match name {
                    $(stringify!($name) => self.$name.is_some(),)*
                    _ => false,
                }
            }

            /// Names of the exports in `names` that were not resolved.
            pub fn missing<'a>(&self, names: &[&'a str]) -> Vec<&'a str> {
                names.iter().copied().filter(|n| !self.has(n)).collect()
            }

            $(
                #[inline]
                pub fn $name(&self) -> Result<unsafe extern "C" fn($($arg),*) $(-> $ret)?> {
                    self.$name.ok_or_else(|| {
                        BridgeError::NotSupported(concat!(stringify!($name), " is not exported").to_string())
                    })
                }
            )*
        }

        impl std::fmt::Debug for MonoApi {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let resolved = [$(self.$name.is_some()),*].iter().filter(|r| **r).count();
                let total = [$(stringify!($name)),*].len();
                write!(f, "MonoApi({resolved}/{total} exports)")
            }
        }
    };
}

mono_api! {
    // domains and threads
    mono_get_root_domain ["mono_get_root_domain_internal"]: fn() -> Ptr;
    mono_jit_init: fn(CStr) -> Ptr;
    mono_thread_current: fn() -> Ptr;
    mono_thread_attach ["mono_thread_attach_internal", "mono_jit_thread_attach"]: fn(Ptr) -> Ptr;
    mono_thread_detach ["mono_thread_detach_internal"]: fn(Ptr);
    mono_thread_detach_if_exiting: fn() -> i32;
    mono_runtime_is_shutting_down: fn() -> i32;

    // assemblies and images
    mono_assembly_foreach: fn(GFunc, Ptr);
    mono_domain_assembly_open: fn(Ptr, CStr) -> Ptr;
    mono_assembly_get_image ["mono_assembly_get_image_internal"]: fn(Ptr) -> Ptr;
    mono_assembly_get_name ["mono_assembly_get_name_internal"]: fn(Ptr) -> Ptr;
    mono_assembly_name_get_name: fn(Ptr) -> CStr;
    mono_image_get_name: fn(Ptr) -> CStr;
    mono_image_get_filename: fn(Ptr) -> CStr;
    mono_image_loaded: fn(CStr) -> Ptr;
    mono_get_corlib: fn() -> Ptr;
    mono_image_get_table_info: fn(Ptr, i32) -> Ptr;
    mono_table_info_get_rows: fn(Ptr) -> i32;

    // classes
    mono_class_get ["mono_unity_class_get"]: fn(Ptr, u32) -> Ptr;
    mono_class_from_name: fn(Ptr, CStr, CStr) -> Ptr;
    mono_class_get_name: fn(Ptr) -> CStr;
    mono_class_get_namespace: fn(Ptr) -> CStr;
    mono_class_get_parent: fn(Ptr) -> Ptr;
    mono_class_get_image: fn(Ptr) -> Ptr;
    mono_class_get_type: fn(Ptr) -> Ptr;
    mono_class_get_flags: fn(Ptr) -> u32;
    mono_class_is_valuetype: fn(Ptr) -> i32;
    mono_class_is_enum: fn(Ptr) -> i32;
    mono_class_enum_basetype: fn(Ptr) -> Ptr;
    mono_class_get_element_class: fn(Ptr) -> Ptr;
    mono_class_is_assignable_from: fn(Ptr, Ptr) -> i32;
    mono_class_instance_size: fn(Ptr) -> i32;
    mono_class_value_size: fn(Ptr, *mut u32) -> i32;
    mono_class_array_element_size: fn(Ptr) -> i32;
    mono_class_get_methods: fn(Ptr, *mut Ptr) -> Ptr;
    mono_class_get_fields: fn(Ptr, *mut Ptr) -> Ptr;
    mono_class_get_properties: fn(Ptr, *mut Ptr) -> Ptr;
    mono_class_get_interfaces: fn(Ptr, *mut Ptr) -> Ptr;
    mono_class_get_method_from_name: fn(Ptr, CStr, i32) -> Ptr;
    mono_class_get_field_from_name: fn(Ptr, CStr) -> Ptr;
    mono_class_get_property_from_name: fn(Ptr, CStr) -> Ptr;
    mono_class_vtable: fn(Ptr, Ptr) -> Ptr;
    mono_runtime_class_init: fn(Ptr);
    mono_class_from_mono_type ["mono_class_from_mono_type_internal"]: fn(Ptr) -> Ptr;

    // types
    mono_type_get_type: fn(Ptr) -> i32;
    mono_type_get_name: fn(Ptr) -> *mut c_char;
    mono_type_get_name_full: fn(Ptr, i32) -> *mut c_char;
    mono_type_is_byref: fn(Ptr) -> i32;
    mono_type_size: fn(Ptr, *mut i32) -> i32;
    mono_type_get_underlying_type: fn(Ptr) -> Ptr;
    mono_type_get_class: fn(Ptr) -> Ptr;
    mono_free ["mono_unity_g_free"]: fn(Ptr);

    // methods and signatures
    mono_method_get_name: fn(Ptr) -> CStr;
    mono_method_get_class: fn(Ptr) -> Ptr;
    mono_method_get_flags: fn(Ptr, *mut u32) -> u32;
    mono_method_signature ["mono_method_signature_internal"]: fn(Ptr) -> Ptr;
    mono_signature_get_param_count: fn(Ptr) -> u32;
    mono_signature_get_params: fn(Ptr, *mut Ptr) -> Ptr;
    mono_signature_get_return_type: fn(Ptr) -> Ptr;
    mono_signature_param_is_out: fn(Ptr, i32) -> i32;
    mono_signature_get_call_conv: fn(Ptr) -> u32;
    mono_runtime_invoke ["mono_unity_runtime_invoke"]: fn(Ptr, Ptr, *mut Ptr, *mut Ptr) -> Ptr;
    mono_compile_method: fn(Ptr) -> Ptr;
    mono_method_get_unmanaged_thunk: fn(Ptr) -> Ptr;

    // fields and properties
    mono_field_get_name: fn(Ptr) -> CStr;
    mono_field_get_type: fn(Ptr) -> Ptr;
    mono_field_get_parent: fn(Ptr) -> Ptr;
    mono_field_get_offset: fn(Ptr) -> u32;
    mono_field_get_flags: fn(Ptr) -> u32;
    mono_field_set_value: fn(Ptr, Ptr, Ptr);
    mono_field_static_get_value: fn(Ptr, Ptr, Ptr);
    mono_field_static_set_value: fn(Ptr, Ptr, Ptr);
    mono_property_get_name: fn(Ptr) -> CStr;
    mono_property_get_parent: fn(Ptr) -> Ptr;
    mono_property_get_get_method: fn(Ptr) -> Ptr;
    mono_property_get_set_method: fn(Ptr) -> Ptr;

    // objects
    mono_object_new ["mono_unity_object_new"]: fn(Ptr, Ptr) -> Ptr;
    mono_object_get_class: fn(Ptr) -> Ptr;
    mono_object_unbox: fn(Ptr) -> Ptr;
    mono_object_clone: fn(Ptr) -> Ptr;
    mono_object_to_string: fn(Ptr, *mut Ptr) -> Ptr;
    mono_value_box: fn(Ptr, Ptr, Ptr) -> Ptr;
    mono_runtime_object_init: fn(Ptr);

    // strings
    mono_string_new ["mono_unity_string_new"]: fn(Ptr, CStr) -> Ptr;
    mono_string_new_utf16: fn(Ptr, *const u16, i32) -> Ptr;
    mono_string_length: fn(Ptr) -> i32;
    mono_string_chars: fn(Ptr) -> *mut u16;
    mono_string_to_utf8: fn(Ptr) -> *mut c_char;

    // arrays
    mono_array_new: fn(Ptr, Ptr, usize) -> Ptr;
    mono_array_length: fn(Ptr) -> usize;
    mono_array_addr_with_size: fn(Ptr, i32, usize) -> *mut c_char;
    mono_gc_wbarrier_set_arrayref: fn(Ptr, Ptr, Ptr);

    // GC handles
    mono_gchandle_new: fn(Ptr, i32) -> u32;
    mono_gchandle_new_weakref: fn(Ptr, i32) -> u32;
    mono_gchandle_get_target: fn(u32) -> Ptr;
    mono_gchandle_free: fn(u32);

    // internal calls
    mono_add_internal_call: fn(CStr, Ptr);
}

/// Exports without which the bridge cannot do anything useful.
pub const REQUIRED_EXPORTS: &[&str] = &[
    "mono_get_root_domain",
    "mono_thread_current",
    "mono_thread_attach",
    "mono_class_from_name",
    "mono_class_get_name",
    "mono_class_get_namespace",
    "mono_class_get_type",
    "mono_type_get_type",
    "mono_method_get_name",
    "mono_method_signature",
    "mono_runtime_invoke",
    "mono_object_get_class",
    "mono_object_unbox",
    "mono_value_box",
    "mono_string_new",
];
