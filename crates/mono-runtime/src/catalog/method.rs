use crate::{
    catalog::{class::MonoClass, read_name},
    error::{BridgeError, Result},
    handle::mono_handle,
    types::MonoType,
};
use mono_types::attrs::{method_attributes, CallConv};
use mono_utils::NativePtr;

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub ty: MonoType,
    pub is_out: bool,
}

#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub params: Vec<Parameter>,
    pub return_type: MonoType,
    pub call_conv: CallConv,
}

impl MethodSignature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

mono_handle! {
    /// A method (`MonoMethod*`).
    pub struct MonoMethod {
        name: String,
        class: MonoClass,
        flags: u32,
        signature: MethodSignature,
    }
}

impl MonoMethod {
    pub fn name(&self) -> Result<&str> {
        self.name
            .get_or_try_init(|| {
                self.runtime.with_thread(|| {
                    Ok(read_name(unsafe { self.runtime.api().mono_method_get_name()?(self.ptr()) }))
                })
            })
            .map(String::as_str)
    }

    /// Declaring class.
    pub fn class(&self) -> Result<MonoClass> {
        self.class
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                let class = unsafe { self.runtime.api().mono_method_get_class()?(self.ptr()) };
                MonoClass::non_null(&self.runtime, class).ok_or_else(|| {
                    BridgeError::Memory(format!("method {} has no declaring class", self.address))
                })
            })
            .cloned()
    }

    /// `Namespace.Class::Method`.
    pub fn full_name(&self) -> Result<String> {
        Ok(format!("{}::{}", self.class()?.full_name()?, self.name()?))
    }

    pub fn flags(&self) -> Result<u32> {
        self.flags
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                Ok(unsafe {
                    self.runtime.api().mono_method_get_flags()?(self.ptr(), std::ptr::null_mut())
                })
            })
            .copied()
    }

    pub fn is_static(&self) -> Result<bool> {
        Ok(self.flags()? & method_attributes::STATIC != 0)
    }

    pub fn is_virtual(&self) -> Result<bool> {
        Ok(self.flags()? & method_attributes::VIRTUAL != 0)
    }

    pub fn is_abstract(&self) -> Result<bool> {
        Ok(self.flags()? & method_attributes::ABSTRACT != 0)
    }

    pub fn signature(&self) -> Result<&MethodSignature> {
        self.signature.get_or_try_init(|| self.read_signature())
    }

    fn read_signature(&self) -> Result<MethodSignature> {
        let _guard = self.runtime.attach()?;
        let api = self.runtime.api();
        let sig = unsafe { api.mono_method_signature()?(self.ptr()) };
        if sig.is_null() {
            return Err(BridgeError::Memory(format!(
                "method {} has no signature",
                self.address
            )));
        }

        let declared = unsafe { api.mono_signature_get_param_count()?(sig) } as usize;
        let next = api.mono_signature_get_params()?;
        let types: Vec<NativePtr> = super::collect_iter(|iter| unsafe { next(sig, iter) });
        if types.len() != declared {
            return Err(BridgeError::validation(format!(
                "corrupt signature for {}: {} declared parameters, {} parameter types",
                self.name().unwrap_or("<method>"),
                declared,
                types.len()
            )));
        }

        let is_out = |index: usize| -> bool {
            match api.mono_signature_param_is_out() {
                Ok(is_out) => unsafe { is_out(sig, index as i32) != 0 },
                Err(_) => false,
            }
        };
        let params = types
            .into_iter()
            .enumerate()
            .map(|(i, ty)| Parameter {
                ty: MonoType::from_raw(self.runtime.clone(), ty),
                is_out: is_out(i),
            })
            .collect();

        let ret = unsafe { api.mono_signature_get_return_type()?(sig) };
        let return_type = MonoType::non_null(&self.runtime, ret).ok_or_else(|| {
            BridgeError::validation(format!("corrupt signature for {}: no return type", self.address))
        })?;

        let call_conv = match api.mono_signature_get_call_conv() {
            Ok(cc) => CallConv::from(unsafe { cc(sig) }),
            Err(_) => CallConv::Default,
        };

        Ok(MethodSignature {
            params,
            return_type,
            call_conv,
        })
    }

    /// JIT-compiles the method and returns its native entry point.
    pub fn compile(&self) -> Result<NativePtr> {
        let _guard = self.runtime.attach()?;
        let code = unsafe { self.runtime.api().mono_compile_method()?(self.ptr()) };
        NativePtr::from(code)
            .non_null()
            .ok_or_else(|| BridgeError::NotSupported(format!("could not compile {}", self.address)))
    }
}
