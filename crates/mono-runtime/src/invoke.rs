//! Calling managed methods through `mono_runtime_invoke`.
use crate::{
    api::Ptr,
    catalog::{class::MonoClass, method::MonoMethod},
    config::BridgeConfig,
    error::{BridgeError, Result},
    marshal::{self, Frame},
    object::{MonoString, ObjectRef},
    runtime::MonoRuntime,
    value::Value,
};
use mono_types::TypeKind;
use mono_utils::{memory, NativePtr};
use std::sync::Arc;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Surface managed exceptions as [`BridgeError::ForeignException`].
    /// When off, a throwing call returns [`Value::Absent`] and logs.
    pub throw_on_exception: bool,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            throw_on_exception: true,
        }
    }
}

impl From<&BridgeConfig> for InvokeOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            throw_on_exception: config.throw_on_exception,
        }
    }
}

impl MonoMethod {
    pub fn invoke(&self, receiver: Option<&ObjectRef>, args: &[Value]) -> Result<Value> {
        let options = InvokeOptions::from(self.runtime().config());
        self.invoke_with(receiver, args, options)
    }

    pub fn invoke_with(
        &self,
        receiver: Option<&ObjectRef>,
        args: &[Value],
        options: InvokeOptions,
    ) -> Result<Value> {
        let runtime = self.runtime();
        let _guard = runtime.attach()?;
        let signature = self.signature()?;
        if args.len() != signature.arity() {
            return Err(BridgeError::validation(format!(
                "{} takes {} arguments, got {}",
                self.name()?,
                signature.arity(),
                args.len()
            )));
        }

        let this = if self.is_static()? {
            if receiver.is_some() {
                trace!(method = self.name()?, "ignoring receiver of static method");
            }
            NativePtr::NULL
        } else {
            let receiver = receiver.ok_or_else(|| {
                BridgeError::validation(format!("instance method {} needs a receiver", self.name().unwrap_or("?")))
            })?;
            receiver.this_pointer()?
        };

        let mut frame = Frame::new(runtime);
        let mut params = signature
            .params
            .iter()
            .zip(args)
            .map(|(param, value)| marshal::argument(&mut frame, param, value).map(NativePtr::as_void))
            .collect::<Result<Vec<Ptr>>>()?;
        let params_ptr = if params.is_empty() {
            std::ptr::null_mut()
        } else {
            params.as_mut_ptr()
        };

        trace!(method = self.name()?, %this, args = args.len(), "mono_runtime_invoke");
        let mut exc: Ptr = std::ptr::null_mut();
        let result = unsafe { runtime.api().mono_runtime_invoke()?(self.ptr(), this.as_void(), params_ptr, &mut exc) };
        drop(frame);

        if !exc.is_null() {
            let error = describe_exception(runtime, NativePtr::from(exc));
            if options.throw_on_exception {
                return Err(error);
            }
            warn!(method = self.name()?, %error, "managed exception swallowed");
            return Ok(Value::Absent);
        }

        unwrap_result(runtime, &signature.return_type, NativePtr::from(result))
    }
}

/// Converts a `mono_runtime_invoke` result into a host value. Value-type
/// results arrive boxed.
fn unwrap_result(
    runtime: &Arc<MonoRuntime>,
    return_type: &crate::types::MonoType,
    result: NativePtr,
) -> Result<Value> {
    let kind = return_type.effective_kind()?;
    if kind == TypeKind::Void || result.is_null() {
        return Ok(Value::Absent);
    }
    if kind.is_primitive() {
        let boxed = ObjectRef::from_address(runtime, result)?;
        return Ok(Value::Primitive(marshal::unbox(&boxed, kind)?));
    }
    marshal::object_value(runtime, result)
}

/// Builds a [`BridgeError::ForeignException`] from a thrown exception
/// object: its class name and the `_message` field, when present.
pub(crate) fn describe_exception(runtime: &Arc<MonoRuntime>, exc: NativePtr) -> BridgeError {
    let object = match ObjectRef::from_address(runtime, exc) {
        Ok(object) => object,
        Err(e) => {
            return BridgeError::ForeignException {
                address: exc,
                class_name: "<unknown>".into(),
                message: format!("unreadable exception object: {e}"),
            }
        }
    };
    let class_name = object.class().display_name();
    let message = exception_message(&object).unwrap_or_else(|e| {
        trace!(error = %e, "could not read exception message");
        String::new()
    });
    BridgeError::ForeignException {
        address: exc,
        class_name,
        message,
    }
}

fn exception_message(exception: &ObjectRef) -> Result<String> {
    for name in ["_message", "message"] {
        if let Some(field) = exception.class().find_field(name)? {
            let slot = exception.address() + field.offset()?;
            let string = unsafe { memory::read_ptr(slot) };
            return MonoString::read_at(exception.runtime(), string);
        }
    }
    Ok(String::new())
}

impl ObjectRef {
    /// Invokes an instance method by name, choosing the overload by arity.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.class().get_method(name, args.len() as i32)?;
        method.invoke(Some(self), args)
    }
}

impl MonoClass {
    /// Invokes a static method by name, choosing the overload by arity.
    pub fn invoke_static(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.get_method(name, args.len() as i32)?;
        if !method.is_static()? {
            return Err(BridgeError::validation(format!(
                "{} is an instance method",
                method.full_name()?
            )));
        }
        method.invoke(None, args)
    }
}
