//! Direct native calls into managed delegates.
//!
//! `mono_method_get_unmanaged_thunk` returns a native entry point for a
//! delegate's `Invoke` method with the signature
//! `ret thunk(this, args..., MonoException **exc)`. Calling it through a
//! prepared libffi CIF skips the argument boxing of `mono_runtime_invoke`,
//! which is what makes it worth having on hot paths.
use crate::{
    api::Ptr,
    error::{BridgeError, Result},
    catalog::method::MonoMethod,
    handle::Memo,
    invoke::describe_exception,
    object::ObjectRef,
};
use libffi::middle::{Arg, Cif, CodePtr, Type};
use mono_utils::{sync::Mutex, NativePtr};
use std::{collections::HashMap, ffi::c_void, fmt, sync::Arc};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Void,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Pointer,
}

impl NativeType {
    fn ffi_type(self) -> Type {
        match self {
            NativeType::Void => Type::void(),
            NativeType::Bool | NativeType::U8 => Type::u8(),
            NativeType::I8 => Type::i8(),
            NativeType::I16 => Type::i16(),
            NativeType::U16 => Type::u16(),
            NativeType::I32 => Type::i32(),
            NativeType::U32 => Type::u32(),
            NativeType::I64 => Type::i64(),
            NativeType::U64 => Type::u64(),
            NativeType::F32 => Type::f32(),
            NativeType::F64 => Type::f64(),
            NativeType::Pointer => Type::pointer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeValue {
    Void,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Pointer(NativePtr),
}

impl NativeValue {
    pub fn native_type(&self) -> NativeType {
        match self {
            NativeValue::Void => NativeType::Void,
            NativeValue::Bool(_) => NativeType::Bool,
            NativeValue::I8(_) => NativeType::I8,
            NativeValue::U8(_) => NativeType::U8,
            NativeValue::I16(_) => NativeType::I16,
            NativeValue::U16(_) => NativeType::U16,
            NativeValue::I32(_) => NativeType::I32,
            NativeValue::U32(_) => NativeType::U32,
            NativeValue::I64(_) => NativeType::I64,
            NativeValue::U64(_) => NativeType::U64,
            NativeValue::F32(_) => NativeType::F32,
            NativeValue::F64(_) => NativeType::F64,
            NativeValue::Pointer(_) => NativeType::Pointer,
        }
    }
}

/// Argument storage with a stable address for libffi. Booleans travel as a
/// single byte.
enum ArgSlot {
    Byte(u8),
    Value(NativeValue),
}

impl ArgSlot {
    fn arg(&self) -> Arg {
        match self {
            ArgSlot::Byte(b) => Arg::new(b),
            ArgSlot::Value(v) => match v {
                NativeValue::I8(x) => Arg::new(x),
                NativeValue::U8(x) => Arg::new(x),
                NativeValue::I16(x) => Arg::new(x),
                NativeValue::U16(x) => Arg::new(x),
                NativeValue::I32(x) => Arg::new(x),
                NativeValue::U32(x) => Arg::new(x),
                NativeValue::I64(x) => Arg::new(x),
                NativeValue::U64(x) => Arg::new(x),
                NativeValue::F32(x) => Arg::new(x),
                NativeValue::F64(x) => Arg::new(x),
                NativeValue::Pointer(p) => Arg::new(&p.0),
                // Bool is stored as Byte and Void is rejected before calling.
                NativeValue::Bool(_) | NativeValue::Void => Arg::new(&()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeSignature {
    pub ret: NativeType,
    pub args: Vec<NativeType>,
}

impl NativeSignature {
    pub fn new(ret: NativeType, args: impl Into<Vec<NativeType>>) -> Self {
        Self {
            ret,
            args: args.into(),
        }
    }
}

/// A native code address with a prepared call interface.
pub struct NativeFunction {
    code: NativePtr,
    signature: NativeSignature,
    cif: Cif,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("code", &self.code)
            .field("signature", &self.signature)
            .finish()
    }
}

impl NativeFunction {
    /// Wraps an arbitrary entry point, e.g. the result of
    /// [`MonoMethod::compile`](crate::catalog::MonoMethod::compile).
    ///
    /// # Safety
    ///
    /// `code` must be a function with exactly `signature` under the C
    /// calling convention for as long as this value is called.
    pub unsafe fn new(code: NativePtr, signature: NativeSignature) -> Result<Self> {
        if code.is_null() {
            return Err(BridgeError::validation("native function at null address"));
        }
        if signature.args.contains(&NativeType::Void) {
            return Err(BridgeError::validation("void is not an argument type"));
        }
        let cif = Cif::new(
            signature.args.iter().map(|t| t.ffi_type()),
            signature.ret.ffi_type(),
        );
        Ok(Self {
            code,
            signature,
            cif,
        })
    }

    pub fn code(&self) -> NativePtr {
        self.code
    }

    pub fn signature(&self) -> &NativeSignature {
        &self.signature
    }

    /// Calls the function after checking `args` against the signature.
    pub fn call(&self, args: &[NativeValue]) -> Result<NativeValue> {
        if args.len() != self.signature.args.len() {
            return Err(BridgeError::validation(format!(
                "native call takes {} arguments, got {}",
                self.signature.args.len(),
                args.len()
            )));
        }
        for (i, (value, expected)) in args.iter().zip(&self.signature.args).enumerate() {
            if value.native_type() != *expected {
                return Err(BridgeError::validation(format!(
                    "argument {i} is {:?}, signature says {expected:?}",
                    value.native_type()
                )));
            }
        }

        let slots: Vec<ArgSlot> = args
            .iter()
            .map(|v| match v {
                NativeValue::Bool(b) => ArgSlot::Byte(*b as u8),
                other => ArgSlot::Value(*other),
            })
            .collect();
        let ffi_args: Vec<Arg> = slots.iter().map(ArgSlot::arg).collect();
        let code = CodePtr::from_ptr(self.code.as_ptr::<c_void>());

        // Integer returns are widened to a full register by libffi, so they
        // are read back as u64 and narrowed.
        let value = unsafe {
            match self.signature.ret {
                NativeType::Void => {
                    self.cif.call::<()>(code, &ffi_args);
                    NativeValue::Void
                }
                NativeType::F32 => NativeValue::F32(self.cif.call::<f32>(code, &ffi_args)),
                NativeType::F64 => NativeValue::F64(self.cif.call::<f64>(code, &ffi_args)),
                ret => {
                    let raw = self.cif.call::<u64>(code, &ffi_args);
                    match ret {
                        NativeType::Bool => NativeValue::Bool(raw as u8 != 0),
                        NativeType::I8 => NativeValue::I8(raw as i8),
                        NativeType::U8 => NativeValue::U8(raw as u8),
                        NativeType::I16 => NativeValue::I16(raw as i16),
                        NativeType::U16 => NativeValue::U16(raw as u16),
                        NativeType::I32 => NativeValue::I32(raw as i32),
                        NativeType::U32 => NativeValue::U32(raw as u32),
                        NativeType::I64 => NativeValue::I64(raw as i64),
                        NativeType::U64 => NativeValue::U64(raw),
                        _ => NativeValue::Pointer(NativePtr(raw as usize)),
                    }
                }
            }
        };
        Ok(value)
    }
}

/// A managed delegate instance with its `Invoke` method and unmanaged thunk.
pub struct DelegateRef {
    object: ObjectRef,
    invoke: Memo<MonoMethod>,
    thunk: Mutex<Option<NativePtr>>,
    compiled: Mutex<HashMap<NativeSignature, Arc<NativeFunction>>>,
}

impl fmt::Debug for DelegateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateRef")
            .field("object", &self.object)
            .field("thunk", &*self.thunk.lock())
            .field("compiled", &self.compiled.lock().len())
            .finish()
    }
}

impl DelegateRef {
    pub fn new(object: ObjectRef) -> Self {
        Self {
            object,
            invoke: Memo::new(),
            thunk: Mutex::new(None),
            compiled: Mutex::new(HashMap::new()),
        }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn is_compiled(&self) -> bool {
        self.thunk.lock().is_some()
    }

    /// The delegate class's `Invoke` method, looked up once per instance.
    pub fn invoke_method(&self) -> Result<&MonoMethod> {
        self.invoke
            .get_or_try_init(|| self.object.class().get_method("Invoke", -1))
    }

    /// The unmanaged thunk of the delegate's `Invoke` method. Cached on this
    /// instance and, per delegate class, in the runtime.
    pub fn thunk(&self) -> Result<NativePtr> {
        if let Some(thunk) = *self.thunk.lock() {
            return Ok(thunk);
        }

        let class = self.object.class();
        let runtime = self.object.runtime();
        let cached = runtime.caches.thunks.lock().get(&class.address()).copied();
        let thunk = match cached {
            Some(thunk) => thunk,
            None => {
                let _guard = runtime.attach()?;
                let invoke = self.invoke_method()?;
                let raw = unsafe { runtime.api().mono_method_get_unmanaged_thunk()?(invoke.address().as_void()) };
                let thunk = NativePtr::from(raw).non_null().ok_or_else(|| {
                    BridgeError::NotSupported(format!("no unmanaged thunk for {}", class.display_name()))
                })?;
                debug!(class = %class.address(), %thunk, "compiled delegate thunk");
                runtime.caches.thunks.lock().set(class.address(), thunk);
                thunk
            }
        };
        *self.thunk.lock() = Some(thunk);
        Ok(thunk)
    }

    /// A callable adapter for the delegate with the given managed-visible
    /// signature. The delegate and exception slot are added automatically.
    pub fn compile_native(&self, ret: NativeType, args: &[NativeType]) -> Result<Arc<NativeFunction>> {
        let key = NativeSignature::new(ret, args);
        if let Some(function) = self.compiled.lock().get(&key) {
            return Ok(function.clone());
        }

        let thunk = self.thunk()?;
        let mut full_args = Vec::with_capacity(args.len() + 2);
        full_args.push(NativeType::Pointer);
        full_args.extend_from_slice(args);
        full_args.push(NativeType::Pointer);
        let function = Arc::new(unsafe { NativeFunction::new(thunk, NativeSignature::new(ret, full_args))? });
        trace!(?key, "prepared delegate call interface");
        self.compiled.lock().insert(key, function.clone());
        Ok(function)
    }

    /// Calls the delegate through its thunk.
    pub fn call(&self, signature: &NativeSignature, args: &[NativeValue]) -> Result<NativeValue> {
        let function = self.compile_native(signature.ret, &signature.args)?;
        let runtime = self.object.runtime();
        let _guard = runtime.attach()?;

        let mut exc: Ptr = std::ptr::null_mut();
        let mut full_args = Vec::with_capacity(args.len() + 2);
        full_args.push(NativeValue::Pointer(self.object.address()));
        full_args.extend_from_slice(args);
        full_args.push(NativeValue::Pointer(NativePtr::from_mut(&mut exc as *mut Ptr)));

        let value = function.call(&full_args)?;
        if !exc.is_null() {
            return Err(describe_exception(runtime, NativePtr::from(exc)));
        }
        Ok(value)
    }

    pub fn compiled_signatures(&self) -> usize {
        self.compiled.lock().len()
    }
}
