//! # mono-runtime
//!
//! An in-process bridge onto an embedded Mono runtime. It binds the Mono
//! embedding API at run time and exposes the runtime's metadata, objects and
//! methods as typed handles.
//!
//! ## Subsystems
//!
//! - **Exports** (`exports`, `api`): resolving the embedding entry points,
//!   including fallbacks for renamed exports across Mono builds.
//! - **Catalog** (`catalog/`, `types`): domains, assemblies, images, classes
//!   and their members, with memoized metadata and LRU lookup caches.
//! - **Marshaling** (`value`, `marshal`, `object`): host values to native
//!   argument slots and back, boxing and unboxing, strings and arrays.
//! - **Invocation** (`invoke`, `delegate`): `mono_runtime_invoke` and direct
//!   calls through delegate thunks.
//! - **Lifetimes** (`gchandle`, `thread`): GC handles and thread attachment.
//! - **Internal calls** (`icall`): binding native functions into managed code.

pub mod api;
pub mod catalog;
pub mod config;
pub mod delegate;
pub mod error;
pub mod exports;
pub mod gchandle;
pub mod handle;
pub mod icall;
pub mod invoke;
pub mod marshal;
pub mod object;
pub mod runtime;
pub mod thread;
pub mod types;
pub mod value;

pub use catalog::{
    MethodSignature, MonoAssembly, MonoClass, MonoDomain, MonoField, MonoImage, MonoMethod, MonoProperty,
    Parameter,
};
pub use config::BridgeConfig;
pub use delegate::{DelegateRef, NativeFunction, NativeSignature, NativeType, NativeValue};
pub use error::{BridgeError, OptionalExt, Result};
pub use exports::{ExportSource, ExportTable, Exports, LibraryExports, SymbolResolver};
pub use gchandle::{GcHandle, GcHandleKind, GcHandlePool, GcPoolStats};
pub use handle::{Handle, Memo, RawHandle};
pub use icall::{DuplicatePolicy, InternalCalls};
pub use invoke::InvokeOptions;
pub use object::{ArrayRef, MonoString, ObjectRef};
pub use runtime::MonoRuntime;
pub use thread::AttachGuard;
pub use types::{MonoType, TypeDescriptor};
pub use value::{Primitive, Value};
