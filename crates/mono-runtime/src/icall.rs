//! Registration of native functions as managed internal calls.
use crate::{
    error::{BridgeError, Result},
    runtime::{c_string, MonoRuntime},
};
use mono_utils::{sync::Mutex, NativePtr};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

/// What to do when a name is registered twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Keep the first registration.
    #[default]
    Skip,
    Overwrite,
    /// Fail unless the new pointer is the registered one.
    Throw,
}

pub struct InternalCalls {
    runtime: Arc<MonoRuntime>,
    registered: Mutex<HashMap<String, NativePtr>>,
}

impl InternalCalls {
    pub fn new(runtime: Arc<MonoRuntime>) -> Self {
        Self {
            runtime,
            registered: Mutex::new(HashMap::new()),
        }
    }

    /// Binds `name` (e.g. `"Game.Native::Log"`) to `function`. Returns
    /// whether the runtime was told about it.
    pub fn register(&self, name: &str, function: NativePtr, policy: DuplicatePolicy) -> Result<bool> {
        if name.trim().is_empty() {
            return Err(BridgeError::validation("internal call name is blank"));
        }
        if function.is_null() {
            return Err(BridgeError::validation(format!("internal call {name} has a null function")));
        }

        let existing = self.registered.lock().get(name).copied();
        if let Some(existing) = existing {
            match policy {
                DuplicatePolicy::Skip => {
                    debug!(name, %existing, "internal call already registered, skipping");
                    return Ok(false);
                }
                DuplicatePolicy::Throw if existing == function => return Ok(false),
                DuplicatePolicy::Throw => {
                    return Err(BridgeError::validation(format!(
                        "internal call {name} is already bound to {existing}"
                    )))
                }
                DuplicatePolicy::Overwrite => {
                    warn!(name, %existing, replacement = %function, "overwriting internal call");
                }
            }
        }

        let c_name = c_string(name)?;
        let _guard = self.runtime.attach()?;
        unsafe { self.runtime.api().mono_add_internal_call()?(c_name.as_ptr(), function.as_void()) };
        self.registered.lock().insert(name.to_string(), function);
        debug!(name, %function, "internal call registered");
        Ok(true)
    }

    pub fn lookup(&self, name: &str) -> Option<NativePtr> {
        self.registered.lock().get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.registered.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.lock().is_empty()
    }
}
