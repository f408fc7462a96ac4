//! Attachment of the calling OS thread to the runtime.
//!
//! Native calls into Mono from an unattached thread crash the target, so
//! every public operation that reaches native code holds an [`AttachGuard`].
//! Guards nest freely: only a guard that actually attached the thread
//! detaches it again.
use crate::{
    error::{BridgeError, Result},
    runtime::MonoRuntime,
};
use mono_utils::NativePtr;
use tracing::{debug, trace};

#[must_use = "the thread is detached when the guard is dropped"]
pub struct AttachGuard<'a> {
    runtime: &'a MonoRuntime,
    /// The thread object this guard attached, if it attached at all.
    attached: Option<NativePtr>,
}

impl AttachGuard<'_> {
    /// Whether this guard performed the attachment.
    pub fn is_owner(&self) -> bool {
        self.attached.is_some()
    }
}

impl MonoRuntime {
    pub fn is_thread_attached(&self) -> Result<bool> {
        let current = unsafe { self.api().mono_thread_current()?() };
        Ok(!current.is_null())
    }

    pub fn attach(&self) -> Result<AttachGuard<'_>> {
        if self.is_thread_attached()? {
            return Ok(AttachGuard {
                runtime: self,
                attached: None,
            });
        }

        let api = self.api();
        let domain = unsafe { api.mono_get_root_domain()?() };
        if domain.is_null() {
            return Err(BridgeError::Thread("no root domain to attach to".into()));
        }
        let thread = NativePtr::from(unsafe { api.mono_thread_attach()?(domain) });
        if thread.is_null() {
            return Err(BridgeError::Thread(
                "mono_thread_attach returned no thread".into(),
            ));
        }
        debug!(%thread, "attached thread");
        Ok(AttachGuard {
            runtime: self,
            attached: Some(thread),
        })
    }

    /// Runs `f` with the calling thread attached.
    pub fn with_thread<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let _guard = self.attach()?;
        f()
    }

    fn is_shutting_down(&self) -> bool {
        match self.api().mono_runtime_is_shutting_down() {
            Ok(query) => unsafe { query() != 0 },
            Err(_) => false,
        }
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        let Some(thread) = self.attached else {
            return;
        };
        let runtime = self.runtime;
        if !runtime.config().detach_on_exit {
            trace!(%thread, "leaving thread attached");
            return;
        }

        if runtime.is_shutting_down() {
            match runtime.api().mono_thread_detach_if_exiting() {
                Ok(detach) => {
                    unsafe { detach() };
                    debug!(%thread, "detached thread during shutdown");
                }
                Err(_) => debug!(%thread, "runtime shutting down, skipping detach"),
            }
            return;
        }

        match runtime.api().mono_thread_detach() {
            Ok(detach) => {
                unsafe { detach(thread.as_void()) };
                debug!(%thread, "detached thread");
            }
            Err(_) => trace!(%thread, "mono_thread_detach missing, thread stays attached"),
        }
    }
}
