//! Runtime support for cooperative, structured tasks.
//!
//! This module provides the executor, the scope tree that owns tasks,
//! context injection, and the explicit task environment [`Cx`] that every
//! task body receives.

mod config;
mod context;
mod executor;
mod scope;
mod waker;

pub use config::RuntimeConfig;
pub use context::Context;
pub use scope::{Cx, Provide, Scope, Task};

pub(crate) use executor::{Exit, RuntimeInner};
pub(crate) use scope::Lease;

use crate::error::Result;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// Identifier of a scope or task within one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub(crate) u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Single-threaded cooperative runtime.
///
/// Tasks only run when the host drives the runtime with
/// [`run_until_stalled`](Runtime::run_until_stalled) or
/// [`block_on`](Runtime::block_on). Cloning a `Runtime` yields another handle
/// to the same executor.
///
/// # Examples
///
/// ```
/// use enact::runtime::Runtime;
///
/// let runtime = Runtime::new();
/// let scope = runtime.create_scope();
/// let task = scope.run(|_cx| async { Ok(40 + 2) });
///
/// runtime.run_until_stalled();
/// assert_eq!(task.try_take(), Some(Ok(42)));
/// ```
///
/// Driving a single root operation to completion:
///
/// ```
/// use enact::runtime::Runtime;
///
/// let runtime = Runtime::new();
/// let value = runtime.block_on(|cx| async move {
///     let child = cx.spawn(|_| async { Ok("done") });
///     child.await
/// });
/// assert_eq!(value, Ok("done"));
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime with the default [`RuntimeConfig`].
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// A runtime using `config` for its name, panic handling and limits.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: RuntimeInner::new(config),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    /// The settings this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        self.inner.config()
    }

    /// Create a root scope. It lives until [`Scope::destroy`] is called.
    pub fn create_scope(&self) -> Scope {
        Scope::root(Rc::clone(&self.inner))
    }

    /// Poll every runnable task until none are left (or the configured poll
    /// limit is hit). Returns the number of polls performed.
    ///
    /// Calling this from inside a task is a no-op returning `0`.
    pub fn run_until_stalled(&self) -> usize {
        self.inner.tick()
    }

    /// Whether a task is waiting to be polled.
    pub fn has_ready_tasks(&self) -> bool {
        !self.inner.ready().is_empty()
    }

    /// Number of live scopes and tasks.
    pub fn frame_count(&self) -> usize {
        self.inner.frame_count()
    }

    /// Run `body` as the root task of a fresh scope and drive the runtime
    /// until it finishes.
    ///
    /// While nothing is runnable the thread parks until a waker fires. With
    /// a [`stall_timeout`](RuntimeConfig::with_stall_timeout) configured, a
    /// park that outlasts it returns [`Error::Stalled`](crate::Error::Stalled).
    /// The scope is destroyed before returning, cancelling anything the root
    /// left running.
    pub fn block_on<T, F, Fut>(&self, body: F) -> Result<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        let scope = self.create_scope();
        let task = scope.run_named("block_on", body);
        let timeout = self.config().stall_timeout();

        let result = loop {
            self.run_until_stalled();
            if let Some(result) = task.try_take() {
                break result;
            }
            if !self.inner.ready().wait(timeout) {
                tracing::warn!(?timeout, "block_on stalled");
                break Err(crate::Error::Stalled);
            }
        };
        scope.destroy();
        result
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.config().name())
            .field("frames", &self.frame_count())
            .finish()
    }
}
