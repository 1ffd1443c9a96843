use super::context::Context;
use super::executor::{Exit, ExitHook, FrameKind, RuntimeInner};
use super::{FrameId, Runtime};
use crate::error::{Error, Result};
use futures::channel::oneshot;
use futures::FutureExt;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context as PollContext, Poll, Waker};

/// An ownership and cancellation boundary for a tree of tasks.
///
/// A failure from one of the scope's tasks stops here: the remaining tasks
/// are cancelled, but the scope itself stays usable until destroyed.
#[derive(Clone)]
pub struct Scope {
    rt: Rc<RuntimeInner>,
    id: FrameId,
}

impl Scope {
    pub(crate) fn root(rt: Rc<RuntimeInner>) -> Self {
        let id = rt
            .insert_frame(None, "scope", FrameKind::Scope)
            .unwrap_or_else(|| unreachable!("root frames have no parent to check"));
        Self { rt, id }
    }

    /// The scope's frame.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// False once the scope has been destroyed.
    pub fn is_alive(&self) -> bool {
        self.rt.is_alive(self.id)
    }

    /// Start `body` as a task owned by this scope.
    pub fn run<T, F, Fut>(&self, body: F) -> Task<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        self.run_named("task", body)
    }

    /// Like [`Scope::run`], naming the task in traces and logs.
    pub fn run_named<T, F, Fut>(&self, name: impl Into<Cow<'static, str>>, body: F) -> Task<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        Task::spawn(&self.rt, self.id, name, false, body)
    }

    /// Bind a context value visible to every task in this scope.
    pub fn set<T: 'static>(&self, ctx: &Context<T>, value: T) {
        self.rt.bind(self.id, ctx, value);
    }

    /// The value bound to `ctx` on this scope or an enclosing frame.
    pub fn get<T: Clone + 'static>(&self, ctx: &Context<T>) -> Option<T> {
        self.rt.lookup(self.id, ctx)
    }

    /// Cancel every task and child scope, then run the scope's finalizers.
    pub fn destroy(&self) {
        tracing::debug!(scope = self.id.0, "destroy scope");
        self.rt.destroy(self.id);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// The environment handed to every task body.
///
/// It identifies the task's frame, so spawning, context lookup and release
/// registration all attach to the right place in the ownership tree.
#[derive(Clone)]
pub struct Cx {
    rt: Rc<RuntimeInner>,
    frame: FrameId,
}

impl Cx {
    /// The frame of the task this context belongs to.
    pub fn id(&self) -> FrameId {
        self.frame
    }

    /// A handle to the runtime running this task.
    pub fn runtime(&self) -> Runtime {
        Runtime::from_inner(Rc::clone(&self.rt))
    }

    /// False once this task has ended or been torn down.
    pub fn is_alive(&self) -> bool {
        self.rt.is_alive(self.frame)
    }

    /// Start `body` as a child task. Its failure fails this task too.
    pub fn spawn<T, F, Fut>(&self, body: F) -> Task<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        self.spawn_as("task", false, body)
    }

    /// Like [`Cx::spawn`], naming the task in traces and logs.
    pub fn spawn_named<T, F, Fut>(&self, name: impl Into<Cow<'static, str>>, body: F) -> Task<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        self.spawn_as(name, false, body)
    }

    /// Start a child task whose failure is only reported through its handle.
    pub fn spawn_isolated<T, F, Fut>(&self, body: F) -> Task<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        self.spawn_as("isolated", true, body)
    }

    pub(crate) fn spawn_as<T, F, Fut>(
        &self,
        name: impl Into<Cow<'static, str>>,
        isolated: bool,
        body: F,
    ) -> Task<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        Task::spawn(&self.rt, self.frame, name, isolated, body)
    }

    /// Run `body` inline as part of this task.
    pub async fn call<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        body(self.clone()).await
    }

    /// Acquire a resource owned by this task.
    ///
    /// `setup` runs in its own child frame. Everything before
    /// [`Provide::provide`] is acquisition; release logic registered with
    /// [`Cx::ensure`] on the setup's `Cx` (or held in a drop guard inside
    /// `setup`) runs exactly once when this task ends, however it ends.
    ///
    /// ```
    /// use enact::runtime::Runtime;
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let runtime = Runtime::new();
    /// let released = Rc::new(Cell::new(false));
    /// let flag = released.clone();
    ///
    /// let value = runtime.block_on(move |cx| async move {
    ///     let conn = cx
    ///         .resource(move |cx, provide| async move {
    ///             cx.ensure(move || flag.set(true));
    ///             provide.provide("connection").await
    ///         })
    ///         .await?;
    ///     Ok(conn.len())
    /// });
    ///
    /// assert_eq!(value, Ok(10));
    /// assert!(released.get());
    /// ```
    pub async fn resource<T, F, Fut>(&self, setup: F) -> Result<T>
    where
        T: 'static,
        F: FnOnce(Cx, Provide<T>) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let (value, _frame) = self.acquire("resource", setup).await?;
        Ok(value)
    }

    /// [`Cx::resource`], also returning the setup frame so the caller can
    /// release it early.
    pub(crate) async fn acquire<T, F, Fut>(
        &self,
        name: &'static str,
        setup: F,
    ) -> Result<(T, FrameId)>
    where
        T: 'static,
        F: FnOnce(Cx, Provide<T>) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let provide = Provide { tx };
        let task = Task::spawn(&self.rt, self.frame, name, false, move |cx| setup(cx, provide));
        let frame = task.id();

        match rx.await {
            Ok(value) => Ok((value, frame)),
            Err(oneshot::Canceled) => match task.await {
                Ok(()) => Err(Error::ResourceNotProvided {
                    name: name.to_string(),
                }),
                Err(err) => Err(err),
            },
        }
    }

    /// Register release logic on this task's frame. It runs when the task
    /// ends for any reason, after its children are gone. If the task is
    /// already closing, `release` runs immediately.
    pub fn ensure(&self, release: impl FnOnce() + 'static) {
        self.rt.add_finalizer(self.frame, Box::new(release));
    }

    /// Bind a context value for this task and its descendants.
    pub fn set<T: 'static>(&self, ctx: &Context<T>, value: T) {
        self.rt.bind(self.frame, ctx, value);
    }

    /// The nearest binding of `ctx`, searching this task then its ancestors.
    pub fn get<T: Clone + 'static>(&self, ctx: &Context<T>) -> Option<T> {
        self.rt.lookup(self.frame, ctx)
    }

    /// Look up a context value, failing with [`Error::ContextMissing`] when no
    /// ancestor bound it.
    pub fn expect<T: Clone + 'static>(&self, ctx: &Context<T>) -> Result<T> {
        self.get(ctx)
            .ok_or(Error::ContextMissing { name: ctx.name() })
    }

    /// Create a scope owned by this task; it is destroyed with the task.
    pub fn create_scope(&self) -> Result<Scope> {
        let id = self
            .rt
            .insert_frame(Some(self.frame), "scope", FrameKind::Scope)
            .ok_or(Error::Cancelled)?;
        Ok(Scope {
            rt: Rc::clone(&self.rt),
            id,
        })
    }

    /// Tie the lifetime of `frame` to the returned guard.
    pub(crate) fn lease(&self, frame: FrameId) -> Lease {
        Lease {
            rt: Rc::downgrade(&self.rt),
            frame,
        }
    }

    /// Give other ready tasks a turn.
    pub async fn yield_now(&self) {
        let mut yielded = false;
        futures::future::poll_fn(move |cx| {
            if yielded {
                Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        })
        .await
    }

    /// Suspend until this task is cancelled.
    pub async fn suspend(&self) -> Result<()> {
        futures::future::pending().await
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx").field("frame", &self.frame).finish()
    }
}

/// Destroys a frame when dropped, unless the runtime is already gone.
pub(crate) struct Lease {
    rt: Weak<RuntimeInner>,
    frame: FrameId,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.destroy(self.frame);
        }
    }
}

/// Capability handed to a resource's setup to deliver its value.
pub struct Provide<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Provide<T> {
    /// Hand `value` to the acquiring task, then stay suspended until the
    /// owner is torn down. Only returns if the acquirer is already gone.
    pub async fn provide(self, value: T) -> Result<()> {
        if self.tx.send(value).is_err() {
            return Err(Error::Cancelled);
        }
        futures::future::pending().await
    }
}

enum JoinState<T> {
    Pending,
    Ready(Result<T>),
    Taken,
}

struct JoinSlot<T> {
    state: JoinState<T>,
    waker: Option<Waker>,
}

impl<T> JoinSlot<T> {
    fn resolve(&mut self, result: Result<T>) {
        if matches!(self.state, JoinState::Pending) {
            self.state = JoinState::Ready(result);
            if let Some(waker) = self.waker.take() {
                waker.wake();
            }
        }
    }
}

/// Handle to a spawned task.
///
/// Awaiting it yields the task's value, its failure, or
/// [`Error::Cancelled`] if it was halted. The outcome is handed out once:
/// awaiting again, or after [`Task::try_take`], yields
/// [`Error::OutcomeTaken`]. Dropping the handle does not cancel the task.
pub struct Task<T> {
    id: FrameId,
    rt: Weak<RuntimeInner>,
    slot: Rc<RefCell<JoinSlot<T>>>,
}

impl<T: 'static> Task<T> {
    pub(crate) fn spawn<F, Fut>(
        rt: &Rc<RuntimeInner>,
        parent: FrameId,
        name: impl Into<Cow<'static, str>>,
        isolated: bool,
        body: F,
    ) -> Self
    where
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        let slot = Rc::new(RefCell::new(JoinSlot {
            state: JoinState::Pending,
            waker: None,
        }));

        let spawned = rt.spawn(parent, name, isolated, |frame| {
            let cx = Cx {
                rt: Rc::clone(rt),
                frame,
            };
            let slot = Rc::clone(&slot);
            async move {
                let value = body(cx).await?;
                slot.borrow_mut().resolve(Ok(value));
                Ok(())
            }
            .boxed_local()
        });

        let id = match spawned {
            Some(id) => {
                let slot = Rc::clone(&slot);
                // Freshly spawned frames are never polled before this point.
                let _ = rt.on_exit(
                    id,
                    Box::new(move |exit| match exit {
                        Exit::Completed => {}
                        Exit::Failed(err) => slot.borrow_mut().resolve(Err(err.clone())),
                        Exit::Cancelled => slot.borrow_mut().resolve(Err(Error::Cancelled)),
                    }),
                );
                id
            }
            None => {
                tracing::debug!(parent = parent.0, "spawn into closed frame");
                slot.borrow_mut().resolve(Err(Error::Cancelled));
                FrameId(u64::MAX)
            }
        };

        Self {
            id,
            rt: Rc::downgrade(rt),
            slot,
        }
    }
}

impl<T> Task<T> {
    /// The task's frame, or an unused id if it was never started.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Run `hook` with the task's exit once it finishes. If the task is
    /// already gone the hook runs immediately with a cancelled exit.
    pub(crate) fn when_done(&self, hook: impl FnOnce(&Exit) + 'static) {
        let hook: ExitHook = Box::new(hook);
        let rejected = match self.rt.upgrade() {
            Some(rt) => rt.on_exit(self.id, hook),
            None => Some(hook),
        };
        if let Some(hook) = rejected {
            hook(&Exit::Cancelled);
        }
    }

    /// Cancel the task and everything it owns.
    pub fn halt(&self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.destroy(self.id);
        }
    }

    /// Whether the task has ended, however it ended.
    pub fn is_finished(&self) -> bool {
        !matches!(self.slot.borrow().state, JoinState::Pending)
    }

    /// Take the outcome if the task has finished and it was not taken yet.
    /// Afterwards the handle only reports [`Error::OutcomeTaken`].
    pub fn try_take(&self) -> Option<Result<T>> {
        let mut slot = self.slot.borrow_mut();
        match std::mem::replace(&mut slot.state, JoinState::Taken) {
            JoinState::Ready(result) => Some(result),
            other => {
                slot.state = other;
                None
            }
        }
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        match std::mem::replace(&mut slot.state, JoinState::Taken) {
            JoinState::Ready(result) => Poll::Ready(result),
            JoinState::Taken => Poll::Ready(Err(Error::OutcomeTaken)),
            JoinState::Pending => {
                slot.state = JoinState::Pending;
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
