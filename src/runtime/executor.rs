use super::config::RuntimeConfig;
use super::context::{Bindings, Context};
use super::waker::{ReadyQueue, TaskWaker};
use super::FrameId;
use crate::error::{Error, Failure, Result};
use futures::future::LocalBoxFuture;
use std::any::Any;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context as PollContext, Poll, Waker};

pub(crate) type TaskFuture = LocalBoxFuture<'static, Result<()>>;
pub(crate) type ExitHook = Box<dyn FnOnce(&Exit)>;
type Finalizer = Box<dyn FnOnce()>;

/// How a frame ended.
#[derive(Debug, Clone)]
pub(crate) enum Exit {
    Completed,
    Failed(Error),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// Bare ownership boundary; stops failure propagation.
    Scope,
    Task { isolated: bool },
}

/// Runtime node shared by scopes and tasks.
struct Frame {
    name: Cow<'static, str>,
    parent: Option<FrameId>,
    kind: FrameKind,
    children: Vec<FrameId>,
    future: Option<TaskFuture>,
    waker: Option<Waker>,
    bindings: Bindings,
    finalizers: Vec<Finalizer>,
    exit_hooks: Vec<ExitHook>,
    closing: bool,
}

impl Frame {
    fn label(&self, id: FrameId) -> String {
        format!("{} (#{})", self.name, id.0)
    }
}

/// Single-threaded executor state behind [`Runtime`](super::Runtime).
///
/// No `RefCell` borrow is ever held while user code runs: futures are taken
/// out of their frame for polling, and drops, finalizers and hooks run after
/// the frame table is released.
pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    next_id: Cell<u64>,
    frames: RefCell<HashMap<FrameId, Frame>>,
    ready: Arc<ReadyQueue>,
    ticking: Cell<bool>,
}

impl RuntimeInner {
    pub(crate) fn new(config: RuntimeConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            next_id: Cell::new(0),
            frames: RefCell::new(HashMap::new()),
            ready: Arc::new(ReadyQueue::default()),
            ticking: Cell::new(false),
        })
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn ready(&self) -> &ReadyQueue {
        &self.ready
    }

    fn next_id(&self) -> FrameId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        FrameId(id)
    }

    /// Allocate a frame. Fails when the parent is gone or already closing.
    pub(crate) fn insert_frame(
        &self,
        parent: Option<FrameId>,
        name: impl Into<Cow<'static, str>>,
        kind: FrameKind,
    ) -> Option<FrameId> {
        let mut frames = self.frames.borrow_mut();
        if let Some(parent) = parent {
            match frames.get(&parent) {
                Some(frame) if !frame.closing => {}
                _ => return None,
            }
        }

        let id = self.next_id();
        if let Some(parent) = parent.and_then(|p| frames.get_mut(&p)) {
            parent.children.push(id);
        }
        frames.insert(
            id,
            Frame {
                name: name.into(),
                parent,
                kind,
                children: Vec::new(),
                future: None,
                waker: None,
                bindings: Bindings::default(),
                finalizers: Vec::new(),
                exit_hooks: Vec::new(),
                closing: false,
            },
        );
        Some(id)
    }

    /// Create a task frame under `parent` and schedule its first poll.
    ///
    /// `make` receives the new frame's id so the body can be handed a `Cx`.
    /// The task does not run until the next tick.
    pub(crate) fn spawn(
        &self,
        parent: FrameId,
        name: impl Into<Cow<'static, str>>,
        isolated: bool,
        make: impl FnOnce(FrameId) -> TaskFuture,
    ) -> Option<FrameId> {
        let name = name.into();
        let id = self.insert_frame(Some(parent), name.clone(), FrameKind::Task { isolated })?;
        let future = make(id);
        let waker = futures::task::waker(Arc::new(TaskWaker {
            id,
            queue: Arc::clone(&self.ready),
        }));

        if let Some(frame) = self.frames.borrow_mut().get_mut(&id) {
            frame.future = Some(future);
            frame.waker = Some(waker);
        }
        tracing::debug!(task = id.0, parent = parent.0, %name, isolated, "spawn");
        self.ready.push(id);
        Some(id)
    }

    pub(crate) fn is_alive(&self, id: FrameId) -> bool {
        self.frames
            .borrow()
            .get(&id)
            .is_some_and(|frame| !frame.closing)
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.frames.borrow().len()
    }

    pub(crate) fn bind<T: 'static>(&self, id: FrameId, ctx: &Context<T>, value: T) -> bool {
        match self.frames.borrow_mut().get_mut(&id) {
            Some(frame) => {
                frame.bindings.insert(ctx, value);
                true
            }
            None => false,
        }
    }

    /// Walk from `id` up the ownership chain looking for `ctx`.
    pub(crate) fn lookup<T: Clone + 'static>(&self, id: FrameId, ctx: &Context<T>) -> Option<T> {
        let frames = self.frames.borrow();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let frame = frames.get(&current)?;
            if let Some(value) = frame.bindings.get(ctx) {
                return Some(value);
            }
            cursor = frame.parent;
        }
        None
    }

    /// Register release logic on a frame. If the frame is already gone the
    /// finalizer runs immediately and `false` is returned.
    pub(crate) fn add_finalizer(&self, id: FrameId, finalizer: Finalizer) -> bool {
        let rejected = {
            let mut frames = self.frames.borrow_mut();
            match frames.get_mut(&id) {
                Some(frame) if !frame.closing => {
                    frame.finalizers.push(finalizer);
                    None
                }
                _ => Some(finalizer),
            }
        };
        match rejected {
            Some(finalizer) => {
                self.run_finalizer(finalizer);
                false
            }
            None => true,
        }
    }

    /// Register a hook fired once with the frame's exit. Hands the hook back
    /// when the frame is already gone.
    pub(crate) fn on_exit(&self, id: FrameId, hook: ExitHook) -> Option<ExitHook> {
        match self.frames.borrow_mut().get_mut(&id) {
            Some(frame) => {
                frame.exit_hooks.push(hook);
                None
            }
            None => Some(hook),
        }
    }

    /// Poll ready tasks until none are runnable.
    pub(crate) fn tick(&self) -> usize {
        if self.ticking.replace(true) {
            return 0;
        }
        let _reset = TickGuard(&self.ticking);

        let limit = self.config.max_polls_per_tick();
        let mut polls = 0;
        while limit.is_none_or(|limit| polls < limit) {
            let Some(id) = self.ready.pop() else { break };
            if self.poll_frame(id) {
                polls += 1;
            }
        }
        tracing::trace!(runtime = %self.config.name(), polls, "tick");
        polls
    }

    fn poll_frame(&self, id: FrameId) -> bool {
        let (mut future, waker, name) = {
            let mut frames = self.frames.borrow_mut();
            let Some(frame) = frames.get_mut(&id) else {
                return false;
            };
            if frame.closing {
                return false;
            }
            let (Some(future), Some(waker)) = (frame.future.take(), frame.waker.clone()) else {
                return false;
            };
            (future, waker, frame.name.clone())
        };

        let span = tracing::trace_span!("task", runtime = %self.config.name(), id = id.0, name = %name);
        let _enter = span.enter();

        let mut cx = PollContext::from_waker(&waker);
        let poll = if self.config.catch_panics() {
            catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))).unwrap_or_else(
                |payload| {
                    Poll::Ready(Err(Error::Panicked(Failure::new(panic_message(
                        payload.as_ref(),
                    )))))
                },
            )
        } else {
            future.as_mut().poll(&mut cx)
        };

        match poll {
            Poll::Pending => {
                let mut frames = self.frames.borrow_mut();
                match frames.get_mut(&id) {
                    Some(frame) if !frame.closing => frame.future = Some(future),
                    _ => {
                        // Torn down while it was running.
                        drop(frames);
                        self.drop_future(future);
                    }
                }
            }
            Poll::Ready(result) => {
                self.drop_future(future);
                match result {
                    Ok(()) => {
                        tracing::debug!(task = id.0, "complete");
                        self.teardown(id, Exit::Completed);
                    }
                    Err(err) if err.is_cancelled() => {
                        tracing::debug!(task = id.0, "cancelled by body");
                        self.teardown(id, Exit::Cancelled);
                    }
                    Err(err) => self.fail(id, err),
                }
            }
        }
        true
    }

    /// Cancel a frame and everything it owns.
    pub(crate) fn destroy(&self, id: FrameId) {
        self.teardown(id, Exit::Cancelled);
    }

    /// Cancel the children of a frame, keeping the frame itself.
    pub(crate) fn cancel_children(&self, id: FrameId) {
        let children = match self.frames.borrow_mut().get_mut(&id) {
            Some(frame) => std::mem::take(&mut frame.children),
            None => return,
        };
        for child in children.into_iter().rev() {
            self.teardown(child, Exit::Cancelled);
        }
    }

    /// Fail a task frame and propagate upward until an isolated task or a
    /// scope boundary is reached.
    fn fail(&self, id: FrameId, err: Error) {
        let (label, parent, kind) = {
            let frames = self.frames.borrow();
            let Some(frame) = frames.get(&id) else { return };
            if frame.closing {
                return;
            }
            (frame.label(id), frame.parent, frame.kind)
        };

        let err = err.traced(label);
        tracing::debug!(task = id.0, error = %err, "failed");
        self.teardown(id, Exit::Failed(err.clone()));

        if matches!(kind, FrameKind::Task { isolated: true }) {
            return;
        }
        let Some(parent) = parent else { return };
        let parent_kind = match self.frames.borrow().get(&parent) {
            Some(frame) if !frame.closing => frame.kind,
            _ => return,
        };
        match parent_kind {
            FrameKind::Task { .. } => self.fail(parent, err),
            FrameKind::Scope => {
                tracing::debug!(scope = parent.0, "failure reached scope; cancelling siblings");
                self.cancel_children(parent);
            }
        }
    }

    fn teardown(&self, id: FrameId, exit: Exit) {
        let children = {
            let mut frames = self.frames.borrow_mut();
            let Some(frame) = frames.get_mut(&id) else { return };
            if frame.closing {
                return;
            }
            frame.closing = true;
            std::mem::take(&mut frame.children)
        };

        for child in children.into_iter().rev() {
            self.teardown(child, Exit::Cancelled);
        }

        let (future, finalizers) = {
            let mut frames = self.frames.borrow_mut();
            match frames.get_mut(&id) {
                Some(frame) => (
                    frame.future.take(),
                    std::mem::take(&mut frame.finalizers),
                ),
                None => return,
            }
        };

        if matches!(exit, Exit::Cancelled) {
            tracing::debug!(frame = id.0, started = future.is_some(), "cancel");
        }
        if let Some(future) = future {
            self.drop_future(future);
        }
        for finalizer in finalizers.into_iter().rev() {
            self.run_finalizer(finalizer);
        }

        let (parent, hooks) = {
            let mut frames = self.frames.borrow_mut();
            let Some(mut frame) = frames.remove(&id) else { return };
            if let Some(parent) = frame.parent.and_then(|p| frames.get_mut(&p)) {
                parent.children.retain(|child| *child != id);
            }
            (frame.parent, std::mem::take(&mut frame.exit_hooks))
        };
        tracing::trace!(frame = id.0, parent = parent.map(|p| p.0), "frame removed");

        for hook in hooks {
            hook(&exit);
        }
    }

    fn run_finalizer(&self, finalizer: Finalizer) {
        self.guarded("finalizer", finalizer);
    }

    /// Drop a task's future, running the drop guards it holds.
    fn drop_future(&self, future: TaskFuture) {
        self.guarded("drop guard", move || drop(future));
    }

    /// Run release code; with `catch_panics` a panic is logged instead of
    /// unwinding through teardown.
    fn guarded(&self, what: &'static str, release: impl FnOnce()) {
        if !self.config.catch_panics() {
            release();
            return;
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(release)) {
            tracing::warn!(panic = %panic_message(payload.as_ref()), "{} panicked", what);
        }
    }
}

struct TickGuard<'a>(&'a Cell<bool>);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
