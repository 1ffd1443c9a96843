use super::{Content, Crash};
use crate::error::{Error, Result};
use crate::runtime::{Context, Cx, Exit, Runtime, Scope, Task};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

type Listener<N> = Rc<dyn Fn(&N)>;
type Body<P> = Rc<dyn Fn(Cx, P) -> LocalBoxFuture<'static, Result<()>>>;

/// The context key under which a mount binds its [`Renderer`].
pub fn render_context<N: Content>() -> Context<Renderer<N>> {
    Context::new("enact.render")
}

/// Replace the content shown at the nearest render position.
///
/// Fails with [`Error::ContextMissing`] when `cx` does not belong to a
/// mounted component.
#[doc(alias = "$")]
pub fn render<N: Content>(cx: &Cx, content: N) -> Result<()> {
    cx.expect(&render_context::<N>())?.replace(content);
    Ok(())
}

struct Slot<N> {
    content: Option<N>,
    crash: Option<Crash>,
    version: u64,
    mounted: bool,
    next_listener: u64,
    listeners: Vec<(u64, Listener<N>)>,
}

/// The render callback bound into a mount's scope.
pub struct Renderer<N> {
    slot: Rc<RefCell<Slot<N>>>,
}

impl<N> Clone for Renderer<N> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<N: Content> Renderer<N> {
    /// Replace the displayed content. Ignored once unmounted.
    pub fn replace(&self, content: N) {
        let listeners = {
            let mut slot = self.slot.borrow_mut();
            if !slot.mounted {
                tracing::trace!("render after unmount ignored");
                return;
            }
            slot.content = Some(content.clone());
            slot.version += 1;
            slot.listeners.clone()
        };
        for (_, listener) in listeners {
            listener(&content);
        }
    }

    fn crash(&self, err: &Error) {
        let crash = Crash::from(err);
        tracing::warn!(error = %err, "component crashed");
        let mounted = {
            let mut slot = self.slot.borrow_mut();
            if slot.mounted {
                slot.crash = Some(crash.clone());
            }
            slot.mounted
        };
        if mounted {
            self.replace(N::crash(&crash));
        }
    }
}

/// An async component body that renders through its context.
///
/// ```
/// use enact::render::{render, Component};
/// use enact::runtime::Runtime;
///
/// let greeting: Component<&str, String> = Component::new(|cx, name| async move {
///     render(&cx, format!("hello, {name}"))
/// });
///
/// let runtime = Runtime::new();
/// let mount = greeting.mount(&runtime, "world");
/// runtime.run_until_stalled();
/// assert_eq!(mount.content().as_deref(), Some("hello, world"));
/// ```
pub struct Component<P, N> {
    name: Cow<'static, str>,
    body: Body<P>,
    _content: PhantomData<fn() -> N>,
}

impl<P, N> Clone for Component<P, N> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            body: Rc::clone(&self.body),
            _content: PhantomData,
        }
    }
}

impl<P: 'static, N: Content> Component<P, N> {
    /// A component whose root task runs `body` with the mount's props.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: Fn(Cx, P) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        Self {
            name: Cow::Borrowed("component"),
            body: Rc::new(move |cx, props| body(cx, props).boxed_local()),
            _content: PhantomData,
        }
    }

    /// Name the root task in traces and logs.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Mount at a host boundary. The mount owns a root scope.
    pub fn mount(&self, runtime: &Runtime, props: P) -> Mount<N> {
        self.start(runtime.create_scope(), props)
    }

    /// Mount inside a running task; the mount is torn down with that task
    /// even if the handle is kept.
    pub fn mount_within(&self, cx: &Cx, props: P) -> Result<Mount<N>> {
        Ok(self.start(cx.create_scope()?, props))
    }

    fn start(&self, scope: Scope, props: P) -> Mount<N> {
        let slot = Rc::new(RefCell::new(Slot {
            content: None,
            crash: None,
            version: 0,
            mounted: true,
            next_listener: 0,
            listeners: Vec::new(),
        }));
        let renderer = Renderer {
            slot: Rc::clone(&slot),
        };
        scope.set(&render_context::<N>(), renderer.clone());

        let body = Rc::clone(&self.body);
        let task = scope.run_named(self.name.clone(), move |cx| body(cx, props));
        task.when_done(move |exit| {
            if let Exit::Failed(err) = exit {
                renderer.crash(err);
            }
        });
        tracing::debug!(scope = %scope.id(), name = %self.name, "mounted");

        Mount { slot, scope, task }
    }
}

impl<P, N> fmt::Debug for Component<P, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component").field("name", &self.name).finish()
    }
}

/// Host-side handle to a mounted component. Dropping it unmounts.
pub struct Mount<N> {
    slot: Rc<RefCell<Slot<N>>>,
    scope: Scope,
    task: Task<()>,
}

impl<N: Content> Mount<N> {
    /// The most recently rendered content, if any.
    pub fn content(&self) -> Option<N> {
        self.slot.borrow().content.clone()
    }

    /// Incremented on every accepted render.
    pub fn version(&self) -> u64 {
        self.slot.borrow().version
    }

    /// The crash shown by this mount, if its tree failed.
    pub fn crash(&self) -> Option<Crash> {
        self.slot.borrow().crash.clone()
    }

    /// False once the mount was unmounted or dropped.
    pub fn is_mounted(&self) -> bool {
        self.slot.borrow().mounted
    }

    /// Whether the root task has ended (completed, crashed or cancelled).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Call `listener` with every content replacement from now on, until
    /// the returned guard is dropped.
    pub fn on_change(&self, listener: impl Fn(&N) + 'static) -> ChangeGuard<N> {
        let mut slot = self.slot.borrow_mut();
        let id = slot.next_listener;
        slot.next_listener += 1;
        slot.listeners.push((id, Rc::new(listener)));
        ChangeGuard {
            id,
            slot: Rc::downgrade(&self.slot),
        }
    }

    /// Stop rendering and cancel the whole task tree.
    pub fn unmount(self) {
        drop(self);
    }
}

/// Keeps a [`Mount::on_change`] listener registered. Dropping it removes
/// the listener.
#[must_use = "the listener is removed when the guard is dropped"]
pub struct ChangeGuard<N> {
    id: u64,
    slot: Weak<RefCell<Slot<N>>>,
}

impl<N> Drop for ChangeGuard<N> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.borrow_mut().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl<N> fmt::Debug for ChangeGuard<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeGuard").field("id", &self.id).finish()
    }
}

impl<N> Drop for Mount<N> {
    fn drop(&mut self) {
        let was_mounted = {
            let mut slot = self.slot.borrow_mut();
            std::mem::replace(&mut slot.mounted, false)
        };
        if was_mounted {
            tracing::debug!(scope = %self.scope.id(), "unmount");
            self.scope.destroy();
        }
    }
}

impl<N> fmt::Debug for Mount<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("Mount")
            .field("scope", &self.scope)
            .field("version", &slot.version)
            .field("mounted", &slot.mounted)
            .finish()
    }
}
