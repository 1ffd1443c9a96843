use crate::error::Result;
use crate::render::{project_text, Component, Content};
use crate::runtime::{Cx, Exit};
use crate::stream::{Channel, Cursor, Source};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

type Producer<T> = Rc<dyn Fn(Cx, Emitter<T>) -> LocalBoxFuture<'static, Result<()>>>;

/// Capability handed to a producer to publish values.
pub struct Emitter<T> {
    channel: Channel<T>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T: Clone> Emitter<T> {
    /// Deliver `value` to the consumer, in emission order.
    pub fn emit(&self, value: T) {
        self.channel.send(value);
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed() || self.channel.subscriber_count() == 0
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").finish_non_exhaustive()
    }
}

/// A stream whose values come from a producer task.
///
/// Each [`subscribe`](Computed::subscribe) starts one producer inside a
/// resource owned by the subscribing task. The producer lives until the
/// cursor is dropped or its owner ends. When the producer returns the stream
/// closes. When it fails, the stream ends with that error after the values
/// already emitted, and the failure climbs to the subscribing task like any
/// other child failure, even if that task is waiting on something else.
///
/// ```
/// use enact::runtime::Runtime;
/// use enact::signal::compute;
///
/// let countdown = compute(|_cx, emit| async move {
///     for n in (1..=3).rev() {
///         emit.emit(n);
///     }
///     Ok(())
/// });
///
/// let runtime = Runtime::new();
/// let seen = runtime.block_on(move |cx| async move {
///     let mut cursor = countdown.subscribe(&cx).await?;
///     let mut seen = Vec::new();
///     while let Some(n) = cursor.next().await? {
///         seen.push(n);
///     }
///     Ok(seen)
/// });
/// assert_eq!(seen, Ok(vec![3, 2, 1]));
/// ```
pub struct Computed<T> {
    name: Cow<'static, str>,
    producer: Producer<T>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            producer: Rc::clone(&self.producer),
        }
    }
}

/// Create a [`Computed`] stream from a producer body.
pub fn compute<T, F, Fut>(body: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn(Cx, Emitter<T>) -> Fut + 'static,
    Fut: Future<Output = Result<()>> + 'static,
{
    Computed::new(body)
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a stream whose producer runs `body` once per subscription.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: Fn(Cx, Emitter<T>) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        Self {
            name: Cow::Borrowed("computed"),
            producer: Rc::new(move |cx, emitter| body(cx, emitter).boxed_local()),
        }
    }

    /// Name the producer task in traces and logs.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Start a producer owned by the task behind `cx` and return a cursor
    /// over its values. Dropping the cursor cancels the producer.
    pub async fn subscribe(&self, cx: &Cx) -> Result<Cursor<T>> {
        let channel = Channel::new();
        // Subscribed before the producer exists, so its first emission lands.
        let cursor = channel.subscribe();
        let producer = Rc::clone(&self.producer);
        let name = self.name.clone();

        let ((), frame) = cx
            .acquire("computed", move |cx, provide| async move {
                let emitter = Emitter {
                    channel: channel.clone(),
                };
                let task = cx.spawn_named(name, move |cx| producer(cx, emitter));
                task.when_done(move |exit| match exit {
                    Exit::Failed(err) => channel.fail(err.clone()),
                    Exit::Completed | Exit::Cancelled => channel.close(),
                });
                provide.provide(()).await
            })
            .await?;

        tracing::trace!(owner = %cx.id(), resource = %frame, "computed subscribed");
        Ok(cursor.with_lease(cx.lease(frame)))
    }
}

impl<T: Clone + fmt::Display + 'static> Computed<T> {
    /// Show every emitted value at the current render position until the
    /// producer finishes.
    pub async fn render_text<N: Content>(&self, cx: &Cx) -> Result<()> {
        project_text::<T, N, _>(cx, self).await
    }

    /// A component rendering each emitted value as text.
    pub fn component<N: Content>(&self) -> Component<(), N> {
        let computed = self.clone();
        Component::new(move |cx, ()| {
            let computed = computed.clone();
            async move { computed.render_text::<N>(&cx).await }
        })
        .named(self.name.clone())
    }
}

impl<T: Clone + 'static> Source<T> for Computed<T> {
    fn subscribe<'a>(&'a self, cx: &'a Cx) -> LocalBoxFuture<'a, Result<Cursor<T>>> {
        Computed::subscribe(self, cx).boxed_local()
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed").field("name", &self.name).finish()
    }
}
