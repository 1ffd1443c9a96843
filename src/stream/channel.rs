use crate::error::{Error, Result};
use crate::runtime::{Cx, Lease};
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context as PollContext, Poll, Waker};

/// How a stream ended.
#[derive(Debug, Clone)]
enum End {
    Closed,
    Failed(Error),
}

struct CursorState<T> {
    queue: VecDeque<T>,
    end: Option<End>,
    waker: Option<Waker>,
}

impl<T> CursorState<T> {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

struct Shared<T> {
    cursors: Vec<Weak<RefCell<CursorState<T>>>>,
    end: Option<End>,
}

/// Multicast stream without history.
///
/// Each [`Cursor`] sees every value sent after it subscribed, in send order.
/// Values sent before a cursor exists are never replayed to it.
///
/// ```
/// use enact::stream::Channel;
/// use enact::runtime::Runtime;
///
/// let channel = Channel::new();
/// let mut early = channel.subscribe();
/// channel.send(1);
/// let mut late = channel.subscribe();
/// channel.send(2);
/// channel.close();
///
/// let runtime = Runtime::new();
/// let seen = runtime.block_on(move |_| async move {
///     let mut early_seen = Vec::new();
///     while let Some(v) = early.next().await? {
///         early_seen.push(v);
///     }
///     Ok((early_seen, late.next().await?))
/// });
/// assert_eq!(seen, Ok((vec![1, 2], Some(2))));
/// ```
pub struct Channel<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Channel<T> {
    /// An open channel with no subscribers.
    pub fn new() -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                cursors: Vec::new(),
                end: None,
            })),
        }
    }

    /// Start following the stream from now on.
    pub fn subscribe(&self) -> Cursor<T> {
        self.subscribe_with(VecDeque::new())
    }

    /// Subscribe with values already queued ahead of anything sent later.
    pub(crate) fn subscribe_with(&self, queue: VecDeque<T>) -> Cursor<T> {
        let mut shared = self.shared.borrow_mut();
        let state = Rc::new(RefCell::new(CursorState {
            queue,
            end: shared.end.clone(),
            waker: None,
        }));
        if shared.end.is_none() {
            shared.cursors.retain(|cursor| cursor.strong_count() > 0);
            shared.cursors.push(Rc::downgrade(&state));
        }
        Cursor { state, lease: None }
    }

    /// End every iteration normally. Later sends are ignored.
    pub fn close(&self) {
        self.finish(End::Closed);
    }

    /// End every iteration with `error`, after already-queued values.
    pub fn fail(&self, error: Error) {
        self.finish(End::Failed(error));
    }

    /// Whether the channel was closed or failed.
    pub fn is_closed(&self) -> bool {
        self.shared.borrow().end.is_some()
    }

    /// Number of live cursors.
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .borrow()
            .cursors
            .iter()
            .filter(|cursor| cursor.strong_count() > 0)
            .count()
    }

    fn finish(&self, end: End) {
        let cursors = {
            let mut shared = self.shared.borrow_mut();
            if shared.end.is_some() {
                return;
            }
            shared.end = Some(end.clone());
            std::mem::take(&mut shared.cursors)
        };
        for cursor in cursors.iter().filter_map(Weak::upgrade) {
            let mut state = cursor.borrow_mut();
            state.end = Some(end.clone());
            state.wake();
        }
    }

    fn live_cursors(&self) -> Vec<Rc<RefCell<CursorState<T>>>> {
        let mut shared = self.shared.borrow_mut();
        shared.cursors.retain(|cursor| cursor.strong_count() > 0);
        shared.cursors.iter().filter_map(Weak::upgrade).collect()
    }
}

impl<T: Clone> Channel<T> {
    /// Deliver `value` to every live cursor. No-op once closed.
    pub fn send(&self, value: T) {
        if self.is_closed() {
            tracing::trace!("send on closed channel dropped");
            return;
        }
        for cursor in self.live_cursors() {
            let mut state = cursor.borrow_mut();
            state.queue.push_back(value.clone());
            state.wake();
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One consumer's position in a [`Channel`].
///
/// `current` waits for the value at the cursor without consuming it;
/// `advance` acknowledges it. `next` does both.
pub struct Cursor<T> {
    state: Rc<RefCell<CursorState<T>>>,
    lease: Option<Lease>,
}

impl<T> Cursor<T> {
    pub(crate) fn with_lease(mut self, lease: Lease) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Drop the value at the cursor so the following one becomes current.
    pub fn advance(&mut self) {
        self.state.borrow_mut().queue.pop_front();
    }

    /// Values delivered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    fn poll_head<R>(
        &mut self,
        cx: &mut PollContext<'_>,
        take: impl FnOnce(&mut VecDeque<T>) -> Option<R>,
    ) -> Poll<Result<Option<R>>> {
        let mut state = self.state.borrow_mut();
        if let Some(value) = take(&mut state.queue) {
            return Poll::Ready(Ok(Some(value)));
        }
        match &state.end {
            Some(End::Closed) => Poll::Ready(Ok(None)),
            Some(End::Failed(err)) => Poll::Ready(Err(err.clone())),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    /// Take the next value, waiting if none is queued.
    ///
    /// `Ok(None)` means the stream was closed; `Err` means it failed.
    pub async fn next(&mut self) -> Result<Option<T>> {
        futures::future::poll_fn(|cx| self.poll_head(cx, VecDeque::pop_front)).await
    }
}

impl<T: Clone> Cursor<T> {
    /// Wait for the value at the cursor without consuming it.
    pub async fn current(&mut self) -> Result<Option<T>> {
        futures::future::poll_fn(|cx| self.poll_head(cx, |queue| queue.front().cloned())).await
    }
}

impl<T> futures::Stream for Cursor<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut PollContext<'_>) -> Poll<Option<Self::Item>> {
        self.poll_head(cx, VecDeque::pop_front)
            .map(Result::transpose)
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("pending", &self.pending())
            .field("leased", &self.lease.is_some())
            .finish()
    }
}

/// Anything a task can subscribe to.
pub trait Source<T> {
    /// Obtain a cursor owned by the task behind `cx`.
    fn subscribe<'a>(&'a self, cx: &'a Cx) -> LocalBoxFuture<'a, Result<Cursor<T>>>;
}

impl<T: 'static> Source<T> for Channel<T> {
    fn subscribe<'a>(&'a self, _cx: &'a Cx) -> LocalBoxFuture<'a, Result<Cursor<T>>> {
        let cursor = Channel::subscribe(self);
        Box::pin(async move { Ok(cursor) })
    }
}
