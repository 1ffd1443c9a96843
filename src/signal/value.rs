use crate::error::Result;
use crate::render::{project_text, Component, Content};
use crate::runtime::Cx;
use crate::stream::{Channel, Cursor, Source};
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

struct Inner<T> {
    current: RefCell<T>,
    changes: Channel<T>,
}

/// A reactive cell: a synchronously readable value plus a stream of its
/// changes.
///
/// Writes are deduplicated with `PartialEq`, so `set` with a value equal to
/// the current one emits nothing. Types whose equality is not meaningful
/// will emit on every write.
///
/// # Examples
///
/// ```
/// use enact::signal::use_value;
///
/// let count = use_value(0);
/// assert!(count.set(1));
/// assert!(!count.set(1));
/// count.update(|n| n + 1);
/// assert_eq!(count.current(), 2);
/// ```
pub struct Value<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Create a [`Value`] holding `initial`.
pub fn use_value<T: Clone + PartialEq + 'static>(initial: T) -> Value<T> {
    Value::new(initial)
}

impl<T: Clone + PartialEq + 'static> Value<T> {
    /// A cell holding `initial`. Same as [`use_value`].
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                current: RefCell::new(initial),
                changes: Channel::new(),
            }),
        }
    }

    /// The latest accepted value.
    pub fn current(&self) -> T {
        self.inner.current.borrow().clone()
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.current.borrow())
    }

    /// Store `value` and emit it, unless it equals the current value.
    /// Returns whether the write was accepted.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.current.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }
        self.inner.changes.send(value);
        true
    }

    /// `set` the result of applying `f` to the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = self.with(f);
        self.set(next)
    }

    /// Resolve `true` once the cell holds `value`, or `false` if the cell
    /// is closed first.
    ///
    /// The current value is checked and the change stream subscribed when
    /// `is` is called, not when the future is first polled, so no write in
    /// between can be missed. If the cell already holds `value` the future
    /// is ready on its first poll.
    pub fn is(&self, value: T) -> impl Future<Output = bool> + 'static {
        let waiting = if self.with(|current| *current == value) {
            None
        } else {
            Some(self.inner.changes.subscribe())
        };
        async move {
            let Some(mut cursor) = waiting else {
                return true;
            };
            loop {
                match cursor.next().await {
                    Ok(Some(next)) if next == value => return true,
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => return false,
                }
            }
        }
    }

    /// Follow the cell: the first value is the one held now, then every
    /// accepted change in order.
    pub fn subscribe(&self) -> Cursor<T> {
        // Seeded under the same borrow so no write can slip in between.
        let current = self.inner.current.borrow();
        self.inner
            .changes
            .subscribe_with(VecDeque::from([current.clone()]))
    }

    /// Follow only the changes made from now on.
    pub fn changes(&self) -> Cursor<T> {
        self.inner.changes.subscribe()
    }

    /// End every iteration over the cell. The value stays readable and
    /// writable, but nothing is emitted any more.
    pub fn close(&self) {
        self.inner.changes.close();
    }

    /// Whether [`Value::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.changes.is_closed()
    }
}

impl<T: Clone + PartialEq + fmt::Display + 'static> Value<T> {
    /// Show the cell's value at the current render position, replacing it
    /// on every change. Returns when the cell is closed.
    pub async fn render_text<N: Content>(&self, cx: &Cx) -> Result<()> {
        project_text::<T, N, _>(cx, self).await
    }

    /// A component rendering this cell as text.
    pub fn component<N: Content>(&self) -> Component<(), N> {
        let value = self.clone();
        Component::new(move |cx, ()| {
            let value = value.clone();
            async move { value.render_text::<N>(&cx).await }
        })
        .named("value")
    }
}

impl<T: Clone + PartialEq + 'static> Source<T> for Value<T> {
    fn subscribe<'a>(&'a self, _cx: &'a Cx) -> LocalBoxFuture<'a, Result<Cursor<T>>> {
        let cursor = Value::subscribe(self);
        Box::pin(async move { Ok(cursor) })
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("current", &*self.inner.current.borrow())
            .field("changes", &self.inner.changes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use futures::FutureExt;
    use proptest::prelude::*;

    #[test]
    fn equal_write_emits_once() {
        let value = use_value(0);
        let cursor = value.changes();
        assert!(value.set(1));
        assert!(!value.set(1));
        assert_eq!(cursor.pending(), 1);
        assert_eq!(value.current(), 1);
    }

    #[test]
    fn is_current_is_immediate() {
        let value = use_value("ready");
        assert_eq!(value.is("ready").now_or_never(), Some(true));
        assert_eq!(value.inner.changes.subscriber_count(), 0);
    }

    #[test]
    fn is_catches_write_before_first_poll() {
        let value = use_value(0);
        let waiting = value.is(3);
        value.set(3);
        value.set(4);
        assert_eq!(waiting.now_or_never(), Some(true));
    }

    #[test]
    fn is_waits_for_later_write() {
        let runtime = Runtime::new();
        let scope = runtime.create_scope();
        let value = use_value(0);
        let waiting = value.is(2);
        let task = scope.run(move |_| async move { Ok(waiting.await) });
        runtime.run_until_stalled();
        assert!(!task.is_finished());

        value.set(1);
        runtime.run_until_stalled();
        assert!(!task.is_finished());

        value.set(2);
        runtime.run_until_stalled();
        assert_eq!(task.try_take(), Some(Ok(true)));
    }

    #[test]
    fn is_resolves_false_on_close() {
        let value = use_value(0);
        let waiting = value.is(5);
        value.set(1);
        value.close();
        assert_eq!(waiting.now_or_never(), Some(false));
    }

    #[test]
    fn subscriber_replays_current_then_follows() {
        let runtime = Runtime::new();
        let value = use_value(0);
        let writer = value.clone();
        let seen = runtime.block_on(move |cx| async move {
            let mut cursor = value.subscribe();
            let consumer = cx.spawn(move |_| async move {
                let mut seen = Vec::new();
                while let Some(v) = cursor.next().await? {
                    seen.push(v);
                }
                Ok(seen)
            });
            cx.yield_now().await;
            writer.set(1);
            writer.close();
            consumer.await
        });
        assert_eq!(seen, Ok(vec![0, 1]));
    }

    #[test]
    fn update_uses_current_value() {
        let value = use_value(String::from("a"));
        assert!(value.update(|s| format!("{s}b")));
        assert_eq!(value.with(String::len), 2);
    }

    proptest! {
        #[test]
        fn emits_only_on_change(writes in prop::collection::vec(0u8..4, 0..32)) {
            let value = use_value(0u8);
            let cursor = value.changes();
            let mut last = 0u8;
            let mut expected = 0;
            for write in writes {
                let accepted = value.set(write);
                prop_assert_eq!(accepted, write != last);
                if accepted {
                    expected += 1;
                    last = write;
                }
            }
            prop_assert_eq!(cursor.pending(), expected);
            prop_assert_eq!(value.current(), last);
        }
    }
}
