use super::FrameId;
use futures::task::ArcWake;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Ready queue shared between the executor and every task waker.
///
/// Wakers may fire from any thread, so this is the one piece of runtime
/// state behind a lock.
#[derive(Default)]
pub(crate) struct ReadyQueue {
    inner: Mutex<Ready>,
    signal: Condvar,
}

#[derive(Default)]
struct Ready {
    order: VecDeque<FrameId>,
    queued: HashSet<FrameId>,
}

impl ReadyQueue {
    pub(crate) fn push(&self, id: FrameId) {
        let mut ready = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if ready.queued.insert(id) {
            ready.order.push_back(id);
            self.signal.notify_one();
        }
    }

    pub(crate) fn pop(&self) -> Option<FrameId> {
        let mut ready = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = ready.order.pop_front()?;
        ready.queued.remove(&id);
        Some(id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .order
            .is_empty()
    }

    /// Park until something is queued. Returns `false` on timeout.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let ready = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match timeout {
            Some(timeout) => {
                let (ready, result) = self
                    .signal
                    .wait_timeout_while(ready, timeout, |r| r.order.is_empty())
                    .unwrap_or_else(|e| e.into_inner());
                !(result.timed_out() && ready.order.is_empty())
            }
            None => {
                let _ready = self
                    .signal
                    .wait_while(ready, |r| r.order.is_empty())
                    .unwrap_or_else(|e| e.into_inner());
                true
            }
        }
    }
}

/// Waker for a single task frame.
pub(crate) struct TaskWaker {
    pub(crate) id: FrameId,
    pub(crate) queue: Arc<ReadyQueue>,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        tracing::trace!(task = arc_self.id.0, "wake");
        arc_self.queue.push(arc_self.id);
    }
}
