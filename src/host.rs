//! Host Bridge
//!
//! Control messages arrive on the host's threads; the engine runs inside
//! the audio callback. This module supplies the serialization between the
//! two: a pair of bounded [`MessageQueue`]s, one carrying
//! [`ControlMsg`](crate::protocol::ControlMsg) in (drained at the top of
//! each callback), one carrying [`EngineEvent`](crate::protocol::EngineEvent)
//! out.
//!
//! Both directions are best-effort under pressure: a full queue drops the
//! message rather than block, because nothing on the audio side is ever
//! allowed to wait.

use crate::engine::EventSink;
use crate::protocol::EngineEvent;
use alloc::boxed::Box;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A bounded, thread-safe message queue.
///
/// Clones share the same underlying queue, so one clone can live on the
/// host thread and another inside the audio callback.
pub struct MessageQueue<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> MessageQueue<T> {
    /// Create a queue holding at most `capacity` messages.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
            }),
        }
    }

    /// Enqueue a message. Returns `false` (and drops the message) when the
    /// queue is full or its lock is poisoned.
    pub fn push(&self, value: T) -> bool {
        if let Ok(mut queue) = self.inner.queue.lock() {
            if queue.len() < self.inner.capacity {
                queue.push_back(value);
                return true;
            }
        }
        false
    }

    /// Dequeue the oldest message, if any.
    pub fn pop(&self) -> Option<T> {
        self.inner.queue.lock().ok()?.pop_front()
    }

    /// Drain everything currently queued through `apply`.
    ///
    /// This is the per-callback ingress point: drain the control queue,
    /// then generate the block's samples.
    pub fn drain(&self, mut apply: impl FnMut(T)) {
        if let Ok(mut queue) = self.inner.queue.lock() {
            while let Some(value) = queue.pop_front() {
                apply(value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for MessageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl MessageQueue<EngineEvent> {
    /// An [`EventSink`] feeding this queue, dropping events on overflow.
    pub fn sink(&self) -> EventSink {
        let queue = self.clone();
        Box::new(move |event| {
            queue.push(event);
        })
    }
}
