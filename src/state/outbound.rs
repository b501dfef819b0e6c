//! Per-connection outbound event queue.
//!
//! Every connection owns one bounded queue drained by a single writer
//! task, which preserves per-connection FIFO order. Under backpressure
//! the queue sheds load by class: the oldest screen frame goes first,
//! then the oldest audio frame. Chat messages and state transitions are
//! never dropped; if a queue is full of nothing but critical frames the
//! consumer is too slow to keep, and the connection is marked for
//! force-disconnect.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use palaver_proto::names::event;
use palaver_proto::ServerFrame;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Drop classification of an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Never dropped; overflow disconnects the consumer instead.
    Critical,
    /// Droppable after screen frames.
    Audio,
    /// First to go under backpressure.
    Screen,
}

/// Classify an event frame by name.
pub fn classify(frame: &ServerFrame) -> FrameClass {
    match frame.name.as_str() {
        event::RECEIVE_SCREEN_FRAME => FrameClass::Screen,
        event::RECEIVE_AUDIO | event::RECEIVE_CALL_AUDIO | event::RECEIVE_GROUP_CALL_AUDIO => {
            FrameClass::Audio
        }
        _ => FrameClass::Critical,
    }
}

struct Shared {
    queue: Mutex<VecDeque<Arc<ServerFrame>>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
    /// Set when a critical frame could not be queued; the writer task
    /// observes this and force-disconnects.
    overflowed: AtomicBool,
}

/// Cloneable handle to a connection's outbound queue.
#[derive(Clone)]
pub struct OutboundHandle {
    shared: Arc<Shared>,
}

impl OutboundHandle {
    /// Create a queue with the given frame capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                capacity,
                closed: AtomicBool::new(false),
                overflowed: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueue a frame, applying the drop policy when full.
    pub fn push(&self, frame: Arc<ServerFrame>) {
        if self.shared.closed.load(Ordering::Acquire) {
            return;
        }

        {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.shared.capacity && !Self::shed_one(&mut queue) {
                // Queue is all-critical. Media can be dropped outright;
                // a critical frame means the consumer must go.
                if classify(&frame) == FrameClass::Critical {
                    self.shared.overflowed.store(true, Ordering::Release);
                } else {
                    crate::metrics::OUTBOUND_DROPPED.inc();
                }
                self.shared.notify.notify_one();
                return;
            }
            queue.push_back(frame);
        }
        self.shared.notify.notify_one();
    }

    /// Drop the oldest sheddable frame. Screen frames go before audio.
    fn shed_one(queue: &mut VecDeque<Arc<ServerFrame>>) -> bool {
        for wanted in [FrameClass::Screen, FrameClass::Audio] {
            if let Some(idx) = queue.iter().position(|f| classify(f) == wanted) {
                queue.remove(idx);
                crate::metrics::OUTBOUND_DROPPED.inc();
                return true;
            }
        }
        false
    }

    /// Dequeue the next frame.
    ///
    /// Returns `None` when the queue is closed and drained, or when the
    /// connection must be force-disconnected after a critical overflow.
    pub async fn pop(&self) -> Option<Arc<ServerFrame>> {
        loop {
            if self.shared.overflowed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(frame) = self.shared.queue.lock().pop_front() {
                return Some(frame);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Dequeue the next frame if one is already pending.
    pub fn try_pop(&self) -> Option<Arc<ServerFrame>> {
        self.shared.queue.lock().pop_front()
    }

    /// Close the queue; pending frames may still be drained.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    /// Whether a critical frame overflowed (consumer too slow to keep).
    pub fn is_overflowed(&self) -> bool {
        self.shared.overflowed.load(Ordering::Acquire)
    }

    /// Current queue depth (diagnostics and tests).
    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.shared.queue.lock().is_empty()
    }
}
