//! Suppression of bus echoes of locally originated messages.
//!
//! Every local message is dispatched here and also published on the bus,
//! whose subscriber hands the same message back to this process. The
//! filter remembers originated ids for a short window and reports the
//! first bus copy of each as an echo.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::domain::MessageId;

/// Short-lived set of message ids this process originated.
#[derive(Debug)]
pub struct EchoFilter {
    window: Duration,
    order: VecDeque<(Instant, MessageId)>,
    pending: HashSet<MessageId>,
}

impl EchoFilter {
    /// Creates a filter that forgets ids after `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            order: VecDeque::new(),
            pending: HashSet::new(),
        }
    }

    /// Remembers a locally originated id.
    pub fn record(&mut self, id: MessageId, now: Instant) {
        self.prune(now);
        if self.pending.insert(id) {
            self.order.push_back((now, id));
        }
    }

    /// Returns `true` (and forgets the id) if `id` was originated here
    /// within the window.
    pub fn is_echo(&mut self, id: MessageId, now: Instant) -> bool {
        self.prune(now);
        self.pending.remove(&id)
    }

    /// Number of ids currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no id is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&(at, id)) = self.order.front() {
            if now.saturating_duration_since(at) < self.window {
                break;
            }
            let _ = self.order.pop_front();
            let _ = self.pending.remove(&id);
        }
    }
}
