use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::browser::WaitUntil;

/// Tracks in-flight requests of a page load and decides when the network is idle.
///
/// Requests are keyed by id, so the repeated `requestWillBeSent` Chrome emits
/// for each redirect hop counts once. The idle window starts when the number
/// of in-flight requests drops to the limit and is only cancelled when it
/// goes above it again, so short requests under the limit do not restart it.
#[derive(Debug, Clone)]
pub struct NetworkIdleTracker {
    inflight: HashSet<String>,
    max_inflight: usize,
    window: Duration,
    idle_since: Option<Instant>,
}

impl NetworkIdleTracker {
    pub fn new(now: Instant) -> Self {
        Self::with_limits(WaitUntil::IDLE_CONNECTIONS, WaitUntil::IDLE_WINDOW, now)
    }

    pub fn with_limits(max_inflight: usize, window: Duration, now: Instant) -> Self {
        Self {
            inflight: HashSet::new(),
            max_inflight,
            window,
            idle_since: Some(now),
        }
    }

    pub fn request_started(&mut self, request_id: &str) {
        self.inflight.insert(request_id.to_string());
        if self.inflight.len() > self.max_inflight {
            self.idle_since = None;
        }
    }

    pub fn request_finished(&mut self, request_id: &str, now: Instant) {
        self.inflight.remove(request_id);
        if self.inflight.len() <= self.max_inflight && self.idle_since.is_none() {
            self.idle_since = Some(now);
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// When the network counts as idle if nothing else goes above the limit
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_since.map(|since| since + self.window)
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        self.idle_deadline().is_some_and(|deadline| now >= deadline)
    }
}
