//! Frame admission: throttled, one frame in flight, drop the rest.
//!
//! Freshness over completeness: a frame arriving while the previous one is
//! still being matched, or sooner than the minimum interval after the last
//! admitted frame, is discarded rather than queued.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct GateState {
    busy: bool,
    last_admitted: Option<Instant>,
}

#[derive(Debug)]
pub struct FrameGate {
    min_interval: Duration,
    state: Mutex<GateState>,
}

impl FrameGate {
    pub fn new(min_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            min_interval,
            state: Mutex::new(GateState::default()),
        })
    }

    /// Admit a frame arriving at `now`, or `None` if it must be dropped.
    /// The slot stays occupied until the returned permit is dropped.
    pub fn try_admit(self: &Arc<Self>, now: Instant) -> Option<FramePermit> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.busy {
            return None;
        }
        if let Some(last) = state.last_admitted {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }
        state.busy = true;
        state.last_admitted = Some(now);
        Some(FramePermit {
            gate: Arc::clone(self),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).busy
    }
}

/// Occupies the gate's single in-flight slot.
#[derive(Debug)]
pub struct FramePermit {
    gate: Arc<FrameGate>,
}

impl Drop for FramePermit {
    fn drop(&mut self) {
        self.gate
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .busy = false;
    }
}
