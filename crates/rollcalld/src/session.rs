//! A recognition session: gallery warm-up, probe intake and the cooldown
//! countdown.
//!
//! Every background task belongs to the session and is aborted when it is
//! shut down or dropped, so no timer outlives the screen that reads it.

use crate::engine::EngineHandle;
use crate::gate::FrameGate;
use crate::state::CheckInState;
use rollcall_core::Embedding;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

pub struct RecognitionSession {
    engine: EngineHandle,
    gate: Arc<FrameGate>,
    state_tx: Arc<watch::Sender<CheckInState>>,
    warm_up: JoinHandle<()>,
    ticker: JoinHandle<()>,
    in_flight: Option<JoinHandle<()>>,
}

impl RecognitionSession {
    /// Publish the loading state, then warm the gallery cache and start the
    /// countdown ticker in the background. Must be called inside a runtime.
    pub fn start(engine: EngineHandle, frame_interval: Duration) -> Self {
        tracing::info!(interval_ms = frame_interval.as_millis() as u64, "recognition session started");

        let (state_tx, _) = watch::channel(CheckInState::loading());
        let state_tx = Arc::new(state_tx);
        let warm_up = tokio::spawn(warm_gallery(engine.clone(), Arc::clone(&state_tx)));
        let ticker = tokio::spawn(run_countdown(Arc::clone(&state_tx)));

        Self {
            engine,
            gate: FrameGate::new(frame_interval),
            state_tx,
            warm_up,
            ticker,
            in_flight: None,
        }
    }

    /// Wait until the gallery warm-up has finished.
    pub async fn ready(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this only returns once loaded.
        let _ = rx.wait_for(|state| !state.loading).await;
    }

    pub fn subscribe(&self) -> watch::Receiver<CheckInState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> CheckInState {
        self.state_tx.borrow().clone()
    }

    /// Offer a probe embedding. Returns false if the frame was dropped.
    pub fn submit(&mut self, probe: Embedding) -> bool {
        let Some(permit) = self.gate.try_admit(Instant::now()) else {
            tracing::trace!("frame dropped");
            return false;
        };

        let engine = self.engine.clone();
        let state_tx = Arc::clone(&self.state_tx);
        self.in_flight = Some(tokio::spawn(async move {
            let _permit = permit;
            match engine.recognize(probe).await {
                Ok(outcome) => {
                    state_tx.send_replace(CheckInState::from_outcome(&outcome));
                }
                Err(e) => tracing::error!(error = %e, "recognition failed"),
            }
        }));
        true
    }

    /// Wait for the in-flight frame, if any, then stop the ticker.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.in_flight.take() {
            let _ = task.await;
        }
        self.warm_up.abort();
        self.ticker.abort();
        tracing::info!("recognition session stopped");
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        self.warm_up.abort();
        self.ticker.abort();
        if let Some(task) = &self.in_flight {
            task.abort();
        }
    }
}

/// Load the gallery once and clear the loading flag, keeping any
/// recognition result that arrived in the meantime.
async fn warm_gallery(engine: EngineHandle, state_tx: Arc<watch::Sender<CheckInState>>) {
    match engine.load_gallery().await {
        Ok(faces) => tracing::info!(faces, "gallery warmed"),
        // Recognition loads the gallery lazily, so frames still get a chance.
        Err(e) => tracing::error!(error = %e, "gallery warm-up failed"),
    }
    state_tx.send_if_modified(|state| std::mem::replace(&mut state.loading, false));
}

/// Decrement the displayed cooldown once per second, independent of recognition.
async fn run_countdown(state_tx: Arc<watch::Sender<CheckInState>>) {
    let mut interval = tokio::time::interval(COUNTDOWN_TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        interval.tick().await;
        state_tx.send_if_modified(CheckInState::tick);
    }
}
