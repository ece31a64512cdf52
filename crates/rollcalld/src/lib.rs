//! rollcalld — attendance service around the rollcall matching core.
//!
//! A dedicated engine thread owns the SQLite store and the gallery cache;
//! async callers talk to it over channels. Recognition sessions admit
//! probe embeddings through a throttled frame gate and keep a ticking
//! check-in state for display.

pub mod cache;
pub mod config;
pub mod engine;
pub mod gate;
pub mod session;
pub mod state;

pub use cache::{GalleryCache, GallerySource};
pub use config::Config;
pub use engine::{spawn_engine, Engine, EngineError, EngineHandle, RegisterOutcome};
pub use gate::{FrameGate, FramePermit};
pub use session::RecognitionSession;
pub use state::CheckInState;
