//! rollcall-store — SQLite persistence for enrolled faces and check-ins.
//!
//! The store is the source of truth for attendance history: cooldown
//! decisions read the last check-in from here, never from a cache.

pub mod codec;
pub mod filter;
pub mod store;

pub use codec::CodecError;
pub use filter::RecordFilter;
pub use store::{AttendanceStore, StoreError};
