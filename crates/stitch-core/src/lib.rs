//! Foundational low-level utilities shared across Stitch crates.
//!
//! Provides atomic file-write helpers, time utilities, size-based log
//! rotation, and the HTTP retry/backoff helpers used by the gateway clients.

pub mod atomic_io;
pub mod log_rotation;
pub mod retry;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use log_rotation::{append_line_with_rotation, LogRotationPolicy};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
