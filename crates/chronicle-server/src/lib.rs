// crates/chronicle-server/src/lib.rs
// Chronicle - memory persistence and consolidation engine

#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod config;
pub mod db;
pub mod decay;
pub mod error;
pub mod host;
pub mod mcp;
pub mod similarity;

pub use error::{ChronicleError, Result};

/// Current time as a millisecond Unix timestamp.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
