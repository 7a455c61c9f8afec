//! Utility functions for identifier generation and timestamp handling.

mod ids;
mod timestamps;

pub use ids::generate_id;
pub use timestamps::{elapsed_ms, now_utc, Timestamp};
