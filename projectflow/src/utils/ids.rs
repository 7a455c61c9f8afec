//! Identifier helpers.

use uuid::Uuid;

/// Generates a new identifier (hyphenated UUID v4).
///
/// Used for runs and log entries.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
