//! Session records, the local session registry and name generation.

mod names;
mod store;
mod types;

use std::time::{SystemTime, UNIX_EPOCH};

pub use names::NameGenerator;
pub use store::SessionStore;
pub use types::{Backend, Session, Status};

/// Canonical form of a session id: trimmed and lowercased.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Current time in seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
