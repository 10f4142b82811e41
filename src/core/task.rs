//! Task and execution unit identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonically increasing task identifier, never reused within a pool.
pub type TaskId = u64;

/// Pool-local execution unit identity.
///
/// Replacement units always receive a fresh id, so a report carrying a
/// retired id can be recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// Metadata describing a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Unique task identifier.
    pub id: TaskId,
    /// Creation timestamp in milliseconds since epoch (diagnostics only).
    pub created_at_ms: u128,
}
