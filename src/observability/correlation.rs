//! Correlation id for tracking a single pipeline run across log lines.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation id for a pipeline run, attached to its top-level tracing
/// span so every log line emitted underneath carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_ids_are_not_equal() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }
}
