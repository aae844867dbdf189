//! The event payload shape carried across the queue, per §6 "Event queue":
//! UTF-8 JSON with fields `{name, data, metadata, attempt, scheduled_for}`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub data: serde_json::Value,
    pub metadata: HashMap<String, String>,
    pub attempt: u32,
    pub scheduled_for: DateTime<Utc>,
    pub correlation_id: Option<String>,
}

impl Event {
    #[must_use]
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
            metadata: HashMap::new(),
            attempt: 0,
            scheduled_for: Utc::now(),
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: chrono::Duration) -> Self {
        self.scheduled_for = self.scheduled_for + delay;
        self
    }

    #[must_use]
    pub(crate) fn redelivered(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// Matches a glob-style subscription pattern (`*` = any run of characters)
/// against an event name, per §4.9 "`subscribe(pattern, ...)`".
#[must_use]
pub fn glob_match(pattern: &str, name: &str) -> bool {
    fn helper(pattern: &[u8], name: &[u8]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                (0..=name.len()).any(|split| helper(&pattern[1..], &name[split..]))
            }
            (Some(p), Some(n)) if p == n => helper(&pattern[1..], &name[1..]),
            _ => false,
        }
    }
    helper(pattern.as_bytes(), name.as_bytes())
}
