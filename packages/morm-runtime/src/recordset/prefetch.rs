//! Batched prefetch bookkeeping (§4.6 "Lazy load"/"Prefetch companions").
//!
//! A miss on field `f` triggers one adapter call per target collection
//! for every id in the recordset's prefetch set still missing `f`. When
//! `f` is relational, the runtime additionally queues the target model's
//! "common fields" — fields declared `prefetch = true` on the model, plus
//! whichever fields were read most recently in this environment — up to a
//! bounded chain depth.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct PrefetchConfig {
    pub batch_size: usize,
    pub chain_depth: u32,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            chain_depth: 2,
        }
    }
}

/// Tracks, per model, the most recently accessed field names in this
/// environment so they can be folded into the next batched prefetch as
/// "common fields".
#[derive(Default)]
pub struct PrefetchRegistry {
    recent: DashMap<String, Mutex<VecDeque<String>>>,
    window: usize,
}

impl PrefetchRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            recent: DashMap::new(),
            window: 20,
        }
    }

    pub fn record_access(&self, model: &str, field: &str) {
        let lane = self.recent.entry(model.to_string()).or_default();
        let mut queue = lane.lock();
        queue.retain(|existing| existing != field);
        queue.push_back(field.to_string());
        while queue.len() > self.window {
            queue.pop_front();
        }
    }

    /// Fields accessed recently on `model`, most-recent last.
    #[must_use]
    pub fn recent_fields(&self, model: &str) -> Vec<String> {
        self.recent
            .get(model)
            .map(|lane| lane.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Companions to prefetch alongside `field`: declared-`prefetch`
    /// fields on the model plus recently accessed fields, deduplicated,
    /// excluding `field` itself.
    #[must_use]
    pub fn companions(&self, model: &str, field: &str, declared_prefetch: &[String]) -> Vec<String> {
        let mut out: Vec<String> = declared_prefetch.iter().filter(|f| f.as_str() != field).cloned().collect();
        for recent in self.recent_fields(model) {
            if recent != field && !out.contains(&recent) {
                out.push(recent);
            }
        }
        out
    }
}
