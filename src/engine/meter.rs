//! Meter aggregation
//!
//! The renderer reports levels far faster than any UI can draw them. Only
//! the most recent reading per tap is kept; each display tick publishes the
//! whole map once and then empties it.

use std::collections::HashMap;

use serde::Serialize;

/// Signal range over one renderer block
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MeterValue {
    pub min: f32,
    pub max: f32,
}

impl MeterValue {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Largest absolute excursion
    pub fn peak(&self) -> f32 {
        self.min.abs().max(self.max.abs())
    }
}

/// Latest reading per tap name
pub type MeterMap = HashMap<String, MeterValue>;

#[derive(Debug, Default)]
pub struct MeterAggregator {
    latest: MeterMap,
}

impl MeterAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reading, replacing any earlier one from the same tap
    pub fn record(&mut self, source: impl Into<String>, min: f32, max: f32) {
        self.latest.insert(source.into(), MeterValue::new(min, max));
    }

    pub fn get(&self, source: &str) -> Option<MeterValue> {
        self.latest.get(source).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Take the current map for publishing, leaving the aggregator empty
    ///
    /// Returns `None` when nothing has been recorded since the last flush.
    pub fn flush(&mut self) -> Option<MeterMap> {
        if self.latest.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.latest))
        }
    }

    pub fn clear(&mut self) {
        self.latest.clear();
    }
}
