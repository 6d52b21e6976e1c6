//! Remote transfer aggregation

use std::collections::BTreeMap;

use crate::utils::format_bytes;

/// Progress of one remote transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transfer {
    pub total: i64,
    pub current: i64,
}

/// Per-id transfer progress, last write wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferTable {
    entries: BTreeMap<String, Transfer>,
}

impl TransferTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest progress of a transfer
    pub fn upsert(&mut self, id: impl Into<String>, total: i64, current: i64) {
        self.entries.insert(id.into(), Transfer { total, current });
    }

    pub fn get(&self, id: &str) -> Option<&Transfer> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(current, total)` summed over every transfer
    pub fn aggregate(&self) -> (i64, i64) {
        self.entries
            .values()
            .fold((0, 0), |(c, t), tr| (c + tr.current, t + tr.total))
    }

    /// Completion ratio in `0.0..=1.0`, `None` while nothing is sized
    pub fn ratio(&self) -> Option<f64> {
        let (current, total) = self.aggregate();
        if total <= 0 {
            return None;
        }
        Some((current as f64 / total as f64).clamp(0.0, 1.0))
    }

    /// `current/total` with human readable sizes
    pub fn summary(&self) -> String {
        let (current, total) = self.aggregate();
        format!("{}/{}", format_bytes(current), format_bytes(total))
    }
}
