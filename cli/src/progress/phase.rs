//! Completed phase bookkeeping and stall detection

use std::time::Duration;

use tokio::time::Instant;

/// Summary name recorded when the source upload finishes
pub const UPLOAD_PHASE: &str = "Upload artifacts";

/// Summary name recorded when the image build finishes
pub const BUILD_PHASE: &str = "Build & push image";

/// A finished phase as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSummary {
    pub name: String,
    pub duration: Duration,
    pub details: String,
}

/// Append-only list of completed phases
///
/// Each name is recorded at most once; the duration of a phase runs from the
/// end of the previous one.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase_started: Instant,
    summaries: Vec<PhaseSummary>,
}

impl PhaseTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            phase_started: now,
            summaries: Vec::new(),
        }
    }

    /// Close the current phase under `name`.
    ///
    /// Returns `false` and changes nothing if `name` was already recorded.
    pub fn complete(&mut self, name: &str, details: impl Into<String>, now: Instant) -> bool {
        if self.has(name) {
            return false;
        }
        self.summaries.push(PhaseSummary {
            name: name.to_string(),
            duration: now.saturating_duration_since(self.phase_started),
            details: details.into(),
        });
        self.phase_started = now;
        true
    }

    pub fn has(&self, name: &str) -> bool {
        self.summaries.iter().any(|s| s.name == name)
    }

    /// Start of the phase in progress
    pub fn phase_started(&self) -> Instant {
        self.phase_started
    }

    pub fn summaries(&self) -> &[PhaseSummary] {
        &self.summaries
    }
}

/// Flags a build that never starts moving.
///
/// The window opens when the build phase is entered. Only transfer progress
/// counts as build activity; once any transfer was seen the monitor never
/// fires.
#[derive(Debug, Clone)]
pub struct StallMonitor {
    window: Duration,
    building_since: Option<Instant>,
    saw_transfer: bool,
}

impl StallMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            building_since: None,
            saw_transfer: false,
        }
    }

    pub fn enter_building(&mut self, now: Instant) {
        if self.building_since.is_none() {
            self.building_since = Some(now);
        }
    }

    pub fn on_transfer(&mut self) {
        self.saw_transfer = true;
    }

    pub fn is_stalled(&self, now: Instant) -> bool {
        match self.building_since {
            Some(since) if !self.saw_transfer => now.saturating_duration_since(since) >= self.window,
            _ => false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
