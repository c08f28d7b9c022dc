use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::components::prediction::PredictionId;

/// Global cooldown gate shared by every GCD-bound ability of an actor.
/// Owned by the actor's `AbilityHandler`; other systems only read it.
/// An active cooldown with `end == None` has not had its length confirmed by the authority.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GlobalCooldown {
    pub active: bool,
    pub prediction_id: PredictionId,
    pub start: Duration,
    pub end: Option<Duration>,
}

impl GlobalCooldown {
    /// Enter the active state; pass `None` when the length is only an estimate
    pub fn start(&mut self, prediction_id: PredictionId, start: Duration, length: Option<Duration>) {
        *self = Self {
            active: true,
            prediction_id,
            start,
            end: length.map(|length| start + length),
        };
    }

    /// Overwrite timing with the authority's window
    pub fn confirm(&mut self, prediction_id: PredictionId, start: Duration, length: Duration) {
        self.start(prediction_id, start, Some(length));
    }

    /// Force back to idle regardless of cause
    pub fn end(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_confirmed(&self) -> bool {
        self.active && self.end.is_some()
    }

    /// Remaining time on a confirmed cooldown
    pub fn remaining(&self, now: Duration) -> Option<Duration> {
        if !self.active { return None; }
        self.end.map(|end| end.saturating_sub(now))
    }

    /// Whether a GCD-bound ability starting at `at` would be blocked
    pub fn blocks_at(&self, at: Duration) -> bool {
        match (self.active, self.end) {
            (false, _) => false,
            (true, None) => true,
            (true, Some(end)) => at < end,
        }
    }
}
