use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::components::{ability::AbilityType, prediction::PredictionId};

/// Timing of the actor's current channeled cast.
/// Idle states never carry an ability or elapsed ticks; an active cast with
/// `end == None` is still waiting on the authority to confirm its length.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CastingState {
    pub active: bool,
    pub ability: Option<AbilityType>,
    pub prediction_id: PredictionId,
    pub start: Duration,
    pub end: Option<Duration>,
    pub elapsed_ticks: u32,
    pub interruptible: bool,
}

impl CastingState {
    pub fn start(
        &mut self,
        ability: AbilityType,
        prediction_id: PredictionId,
        start: Duration,
        length: Option<Duration>,
        interruptible: bool,
    ) {
        *self = Self {
            active: true,
            ability: Some(ability),
            prediction_id,
            start,
            end: length.map(|length| start + length),
            elapsed_ticks: 0,
            interruptible,
        };
    }

    /// Adopt the authority's window, keeping ticks already run locally
    pub fn confirm(&mut self, start: Duration, length: Duration, interruptible: bool) {
        if !self.active { return; }
        self.start = start;
        self.end = Some(start + length);
        self.interruptible = interruptible;
    }

    /// Advance one tick; returns the new tick number, or None once all `total` ticks ran
    pub fn tick(&mut self, total: u32) -> Option<u32> {
        if !self.active || self.elapsed_ticks >= total { return None; }
        self.elapsed_ticks += 1;
        Some(self.elapsed_ticks)
    }

    pub fn is_complete(&self, total: u32) -> bool {
        self.active && self.elapsed_ticks >= total
    }

    pub fn end(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_confirmed(&self) -> bool {
        self.active && self.end.is_some()
    }

    pub fn remaining(&self, now: Duration) -> Option<Duration> {
        if !self.active { return None; }
        self.end.map(|end| end.saturating_sub(now))
    }

    /// Whether a new cast starting at `at` would overlap this one
    pub fn blocks_at(&self, at: Duration) -> bool {
        match (self.active, self.end) {
            (false, _) => false,
            (true, None) => true,
            (true, Some(end)) => at < end,
        }
    }
}
