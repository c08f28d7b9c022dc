use std::collections::{BTreeMap, BTreeSet};

use crate::common::components::{ability::TickParams, prediction::PredictionId};

/// `(prediction, tick)` pairs the authority already applied. Retries of an
/// applied pair are dropped; only the most recent predictions are remembered
/// since older ids are stale anyway.
#[derive(Clone, Debug, Default)]
pub struct TickLedger {
    applied: BTreeSet<(PredictionId, u32)>,
}

impl TickLedger {
    pub const HORIZON: u32 = 32;

    pub fn contains(&self, prediction_id: PredictionId, tick: u32) -> bool {
        self.applied.contains(&(prediction_id, tick))
    }

    /// Returns false if the pair was already applied
    pub fn record(&mut self, prediction_id: PredictionId, tick: u32) -> bool {
        let inserted = self.applied.insert((prediction_id, tick));
        let floor = prediction_id.0.saturating_sub(Self::HORIZON);
        self.applied.retain(|(id, _)| id.0 >= floor);
        inserted
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }
}

/// Reorders predicted ticks whose client params and authoritative timer arrive
/// in either order
#[derive(Clone, Debug, Default)]
pub struct TickParamBuffer {
    /// Params the client sent before the authority reached their tick
    params_awaiting_tick: BTreeMap<(PredictionId, u32), TickParams>,
    /// Ticks the authority reached before the client's params arrived
    ticks_awaiting_params: BTreeSet<(PredictionId, u32)>,
}

impl TickParamBuffer {
    pub fn park_params(&mut self, prediction_id: PredictionId, tick: u32, params: TickParams) {
        self.params_awaiting_tick.insert((prediction_id, tick), params);
    }

    pub fn take_params(&mut self, prediction_id: PredictionId, tick: u32) -> Option<TickParams> {
        self.params_awaiting_tick.remove(&(prediction_id, tick))
    }

    pub fn park_tick(&mut self, prediction_id: PredictionId, tick: u32) {
        self.ticks_awaiting_params.insert((prediction_id, tick));
    }

    pub fn take_tick(&mut self, prediction_id: PredictionId, tick: u32) -> bool {
        self.ticks_awaiting_params.remove(&(prediction_id, tick))
    }

    /// Drop entries of older predictions, and of ticks the cast is more than one past
    pub fn prune(&mut self, current: PredictionId, elapsed_ticks: u32) {
        let keep = |&(id, tick): &(PredictionId, u32)| id >= current && tick + 1 >= elapsed_ticks;
        self.params_awaiting_tick.retain(|key, _| keep(key));
        self.ticks_awaiting_params.retain(keep);
    }

    pub fn purge(&mut self, prediction_id: PredictionId) {
        self.params_awaiting_tick.retain(|&(id, _), _| id != prediction_id);
        self.ticks_awaiting_params.retain(|&(id, _)| id != prediction_id);
    }

    pub fn is_empty(&self) -> bool {
        self.params_awaiting_tick.is_empty() && self.ticks_awaiting_params.is_empty()
    }
}
