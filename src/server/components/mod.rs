pub mod tick_buffer;

use std::time::Duration;

use bevy::prelude::*;

use crate::common::components::{ability::AbilityType, prediction::PredictionId};

use tick_buffer::{TickLedger, TickParamBuffer};

/// Server-only bookkeeping for an actor whose abilities a client predicts
#[derive(Component, Debug, Default)]
pub struct AuthorityState {
    pub last_accepted: PredictionId,
    pub ledger: TickLedger,
    pub buffer: TickParamBuffer,
    /// Latest predicted cast; its tick requests may still arrive after it completes
    pub current_cast: PredictionId,
    pub cast_ability: Option<AbilityType>,
    pub reached_tick: u32,
    /// `current_cast` was cancelled or interrupted and takes no more ticks
    pub cast_stopped: bool,
}

/// Server-driven actor that periodically uses its abilities
#[derive(Component, Debug, Default)]
pub struct TrainingDummy {
    pub next_at: Duration,
}
