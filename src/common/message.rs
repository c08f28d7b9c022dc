use std::time::Duration;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::{
    components::{
        ability::{AbilityType, TickParams},
        casting::CastingState,
        crowd_control::{CrowdControlType, Restriction, RestrictionSource},
        gcd::GlobalCooldown,
        prediction::PredictionId,
        resources::{ResourceCost, ResourceKind},
    },
    error::CastFailReason,
};

/// Client → server: use an ability (`tick == 0`) or deliver params for a later predicted tick
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AbilityUseRequest {
    pub ability: AbilityType,
    pub prediction_id: PredictionId,
    pub tick: u32,
    pub client_timestamp: Duration,
    pub params: TickParams,
}

/// Server → owner: authoritative outcome of one use request, sent exactly once
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ServerResult {
    pub prediction_id: PredictionId,
    pub ability: AbilityType,
    pub success: bool,
    pub fail_reason: Option<CastFailReason>,
    pub gcd_activated: bool,
    pub gcd_length: Duration,
    pub cast_activated: bool,
    pub cast_length: Duration,
    pub interruptible: bool,
    pub charges_spent: u32,
    pub costs: Vec<ResourceCost>,
    pub client_start_time: Duration,
}

impl ServerResult {
    pub fn failed(request: &AbilityUseRequest, reason: CastFailReason) -> Self {
        Self {
            prediction_id: request.prediction_id,
            ability: request.ability,
            success: false,
            fail_reason: Some(reason),
            gcd_activated: false,
            gcd_length: Duration::ZERO,
            cast_activated: false,
            cast_length: Duration::ZERO,
            interruptible: false,
            charges_spent: 0,
            costs: Vec::new(),
            client_start_time: request.client_timestamp,
        }
    }

    pub fn gcd_end(&self) -> Option<Duration> {
        self.gcd_activated.then(|| self.client_start_time + self.gcd_length)
    }

    pub fn cast_end(&self) -> Option<Duration> {
        self.cast_activated.then(|| self.client_start_time + self.cast_length)
    }
}

/// Server → observers: one applied tick of an ability
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TickBroadcast {
    pub prediction_id: PredictionId,
    pub ability: AbilityType,
    pub tick: u32,
    pub params: TickParams,
}

/// Client → server: cancel the cast started under `cancelled_cast_id`
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct CancelRequest {
    pub prediction_id: PredictionId,
    pub cancelled_cast_id: PredictionId,
    pub timestamp: Duration,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CancelEvent {
    pub ability: AbilityType,
    pub cancelled_cast_id: PredictionId,
    pub cast_start: Duration,
    pub cast_end: Option<Duration>,
    pub cancel_time: Duration,
    pub elapsed_ticks: u32,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum InterruptSource {
    CrowdControl(CrowdControlType),
    Death,
    Ability(AbilityType),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct InterruptEvent {
    pub ability: AbilityType,
    pub cancelled_cast_id: PredictionId,
    pub cast_start: Duration,
    pub cast_end: Option<Duration>,
    pub interrupt_time: Duration,
    pub elapsed_ticks: u32,
    pub applied_by: Option<Entity>,
    pub source: InterruptSource,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Event {
    /// Server → owner: the client's actor and the server's elapsed time
    Init { ent: Entity, elapsed: Duration },
    Spawn { ent: Entity },
    Despawn { ent: Entity },
    AbilityAdded { ent: Entity, ability: AbilityType },
    AbilityRemoved { ent: Entity, ability: AbilityType },
    UseAbility { ent: Entity, request: AbilityUseRequest },
    AbilityResult { ent: Entity, result: ServerResult },
    AbilityTick { ent: Entity, tick: TickBroadcast },
    /// `prediction_id` names the cast concerned; an ended state no longer carries it
    CastState { ent: Entity, prediction_id: PredictionId, state: CastingState },
    CancelCast { ent: Entity, request: CancelRequest },
    AbilityCancelled { ent: Entity, event: CancelEvent },
    AbilityInterrupted { ent: Entity, event: InterruptEvent },
    Resource { ent: Entity, kind: ResourceKind, state: f32, max: f32 },
    Charges { ent: Entity, ability: AbilityType, state: u32 },
    CrowdControl { ent: Entity, active: Vec<CrowdControlType> },
    Restrictions { ent: Entity, active: Vec<(RestrictionSource, Restriction)> },
}

impl Event {
    /// Actor the event is about
    pub fn ent(&self) -> Entity {
        match self {
            Event::Init { ent, .. }
            | Event::Spawn { ent }
            | Event::Despawn { ent }
            | Event::AbilityAdded { ent, .. }
            | Event::AbilityRemoved { ent, .. }
            | Event::UseAbility { ent, .. }
            | Event::AbilityResult { ent, .. }
            | Event::AbilityTick { ent, .. }
            | Event::CastState { ent, .. }
            | Event::CancelCast { ent, .. }
            | Event::AbilityCancelled { ent, .. }
            | Event::AbilityInterrupted { ent, .. }
            | Event::Resource { ent, .. }
            | Event::Charges { ent, .. }
            | Event::CrowdControl { ent, .. }
            | Event::Restrictions { ent, .. } => *ent,
        }
    }

    /// Same event about another entity, used when mapping between server and client ids
    pub fn with_ent(mut self, to: Entity) -> Self {
        match &mut self {
            Event::Init { ent, .. }
            | Event::Spawn { ent }
            | Event::Despawn { ent }
            | Event::AbilityAdded { ent, .. }
            | Event::AbilityRemoved { ent, .. }
            | Event::UseAbility { ent, .. }
            | Event::AbilityResult { ent, .. }
            | Event::AbilityTick { ent, .. }
            | Event::CastState { ent, .. }
            | Event::CancelCast { ent, .. }
            | Event::AbilityCancelled { ent, .. }
            | Event::AbilityInterrupted { ent, .. }
            | Event::Resource { ent, .. }
            | Event::Charges { ent, .. }
            | Event::CrowdControl { ent, .. }
            | Event::Restrictions { ent, .. } => *ent = to,
        }
        self
    }
}

/// Authoritative event, applied as-is by the receiver
#[derive(Clone, Debug, Deserialize, Message, Serialize)]
pub struct Do {
    pub event: Event,
}

/// Request the authority may refuse
#[derive(Clone, Debug, Deserialize, Message, Serialize)]
pub struct Try {
    pub event: Event,
}

/// Outward notifications raised by an actor's ability handler
#[derive(Clone, Debug, PartialEq)]
pub enum AbilityEvent {
    Added(AbilityType),
    Removed(AbilityType),
    Tick { ability: AbilityType, prediction_id: PredictionId, tick: u32, params: TickParams },
    Cancelled(CancelEvent),
    Interrupted(InterruptEvent),
    CastStateChanged { previous: CastingState, current: CastingState },
    GlobalCooldownChanged { previous: GlobalCooldown, current: GlobalCooldown },
    Mispredicted { prediction_id: PredictionId, reason: CastFailReason },
}

#[derive(Clone, Debug, Message)]
pub struct Notify {
    pub ent: Entity,
    pub event: AbilityEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_ent_retargets_every_variant_field() {
        let server = Entity::from_raw_u32(7).unwrap();
        let local = Entity::from_raw_u32(3).unwrap();
        let event = Event::Charges { ent: server, ability: AbilityType::Dash, state: 1 };

        let mapped = event.with_ent(local);
        assert_eq!(mapped.ent(), local);
        assert_eq!(mapped, Event::Charges { ent: local, ability: AbilityType::Dash, state: 1 });
    }

    #[test]
    fn test_result_survives_the_wire() {
        let request = AbilityUseRequest {
            ability: AbilityType::Siphon,
            prediction_id: PredictionId(9),
            tick: 0,
            client_timestamp: Duration::from_millis(1250),
            params: TickParams::with(&[5.]),
        };
        let ent = Entity::from_raw_u32(1).unwrap();
        let sent = Do { event: Event::AbilityResult { ent, result: ServerResult::failed(&request, CastFailReason::Stale) } };

        let bytes = bincode::serde::encode_to_vec(&sent, bincode::config::legacy()).unwrap();
        let (received, _): (Do, usize) = bincode::serde::decode_from_slice(&bytes, bincode::config::legacy()).unwrap();
        let Event::AbilityResult { result, .. } = received.event else { panic!("wrong variant") };
        assert_eq!(result.prediction_id, PredictionId(9));
        assert_eq!(result.fail_reason, Some(CastFailReason::Stale));
        assert_eq!(result.client_start_time, Duration::from_millis(1250));
        assert!(!result.success);
    }
}
