use std::time::Duration;

use bevy::prelude::*;

use crate::{
    common::{
        components::{
            ability::{AbilityHooks, AbilityType, CastType, TickParams},
            casting::CastingState,
            handler::{AbilityHandler, CastTick, NetRole},
            prediction::PredictionId,
        },
        error::{CancelFailReason, CastFailReason, InterruptFailReason},
        message::{
            AbilityUseRequest, CancelEvent, CancelRequest, Event, InterruptEvent, InterruptSource,
            ServerResult, TickBroadcast,
        },
        resources::AbilityConfig,
        systems::combat::{authorities::Authorities, scheduler::TimerAction, validation::validate_use},
    },
    server::components::AuthorityState,
};

/// Something the authority decided that clients need to hear about
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Result(ServerResult),
    Tick(TickBroadcast),
    CastState { prediction_id: PredictionId, state: CastingState },
    Cancelled(CancelEvent),
    Interrupted(InterruptEvent),
}

impl Outbound {
    pub fn into_event(self, ent: Entity) -> Event {
        match self {
            Outbound::Result(result) => Event::AbilityResult { ent, result },
            Outbound::Tick(tick) => Event::AbilityTick { ent, tick },
            Outbound::CastState { prediction_id, state } => Event::CastState { ent, prediction_id, state },
            Outbound::Cancelled(event) => Event::AbilityCancelled { ent, event },
            Outbound::Interrupted(event) => Event::AbilityInterrupted { ent, event },
        }
    }
}

fn apply_tick(
    handler: &mut AbilityHandler,
    ability: AbilityType,
    prediction_id: PredictionId,
    tick: u32,
    params: &TickParams,
) -> Outbound {
    let params = ability.server_tick(tick, params);
    handler.emit_tick(&CastTick { ability, prediction_id, tick, last: false }, params.clone());
    Outbound::Tick(TickBroadcast { prediction_id, ability, tick, params })
}

/// Start the GCD and cast, pay for the ability and run tick 0 where it has one
#[allow(clippy::too_many_arguments)]
fn commit(
    handler: &mut AbilityHandler,
    authorities: &mut Authorities,
    ability: AbilityType,
    prediction_id: PredictionId,
    start: Duration,
    params: &TickParams,
    config: &AbilityConfig,
    now: Duration,
) -> (ServerResult, Vec<Outbound>) {
    let def = ability.def();
    let gcd_length = if def.on_gcd { authorities.gcd_length(ability, config) } else { Duration::ZERO };
    if def.on_gcd {
        handler.start_gcd(prediction_id, start, gcd_length, true, now);
    }
    authorities.commit(ability, now);

    let mut outbound = Vec::new();
    let mut cast_length = Duration::ZERO;
    let mut cast_activated = false;
    match def.cast_type {
        CastType::Instant => outbound.push(apply_tick(handler, ability, prediction_id, 0, params)),
        CastType::Channel => {
            cast_length = authorities.cast_length(ability, config);
            cast_activated = handler.start_cast(ability, prediction_id, start, cast_length, true, def.interruptible);
            outbound.push(Outbound::CastState { prediction_id, state: *handler.casting() });
            if def.initial_tick {
                outbound.push(apply_tick(handler, ability, prediction_id, 0, params));
            }
        }
    }

    let result = ServerResult {
        prediction_id,
        ability,
        success: true,
        fail_reason: None,
        gcd_activated: def.on_gcd,
        gcd_length,
        cast_activated,
        cast_length,
        interruptible: def.interruptible,
        charges_spent: def.charge_cost,
        costs: def.costs.to_vec(),
        client_start_time: start,
    };
    (result, outbound)
}

impl AuthorityState {
    /// Resolve a client's use request (`tick == 0`) or deliver its params for a later tick
    pub fn handle_use_request(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        request: &AbilityUseRequest,
        config: &AbilityConfig,
        now: Duration,
    ) -> Vec<Outbound> {
        if request.tick > 0 {
            return self.handle_tick_request(handler, request);
        }
        let prediction_id = request.prediction_id;
        if self.ledger.contains(prediction_id, 0) {
            debug!("dropping repeated {prediction_id}");
            return Vec::new();
        }
        if !prediction_id.is_predicted() || prediction_id <= self.last_accepted {
            debug!("stale {prediction_id}, last accepted {}", self.last_accepted);
            return vec![Outbound::Result(ServerResult::failed(request, CastFailReason::Stale))];
        }
        self.last_accepted = prediction_id;

        let start = config.compensated_start(request.client_timestamp, now);
        let checked = match handler.role {
            NetRole::Authority => validate_use(handler, authorities, request.ability, start).map(|_| ()),
            _ => Err(CastFailReason::NetRole),
        };
        if let Err(reason) = checked {
            debug!("rejected {:?} {prediction_id}: {reason}", request.ability);
            return vec![Outbound::Result(ServerResult::failed(request, reason))];
        }

        let (result, mut outbound) =
            commit(handler, authorities, request.ability, prediction_id, start, &request.params, config, now);
        self.ledger.record(prediction_id, 0);
        if result.cast_activated {
            self.current_cast = prediction_id;
            self.cast_ability = Some(request.ability);
            self.reached_tick = 0;
            self.cast_stopped = false;
            self.buffer.prune(prediction_id, 0);
        }
        debug!("accepted {:?} {prediction_id} from {start:?}", request.ability);
        outbound.insert(0, Outbound::Result(result));
        outbound
    }

    /// Client params for tick `N > 0` of its predicted cast
    pub fn handle_tick_request(&mut self, handler: &mut AbilityHandler, request: &AbilityUseRequest) -> Vec<Outbound> {
        let (prediction_id, tick) = (request.prediction_id, request.tick);
        if prediction_id != self.current_cast || self.cast_stopped {
            debug!("dropping tick {tick} of {prediction_id}, not the live cast");
            return Vec::new();
        }
        let Some(ability) = self.cast_ability.filter(|&ability| ability == request.ability) else {
            warn!("tick {tick} of {prediction_id} names {:?}", request.ability);
            return Vec::new();
        };
        if tick > ability.def().ticks {
            warn!("{ability:?} has no tick {tick}");
            return Vec::new();
        }
        if self.ledger.contains(prediction_id, tick) {
            debug!("dropping repeated tick {tick} of {prediction_id}");
            return Vec::new();
        }
        if tick > self.reached_tick {
            debug!("buffering tick {tick} of {prediction_id}, at {}", self.reached_tick);
            self.buffer.park_params(prediction_id, tick, request.params.clone());
            return Vec::new();
        }
        if self.buffer.take_tick(prediction_id, tick) {
            self.ledger.record(prediction_id, tick);
            return vec![apply_tick(handler, ability, prediction_id, tick, &request.params)];
        }
        debug!("tick {tick} of {prediction_id} is no longer awaited");
        Vec::new()
    }

    pub fn handle_cancel_request(
        &mut self,
        handler: &mut AbilityHandler,
        request: &CancelRequest,
        now: Duration,
    ) -> Result<Vec<Outbound>, CancelFailReason> {
        if handler.role != NetRole::Authority {
            return Err(CancelFailReason::NetRole);
        }
        let casting = handler.casting();
        if !casting.is_active() {
            return Err(CancelFailReason::NotCasting);
        }
        if casting.prediction_id != request.cancelled_cast_id {
            return Err(CancelFailReason::Mismatch);
        }
        let event = handler.cancel_cast(now).ok_or(CancelFailReason::NotCasting)?;
        self.stop_cast(event.cancelled_cast_id);
        Ok(vec![Outbound::Cancelled(event)])
    }

    pub fn interrupt_current_cast(
        &mut self,
        handler: &mut AbilityHandler,
        applied_by: Option<Entity>,
        source: InterruptSource,
        ignore_restrictions: bool,
        now: Duration,
    ) -> Result<Vec<Outbound>, InterruptFailReason> {
        if handler.role != NetRole::Authority {
            return Err(InterruptFailReason::NetRole);
        }
        let casting = handler.casting();
        if !casting.is_active() {
            return Err(InterruptFailReason::NotCasting);
        }
        if !casting.interruptible && !ignore_restrictions {
            return Err(InterruptFailReason::Restricted);
        }
        let event = handler.interrupt_cast(applied_by, source, now).ok_or(InterruptFailReason::NotCasting)?;
        self.stop_cast(event.cancelled_cast_id);
        Ok(vec![Outbound::Interrupted(event)])
    }

    fn stop_cast(&mut self, prediction_id: PredictionId) {
        self.buffer.purge(prediction_id);
        if prediction_id == self.current_cast {
            self.cast_stopped = true;
        }
    }

    /// Ability use originated by the server itself, carrying no prediction
    pub fn use_ability(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        ability: AbilityType,
        config: &AbilityConfig,
        now: Duration,
    ) -> Result<Vec<Outbound>, CastFailReason> {
        if handler.role != NetRole::Authority {
            return Err(CastFailReason::NetRole);
        }
        validate_use(handler, authorities, ability, now)?;
        let (_, outbound) =
            commit(handler, authorities, ability, PredictionId::AUTHORITY, now, &TickParams::default(), config, now);
        Ok(outbound)
    }

    /// Run every timer due by `now`
    pub fn update(&mut self, handler: &mut AbilityHandler, now: Duration) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        while let Some(action) = handler.pop_due(now) {
            match action {
                TimerAction::GcdEnd => handler.end_gcd(),
                TimerAction::CastTick => outbound.extend(self.server_tick(handler)),
                TimerAction::QueueExpire => {}
            }
        }
        outbound
    }

    fn server_tick(&mut self, handler: &mut AbilityHandler) -> Vec<Outbound> {
        let Some(tick) = handler.advance_tick() else { return Vec::new() };
        let mut outbound = Vec::new();
        if tick.prediction_id.is_predicted() {
            self.reached_tick = tick.tick;
            match self.buffer.take_params(tick.prediction_id, tick.tick) {
                Some(params) => {
                    self.ledger.record(tick.prediction_id, tick.tick);
                    outbound.push(apply_tick(handler, tick.ability, tick.prediction_id, tick.tick, &params));
                }
                None => {
                    trace!("tick {} of {} awaits params", tick.tick, tick.prediction_id);
                    self.buffer.park_tick(tick.prediction_id, tick.tick);
                }
            }
            self.buffer.prune(self.current_cast, self.reached_tick);
        } else {
            outbound.push(apply_tick(handler, tick.ability, tick.prediction_id, tick.tick, &TickParams::default()));
        }
        if tick.last {
            handler.complete_cast();
            outbound.push(Outbound::CastState { prediction_id: tick.prediction_id, state: *handler.casting() });
        }
        outbound
    }
}
