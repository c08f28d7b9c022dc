use bevy::prelude::*;

use crate::{
    client::components::{Outgoing, PendingPrediction, PredictionState},
    common::{
        components::{
            ability::{AbilityHooks, AbilityType, CasterState, CastType, TickParams},
            ability_queue::QueueStatus,
            handler::{AbilityHandler, CastTick, NetRole},
            prediction::PredictionId,
        },
        error::{CancelFailReason, CastFailReason},
        message::{AbilityEvent, AbilityUseRequest, CancelRequest},
        resources::AbilityConfig,
        systems::combat::{
            authorities::{Authorities, ClockAuthority},
            scheduler::TimerAction,
            validation::validate_use,
        },
    },
};

/// What became of a use request from player input
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UseOutcome {
    Sent(PredictionId),
    Queued(QueueStatus),
}

impl PredictionState {
    /// Validate locally, apply the use speculatively and send it for confirmation
    pub fn use_ability(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        ability: AbilityType,
        config: &AbilityConfig,
        clock: &dyn ClockAuthority,
    ) -> Result<PredictionId, CastFailReason> {
        if handler.role != NetRole::Predicting {
            return Err(CastFailReason::NetRole);
        }
        let now = clock.now();
        let def = validate_use(handler, authorities, ability, now)?;

        let prediction_id = self.ids.next();
        let predicted_gcd = def.on_gcd.then(|| authorities.gcd_length(ability, config));
        if let Some(length) = predicted_gcd {
            handler.start_gcd(prediction_id, now, length, false, now);
        }
        authorities.predict_commit(prediction_id, ability);

        let mut params = TickParams::default();
        let predicted_cast = match def.cast_type {
            CastType::Instant => {
                params = ability.predicted_tick(0, &authorities.caster);
                let tick = CastTick { ability, prediction_id, tick: 0, last: true };
                handler.emit_tick(&tick, params.clone());
                None
            }
            CastType::Channel => {
                let length = authorities.cast_length(ability, config);
                handler.start_cast(ability, prediction_id, now, length, false, def.interruptible);
                if def.initial_tick {
                    params = ability.predicted_tick(0, &authorities.caster);
                    let tick = CastTick { ability, prediction_id, tick: 0, last: false };
                    handler.emit_tick(&tick, params.clone());
                }
                Some(length)
            }
        };

        self.pending.insert(prediction_id, PendingPrediction {
            ability,
            prediction_id,
            client_timestamp: now,
            predicted_gcd,
            predicted_cast,
            predicted_costs: def.costs.to_vec(),
        });
        debug!("predicted {ability:?} as {prediction_id}");
        self.send(Outgoing::Use(AbilityUseRequest {
            ability,
            prediction_id,
            tick: 0,
            client_timestamp: now,
            params,
        }));
        Ok(prediction_id)
    }

    /// Player input: use now, or queue behind a GCD or cast that is about to end
    pub fn request_ability(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        ability: AbilityType,
        config: &AbilityConfig,
        clock: &dyn ClockAuthority,
    ) -> Result<UseOutcome, CastFailReason> {
        match self.use_ability(handler, authorities, ability, config, clock) {
            Ok(prediction_id) => Ok(UseOutcome::Sent(prediction_id)),
            Err(reason @ (CastFailReason::OnGlobalCooldown | CastFailReason::AlreadyCasting)) => {
                match self.queue.try_queue(handler, ability, clock.now(), config.queue_window) {
                    Ok(status) => {
                        debug!("queued {ability:?}: {status:?}");
                        Ok(UseOutcome::Queued(status))
                    }
                    Err(refusal) => {
                        debug!("not queueing {ability:?}: {refusal}");
                        Err(reason)
                    }
                }
            }
            Err(reason) => Err(reason),
        }
    }

    pub fn cancel_current_cast(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        config: &AbilityConfig,
        clock: &dyn ClockAuthority,
    ) -> Result<PredictionId, CancelFailReason> {
        if handler.role != NetRole::Predicting {
            return Err(CancelFailReason::NetRole);
        }
        let now = clock.now();
        let mark = handler.events_len();
        let Some(event) = handler.cancel_cast(now) else {
            return Err(CancelFailReason::NotCasting);
        };
        debug!("cancelled {:?} {}", event.ability, event.cancelled_cast_id);
        self.stopped.insert(event.cancelled_cast_id);
        let prediction_id = self.ids.next();
        self.send(Outgoing::Cancel(CancelRequest {
            prediction_id,
            cancelled_cast_id: event.cancelled_cast_id,
            timestamp: now,
        }));
        self.settle(handler, authorities, config, clock, mark);
        Ok(event.cancelled_cast_id)
    }

    /// Run every local timer due by now, in due order. Each GCD or cast ending
    /// reaches the queue before the next timer runs.
    pub fn update(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        config: &AbilityConfig,
        clock: &dyn ClockAuthority,
    ) {
        let now = clock.now();
        while let Some(action) = handler.pop_due(now) {
            let mark = handler.events_len();
            match action {
                TimerAction::GcdEnd => handler.end_gcd(),
                TimerAction::CastTick => self.predicted_tick(handler, &authorities.caster, clock),
                TimerAction::QueueExpire => {
                    if let Some(ability) = self.queue.expire() {
                        debug!("queued {ability:?} expired");
                    }
                    continue;
                }
            }
            self.settle(handler, authorities, config, clock, mark);
        }
    }

    /// Advance the local cast one tick, reporting it to the server
    pub(crate) fn predicted_tick(
        &mut self,
        handler: &mut AbilityHandler,
        caster: &CasterState,
        clock: &dyn ClockAuthority,
    ) {
        let Some(tick) = handler.advance_tick() else { return };
        let params = tick.ability.predicted_tick(tick.tick, caster);
        handler.emit_tick(&tick, params.clone());
        if tick.prediction_id.is_predicted() {
            self.send(Outgoing::Use(AbilityUseRequest {
                ability: tick.ability,
                prediction_id: tick.prediction_id,
                tick: tick.tick,
                client_timestamp: clock.now(),
                params,
            }));
        }
        if tick.last {
            self.stopped.insert(tick.prediction_id);
            handler.complete_cast();
        }
    }

    /// Feed GCD and cast endings raised since `mark` to the queue, firing what it releases
    pub(crate) fn settle(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        config: &AbilityConfig,
        clock: &dyn ClockAuthority,
        mark: usize,
    ) {
        let mut gcd_ended = false;
        let mut cast_ended = false;
        for event in handler.events_since(mark) {
            match event {
                AbilityEvent::GlobalCooldownChanged { previous, current } => {
                    gcd_ended |= previous.is_active() && !current.is_active();
                }
                AbilityEvent::CastStateChanged { previous, current } => {
                    cast_ended |= previous.is_active() && !current.is_active();
                }
                _ => {}
            }
        }

        let mut released = None;
        if gcd_ended {
            released = released.or(self.queue.on_gcd_end(handler));
        }
        if cast_ended {
            released = released.or(self.queue.on_cast_end(handler));
        }
        let Some(ability) = released else { return };
        match self.use_ability(handler, authorities, ability, config, clock) {
            Ok(prediction_id) => debug!("fired queued {ability:?} as {prediction_id}"),
            Err(reason) => debug!("queued {ability:?} failed: {reason}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::common::components::{
        charges::Charges,
        crowd_control::{CrowdControl, CrowdControlType},
        resources::{ResourceKind, ResourcePool},
    };

    pub fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    /// A predicting actor with every collaborator present
    pub struct Actor {
        pub handler: AbilityHandler,
        pub state: PredictionState,
        pub pool: ResourcePool,
        pub charges: Charges,
        pub cc: CrowdControl,
        pub config: AbilityConfig,
    }

    impl Actor {
        pub fn new() -> Self {
            Self {
                handler: AbilityHandler::new(NetRole::Predicting).with_abilities(AbilityType::ALL),
                state: PredictionState::default(),
                pool: ResourcePool::new(100., 100.),
                charges: Charges::for_abilities(AbilityType::ALL),
                cc: CrowdControl::default(),
                config: AbilityConfig::default(),
            }
        }

        pub fn use_ability(&mut self, ability: AbilityType, now: Duration) -> Result<PredictionId, CastFailReason> {
            let mut authorities = Authorities::of(
                Some(&mut self.pool), Some(&mut self.charges), None, Some(&self.cc), CasterState::default());
            self.state.use_ability(&mut self.handler, &mut authorities, ability, &self.config, &now)
        }

        pub fn request(&mut self, ability: AbilityType, now: Duration) -> Result<UseOutcome, CastFailReason> {
            let mut authorities = Authorities::of(
                Some(&mut self.pool), Some(&mut self.charges), None, Some(&self.cc), CasterState::default());
            self.state.request_ability(&mut self.handler, &mut authorities, ability, &self.config, &now)
        }

        pub fn cancel(&mut self, now: Duration) -> Result<PredictionId, CancelFailReason> {
            let mut authorities = Authorities::of(
                Some(&mut self.pool), Some(&mut self.charges), None, Some(&self.cc), CasterState::default());
            self.state.cancel_current_cast(&mut self.handler, &mut authorities, &self.config, &now)
        }

        pub fn update(&mut self, now: Duration) {
            let mut authorities = Authorities::of(
                Some(&mut self.pool), Some(&mut self.charges), None, Some(&self.cc), CasterState::default());
            self.state.update(&mut self.handler, &mut authorities, &self.config, &now);
        }

        pub fn sent_ticks(&mut self) -> Vec<(PredictionId, u32)> {
            self.state.drain_outgoing().into_iter()
                .filter_map(|outgoing| match outgoing {
                    Outgoing::Use(request) => Some((request.prediction_id, request.tick)),
                    Outgoing::Cancel(_) => None,
                })
                .collect()
        }
    }

    #[test]
    fn test_instant_predicts_gcd_cost_and_tick_zero() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Strike, ms(100)).unwrap();

        assert_eq!(id, PredictionId(1));
        let gcd = actor.handler.gcd();
        assert!(gcd.is_active() && !gcd.is_confirmed());
        assert_eq!(gcd.prediction_id, id);
        assert_eq!(actor.pool.step(ResourceKind::Stamina), 90.);
        assert_eq!(actor.pool.state(ResourceKind::Stamina), 100.);

        let pending = &actor.state.pending[&id];
        assert_eq!(pending.client_timestamp, ms(100));
        assert_eq!(pending.predicted_gcd, Some(ms(1000)));
        assert_eq!(pending.predicted_cast, None);

        match actor.state.drain_outgoing().as_slice() {
            [Outgoing::Use(request)] => {
                assert_eq!(request.tick, 0);
                assert_eq!(request.client_timestamp, ms(100));
                assert_eq!(request.params.magnitude(), Some(AbilityType::Strike.def().power));
            }
            other => panic!("unexpected outbox {other:?}"),
        }
    }

    #[test]
    fn test_only_predicting_role_uses_abilities() {
        let mut actor = Actor::new();
        actor.handler.role = NetRole::Simulated;
        assert_eq!(actor.use_ability(AbilityType::Strike, ms(0)), Err(CastFailReason::NetRole));
        assert!(actor.state.drain_outgoing().is_empty());
        assert_eq!(actor.state.ids.last(), PredictionId(0));
    }

    #[test]
    fn test_local_failure_sends_nothing() {
        let mut actor = Actor::new();
        actor.cc.apply(CrowdControlType::Silence);
        assert_eq!(actor.use_ability(AbilityType::Siphon, ms(0)), Err(CastFailReason::CrowdControlled));
        assert!(actor.state.pending.is_empty());
        assert!(actor.state.drain_outgoing().is_empty());
    }

    #[test]
    fn test_channel_sends_each_predicted_tick() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Siphon, ms(0)).unwrap();
        assert_eq!(actor.sent_ticks(), vec![(id, 0)]);

        for now in [500, 1000, 1500, 2000] {
            actor.update(ms(now));
        }
        assert_eq!(actor.sent_ticks(), vec![(id, 1), (id, 2), (id, 3), (id, 4)]);
        assert!(!actor.handler.casting().is_active());
        assert!(!actor.handler.gcd().is_active());
    }

    #[test]
    fn test_initial_tick_channel_predicts_tick_zero() {
        let mut actor = Actor::new();
        actor.use_ability(AbilityType::Bandage, ms(0)).unwrap();
        let ticks = actor.handler.drain_events().into_iter()
            .filter_map(|event| match event {
                AbilityEvent::Tick { tick, .. } => Some(tick),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(ticks, vec![0]);
    }

    #[test]
    fn test_cancel_sends_request_for_active_cast() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Siphon, ms(0)).unwrap();
        actor.state.drain_outgoing();

        assert_eq!(actor.cancel(ms(600)), Ok(id));
        assert!(!actor.handler.casting().is_active());
        match actor.state.drain_outgoing().as_slice() {
            [Outgoing::Cancel(request)] => {
                assert_eq!(request.cancelled_cast_id, id);
                assert_eq!(request.timestamp, ms(600));
                assert!(request.prediction_id > id);
            }
            other => panic!("unexpected outbox {other:?}"),
        }
        assert_eq!(actor.cancel(ms(700)), Err(CancelFailReason::NotCasting));
    }

    #[test]
    fn test_cancelled_cast_stops_ticking() {
        let mut actor = Actor::new();
        actor.use_ability(AbilityType::Siphon, ms(0)).unwrap();
        actor.update(ms(500));
        actor.cancel(ms(600)).unwrap();
        actor.sent_ticks();

        actor.update(ms(3000));
        assert!(actor.sent_ticks().is_empty());
    }

    #[test]
    fn test_input_on_unconfirmed_gcd_is_not_queued() {
        let mut actor = Actor::new();
        actor.use_ability(AbilityType::Strike, ms(0)).unwrap();
        assert_eq!(actor.request(AbilityType::Strike, ms(900)), Err(CastFailReason::OnGlobalCooldown));
        assert_eq!(actor.state.queue.status(), QueueStatus::Empty);
    }

    #[test]
    fn test_queued_ability_fires_when_gcd_ends() {
        let mut actor = Actor::new();
        actor.handler.start_gcd(PredictionId(1), ms(0), ms(1000), true, ms(0));
        actor.state.ids.next();

        assert_eq!(actor.request(AbilityType::Strike, ms(900)), Ok(UseOutcome::Queued(QueueStatus::WaitForGlobal)));
        assert!(actor.state.drain_outgoing().is_empty());

        actor.update(ms(1000));
        assert_eq!(actor.sent_ticks(), vec![(PredictionId(2), 0)]);
        assert_eq!(actor.state.queue.status(), QueueStatus::Empty);
        assert_eq!(actor.handler.gcd().prediction_id, PredictionId(2));
    }

    #[test]
    fn test_queued_ability_fires_when_gcd_end_and_expiry_share_a_frame() {
        let mut actor = Actor::new();
        actor.handler.start_gcd(PredictionId(1), ms(0), ms(1000), true, ms(0));
        actor.state.ids.next();

        // expiry at 1050; the next frame lands after both
        assert_eq!(actor.request(AbilityType::Strike, ms(850)), Ok(UseOutcome::Queued(QueueStatus::WaitForGlobal)));
        actor.update(ms(1060));

        assert_eq!(actor.sent_ticks(), vec![(PredictionId(2), 0)]);
        assert_eq!(actor.state.queue.status(), QueueStatus::Empty);
        let gcd = actor.handler.gcd();
        assert_eq!((gcd.prediction_id, gcd.start), (PredictionId(2), ms(1060)));
    }

    #[test]
    fn test_wait_for_both_fires_when_both_end_in_one_frame() {
        let mut actor = Actor::new();
        actor.handler.start_gcd(PredictionId(1), ms(0), ms(1000), true, ms(0));
        actor.handler.start_cast(AbilityType::Siphon, PredictionId(1), ms(0), ms(1100), true, true);
        actor.state.ids.next();
        actor.update(ms(900));
        actor.sent_ticks();

        assert_eq!(actor.request(AbilityType::Strike, ms(950)), Ok(UseOutcome::Queued(QueueStatus::WaitForBoth)));
        // GCD end, last tick and expiry all fall before this frame
        actor.update(ms(1200));

        assert_eq!(actor.sent_ticks(), vec![(PredictionId(1), 4), (PredictionId(2), 0)]);
        assert_eq!(actor.state.queue.status(), QueueStatus::Empty);
    }

    #[test]
    fn test_queued_ability_revalidates_when_fired() {
        let mut actor = Actor::new();
        actor.handler.start_gcd(PredictionId(1), ms(0), ms(1000), true, ms(0));
        actor.handler.start_cast(AbilityType::Siphon, PredictionId(1), ms(0), ms(2000), true, true);
        actor.state.ids.next();

        assert_eq!(actor.request(AbilityType::Dash, ms(1850)), Ok(UseOutcome::Queued(QueueStatus::WaitForCast)));
        actor.cc.apply(CrowdControlType::Root);
        actor.update(ms(2000));
        // the queued dash fired and failed on the root, nothing went out
        assert!(actor.sent_ticks().iter().all(|&(id, _)| id == PredictionId(1)));
        assert_eq!(actor.state.queue.status(), QueueStatus::Empty);
    }
}
