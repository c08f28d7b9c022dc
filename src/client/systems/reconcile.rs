use std::time::Duration;

use bevy::prelude::*;

use crate::{
    client::components::PredictionState,
    common::{
        components::{ability::CasterState, handler::AbilityHandler, prediction::PredictionId},
        error::CastFailReason,
        message::{AbilityEvent, InterruptEvent, ServerResult},
        resources::AbilityConfig,
        systems::combat::authorities::{Authorities, ClockAuthority},
    },
};

/// A local state predicted after `result` that also begins after the server's
/// window for it ended is not affected by that result
fn supersedes(active: bool, local_id: PredictionId, local_start: Duration, result_id: PredictionId, server_end: Option<Duration>) -> bool {
    active && local_id > result_id && server_end.is_none_or(|end| local_start >= end)
}

impl PredictionState {
    /// Correct speculative state with the authority's verdict on one prediction
    pub fn on_result(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        result: &ServerResult,
        config: &AbilityConfig,
        clock: &dyn ClockAuthority,
    ) {
        let now = clock.now();
        let mark = handler.events_len();
        let prediction_id = result.prediction_id;
        if !result.success && prediction_id <= self.last_acked {
            debug!("ignoring failure for {prediction_id}, already answered up to {}", self.last_acked);
            return;
        }

        // a cast only we predicted, still owed its result, that nothing here stopped
        let restartable = self.pending.get(&prediction_id).is_some_and(|pending| pending.predicted_cast.is_some())
            && !self.stopped.contains(&prediction_id);
        let settled = self.acknowledge(prediction_id);
        trace!("{prediction_id} settled {settled} pending predictions");

        self.reconcile_gcd(handler, result, now);
        self.reconcile_cast(handler, &authorities.caster, result, restartable, clock);

        if result.success {
            authorities.update_from_server(prediction_id, result.ability, result.charges_spent, &result.costs);
        } else {
            let reason = result.fail_reason.unwrap_or_else(|| {
                warn!("failed result for {prediction_id} without a reason");
                CastFailReason::InvalidAbility
            });
            self.unwind(handler, authorities, prediction_id, reason);
        }

        self.settle(handler, authorities, config, clock, mark);
    }

    fn reconcile_gcd(&mut self, handler: &mut AbilityHandler, result: &ServerResult, now: Duration) {
        let local = *handler.gcd();
        if supersedes(local.is_active(), local.prediction_id, local.start, result.prediction_id, result.gcd_end()) {
            return;
        }
        if result.gcd_activated {
            handler.confirm_gcd(result.prediction_id, result.client_start_time, result.gcd_length, now);
        } else if local.is_active() && local.prediction_id == result.prediction_id {
            handler.end_gcd();
        }
    }

    fn reconcile_cast(
        &mut self,
        handler: &mut AbilityHandler,
        caster: &CasterState,
        result: &ServerResult,
        restartable: bool,
        clock: &dyn ClockAuthority,
    ) {
        let local = *handler.casting();
        if local.is_active() && local.prediction_id != result.prediction_id {
            // a newer cast is settled by its own result, which follows this one
            if local.prediction_id > result.prediction_id || !result.success {
                return;
            }
            debug!("{} overtaken by {}", local.prediction_id, result.prediction_id);
            handler.end_cast();
        }

        if handler.casting().is_active() && !result.cast_activated {
            handler.end_cast();
            return;
        }
        if !handler.casting().is_active() {
            if !(result.success && result.cast_activated && restartable) { return; }
            if self.pending.values().any(|pending| pending.predicted_cast.is_some()) { return; }
            if !handler.abilities().contains(result.ability) { return; }
            let started = handler.start_cast(
                result.ability,
                result.prediction_id,
                result.client_start_time,
                result.cast_length,
                true,
                result.interruptible,
            );
            if !started { return; }
            debug!("restarting {} from its result", result.prediction_id);
        }

        let owed = handler.confirm_cast(result.client_start_time, result.cast_length, result.interruptible, clock.now());
        if owed > 0 {
            debug!("{} catching up {owed} ticks", result.prediction_id);
        }
        for _ in 0..owed {
            if !handler.casting().is_active() { break; }
            self.predicted_tick(handler, caster, clock);
        }
        handler.rearm_ticks();
    }

    /// Revert exactly what was predicted for `prediction_id`
    fn unwind(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        prediction_id: PredictionId,
        reason: CastFailReason,
    ) {
        if handler.gcd().is_active() && handler.gcd().prediction_id == prediction_id {
            handler.end_gcd();
        }
        if handler.casting().is_active() && handler.casting().prediction_id == prediction_id {
            handler.end_cast();
        }
        authorities.rollback(prediction_id);
        self.pending.remove(&prediction_id);
        debug!("mispredicted {prediction_id}: {reason}");
        handler.emit(AbilityEvent::Mispredicted { prediction_id, reason });
    }

    /// The authority interrupted our cast; the queue may be waiting on it
    pub fn on_interrupt(
        &mut self,
        handler: &mut AbilityHandler,
        authorities: &mut Authorities,
        event: &InterruptEvent,
        config: &AbilityConfig,
        clock: &dyn ClockAuthority,
    ) {
        let mark = handler.events_len();
        if handler.apply_interrupt(event) {
            self.stopped.insert(event.cancelled_cast_id);
            debug!("{} interrupted by {:?}", event.cancelled_cast_id, event.source);
            self.settle(handler, authorities, config, clock, mark);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{
            components::Outgoing,
            systems::pipeline::tests::{ms, Actor},
        },
        common::{
            components::{
                ability::AbilityType,
                resources::{ResourceCost, ResourceKind},
            },
            message::InterruptSource,
        },
    };

    fn accepted(ability: AbilityType, id: u32, start: Duration) -> ServerResult {
        let def = ability.def();
        let config = AbilityConfig::default();
        ServerResult {
            prediction_id: PredictionId(id),
            ability,
            success: true,
            fail_reason: None,
            gcd_activated: def.on_gcd,
            gcd_length: if def.on_gcd { config.gcd_length(def.gcd) } else { Duration::ZERO },
            cast_activated: def.ticks > 0,
            cast_length: if def.ticks > 0 { config.cast_length(def.cast) } else { Duration::ZERO },
            interruptible: def.interruptible,
            charges_spent: def.charge_cost,
            costs: def.costs.to_vec(),
            client_start_time: start,
        }
    }

    fn rejected(ability: AbilityType, id: u32, reason: CastFailReason) -> ServerResult {
        ServerResult {
            success: false,
            fail_reason: Some(reason),
            gcd_activated: false,
            gcd_length: Duration::ZERO,
            cast_activated: false,
            cast_length: Duration::ZERO,
            charges_spent: 0,
            costs: Vec::new(),
            ..accepted(ability, id, Duration::ZERO)
        }
    }

    impl Actor {
        fn on_result(&mut self, result: &ServerResult, now: Duration) {
            let mut authorities = Authorities::of(
                Some(&mut self.pool), Some(&mut self.charges), None, Some(&self.cc), CasterState::default());
            self.state.on_result(&mut self.handler, &mut authorities, result, &self.config, &now);
        }

        fn mispredictions(&mut self) -> Vec<(PredictionId, CastFailReason)> {
            self.handler.drain_events().into_iter()
                .filter_map(|event| match event {
                    AbilityEvent::Mispredicted { prediction_id, reason } => Some((prediction_id, reason)),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn test_rejected_prediction_reverts_exactly_once() {
        let mut actor = Actor::new();
        for id in 1..5 {
            actor.state.ids.next();
            actor.on_result(&accepted(AbilityType::Strike, id, ms(0)), ms(0));
        }
        actor.handler.end_gcd();
        actor.handler.drain_events();

        let id = actor.use_ability(AbilityType::Siphon, ms(5000)).unwrap();
        assert_eq!(id, PredictionId(5));
        assert_eq!(actor.pool.step(ResourceKind::Mana), 85.);

        actor.on_result(&rejected(AbilityType::Siphon, 5, CastFailReason::CostsNotMet), ms(5100));

        assert!(!actor.handler.gcd().is_active());
        assert!(!actor.handler.casting().is_active());
        assert_eq!(actor.pool.step(ResourceKind::Mana), 100.);
        assert!(actor.state.pending.is_empty());
        assert_eq!(actor.mispredictions(), vec![(PredictionId(5), CastFailReason::CostsNotMet)]);

        // a duplicate delivery changes nothing further
        actor.on_result(&rejected(AbilityType::Siphon, 5, CastFailReason::CostsNotMet), ms(5200));
        assert_eq!(actor.pool.step(ResourceKind::Mana), 100.);
    }

    #[test]
    fn test_rejection_leaves_other_predictions_alone() {
        let mut actor = Actor::new();
        let dash = actor.use_ability(AbilityType::Dash, ms(0)).unwrap();
        let strike = actor.use_ability(AbilityType::Strike, ms(10)).unwrap();
        assert_eq!(actor.charges.step(AbilityType::Dash), 1);

        actor.on_result(&rejected(AbilityType::Strike, strike.0, CastFailReason::Restricted), ms(50));

        assert_eq!(actor.charges.step(AbilityType::Dash), 1);
        assert_eq!(actor.pool.step(ResourceKind::Stamina), 100.);
        assert!(!actor.handler.gcd().is_active());
        // the cumulative ack settled the dash too
        assert!(!actor.state.pending.contains_key(&dash));
    }

    #[test]
    fn test_newer_prediction_survives_older_result() {
        let mut actor = Actor::new();
        actor.use_ability(AbilityType::Strike, ms(0)).unwrap();
        actor.update(ms(1000));
        let six = actor.use_ability(AbilityType::Siphon, ms(1000)).unwrap();

        // 5's window is [0, 1000); 6 began at 1000
        actor.on_result(&accepted(AbilityType::Strike, 1, ms(0)), ms(1100));

        let gcd = actor.handler.gcd();
        assert!(gcd.is_active());
        assert_eq!(gcd.prediction_id, six);
        assert!(!gcd.is_confirmed());
        assert_eq!(actor.handler.casting().prediction_id, six);
        assert!(actor.state.pending.contains_key(&six));
    }

    #[test]
    fn test_results_out_of_order_keep_newest_state() {
        let mut actor = Actor::new();
        actor.use_ability(AbilityType::Strike, ms(0)).unwrap();
        actor.update(ms(1000));
        let six = actor.use_ability(AbilityType::Siphon, ms(1000)).unwrap();

        actor.on_result(&accepted(AbilityType::Siphon, six.0, ms(1000)), ms(1100));
        actor.on_result(&accepted(AbilityType::Strike, 1, ms(0)), ms(1150));

        assert!(actor.handler.gcd().is_confirmed());
        assert_eq!(actor.handler.gcd().prediction_id, six);
        assert!(actor.handler.casting().is_confirmed());
        assert_eq!(actor.handler.casting().prediction_id, six);
        assert!(actor.state.pending.is_empty());
        assert_eq!(actor.pool.state(ResourceKind::Stamina), 90.);
        assert_eq!(actor.pool.state(ResourceKind::Mana), 85.);
    }

    #[test]
    fn test_result_purges_pending_up_to_its_id() {
        let mut actor = Actor::new();
        let ids = [
            actor.use_ability(AbilityType::Dash, ms(0)).unwrap(),
            actor.use_ability(AbilityType::Strike, ms(0)).unwrap(),
        ];
        actor.update(ms(1000));
        let third = actor.use_ability(AbilityType::Dash, ms(1000)).unwrap();

        actor.on_result(&accepted(AbilityType::Strike, ids[1].0, ms(0)), ms(1000));
        assert_eq!(actor.state.pending.keys().copied().collect::<Vec<_>>(), vec![third]);
    }

    #[test]
    fn test_confirmed_length_catches_up_missed_ticks() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Siphon, ms(100)).unwrap();
        actor.update(ms(600));
        assert_eq!(actor.handler.casting().elapsed_ticks, 1);
        actor.state.drain_outgoing();

        // the authority backdated the cast to 0 and gave it 1s: ticks every 250ms
        let result = ServerResult { cast_length: ms(1000), ..accepted(AbilityType::Siphon, id.0, ms(0)) };
        actor.on_result(&result, ms(800));
        assert_eq!(actor.sent_ticks(), vec![(id, 2), (id, 3)]);
        assert_eq!(actor.handler.casting().end, Some(ms(1000)));
        assert_eq!(actor.handler.next_tick_at(), Some(ms(1000)));

        actor.update(ms(1000));
        assert_eq!(actor.sent_ticks(), vec![(id, 4)]);
        assert!(!actor.handler.casting().is_active());
    }

    #[test]
    fn test_longer_authoritative_cast_spreads_remaining_ticks() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Siphon, ms(0)).unwrap();
        actor.update(ms(500));
        actor.sent_ticks();

        // a slow on the authority stretched the channel to 3s: ticks every 750ms
        let result = ServerResult { cast_length: ms(3000), ..accepted(AbilityType::Siphon, id.0, ms(0)) };
        actor.on_result(&result, ms(600));
        assert!(actor.sent_ticks().is_empty());
        assert_eq!(actor.handler.casting().end, Some(ms(3000)));
        assert_eq!(actor.handler.next_tick_at(), Some(ms(1500)));

        actor.update(ms(2000));
        assert_eq!(actor.sent_ticks(), vec![(id, 2)]);
        assert!(actor.handler.casting().is_active());

        actor.update(ms(3000));
        assert_eq!(actor.sent_ticks(), vec![(id, 3), (id, 4)]);
        assert!(!actor.handler.casting().is_active());
    }

    #[test]
    fn test_elapsed_gcd_window_ends_immediately() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Strike, ms(0)).unwrap();
        actor.on_result(&accepted(AbilityType::Strike, id.0, ms(0)), ms(1200));
        assert!(!actor.handler.gcd().is_active());
    }

    #[test]
    fn test_locally_cancelled_cast_is_not_restarted() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Siphon, ms(0)).unwrap();
        actor.cancel(ms(100)).unwrap();
        actor.state.drain_outgoing();

        actor.on_result(&accepted(AbilityType::Siphon, id.0, ms(0)), ms(150));
        assert!(!actor.handler.casting().is_active());
        actor.update(ms(3000));
        assert!(actor.state.drain_outgoing().iter().all(|outgoing| !matches!(outgoing, Outgoing::Use(_))));
    }

    #[test]
    fn test_older_result_leaves_overlapping_newer_cast() {
        let mut actor = Actor::new();
        actor.use_ability(AbilityType::Siphon, ms(0)).unwrap();
        actor.update(ms(2000));
        let second = actor.use_ability(AbilityType::Siphon, ms(2000)).unwrap();
        actor.sent_ticks();

        // the authority ran the first cast over [300, 2300), past the second's local start
        actor.on_result(&accepted(AbilityType::Siphon, 1, ms(300)), ms(2100));
        assert!(actor.handler.casting().is_active());
        assert_eq!(actor.handler.casting().prediction_id, second);

        actor.on_result(&accepted(AbilityType::Siphon, second.0, ms(2300)), ms(2400));
        assert_eq!(actor.handler.casting().start, ms(2300));
        assert!(actor.handler.casting().is_confirmed());

        actor.update(ms(4300));
        assert_eq!(actor.sent_ticks(), vec![(second, 1), (second, 2), (second, 3), (second, 4)]);
        assert!(!actor.handler.casting().is_active());
    }

    #[test]
    fn test_idle_cast_restarts_from_its_result() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Siphon, ms(0)).unwrap();
        actor.handler.end_cast();
        actor.sent_ticks();

        actor.on_result(&accepted(AbilityType::Siphon, id.0, ms(100)), ms(900));
        let casting = actor.handler.casting();
        assert!(casting.is_active() && casting.is_confirmed());
        assert_eq!(casting.prediction_id, id);
        assert_eq!(actor.sent_ticks(), vec![(id, 1)]);
        assert_eq!(actor.handler.next_tick_at(), Some(ms(1100)));

        actor.update(ms(2100));
        assert_eq!(actor.sent_ticks(), vec![(id, 2), (id, 3), (id, 4)]);
    }

    #[test]
    fn test_completed_cast_is_not_restarted() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Siphon, ms(0)).unwrap();
        actor.update(ms(2000));
        actor.sent_ticks();

        actor.on_result(&accepted(AbilityType::Siphon, id.0, ms(150)), ms(2050));
        assert!(!actor.handler.casting().is_active());
        actor.update(ms(3000));
        assert!(actor.sent_ticks().is_empty());
    }

    #[test]
    fn test_failure_for_answered_id_is_ignored() {
        let mut actor = Actor::new();
        let first = actor.use_ability(AbilityType::Strike, ms(0)).unwrap();
        actor.on_result(&accepted(AbilityType::Strike, first.0, ms(0)), ms(50));
        actor.update(ms(1000));
        let second = actor.use_ability(AbilityType::Strike, ms(1000)).unwrap();
        actor.handler.drain_events();

        // a replay of the first request answered long after it left the server's ledger
        actor.on_result(&rejected(AbilityType::Strike, first.0, CastFailReason::Stale), ms(1100));

        assert!(actor.mispredictions().is_empty());
        assert_eq!(actor.handler.gcd().prediction_id, second);
        assert!(actor.state.pending.contains_key(&second));
        assert_eq!(actor.pool.state(ResourceKind::Stamina), 90.);
        assert_eq!(actor.pool.step(ResourceKind::Stamina), 80.);
    }

    #[test]
    fn test_authoritative_costs_replace_prediction() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Strike, ms(0)).unwrap();
        let result = ServerResult {
            costs: vec![ResourceCost { kind: ResourceKind::Stamina, amount: 4. }],
            ..accepted(AbilityType::Strike, id.0, ms(0))
        };
        actor.on_result(&result, ms(50));
        assert_eq!(actor.pool.state(ResourceKind::Stamina), 96.);
        assert_eq!(actor.pool.step(ResourceKind::Stamina), 96.);
    }

    #[test]
    fn test_interrupt_releases_queue() {
        let mut actor = Actor::new();
        let id = actor.use_ability(AbilityType::Siphon, ms(0)).unwrap();
        actor.on_result(&accepted(AbilityType::Siphon, id.0, ms(0)), ms(50));
        actor.update(ms(1000));
        actor.state.drain_outgoing();

        actor.request(AbilityType::Dash, ms(1850)).unwrap();
        let event = InterruptEvent {
            ability: AbilityType::Siphon,
            cancelled_cast_id: id,
            cast_start: ms(0),
            cast_end: Some(ms(2000)),
            interrupt_time: ms(1900),
            elapsed_ticks: 3,
            applied_by: None,
            source: InterruptSource::Death,
        };
        let mut authorities = Authorities::of(
            Some(&mut actor.pool), Some(&mut actor.charges), None, Some(&actor.cc), CasterState::default());
        actor.state.on_interrupt(&mut actor.handler, &mut authorities, &event, &actor.config, &ms(1900));

        assert!(!actor.handler.casting().is_active());
        assert_eq!(actor.sent_ticks(), vec![(PredictionId(2), 0)]);
    }
}
