use std::time::Duration;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::{
    components::{
        ability::{Abilities, AbilityHooks, AbilityType, TickParams},
        casting::CastingState,
        gcd::GlobalCooldown,
        prediction::PredictionId,
    },
    message::{AbilityEvent, CancelEvent, InterruptEvent, InterruptSource, TickBroadcast},
    systems::combat::{
        scheduler::{TimerAction, TimerHandle, Timers},
        ticks::{tick_interval, TickScheduler},
    },
};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum NetRole {
    /// The server's copy of an actor
    #[default]
    Authority,
    /// The owning client's copy, which predicts its own ability use
    Predicting,
    /// Any other client's copy, which only applies broadcasts
    Simulated,
}

/// One tick produced by the active cast
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CastTick {
    pub ability: AbilityType,
    pub prediction_id: PredictionId,
    pub tick: u32,
    pub last: bool,
}

/// Owns every piece of an actor's ability state: known abilities, the cast and
/// GCD state machines, and the timers driving them. Role-specific code
/// (client prediction, server authority) drives it through these methods and
/// collaborators observe it only through the events it raises.
#[derive(Component, Debug, Default)]
pub struct AbilityHandler {
    pub role: NetRole,
    /// Set on the authority when a remote client predicts this actor
    pub predicted_remotely: bool,
    abilities: Abilities,
    casting: CastingState,
    gcd: GlobalCooldown,
    timers: Timers,
    ticks: TickScheduler,
    gcd_timer: Option<TimerHandle>,
    events: Vec<AbilityEvent>,
}

impl AbilityHandler {
    pub fn new(role: NetRole) -> Self {
        Self { role, ..default() }
    }

    pub fn with_abilities(mut self, abilities: impl IntoIterator<Item = AbilityType>) -> Self {
        self.abilities = abilities.into_iter().collect();
        self
    }

    pub fn abilities(&self) -> &Abilities {
        &self.abilities
    }

    pub fn casting(&self) -> &CastingState {
        &self.casting
    }

    pub fn gcd(&self) -> &GlobalCooldown {
        &self.gcd
    }

    pub fn add_ability(&mut self, ability: AbilityType) -> bool {
        let added = self.abilities.insert(ability);
        if added {
            self.emit(AbilityEvent::Added(ability));
        }
        added
    }

    /// Forget an ability; a cast of it in progress is ended
    pub fn remove_ability(&mut self, ability: AbilityType) -> bool {
        let removed = self.abilities.remove(ability);
        if removed {
            if self.casting.ability == Some(ability) {
                self.end_cast();
            }
            self.emit(AbilityEvent::Removed(ability));
        }
        removed
    }

    /// Enter the GCD. Unconfirmed cooldowns still end on a local timer after `length`.
    pub fn start_gcd(
        &mut self,
        prediction_id: PredictionId,
        start: Duration,
        length: Duration,
        confirmed: bool,
        now: Duration,
    ) {
        let previous = self.gcd;
        self.gcd.start(prediction_id, start, confirmed.then_some(length));
        self.arm_gcd_timer(start + length, now);
        self.emit(AbilityEvent::GlobalCooldownChanged { previous, current: self.gcd });
    }

    /// Adopt the authority's GCD window, ending it at once if it already elapsed
    pub fn confirm_gcd(&mut self, prediction_id: PredictionId, start: Duration, length: Duration, now: Duration) {
        if start + length <= now {
            self.end_gcd();
            return;
        }
        self.start_gcd(prediction_id, start, length, true, now);
    }

    pub fn end_gcd(&mut self) {
        if !self.gcd.is_active() { return; }
        if let Some(handle) = self.gcd_timer.take() {
            self.timers.cancel(handle);
        }
        let previous = self.gcd;
        self.gcd.end();
        self.emit(AbilityEvent::GlobalCooldownChanged { previous, current: self.gcd });
    }

    fn arm_gcd_timer(&mut self, end: Duration, now: Duration) {
        if let Some(handle) = self.gcd_timer.take() {
            self.timers.cancel(handle);
        }
        self.gcd_timer = Some(self.timers.schedule_at(end.max(now), None, TimerAction::GcdEnd));
    }

    /// Enter a channel and arm its tick timer. Returns false for abilities that cannot channel.
    #[allow(clippy::too_many_arguments)]
    pub fn start_cast(
        &mut self,
        ability: AbilityType,
        prediction_id: PredictionId,
        start: Duration,
        length: Duration,
        confirmed: bool,
        interruptible: bool,
    ) -> bool {
        let Some(interval) = tick_interval(length, ability.def().ticks) else {
            warn!("{ability:?} cannot channel over {length:?}");
            return false;
        };
        let previous = self.casting;
        self.casting.start(ability, prediction_id, start, confirmed.then_some(length), interruptible);
        self.ticks.arm(&mut self.timers, start, interval, 0);
        self.emit(AbilityEvent::CastStateChanged { previous, current: self.casting });
        true
    }

    /// Adopt the authority's cast window. The tick timer is stopped and the number
    /// of ticks owed under the new timing returned; the caller runs them through
    /// `advance_tick` and then calls `rearm_ticks`.
    pub fn confirm_cast(&mut self, start: Duration, length: Duration, interruptible: bool, now: Duration) -> u32 {
        let Some(ability) = self.casting.ability else { return 0 };
        let total = ability.def().ticks;
        let Some(interval) = tick_interval(length, total) else { return 0 };
        let previous = self.casting;
        self.casting.confirm(start, length, interruptible);
        let owed = self.ticks.resync(&mut self.timers, now, start, interval, self.casting.elapsed_ticks, total);
        self.emit(AbilityEvent::CastStateChanged { previous, current: self.casting });
        owed
    }

    pub fn rearm_ticks(&mut self) {
        if !self.casting.is_active() { return; }
        let interval = self.ticks.interval();
        self.ticks.arm(&mut self.timers, self.casting.start, interval, self.casting.elapsed_ticks);
    }

    pub fn advance_tick(&mut self) -> Option<CastTick> {
        let ability = self.casting.ability?;
        let total = ability.def().ticks;
        let tick = self.casting.tick(total)?;
        Some(CastTick {
            ability,
            prediction_id: self.casting.prediction_id,
            tick,
            last: tick >= total,
        })
    }

    pub fn end_cast(&mut self) {
        if !self.casting.is_active() { return; }
        self.ticks.cancel(&mut self.timers);
        let previous = self.casting;
        self.casting.end();
        self.emit(AbilityEvent::CastStateChanged { previous, current: self.casting });
    }

    pub fn complete_cast(&mut self) {
        if let Some(ability) = self.casting.ability {
            ability.cast_complete();
        }
        self.end_cast();
    }

    pub fn cancel_cast(&mut self, now: Duration) -> Option<CancelEvent> {
        let ability = self.casting.ability?;
        let event = CancelEvent {
            ability,
            cancelled_cast_id: self.casting.prediction_id,
            cast_start: self.casting.start,
            cast_end: self.casting.end,
            cancel_time: now,
            elapsed_ticks: self.casting.elapsed_ticks,
        };
        ability.cast_cancelled(&event);
        self.end_cast();
        self.emit(AbilityEvent::Cancelled(event.clone()));
        Some(event)
    }

    pub fn interrupt_cast(
        &mut self,
        applied_by: Option<Entity>,
        source: InterruptSource,
        now: Duration,
    ) -> Option<InterruptEvent> {
        let ability = self.casting.ability?;
        let event = InterruptEvent {
            ability,
            cancelled_cast_id: self.casting.prediction_id,
            cast_start: self.casting.start,
            cast_end: self.casting.end,
            interrupt_time: now,
            elapsed_ticks: self.casting.elapsed_ticks,
            applied_by,
            source,
        };
        ability.cast_interrupted(&event);
        self.end_cast();
        self.emit(AbilityEvent::Interrupted(event.clone()));
        Some(event)
    }

    pub fn emit_tick(&mut self, tick: &CastTick, params: TickParams) {
        self.emit(AbilityEvent::Tick {
            ability: tick.ability,
            prediction_id: tick.prediction_id,
            tick: tick.tick,
            params,
        });
    }

    /// Next timer action due by `now`
    pub fn pop_due(&mut self, now: Duration) -> Option<TimerAction> {
        let (handle, action) = self.timers.pop_due(now)?;
        if action == TimerAction::GcdEnd && self.gcd_timer == Some(handle) {
            self.gcd_timer = None;
        }
        Some(action)
    }

    pub fn schedule(&mut self, now: Duration, delay: Duration, action: TimerAction) -> TimerHandle {
        self.timers.schedule(now, delay, None, action)
    }

    pub fn cancel_timer(&mut self, handle: TimerHandle) {
        self.timers.cancel(handle);
    }

    pub fn next_tick_at(&self) -> Option<Duration> {
        self.ticks.next_tick_at(&self.timers)
    }

    pub fn emit(&mut self, event: AbilityEvent) {
        self.events.push(event);
    }

    pub fn events_len(&self) -> usize {
        self.events.len()
    }

    pub fn events_since(&self, mark: usize) -> &[AbilityEvent] {
        self.events.get(mark..).unwrap_or_default()
    }

    pub fn drain_events(&mut self) -> Vec<AbilityEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replicated cast state for actors this process does not drive
    pub fn apply_cast_state(&mut self, state: CastingState) {
        if self.casting == state { return; }
        let previous = self.casting;
        self.casting = state;
        self.emit(AbilityEvent::CastStateChanged { previous, current: self.casting });
    }

    pub fn apply_tick(&mut self, tick: &TickBroadcast) {
        tick.ability.simulated_tick(tick.tick, &tick.params);
        if self.casting.is_active() && self.casting.prediction_id == tick.prediction_id {
            self.casting.elapsed_ticks = self.casting.elapsed_ticks.max(tick.tick);
        }
        self.emit(AbilityEvent::Tick {
            ability: tick.ability,
            prediction_id: tick.prediction_id,
            tick: tick.tick,
            params: tick.params.clone(),
        });
    }

    /// Ignored unless `event` names the cast in progress
    pub fn apply_cancel(&mut self, event: &CancelEvent) -> bool {
        if !self.casting.is_active() || self.casting.prediction_id != event.cancelled_cast_id {
            return false;
        }
        event.ability.cast_cancelled(event);
        self.end_cast();
        self.emit(AbilityEvent::Cancelled(event.clone()));
        true
    }

    /// Ignored unless `event` names the cast in progress
    pub fn apply_interrupt(&mut self, event: &InterruptEvent) -> bool {
        if !self.casting.is_active() || self.casting.prediction_id != event.cancelled_cast_id {
            return false;
        }
        event.ability.cast_interrupted(event);
        self.end_cast();
        self.emit(AbilityEvent::Interrupted(event.clone()));
        true
    }
}
