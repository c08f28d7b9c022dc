use bevy::prelude::*;

use crate::{
    client::{
        components::{Outgoing, PredictionState},
        resources::Client,
    },
    common::{
        components::{
            ability::CasterState,
            charges::Charges,
            crowd_control::{CrowdControl, Restrictions},
            handler::{AbilityHandler, NetRole},
            resources::ResourcePool,
        },
        message::{AbilityEvent, Event, *},
        resources::{AbilityConfig, GameClock},
        systems::combat::authorities::{Authorities, ClockAuthority},
    },
};

pub type ActorQuery<'w, 's> = Query<'w, 's, (
    &'static mut AbilityHandler,
    Option<&'static mut PredictionState>,
    Option<&'static mut ResourcePool>,
    Option<&'static mut Charges>,
    Option<&'static mut Restrictions>,
    Option<&'static mut CrowdControl>,
    Option<&'static CasterState>,
)>;

pub fn do_spawn(
    mut commands: Commands,
    mut reader: MessageReader<Do>,
    mut client: ResMut<Client>,
    mut clock: ResMut<GameClock>,
) {
    for message in reader.read() {
        match message.event {
            Event::Init { ent, elapsed } => {
                clock.sync(elapsed);
                client.ent = Some(ent);
                info!("controlling {ent}, server time {elapsed:?}");
                commands.entity(ent).insert((
                    AbilityHandler::new(NetRole::Predicting),
                    PredictionState::default(),
                    ResourcePool::default(),
                    Charges::default(),
                    Restrictions::default(),
                    CrowdControl::default(),
                    CasterState::default(),
                ));
            }
            Event::Spawn { ent } => {
                debug!("observing {ent}");
                commands.entity(ent).insert((
                    AbilityHandler::new(NetRole::Simulated),
                    CrowdControl::default(),
                ));
            }
            _ => {}
        }
    }
}

pub fn do_ability(
    mut reader: MessageReader<Do>,
    mut query: ActorQuery,
    config: Res<AbilityConfig>,
    clock: Res<GameClock>,
) {
    for message in reader.read() {
        let event = &message.event;
        if matches!(event, Event::Init { .. } | Event::Spawn { .. } | Event::Despawn { .. }) { continue; }
        let ent = event.ent();
        let Ok((mut handler, state, mut pool, mut charges, mut restrictions, cc, caster)) = query.get_mut(ent) else {
            warn!("{event:?} for unknown actor {ent}");
            continue;
        };
        let predicting = state.is_some();

        match event {
            Event::AbilityAdded { ability, .. } => {
                handler.add_ability(*ability);
                if let Some(charges) = charges.as_deref_mut() { charges.track(*ability); }
            }
            Event::AbilityRemoved { ability, .. } => {
                handler.remove_ability(*ability);
                if let Some(charges) = charges.as_deref_mut() { charges.untrack(*ability); }
            }
            Event::AbilityResult { result, .. } => {
                let Some(mut state) = state else {
                    warn!("result {} for {ent} which is not predicting", result.prediction_id);
                    continue;
                };
                let mut authorities = Authorities::of(
                    pool.as_deref_mut(), charges.as_deref_mut(), restrictions.as_deref(), cc.as_deref(), caster.copied().unwrap_or_default());
                state.on_result(&mut handler, &mut authorities, result, &config, &*clock);
            }
            // our own predicted casts already ran these locally
            Event::AbilityTick { tick, .. } if predicting && tick.prediction_id.is_predicted() => {}
            Event::AbilityTick { tick, .. } => handler.apply_tick(tick),
            Event::CastState { prediction_id, .. } if predicting && prediction_id.is_predicted() => {}
            Event::CastState { state: cast, .. } => handler.apply_cast_state(*cast),
            Event::AbilityCancelled { event: cancel, .. } => {
                if !handler.apply_cancel(cancel) {
                    trace!("ignored cancel of {} on {ent}", cancel.cancelled_cast_id);
                }
            }
            Event::AbilityInterrupted { event: interrupt, .. } => match state {
                Some(mut state) => {
                    let mut authorities = Authorities::of(
                        pool.as_deref_mut(), charges.as_deref_mut(), restrictions.as_deref(), cc.as_deref(), caster.copied().unwrap_or_default());
                    state.on_interrupt(&mut handler, &mut authorities, interrupt, &config, &*clock);
                }
                None => {
                    handler.apply_interrupt(interrupt);
                }
            },
            Event::Resource { kind, state: value, max, .. } => match pool.as_deref_mut() {
                Some(pool) => pool.set(*kind, *value, *max),
                None => warn!("no resource pool on {ent}"),
            },
            Event::Charges { ability, state: value, .. } => match charges.as_deref_mut() {
                Some(charges) => charges.set(*ability, *value),
                None => warn!("no charges on {ent}"),
            },
            Event::CrowdControl { active, .. } => match cc {
                Some(mut cc) => cc.replace(active.iter().copied()),
                None => warn!("no crowd control on {ent}"),
            },
            Event::Restrictions { active, .. } => match restrictions.as_deref_mut() {
                Some(restrictions) => restrictions.replace(active.iter().copied()),
                None => warn!("no restrictions on {ent}"),
            },
            _ => {}
        }
    }
}

/// Run each predicting actor's local timers
pub fn update(
    mut query: Query<(
        &mut AbilityHandler,
        &mut PredictionState,
        Option<&mut ResourcePool>,
        Option<&mut Charges>,
        Option<&Restrictions>,
        Option<&CrowdControl>,
        Option<&CasterState>,
    )>,
    config: Res<AbilityConfig>,
    clock: Res<GameClock>,
) {
    for (mut handler, mut state, mut pool, mut charges, restrictions, cc, caster) in &mut query {
        let mut authorities = Authorities::of(
            pool.as_deref_mut(), charges.as_deref_mut(), restrictions, cc, caster.copied().unwrap_or_default());
        state.update(&mut handler, &mut authorities, &config, &*clock);
    }
}

/// Turn predicted requests into `Try` messages for the server
pub fn try_requests(
    mut query: Query<(Entity, &mut PredictionState)>,
    mut writer: MessageWriter<Try>,
) {
    for (ent, mut state) in &mut query {
        for outgoing in state.drain_outgoing() {
            let event = match outgoing {
                Outgoing::Use(request) => Event::UseAbility { ent, request },
                Outgoing::Cancel(request) => Event::CancelCast { ent, request },
            };
            writer.write(Try { event });
        }
    }
}

/// Stand-in for UI: report what the handlers raised
pub fn log_notifications(
    mut reader: MessageReader<Notify>,
    client: Res<Client>,
    clock: Res<GameClock>,
) {
    let now = clock.now();
    for Notify { ent, event } in reader.read() {
        let who = if client.ent == Some(*ent) { "you" } else { "other" };
        match event {
            AbilityEvent::Added(ability) => info!("{who}: learned {ability:?}"),
            AbilityEvent::Removed(ability) => info!("{who}: forgot {ability:?}"),
            AbilityEvent::Tick { ability, prediction_id, tick, params } =>
                info!("{who}: {ability:?} {prediction_id} tick {tick} {:?}", params.magnitude()),
            AbilityEvent::Cancelled(event) => info!("{who}: cancelled {:?} {}", event.ability, event.cancelled_cast_id),
            AbilityEvent::Interrupted(event) =>
                info!("{who}: {:?} {} interrupted by {:?}", event.ability, event.cancelled_cast_id, event.source),
            AbilityEvent::CastStateChanged { current, .. } => match current.ability {
                Some(ability) => info!("{who}: casting {ability:?} until {:?}", current.end),
                None => debug!("{who}: cast ended at {now:?}"),
            },
            AbilityEvent::GlobalCooldownChanged { current, .. } if current.is_active() =>
                debug!("{who}: global cooldown until {:?}", current.end),
            AbilityEvent::GlobalCooldownChanged { .. } => debug!("{who}: global cooldown over at {now:?}"),
            AbilityEvent::Mispredicted { prediction_id, reason } => info!("{who}: {prediction_id} refused, {reason}"),
        }
    }
}
