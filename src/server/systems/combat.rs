use bevy::prelude::*;

use crate::{
    common::{
        components::{
            ability::CasterState,
            charges::Charges,
            crowd_control::{CrowdControl, Restrictions},
            handler::AbilityHandler,
            modifiers::LengthModifiers,
            resources::ResourcePool,
        },
        message::{AbilityEvent, Do, Event, InterruptSource, Notify, Try},
        resources::{AbilityConfig, GameClock},
        systems::combat::authorities::{Authorities, ClockAuthority},
    },
    server::{components::AuthorityState, systems::authority::Outbound},
};

pub type AuthorityQuery<'w, 's> = Query<'w, 's, (
    &'static mut AbilityHandler,
    &'static mut AuthorityState,
    Option<&'static mut ResourcePool>,
    Option<&'static mut Charges>,
    Option<&'static Restrictions>,
    Option<&'static CrowdControl>,
    Option<&'static CasterState>,
    Option<&'static LengthModifiers>,
)>;

pub(crate) fn publish(writer: &mut MessageWriter<Do>, ent: Entity, outbound: Vec<Outbound>) {
    for outbound in outbound {
        writer.write(Do { event: outbound.into_event(ent) });
    }
}

/// Resolve use and cancel requests arriving from clients
pub fn try_ability(
    mut reader: MessageReader<Try>,
    mut writer: MessageWriter<Do>,
    mut query: AuthorityQuery,
    config: Res<AbilityConfig>,
    clock: Res<GameClock>,
) {
    let now = clock.now();
    for message in reader.read() {
        let (Event::UseAbility { ent, .. } | Event::CancelCast { ent, .. }) = message.event else { continue };
        let Ok((mut handler, mut state, mut pool, mut charges, restrictions, cc, caster, modifiers)) = query.get_mut(ent) else {
            warn!("{:?} for unknown actor {ent}", message.event);
            continue;
        };
        match &message.event {
            Event::UseAbility { request, .. } => {
                let mut authorities = Authorities::of(
                    pool.as_deref_mut(), charges.as_deref_mut(), restrictions, cc, caster.copied().unwrap_or_default())
                    .with_modifiers(modifiers);
                let outbound = state.handle_use_request(&mut handler, &mut authorities, request, &config, now);
                publish(&mut writer, ent, outbound);
            }
            Event::CancelCast { request, .. } => match state.handle_cancel_request(&mut handler, request, now) {
                Ok(outbound) => publish(&mut writer, ent, outbound),
                Err(reason) => debug!("cancel of {} on {ent} refused: {reason}", request.cancelled_cast_id),
            },
            _ => {}
        }
    }
}

/// Run authoritative GCD and cast timers
pub fn update(
    mut query: Query<(Entity, &mut AbilityHandler, &mut AuthorityState)>,
    mut writer: MessageWriter<Do>,
    clock: Res<GameClock>,
) {
    let now = clock.now();
    for (ent, mut handler, mut state) in &mut query {
        let outbound = state.update(&mut handler, now);
        publish(&mut writer, ent, outbound);
    }
}

/// Interrupt casts the caster can no longer sustain: death, or crowd control
/// that restricts the ability being cast
pub fn interrupt_casts(
    mut query: Query<
        (Entity, &mut AbilityHandler, &mut AuthorityState, Option<&CrowdControl>, Option<&CasterState>),
        Or<(Changed<CrowdControl>, Changed<CasterState>)>,
    >,
    mut writer: MessageWriter<Do>,
    clock: Res<GameClock>,
) {
    for (ent, mut handler, mut state, cc, caster) in &mut query {
        let casting = handler.casting();
        let Some(ability) = casting.ability.filter(|_| casting.is_active()) else { continue };
        let source = if caster.is_some_and(|caster| !caster.alive) {
            Some(InterruptSource::Death)
        } else {
            cc.and_then(|cc| cc.iter().find(|typ| ability.def().restricted_by.contains(typ)))
                .map(InterruptSource::CrowdControl)
        };
        let Some(source) = source else { continue };
        match state.interrupt_current_cast(&mut handler, None, source, true, clock.now()) {
            Ok(outbound) => {
                debug!("interrupted {ability:?} on {ent} by {source:?}");
                publish(&mut writer, ent, outbound);
            }
            Err(reason) => warn!("could not interrupt {ability:?} on {ent}: {reason}"),
        }
    }
}

/// Restore charges on their cooldown and tell the owner
pub fn recharge(
    mut query: Query<(Entity, &mut Charges)>,
    mut writer: MessageWriter<Do>,
    clock: Res<GameClock>,
) {
    let now = clock.now();
    for (ent, mut charges) in &mut query {
        for (ability, state) in charges.bypass_change_detection().recharge(now) {
            trace!("{ability:?} on {ent} recharged to {state}");
            writer.write(Do { event: Event::Charges { ent, ability, state } });
        }
    }
}

pub fn replicate_crowd_control(
    query: Query<(Entity, &CrowdControl), Changed<CrowdControl>>,
    mut writer: MessageWriter<Do>,
) {
    for (ent, cc) in &query {
        writer.write(Do { event: Event::CrowdControl { ent, active: cc.iter().collect() } });
    }
}

pub fn replicate_restrictions(
    query: Query<(Entity, &Restrictions), Changed<Restrictions>>,
    mut writer: MessageWriter<Do>,
) {
    for (ent, restrictions) in &query {
        writer.write(Do { event: Event::Restrictions { ent, active: restrictions.iter().collect() } });
    }
}

/// Abilities gained or lost on the authority reach the owner
pub fn replicate_abilities(
    mut reader: MessageReader<Notify>,
    mut writer: MessageWriter<Do>,
) {
    for &Notify { ent, ref event } in reader.read() {
        match *event {
            AbilityEvent::Added(ability) => writer.write(Do { event: Event::AbilityAdded { ent, ability } }),
            AbilityEvent::Removed(ability) => writer.write(Do { event: Event::AbilityRemoved { ent, ability } }),
            _ => continue,
        };
    }
}
