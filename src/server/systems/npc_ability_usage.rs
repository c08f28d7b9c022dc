use std::time::Duration;

use bevy::prelude::*;
use rand::seq::IteratorRandom;

use crate::{
    common::{
        components::{
            ability::{AbilityType, CasterState},
            charges::Charges,
            crowd_control::{CrowdControl, Restrictions},
            handler::{AbilityHandler, NetRole},
            modifiers::{LengthKind, LengthModifier, LengthModifiers, Modifier},
            resources::ResourcePool,
        },
        message::Do,
        resources::{AbilityConfig, GameClock},
        systems::combat::{
            authorities::{Authorities, ClockAuthority},
            validation::validate_use,
        },
    },
    server::{
        components::{AuthorityState, TrainingDummy},
        systems::combat::publish,
    },
};

const PERIOD: Duration = Duration::from_secs(3);

pub fn spawn_training_dummy(mut commands: Commands) {
    // dummies channel a fifth faster than players
    let mut modifiers = LengthModifiers::default();
    modifiers.add(LengthModifier { kind: LengthKind::CastLength, ability: None, modifier: Modifier::Multiplicative(0.8) });
    let ent = commands.spawn((
        AbilityHandler::new(NetRole::Authority).with_abilities(AbilityType::ALL),
        AuthorityState::default(),
        TrainingDummy::default(),
        ResourcePool::new(200., 200.),
        Charges::for_abilities(AbilityType::ALL),
        Restrictions::default(),
        CrowdControl::default(),
        CasterState::default(),
        modifiers,
    )).id();
    info!("training dummy {ent}");
}

/// Training dummies use one of their currently usable abilities each period.
/// Their casts carry no prediction id, so every client simulates them.
pub fn npc_ability_usage(
    mut query: Query<(
        Entity,
        &mut AbilityHandler,
        &mut AuthorityState,
        &mut TrainingDummy,
        Option<&mut ResourcePool>,
        Option<&mut Charges>,
        Option<&Restrictions>,
        Option<&CrowdControl>,
        Option<&CasterState>,
        Option<&LengthModifiers>,
    )>,
    mut writer: MessageWriter<Do>,
    config: Res<AbilityConfig>,
    clock: Res<GameClock>,
) {
    let now = clock.now();
    for (ent, mut handler, mut state, mut dummy, mut pool, mut charges, restrictions, cc, caster, modifiers) in &mut query {
        if now < dummy.next_at { continue; }
        dummy.next_at = now + PERIOD;

        let mut authorities = Authorities::of(
            pool.as_deref_mut(), charges.as_deref_mut(), restrictions, cc, caster.copied().unwrap_or_default())
            .with_modifiers(modifiers);
        let usable = handler.abilities().iter()
            .filter(|&ability| validate_use(&handler, &authorities, ability, now).is_ok())
            .choose(&mut rand::rng());
        let Some(ability) = usable else {
            trace!("dummy {ent} has nothing to use");
            continue;
        };
        match state.use_ability(&mut handler, &mut authorities, ability, &config, now) {
            Ok(outbound) => {
                debug!("dummy {ent} uses {ability:?}");
                publish(&mut writer, ent, outbound);
            }
            Err(reason) => debug!("dummy {ent} cannot use {ability:?}: {reason}"),
        }
    }
}
