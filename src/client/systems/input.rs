use std::str::FromStr;

use bevy::prelude::*;

use crate::{
    client::{
        resources::{Client, Console},
        components::PredictionState,
        systems::pipeline::UseOutcome,
    },
    common::{
        components::{
            ability::{AbilityType, CasterState},
            charges::Charges,
            crowd_control::{CrowdControl, Restrictions},
            handler::AbilityHandler,
            resources::ResourcePool,
        },
        resources::{AbilityConfig, GameClock},
        systems::combat::authorities::Authorities,
    },
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    Use(AbilityType),
    Cancel,
    Status,
    Move(bool),
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else { return Err("empty command".into()) };
        match verb.to_ascii_lowercase().as_str() {
            "cancel" | "c" => Ok(Command::Cancel),
            "status" | "s" => Ok(Command::Status),
            "move" => Ok(Command::Move(true)),
            "stop" => Ok(Command::Move(false)),
            "use" | "u" => {
                let Some(name) = words.next() else { return Err("use what?".into()) };
                AbilityType::from_name(name).map(Command::Use).ok_or_else(|| format!("unknown ability {name}"))
            }
            other => AbilityType::from_name(other).map(Command::Use).ok_or_else(|| format!("unknown command {other}")),
        }
    }
}

/// Apply terminal commands to the controlled actor
pub fn do_console(
    console: Res<Console>,
    client: Res<Client>,
    mut query: Query<(
        &mut AbilityHandler,
        &mut PredictionState,
        Option<&mut ResourcePool>,
        Option<&mut Charges>,
        Option<&Restrictions>,
        Option<&CrowdControl>,
        Option<&mut CasterState>,
    )>,
    config: Res<AbilityConfig>,
    clock: Res<GameClock>,
) {
    let lines = console.lines();
    if lines.is_empty() { return; }
    let Some(ent) = client.ent else {
        warn!("not connected yet, dropping {} commands", lines.len());
        return;
    };

    for line in lines {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                warn!("{err}");
                continue;
            }
        };
        let Ok((mut handler, mut state, mut pool, mut charges, restrictions, cc, caster)) = query.get_mut(ent) else {
            warn!("{ent} is not predicting");
            continue;
        };
        if let Command::Move(moving) = command {
            match caster {
                Some(mut caster) => caster.moving = moving,
                None => warn!("{ent} has no caster state"),
            }
            continue;
        }
        let caster = caster.as_deref().copied().unwrap_or_default();
        let mut authorities = Authorities::of(pool.as_deref_mut(), charges.as_deref_mut(), restrictions, cc, caster);
        match command {
            Command::Use(ability) => match state.request_ability(&mut handler, &mut authorities, ability, &config, &*clock) {
                Ok(UseOutcome::Sent(prediction_id)) => debug!("{ability:?} sent as {prediction_id}"),
                Ok(UseOutcome::Queued(status)) => info!("{ability:?} queued, {status:?}"),
                Err(reason) => info!("cannot use {ability:?}: {reason}"),
            },
            Command::Cancel => match state.cancel_current_cast(&mut handler, &mut authorities, &config, &*clock) {
                Ok(prediction_id) => debug!("cancel of {prediction_id} sent"),
                Err(reason) => info!("cannot cancel: {reason}"),
            },
            Command::Status => {
                let gcd = handler.gcd();
                let casting = handler.casting();
                info!("abilities {:?}", handler.abilities().iter().collect::<Vec<_>>());
                info!("gcd {} {:?}..{:?}, cast {:?} {} {:?}..{:?} ({} ticks)",
                    gcd.prediction_id, gcd.start, gcd.end,
                    casting.ability, casting.prediction_id, casting.start, casting.end, casting.elapsed_ticks);
                info!("queue {:?} {:?}, {} pending", state.queue.status(), state.queue.queued(), state.pending.len());
            }
            Command::Move(_) => {}
        }
    }
}
