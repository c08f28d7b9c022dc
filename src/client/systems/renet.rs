use bevy::prelude::*;
use ::renet::DefaultChannel;

use crate::{
    client::resources::*,
    common::message::{Event, *},
};

pub fn update_transport(
    time: Res<Time>,
    mut conn: ResMut<Connection>,
) {
    let Connection { client, transport } = &mut *conn;
    client.update(time.delta());
    if let Err(err) = transport.update(time.delta(), client) {
        error!("transport: {err}");
    }
}

pub fn send_packets(
    mut conn: ResMut<Connection>,
) {
    let Connection { client, transport } = &mut *conn;
    if let Err(err) = transport.send_packets(client) {
        error!("transport: {err}");
    }
}

pub fn send_do(
    mut commands: Commands,
    mut writer: MessageWriter<Do>,
    mut conn: ResMut<Connection>,
    mut l2r: ResMut<EntityMap>,
) {
    while let Some(serialized) = conn.client.receive_message(DefaultChannel::ReliableOrdered) {
        let message: Do = match bincode::serde::decode_from_slice(&serialized, bincode::config::legacy()) {
            Ok((message, _)) => message,
            Err(err) => {
                warn!("undecodable message from server: {err}");
                continue;
            }
        };
        match message.event {
            // insert l2r for player
            Event::Init { ent, elapsed } => {
                let loc = commands.spawn_empty().id();
                l2r.0.insert(loc, ent);
                debug!("player {ent} is local {loc}");
                writer.write(Do { event: Event::Init { ent: loc, elapsed } });
            }
            // insert l2r entry when spawning an actor we have not seen
            Event::Spawn { ent } => {
                let loc = match l2r.0.get_by_right(&ent) {
                    Some(&loc) => loc,
                    None => {
                        let loc = commands.spawn_empty().id();
                        l2r.0.insert(loc, ent);
                        loc
                    }
                };
                writer.write(Do { event: Event::Spawn { ent: loc } });
            }
            Event::Despawn { ent } => {
                let Some((loc, _)) = l2r.0.remove_by_right(&ent) else { continue };
                debug!("actor {ent} left");
                commands.entity(loc).despawn();
            }
            event => {
                let Some(&loc) = l2r.0.get_by_right(&event.ent()) else {
                    warn!("{event:?} for unmapped entity");
                    continue;
                };
                let event = match event.with_ent(loc) {
                    Event::AbilityInterrupted { ent, mut event } => {
                        event.applied_by = event.applied_by.and_then(|by| l2r.0.get_by_right(&by).copied());
                        Event::AbilityInterrupted { ent, event }
                    }
                    event => event,
                };
                writer.write(Do { event });
            }
        }
    }
}

pub fn write_try(
    mut conn: ResMut<Connection>,
    mut reader: MessageReader<Try>,
    l2r: Res<EntityMap>,
) {
    for message in reader.read() {
        let Some(&ent) = l2r.0.get_by_left(&message.event.ent()) else {
            warn!("{:?} for unmapped entity", message.event);
            continue;
        };
        let message = Try { event: message.event.clone().with_ent(ent) };
        match bincode::serde::encode_to_vec(&message, bincode::config::legacy()) {
            Ok(payload) => conn.client.send_message(DefaultChannel::ReliableOrdered, payload),
            Err(err) => warn!("cannot encode {message:?}: {err}"),
        }
    }
}
