use bevy::prelude::*;
use ::renet::{ClientId, DefaultChannel, RenetServer, ServerEvent};

use crate::{
    common::{
        components::{
            ability::{AbilityType, CasterState},
            charges::Charges,
            crowd_control::{CrowdControl, Restrictions},
            handler::{AbilityHandler, NetRole},
            modifiers::LengthModifiers,
            resources::ResourcePool,
        },
        message::{Event, *},
        resources::GameClock,
        systems::combat::authorities::ClockAuthority,
    },
    server::{components::AuthorityState, resources::*},
};

/// Who hears about an authoritative event
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Audience {
    /// Only the client controlling the actor
    Owner,
    /// Every client except the owner, who already predicted it
    Observers,
    Everyone,
    Nobody,
}

pub fn audience(event: &Event) -> Audience {
    match event {
        Event::Init { .. }
        | Event::AbilityAdded { .. }
        | Event::AbilityRemoved { .. }
        | Event::AbilityResult { .. }
        | Event::Resource { .. }
        | Event::Charges { .. }
        | Event::CrowdControl { .. }
        | Event::Restrictions { .. } => Audience::Owner,
        Event::AbilityTick { tick, .. } if tick.prediction_id.is_predicted() => Audience::Observers,
        Event::CastState { prediction_id, .. } if prediction_id.is_predicted() => Audience::Observers,
        Event::AbilityCancelled { .. } | Event::Spawn { .. } => Audience::Observers,
        Event::AbilityTick { .. }
        | Event::CastState { .. }
        | Event::AbilityInterrupted { .. }
        | Event::Despawn { .. } => Audience::Everyone,
        Event::UseAbility { .. } | Event::CancelCast { .. } => Audience::Nobody,
    }
}

fn encode(message: &Do) -> Option<Vec<u8>> {
    match bincode::serde::encode_to_vec(message, bincode::config::legacy()) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            error!("failed to encode {:?}: {err}", message.event);
            None
        }
    }
}

fn send_to(server: &mut RenetServer, client_id: ClientId, message: &Do) {
    if let Some(bytes) = encode(message) {
        server.send_message(client_id, DefaultChannel::ReliableOrdered, bytes);
    }
}

pub fn update_transport(
    time: Res<Time>,
    mut conn: ResMut<Connections>,
) {
    let Connections { server, transport } = &mut *conn;
    server.update(time.delta());
    if let Err(err) = transport.update(time.delta(), server) {
        error!("transport: {err}");
    }
}

pub fn send_packets(
    mut conn: ResMut<Connections>,
) {
    let Connections { server, transport } = &mut *conn;
    transport.send_packets(server);
}

/// Spawn an actor per connecting client and introduce it to everyone present
pub fn do_manage_connections(
    mut commands: Commands,
    mut conn: ResMut<Connections>,
    mut writer: MessageWriter<Do>,
    mut lobby: ResMut<Lobby>,
    query: Query<(Entity, &AbilityHandler)>,
    clock: Res<GameClock>,
) {
    while let Some(event) = conn.server.get_event() {
        match event {
            ServerEvent::ClientConnected { client_id } => {
                info!("player {client_id} connected");
                let mut handler = AbilityHandler::new(NetRole::Authority);
                handler.predicted_remotely = true;
                for ability in AbilityType::ALL {
                    handler.add_ability(ability);
                }
                let pool = ResourcePool::new(100., 100.);
                let snapshot: Vec<_> = pool.pools().collect();
                let ent = commands.spawn((
                    handler,
                    AuthorityState::default(),
                    pool,
                    Charges::for_abilities(AbilityType::ALL),
                    Restrictions::default(),
                    CrowdControl::default(),
                    CasterState::default(),
                    LengthModifiers::default(),
                )).id();

                // abilities follow once the handler's notifications are forwarded
                writer.write(Do { event: Event::Init { ent, elapsed: clock.now() } });
                for (kind, resource) in snapshot {
                    writer.write(Do { event: Event::Resource { ent, kind, state: resource.state, max: resource.max } });
                }
                writer.write(Do { event: Event::Spawn { ent } });

                for (other, handler) in &query {
                    send_to(&mut conn.server, client_id, &Do { event: Event::Spawn { ent: other } });
                    let casting = *handler.casting();
                    if casting.is_active() {
                        send_to(&mut conn.server, client_id, &Do { event: Event::CastState {
                            ent: other,
                            prediction_id: casting.prediction_id,
                            state: casting,
                        } });
                    }
                }
                lobby.insert(client_id, ent);
            }
            ServerEvent::ClientDisconnected { client_id, reason } => {
                info!("player {client_id} disconnected: {reason}");
                let Some((_, ent)) = lobby.remove_by_left(&client_id) else {
                    warn!("no {client_id} in lobby");
                    continue;
                };
                commands.entity(ent).despawn();
                writer.write(Do { event: Event::Despawn { ent } });
            }
        }
    }
}

/// Decode client requests and attribute them to the sender's actor
pub fn write_try(
    mut writer: MessageWriter<Try>,
    mut conn: ResMut<Connections>,
    lobby: Res<Lobby>,
) {
    for client_id in conn.server.clients_id() {
        while let Some(serialized) = conn.server.receive_message(client_id, DefaultChannel::ReliableOrdered) {
            let message: Try = match bincode::serde::decode_from_slice(&serialized, bincode::config::legacy()) {
                Ok((message, _)) => message,
                Err(err) => {
                    warn!("undecodable message from {client_id}: {err}");
                    continue;
                }
            };
            let Some(&ent) = lobby.get_by_left(&client_id) else {
                warn!("no {client_id} in lobby");
                continue;
            };
            match message.event {
                event @ (Event::UseAbility { .. } | Event::CancelCast { .. }) =>
                    writer.write(Try { event: event.with_ent(ent) }),
                event => {
                    warn!("{client_id} may not send {event:?}");
                    continue;
                }
            };
        }
    }
}

pub fn send_do(
    mut conn: ResMut<Connections>,
    mut reader: MessageReader<Do>,
    query: Query<&AbilityHandler>,
    lobby: Res<Lobby>,
) {
    for message in reader.read() {
        let ent = message.event.ent();
        let owner = lobby.get_by_right(&ent).copied();
        // an owner that is not predicting needs its own broadcasts
        let owner_predicts = query.get(ent).map_or(true, |handler| handler.predicted_remotely);
        match audience(&message.event) {
            Audience::Owner => match owner {
                Some(client_id) => send_to(&mut conn.server, client_id, message),
                None => trace!("{ent} has no owner for {:?}", message.event),
            },
            Audience::Observers => {
                for (&client_id, _) in lobby.iter() {
                    if Some(client_id) == owner && owner_predicts { continue; }
                    send_to(&mut conn.server, client_id, message);
                }
            }
            Audience::Everyone => {
                if let Some(bytes) = encode(message) {
                    conn.server.broadcast_message(DefaultChannel::ReliableOrdered, bytes);
                }
            }
            Audience::Nobody => warn!("{:?} is not sent to clients", message.event),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::common::{
        components::{casting::CastingState, prediction::PredictionId},
        error::CastFailReason,
    };

    fn ent() -> Entity {
        Entity::from_raw_u32(3).unwrap()
    }

    fn tick(id: u32) -> TickBroadcast {
        TickBroadcast { prediction_id: PredictionId(id), ability: AbilityType::Siphon, tick: 1, params: default() }
    }

    #[test]
    fn test_results_only_reach_owner() {
        let request = AbilityUseRequest {
            ability: AbilityType::Strike,
            prediction_id: PredictionId(4),
            tick: 0,
            client_timestamp: Duration::ZERO,
            params: default(),
        };
        let result = ServerResult::failed(&request, CastFailReason::Stale);
        assert_eq!(audience(&Event::AbilityResult { ent: ent(), result }), Audience::Owner);
        assert_eq!(audience(&Event::Charges { ent: ent(), ability: AbilityType::Dash, state: 1 }), Audience::Owner);
    }

    #[test]
    fn test_predicted_broadcasts_skip_owner() {
        assert_eq!(audience(&Event::AbilityTick { ent: ent(), tick: tick(2) }), Audience::Observers);
        assert_eq!(
            audience(&Event::CastState { ent: ent(), prediction_id: PredictionId(2), state: CastingState::default() }),
            Audience::Observers,
        );
    }

    #[test]
    fn test_authority_broadcasts_reach_everyone() {
        assert_eq!(audience(&Event::AbilityTick { ent: ent(), tick: tick(0) }), Audience::Everyone);
        assert_eq!(
            audience(&Event::CastState { ent: ent(), prediction_id: PredictionId::AUTHORITY, state: CastingState::default() }),
            Audience::Everyone,
        );
        assert_eq!(audience(&Event::Despawn { ent: ent() }), Audience::Everyone);
    }

    #[test]
    fn test_requests_are_never_sent() {
        let request = CancelRequest {
            prediction_id: PredictionId(2),
            cancelled_cast_id: PredictionId(1),
            timestamp: Duration::ZERO,
        };
        assert_eq!(audience(&Event::CancelCast { ent: ent(), request }), Audience::Nobody);
    }
}
