use std::{
    net::{SocketAddr, UdpSocket},
    time::SystemTime,
};

use bevy::prelude::*;
use bimap::BiMap;
use renet::{ClientId, ConnectionConfig, RenetServer};
use renet_netcode::{NetcodeServerTransport, ServerAuthentication, ServerConfig};

use crate::common::{error::NetError, PROTOCOL_ID};

/// Connected clients and the actor each one controls
#[derive(Default, Deref, DerefMut, Resource)]
pub struct Lobby(BiMap<ClientId, Entity>);

#[derive(Resource)]
pub struct Connections {
    pub server: RenetServer,
    pub transport: NetcodeServerTransport,
}

impl Connections {
    pub fn new(bind: &str, max_clients: usize) -> Result<Self, NetError> {
        let public_addr: SocketAddr = bind.parse()?;
        let socket = UdpSocket::bind(public_addr)?;
        let current_time = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH)?;
        let server_config = ServerConfig {
            current_time,
            max_clients,
            protocol_id: PROTOCOL_ID,
            public_addresses: vec![public_addr],
            authentication: ServerAuthentication::Unsecure,
        };
        let transport = NetcodeServerTransport::new(server_config, socket)?;
        let server = RenetServer::new(ConnectionConfig::default());
        Ok(Self { server, transport })
    }
}
