use std::{
    io::BufRead,
    net::UdpSocket,
    sync::{mpsc, Mutex},
    time::SystemTime,
};

use bevy::prelude::*;
use bimap::BiMap;
use renet::{ConnectionConfig, RenetClient};
use renet_netcode::{ClientAuthentication, NetcodeClientTransport};

use crate::common::{error::NetError, PROTOCOL_ID};

/// Local entity (left) to server entity (right)
#[derive(Debug, Default, Resource)]
pub struct EntityMap(pub BiMap<Entity, Entity>);

/// The locally controlled actor, once the server has sent `Init`
#[derive(Debug, Default, Resource)]
pub struct Client {
    pub ent: Option<Entity>,
}

#[derive(Resource)]
pub struct Connection {
    pub client: RenetClient,
    pub transport: NetcodeClientTransport,
}

impl Connection {
    pub fn new(server: &str) -> Result<Self, NetError> {
        let server_addr = server.parse()?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let current_time = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH)?;
        let client_id = current_time.as_millis() as u64;
        let authentication = ClientAuthentication::Unsecure {
            client_id,
            protocol_id: PROTOCOL_ID,
            server_addr,
            user_data: None,
        };
        let transport = NetcodeClientTransport::new(current_time, authentication, socket)
            .map_err(|err| NetError::Netcode(err.to_string()))?;
        let client = RenetClient::new(ConnectionConfig::default());
        Ok(Self { client, transport })
    }
}

/// Lines typed at the terminal, read off the main thread
#[derive(Resource)]
pub struct Console(Mutex<mpsc::Receiver<String>>);

impl Console {
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() { break; }
            }
        });
        Self(Mutex::new(rx))
    }

    pub fn lines(&self) -> Vec<String> {
        match self.0.lock() {
            Ok(rx) => rx.try_iter().collect(),
            Err(_) => Vec::new(),
        }
    }
}
