pub mod components;
pub mod error;
pub mod message;
pub mod resources;
pub mod systems;

pub const PROTOCOL_ID: u64 = 7;
