pub mod authority;
pub mod combat;
pub mod npc_ability_usage;
pub mod renet;
