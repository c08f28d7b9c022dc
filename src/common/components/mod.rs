pub mod ability;
pub mod ability_queue;
pub mod casting;
pub mod charges;
pub mod crowd_control;
pub mod gcd;
pub mod handler;
pub mod modifiers;
pub mod prediction;
pub mod resources;
