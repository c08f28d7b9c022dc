pub mod ability;
pub mod input;
pub mod pipeline;
pub mod reconcile;
pub mod renet;
