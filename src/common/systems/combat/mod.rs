pub mod authorities;
pub mod scheduler;
pub mod ticks;
pub mod validation;
