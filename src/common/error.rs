use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an ability use was refused, locally or by the authority
#[derive(Clone, Copy, Debug, Deserialize, Eq, Error, Hash, PartialEq, Serialize)]
pub enum CastFailReason {
    #[error("not permitted to use abilities in this role")]
    NetRole,
    #[error("ability not known")]
    InvalidAbility,
    #[error("already casting")]
    AlreadyCasting,
    #[error("on global cooldown")]
    OnGlobalCooldown,
    #[error("costs not met")]
    CostsNotMet,
    #[error("not enough charges")]
    ChargesNotMet,
    #[error("cast conditions not met")]
    ConditionsNotMet,
    #[error("ability restricted")]
    Restricted,
    #[error("crowd controlled")]
    CrowdControlled,
    #[error("invalid cast type")]
    InvalidCastType,
    #[error("stale prediction id")]
    Stale,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum CancelFailReason {
    #[error("not permitted to cancel in this role")]
    NetRole,
    #[error("not casting")]
    NotCasting,
    #[error("cancel does not match the active cast")]
    Mismatch,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum InterruptFailReason {
    #[error("only the authority interrupts")]
    NetRole,
    #[error("not casting")]
    NotCasting,
    #[error("cast cannot be interrupted")]
    Restricted,
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum QueueRefusal {
    #[error("no global cooldown or cast to wait on")]
    NothingToWaitOn,
    #[error("timing not yet confirmed by the server")]
    Unconfirmed,
    #[error("{remaining:?} remaining is outside the queue window")]
    OutsideWindow { remaining: Duration },
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("socket: {0}")]
    Io(#[from] std::io::Error),
    #[error("system clock: {0}")]
    Clock(#[from] std::time::SystemTimeError),
    #[error("address: {0}")]
    Addr(#[from] std::net::AddrParseError),
    #[error("netcode: {0}")]
    Netcode(String),
}
