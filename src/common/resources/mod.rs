use std::time::Duration;

use bevy::prelude::*;

use crate::common::systems::combat::authorities::ClockAuthority;

/// Tunables for the ability protocol, shared by client and server so predicted
/// lengths match authoritative ones
#[derive(Clone, Copy, Debug, Resource)]
pub struct AbilityConfig {
    /// How close to the end of a GCD or cast an ability may be queued
    pub queue_window: Duration,
    /// Upper bound on how far the server backdates a request to the client's timestamp
    pub max_ping_compensation: Duration,
    pub min_gcd_length: Duration,
    pub min_cast_length: Duration,
}

impl Default for AbilityConfig {
    fn default() -> Self {
        Self {
            queue_window: Duration::from_millis(200),
            max_ping_compensation: Duration::from_millis(200),
            min_gcd_length: Duration::from_millis(500),
            min_cast_length: Duration::from_millis(500),
        }
    }
}

impl AbilityConfig {
    /// `length` floored at the minimum GCD
    pub fn gcd_length(&self, length: Duration) -> Duration {
        length.max(self.min_gcd_length)
    }

    pub fn cast_length(&self, length: Duration) -> Duration {
        length.max(self.min_cast_length)
    }

    /// Server-side start for a request stamped `client_timestamp`
    pub fn compensated_start(&self, client_timestamp: Duration, now: Duration) -> Duration {
        client_timestamp.clamp(now.saturating_sub(self.max_ping_compensation), now)
    }
}

/// Shared timeline for all ability timing. The server runs on its own elapsed time;
/// clients add the offset received with `Event::Init`.
#[derive(Clone, Copy, Debug, Default, Resource)]
pub struct GameClock {
    local: Duration,
    offset_nanos: i128,
}

impl GameClock {
    pub fn advance(&mut self, local: Duration) {
        self.local = local;
    }

    /// Align with the authority's elapsed time as of now
    pub fn sync(&mut self, authoritative: Duration) {
        self.offset_nanos = authoritative.as_nanos() as i128 - self.local.as_nanos() as i128;
    }
}

impl ClockAuthority for GameClock {
    fn now(&self) -> Duration {
        let nanos = (self.local.as_nanos() as i128 + self.offset_nanos).max(0);
        Duration::from_nanos(nanos as u64)
    }
}

pub fn update_clock(time: Res<Time>, mut clock: ResMut<GameClock>) {
    clock.advance(time.elapsed());
}
