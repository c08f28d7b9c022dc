use std::time::Duration;

use crate::common::{
    components::{ability::AbilityType, handler::AbilityHandler},
    error::QueueRefusal,
    systems::combat::scheduler::{TimerAction, TimerHandle},
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum QueueStatus {
    #[default]
    Empty,
    WaitForGlobal,
    WaitForCast,
    WaitForBoth,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueueEntry {
    pub ability: AbilityType,
    pub expiry: TimerHandle,
}

/// Single-slot queue for an ability requested near the end of a GCD or cast.
/// Only confirmed timing can be queued against; the slot fires once when every
/// constraint it waits on has ended, or silently expires after the queue window.
#[derive(Clone, Debug, Default)]
pub struct AbilityQueue {
    status: QueueStatus,
    entry: Option<QueueEntry>,
}

impl AbilityQueue {
    pub fn status(&self) -> QueueStatus {
        self.status
    }

    pub fn queued(&self) -> Option<AbilityType> {
        self.entry.map(|entry| entry.ability)
    }

    /// Replaces any earlier entry
    pub fn try_queue(
        &mut self,
        handler: &mut AbilityHandler,
        ability: AbilityType,
        now: Duration,
        window: Duration,
    ) -> Result<QueueStatus, QueueRefusal> {
        let gcd = handler.gcd();
        let casting = handler.casting();
        let gcd_remaining = match ability.def().on_gcd && gcd.is_active() {
            true => Some(gcd.remaining(now).ok_or(QueueRefusal::Unconfirmed)?),
            false => None,
        };
        let cast_remaining = match casting.is_active() {
            true => Some(casting.remaining(now).ok_or(QueueRefusal::Unconfirmed)?),
            false => None,
        };
        let (status, remaining) = match (gcd_remaining, cast_remaining) {
            (None, None) => return Err(QueueRefusal::NothingToWaitOn),
            (Some(gcd), None) => (QueueStatus::WaitForGlobal, gcd),
            (None, Some(cast)) => (QueueStatus::WaitForCast, cast),
            (Some(gcd), Some(cast)) => (QueueStatus::WaitForBoth, gcd.min(cast)),
        };
        if remaining > window {
            return Err(QueueRefusal::OutsideWindow { remaining });
        }

        self.clear(handler);
        let expiry = handler.schedule(now, window, TimerAction::QueueExpire);
        self.status = status;
        self.entry = Some(QueueEntry { ability, expiry });
        Ok(status)
    }

    /// Returns the ability to fire once nothing else is awaited
    pub fn on_gcd_end(&mut self, handler: &mut AbilityHandler) -> Option<AbilityType> {
        match self.status {
            QueueStatus::WaitForBoth => {
                self.status = QueueStatus::WaitForCast;
                None
            }
            QueueStatus::WaitForGlobal => self.fire(handler),
            _ => None,
        }
    }

    pub fn on_cast_end(&mut self, handler: &mut AbilityHandler) -> Option<AbilityType> {
        match self.status {
            QueueStatus::WaitForBoth => {
                self.status = QueueStatus::WaitForGlobal;
                None
            }
            QueueStatus::WaitForCast => self.fire(handler),
            _ => None,
        }
    }

    /// The expiry timer fired; returns what was dropped
    pub fn expire(&mut self) -> Option<AbilityType> {
        self.status = QueueStatus::Empty;
        self.entry.take().map(|entry| entry.ability)
    }

    pub fn clear(&mut self, handler: &mut AbilityHandler) {
        if let Some(entry) = self.entry.take() {
            handler.cancel_timer(entry.expiry);
        }
        self.status = QueueStatus::Empty;
    }

    fn fire(&mut self, handler: &mut AbilityHandler) -> Option<AbilityType> {
        let entry = self.entry.take()?;
        handler.cancel_timer(entry.expiry);
        self.status = QueueStatus::Empty;
        Some(entry.ability)
    }
}
