use std::time::Duration;

use crate::common::systems::combat::scheduler::{TimerAction, TimerHandle, Timers};

/// Spacing between ticks of a channel
pub fn tick_interval(length: Duration, ticks: u32) -> Option<Duration> {
    (ticks > 0 && !length.is_zero()).then(|| length / ticks)
}

/// Ticks whose boundary has passed by `now`, capped at `total`
pub fn due_ticks(start: Duration, interval: Duration, now: Duration, total: u32) -> u32 {
    if interval.is_zero() { return total; }
    let due = now.saturating_sub(start).as_nanos() / interval.as_nanos();
    due.min(total as u128) as u32
}

/// Drives the single periodic tick timer of the active cast
#[derive(Clone, Debug, Default)]
pub struct TickScheduler {
    handle: Option<TimerHandle>,
    interval: Duration,
}

impl TickScheduler {
    /// Arm the next boundary after `elapsed_ticks`, i.e. `start + interval * (elapsed_ticks + 1)`
    pub fn arm(&mut self, timers: &mut Timers, start: Duration, interval: Duration, elapsed_ticks: u32) {
        self.cancel(timers);
        self.interval = interval;
        let next = start + interval * (elapsed_ticks + 1);
        self.handle = Some(timers.schedule_at(next, Some(interval), TimerAction::CastTick));
    }

    pub fn cancel(&mut self, timers: &mut Timers) {
        if let Some(handle) = self.handle.take() {
            timers.cancel(handle);
        }
    }

    /// Stop the running timer for new timing; returns how many ticks are owed.
    /// The caller runs the owed ticks in order and then re-arms.
    pub fn resync(
        &mut self,
        timers: &mut Timers,
        now: Duration,
        start: Duration,
        interval: Duration,
        elapsed_ticks: u32,
        total: u32,
    ) -> u32 {
        self.cancel(timers);
        self.interval = interval;
        due_ticks(start, interval, now, total).saturating_sub(elapsed_ticks)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_tick_at(&self, timers: &Timers) -> Option<Duration> {
        self.handle.and_then(|handle| timers.due(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_due_ticks_floors_and_caps() {
        assert_eq!(due_ticks(ms(0), ms(500), ms(499), 4), 0);
        assert_eq!(due_ticks(ms(0), ms(500), ms(1600), 4), 3);
        assert_eq!(due_ticks(ms(0), ms(500), ms(9000), 4), 4);
        assert_eq!(due_ticks(ms(1000), ms(500), ms(200), 4), 0);
    }

    #[test]
    fn test_tick_interval() {
        assert_eq!(tick_interval(ms(2000), 4), Some(ms(500)));
        assert_eq!(tick_interval(ms(2000), 0), None);
        assert_eq!(tick_interval(Duration::ZERO, 3), None);
    }

    #[test]
    fn test_arm_schedules_next_boundary() {
        let mut timers = Timers::default();
        let mut ticks = TickScheduler::default();
        ticks.arm(&mut timers, ms(100), ms(500), 2);
        assert_eq!(ticks.next_tick_at(&timers), Some(ms(1600)));
    }

    #[test]
    fn test_resync_reports_owed_ticks_then_resumes_on_boundary() {
        let mut timers = Timers::default();
        let mut ticks = TickScheduler::default();
        // predicted with a slower interval: one tick ran locally
        ticks.arm(&mut timers, ms(0), ms(600), 0);
        assert_eq!(timers.pop_due(ms(600)).map(|(_, action)| action), Some(TimerAction::CastTick));

        // authority says 2000ms over 4 ticks; at 1600ms three are due
        let owed = ticks.resync(&mut timers, ms(1600), ms(0), ms(500), 1, 4);
        assert_eq!(owed, 2);
        assert!(timers.is_empty());

        ticks.arm(&mut timers, ms(0), ms(500), 1 + owed);
        assert_eq!(timers.pop_due(ms(1600)), None);
        assert_eq!(timers.pop_due(ms(2000)).map(|(_, action)| action), Some(TimerAction::CastTick));
    }

    #[test]
    fn test_resync_never_owes_when_ahead() {
        let mut timers = Timers::default();
        let mut ticks = TickScheduler::default();
        assert_eq!(ticks.resync(&mut timers, ms(700), ms(0), ms(500), 3, 4), 0);
    }
}
