use std::{collections::BTreeMap, time::Duration};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TimerHandle(u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimerAction {
    GcdEnd,
    CastTick,
    QueueExpire,
}

#[derive(Clone, Copy, Debug)]
struct Timer {
    due: Duration,
    interval: Option<Duration>,
    action: TimerAction,
}

/// Per-actor timer wheel. Nothing fires on its own: the owner polls `pop_due`
/// with the current time and dispatches each action before polling again, so a
/// callback may cancel timers that would otherwise fire in the same poll.
#[derive(Clone, Debug, Default)]
pub struct Timers {
    next: u64,
    armed: BTreeMap<TimerHandle, Timer>,
}

impl Timers {
    pub fn schedule(
        &mut self,
        now: Duration,
        delay: Duration,
        interval: Option<Duration>,
        action: TimerAction,
    ) -> TimerHandle {
        self.schedule_at(now + delay, interval, action)
    }

    pub fn schedule_at(&mut self, due: Duration, interval: Option<Duration>, action: TimerAction) -> TimerHandle {
        self.next += 1;
        let handle = TimerHandle(self.next);
        // a zero period would fire forever within one poll
        let interval = interval.filter(|interval| !interval.is_zero());
        self.armed.insert(handle, Timer { due, interval, action });
        handle
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.armed.remove(&handle).is_some()
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.armed.contains_key(&handle)
    }

    pub fn due(&self, handle: TimerHandle) -> Option<Duration> {
        self.armed.get(&handle).map(|timer| timer.due)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Earliest timer due at or before `now`; periodic timers re-arm one interval later
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerHandle, TimerAction)> {
        let (handle, timer) = self.armed.iter()
            .filter(|(_, timer)| timer.due <= now)
            .min_by_key(|(handle, timer)| (timer.due, **handle))
            .map(|(&handle, &timer)| (handle, timer))?;
        match timer.interval {
            Some(interval) => {
                if let Some(armed) = self.armed.get_mut(&handle) {
                    armed.due += interval;
                }
            }
            None => {
                self.armed.remove(&handle);
            }
        }
        Some((handle, timer.action))
    }
}
