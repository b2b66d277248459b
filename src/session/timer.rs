// src/session/timer.rs

/// Event produced by one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// No time limit configured, or the timer was stopped.
    Idle,
    /// Still counting; carries the remaining seconds.
    Tick(u32),
    /// The limit was reached. Produced exactly once per timer.
    Expired,
}

/// Per-session countdown over a quiz's `time_limit`.
///
/// The 1-second cadence is owned by the driver (a wall-clock task on the
/// server, a render loop in an embedded client); the timer itself only
/// guarantees that `Expired` fires exactly once, via a latch independent
/// of the countdown value, so re-running a setup path cannot double-fire
/// the forced submission.
#[derive(Debug)]
pub struct CountdownTimer {
    remaining: Option<u32>,
    running: bool,
    expired_fired: bool,
}

impl CountdownTimer {
    /// `limit` of None leaves the timer inert.
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            remaining: limit,
            running: false,
            expired_fired: false,
        }
    }

    pub fn start(&mut self) {
        if self.remaining.is_some() {
            self.running = true;
        }
    }

    /// Cancels the countdown. Called whenever the session leaves
    /// in-progress through any path, so a stale timer cannot act on a
    /// torn-down session.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    pub fn has_expired(&self) -> bool {
        self.expired_fired
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> TimerEvent {
        if !self.running || self.expired_fired {
            return TimerEvent::Idle;
        }
        let Some(remaining) = self.remaining else {
            return TimerEvent::Idle;
        };

        let next = remaining.saturating_sub(1);
        self.remaining = Some(next);

        if next == 0 {
            self.expire()
        } else {
            TimerEvent::Tick(next)
        }
    }

    /// Expires the timer directly, used by the wall-clock deadline path.
    /// Goes through the same latch as `tick`, so whichever fires first
    /// wins and the other becomes a no-op.
    pub fn force_expire(&mut self) -> TimerEvent {
        if !self.running || self.expired_fired {
            return TimerEvent::Idle;
        }
        self.remaining = Some(0);
        self.expire()
    }

    fn expire(&mut self) -> TimerEvent {
        self.expired_fired = true;
        self.running = false;
        TimerEvent::Expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_and_expires_once() {
        let mut t = CountdownTimer::new(Some(3));
        t.start();
        assert_eq!(t.tick(), TimerEvent::Tick(2));
        assert_eq!(t.tick(), TimerEvent::Tick(1));
        assert_eq!(t.tick(), TimerEvent::Expired);
        // Latched: further ticks never re-fire.
        assert_eq!(t.tick(), TimerEvent::Idle);
        assert_eq!(t.remaining(), Some(0));
        assert!(t.has_expired());
    }

    #[test]
    fn inert_without_limit() {
        let mut t = CountdownTimer::new(None);
        t.start();
        assert_eq!(t.tick(), TimerEvent::Idle);
        assert!(!t.has_expired());
    }

    #[test]
    fn inert_until_started() {
        let mut t = CountdownTimer::new(Some(10));
        assert_eq!(t.tick(), TimerEvent::Idle);
        assert_eq!(t.remaining(), Some(10));
    }

    #[test]
    fn stop_cancels_countdown() {
        let mut t = CountdownTimer::new(Some(10));
        t.start();
        t.tick();
        t.stop();
        assert_eq!(t.tick(), TimerEvent::Idle);
        assert_eq!(t.remaining(), Some(9));
    }

    #[test]
    fn force_expire_is_latched() {
        let mut t = CountdownTimer::new(Some(10));
        t.start();
        assert_eq!(t.force_expire(), TimerEvent::Expired);
        assert_eq!(t.force_expire(), TimerEvent::Idle);
        assert_eq!(t.tick(), TimerEvent::Idle);
    }

    #[test]
    fn force_expire_after_stop_is_noop() {
        let mut t = CountdownTimer::new(Some(10));
        t.start();
        t.stop();
        assert_eq!(t.force_expire(), TimerEvent::Idle);
        assert!(!t.has_expired());
    }
}
