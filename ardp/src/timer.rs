//! Per-connection timers: retransmission, zero-window persist, idle
//! keepalive, and TIME-WAIT (spec.md §4.5: "Retransmission", "Zero-window
//! probes", "Idle keepalive", "TIME-WAIT"). Modeled after the teacher's
//! `TimerTable` (`sctp-proto`'s `association/timer.rs`), generalized from a
//! fixed SCTP timer set to ARDP's.

use std::time::{Duration, Instant};

const TIMER_COUNT: usize = 4;

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub(crate) enum Timer {
    /// Unacked data segment retransmission (spec.md: `data_timeout`/`data_retries`).
    Retransmit = 0,
    /// Zero-window probing (spec.md: `persist_timeout`/`persist_retries`).
    Persist = 1,
    /// Idle-link keepalive NUL probes (spec.md: `probe_timeout`/`probe_retries`).
    Probe = 2,
    /// Post-close connection-id reservation (spec.md: `timewait`).
    TimeWait = 3,
}

impl Timer {
    pub(crate) const VALUES: [Self; TIMER_COUNT] =
        [Timer::Retransmit, Timer::Persist, Timer::Probe, Timer::TimeWait];
}

/// Outcome of checking a timer against `now`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TimerOutcome {
    /// Timer has not fired.
    Pending,
    /// Timer fired and retries remain; caller should retransmit/probe again.
    Retry(u32),
    /// Timer fired and the retry budget is exhausted.
    Exhausted,
}

/// A table of the fixed set of timers a single [`crate::connection::ArdpConnection`]
/// runs, with independent retry budgets per kind.
#[derive(Debug, Clone, Default)]
pub(crate) struct TimerTable {
    deadline: [Option<Instant>; TIMER_COUNT],
    retries: [u32; TIMER_COUNT],
    max_retries: [u32; TIMER_COUNT],
    interval: [Duration; TIMER_COUNT],
}

impl TimerTable {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn configure(&mut self, timer: Timer, interval: Duration, max_retries: u32) {
        self.interval[timer as usize] = interval;
        self.max_retries[timer as usize] = max_retries;
    }

    pub(crate) fn start(&mut self, timer: Timer, now: Instant) {
        self.retries[timer as usize] = 0;
        self.deadline[timer as usize] = Some(now + self.interval[timer as usize]);
    }

    pub(crate) fn stop(&mut self, timer: Timer) {
        self.deadline[timer as usize] = None;
        self.retries[timer as usize] = 0;
    }

    pub(crate) fn is_running(&self, timer: Timer) -> bool {
        self.deadline[timer as usize].is_some()
    }

    /// Returns the earliest deadline across all running timers, i.e. the
    /// value `ARDP_run` would hand back to the maintenance loop to arm on its
    /// timer event (spec.md §4.5, "ARDP_run contract").
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadline.iter().filter_map(|&d| d).min()
    }

    /// Advance a single timer against `now`. On expiry, bumps the retry
    /// counter and re-arms for the next interval unless the budget is spent.
    pub(crate) fn poll(&mut self, timer: Timer, now: Instant) -> TimerOutcome {
        let idx = timer as usize;
        match self.deadline[idx] {
            Some(d) if d <= now => {
                self.retries[idx] += 1;
                if self.retries[idx] > self.max_retries[idx] {
                    self.deadline[idx] = None;
                    TimerOutcome::Exhausted
                } else {
                    self.deadline[idx] = Some(now + self.interval[idx]);
                    TimerOutcome::Retry(self.retries[idx])
                }
            }
            _ => TimerOutcome::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_after_configured_retries() {
        let mut table = TimerTable::new();
        table.configure(Timer::Retransmit, Duration::from_millis(10), 2);
        let start = Instant::now();
        table.start(Timer::Retransmit, start);

        let t1 = start + Duration::from_millis(11);
        assert_eq!(table.poll(Timer::Retransmit, t1), TimerOutcome::Retry(1));
        let t2 = t1 + Duration::from_millis(11);
        assert_eq!(table.poll(Timer::Retransmit, t2), TimerOutcome::Retry(2));
        let t3 = t2 + Duration::from_millis(11);
        assert_eq!(table.poll(Timer::Retransmit, t3), TimerOutcome::Exhausted);
        assert!(!table.is_running(Timer::Retransmit));
    }
}
