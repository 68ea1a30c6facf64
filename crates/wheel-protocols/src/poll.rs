//! Idle backoff for polling loops.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::PollConfig;

/// Exponential sleep between empty polls, reset whenever work arrives.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    config: PollConfig,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(config: PollConfig) -> Self {
        Self {
            config,
            current: config.initial,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.config.initial;
    }

    /// Sleep for the current interval, then double it up to the maximum.
    pub(crate) fn idle(&mut self) {
        thread::sleep(self.current);
        self.current = (self.current * 2).min(self.config.max);
    }

    #[cfg(test)]
    fn current(&self) -> Duration {
        self.current
    }
}

/// Poll `done` until it holds or `timeout` elapses. Returns whether it held.
pub(crate) fn wait_until(
    timeout: Duration,
    poll: PollConfig,
    mut done: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    let mut backoff = Backoff::new(poll);
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        backoff.idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_cap() {
        let mut backoff = Backoff::new(PollConfig {
            initial: Duration::from_micros(10),
            max: Duration::from_micros(35),
        });
        backoff.idle();
        assert_eq!(backoff.current(), Duration::from_micros(20));
        backoff.idle();
        assert_eq!(backoff.current(), Duration::from_micros(35));
        backoff.idle();
        assert_eq!(backoff.current(), Duration::from_micros(35));
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_micros(10));
    }

    #[test]
    fn wait_until_times_out() {
        assert!(!wait_until(Duration::from_millis(5), PollConfig::fast(), || false));

        let mut calls = 0;
        assert!(wait_until(Duration::from_secs(1), PollConfig::fast(), || {
            calls += 1;
            calls == 3
        }));
    }
}
