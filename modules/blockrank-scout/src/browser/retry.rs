use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff for remote pool connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform random delay added to each backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(15),
            jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the `attempt`-th failure (1-based), without jitter:
    /// 3s, 6s, 12s, 15s, 15s...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(extra)
    }
}

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting(u32),
    Retrying { attempt: u32, delay: Duration },
    Succeeded(u32),
    /// Every attempt failed with a retryable error.
    Exhausted(u32),
    FailedFatal(u32),
}

/// Drives one acquisition's attempts. The caller performs the attempt and
/// sleeps; the machine only decides.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Idle,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        match self.state {
            RetryState::Idle => 0,
            RetryState::Attempting(n)
            | RetryState::Retrying { attempt: n, .. }
            | RetryState::Succeeded(n)
            | RetryState::Exhausted(n)
            | RetryState::FailedFatal(n) => n,
        }
    }

    /// Start the next attempt, returning its 1-based number, or `None` once
    /// the machine has reached a terminal state.
    pub fn next_attempt(&mut self) -> Option<u32> {
        let next = match self.state {
            RetryState::Idle => 1,
            RetryState::Retrying { attempt, .. } => attempt + 1,
            _ => return None,
        };
        self.state = RetryState::Attempting(next);
        Some(next)
    }

    /// Record a failed attempt. Returns the delay before the next attempt,
    /// or `None` when no attempt should follow.
    pub fn fail(&mut self, disposition: Disposition) -> Option<Duration> {
        let RetryState::Attempting(attempt) = self.state else {
            return None;
        };

        match disposition {
            Disposition::Fatal => {
                self.state = RetryState::FailedFatal(attempt);
                None
            }
            Disposition::Retryable if attempt >= self.policy.max_attempts => {
                self.state = RetryState::Exhausted(attempt);
                None
            }
            Disposition::Retryable => {
                let delay = self.policy.backoff_with_jitter(attempt);
                self.state = RetryState::Retrying { attempt, delay };
                Some(delay)
            }
        }
    }

    pub fn succeed(&mut self) {
        if let RetryState::Attempting(attempt) = self.state {
            self.state = RetryState::Succeeded(attempt);
        }
    }
}
