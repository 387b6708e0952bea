//! Absolute deadlines threaded through awaited browser and network calls.
//!
//! A `Deadline` is created once per operation and passed down by value;
//! nested steps may only shorten it (`cap`), never extend it.

use std::future::Future;
use std::time::Duration;

use tokio::time::{error::Elapsed, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The earlier of this deadline and `budget` from now.
    pub fn cap(&self, budget: Duration) -> Self {
        Self {
            at: self.at.min(Instant::now() + budget),
        }
    }

    /// This deadline moved `reserve` earlier, keeping that much time back
    /// for a final step.
    pub fn reserve(&self, reserve: Duration) -> Self {
        Self {
            at: self.at.checked_sub(reserve).unwrap_or(self.at),
        }
    }

    /// Run `fut` until it completes or the deadline passes. The future is
    /// dropped on expiry.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Elapsed> {
        tokio::time::timeout_at(self.at, fut).await
    }

    /// Sleep for `pause`, cut short by the deadline. Returns false if the
    /// deadline passed first.
    pub async fn pause(&self, pause: Duration) -> bool {
        self.run(tokio::time::sleep(pause)).await.is_ok()
    }
}
