// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Limits the retry traffic generated by a client.
//!
//! A runner that retries every transient failure can multiply the load on a
//! service that is already struggling. The throttlers in this module track
//! how requests complete and refuse retry attempts once the observed failure
//! rate is too high. First attempts are never throttled.
//!
//! A throttler is shared by every request of a [CallRunner] (and its clones).
//! Operation polls go through the same runner, so they share the budget with
//! regular calls. Set a different throttler per client with
//! [ClientBuilder::with_retry_throttler] or per request with
//! [RequestOptionsBuilder::with_retry_throttler].
//!
//! Two strategies are provided:
//! - [AdaptiveThrottler] rejects retries at random, with a probability that
//!   grows with the ratio of failed requests. See the [Handling Overload]
//!   chapter of the SRE book.
//! - [CircuitBreaker] keeps a token budget and rejects all retries while the
//!   budget is below a threshold, like [gRPC retry throttling].
//!
//! # Example
//! ```
//! # use aiplatform_gax::retry_throttler::*;
//! let adaptive = AdaptiveThrottler::new(2.0)?;
//! let breaker = CircuitBreaker::new(1000, 250, 10)?;
//! # Ok::<(), Error>(())
//! ```
//!
//! [CallRunner]: crate::call_runner::CallRunner
//! [ClientBuilder::with_retry_throttler]: crate::client_builder::ClientBuilder::with_retry_throttler
//! [RequestOptionsBuilder::with_retry_throttler]: crate::options::RequestOptionsBuilder::with_retry_throttler
//! [Handling Overload]: https://sre.google/sre-book/handling-overload/
//! [gRPC retry throttling]: https://github.com/grpc/proposal/blob/master/A6-client-retries.md

use crate::loop_control::RetryResult;
use std::sync::{Arc, Mutex};

/// Errors creating a throttler.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("the adaptive throttling factor must be a non-negative number, got {0}")]
    InvalidFactor(f64),
    #[error("the throttling threshold ({threshold}) cannot exceed the token capacity ({capacity})")]
    ThresholdAboveCapacity { threshold: u64, capacity: u64 },
}

/// Decides whether a retry attempt may be sent.
///
/// The call runner asks [throttle_retry_attempt] before each retry and
/// reports how every attempt completes. A throttled attempt is not sent:
/// the runner hands the previous error to [RetryPolicy::on_throttle] and
/// backs off as if the attempt had failed.
///
/// [throttle_retry_attempt]: RetryThrottler::throttle_retry_attempt
/// [RetryPolicy::on_throttle]: crate::retry_policy::RetryPolicy::on_throttle
pub trait RetryThrottler: Send + Sync + std::fmt::Debug {
    /// Returns `true` if the next retry attempt should be skipped.
    fn throttle_retry_attempt(&self) -> bool;

    /// Records a failed attempt and the retry policy decision for it.
    fn on_retry_failure(&mut self, flow: &RetryResult);

    /// Records a successful attempt.
    fn on_success(&mut self);
}

/// A throttler shared between requests and clients.
pub type SharedRetryThrottler = Arc<Mutex<dyn RetryThrottler>>;

/// Converts throttlers into the shared form used by the configuration types.
#[derive(Clone, Debug)]
pub struct RetryThrottlerArg(pub(crate) SharedRetryThrottler);

impl<T: RetryThrottler + 'static> From<T> for RetryThrottlerArg {
    fn from(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }
}

impl From<SharedRetryThrottler> for RetryThrottlerArg {
    fn from(value: SharedRetryThrottler) -> Self {
        Self(value)
    }
}

impl From<RetryThrottlerArg> for SharedRetryThrottler {
    fn from(value: RetryThrottlerArg) -> Self {
        value.0
    }
}

/// Rejects retries at random, based on the observed failure rate.
///
/// The throttler counts completed `requests` and the subset `accepted` by the
/// service. Permanent errors count as accepted: the service processed the
/// request and rejected it on its merits. Each retry is rejected with
/// probability:
///
/// ```norust
/// max(0, (requests - factor * accepted) / (requests + 1))
/// ```
///
/// Larger factors tolerate more failures before rejecting retries. With a
/// factor of `0.0` some retries are rejected even if every request succeeds.
/// The default factor is `2.0`.
#[derive(Clone, Debug)]
pub struct AdaptiveThrottler {
    requests: u64,
    accepted: u64,
    factor: f64,
}

impl AdaptiveThrottler {
    /// Creates a throttler, rejecting negative or NaN factors.
    ///
    /// ```
    /// # use aiplatform_gax::retry_throttler::*;
    /// assert!(AdaptiveThrottler::new(2.0).is_ok());
    /// assert!(AdaptiveThrottler::new(-1.0).is_err());
    /// ```
    pub fn new(factor: f64) -> Result<Self, Error> {
        if factor.is_nan() || factor < 0.0 {
            return Err(Error::InvalidFactor(factor));
        }
        Ok(Self::clamp(factor))
    }

    /// Creates a throttler, replacing negative or NaN factors with `0.0`.
    pub fn clamp(factor: f64) -> Self {
        Self {
            requests: 0,
            accepted: 0,
            factor: if factor >= 0.0 { factor } else { 0.0 },
        }
    }

    /// The current probability of rejecting a retry attempt.
    pub fn reject_probability(&self) -> f64 {
        let requests = self.requests as f64;
        let accepted = self.accepted as f64;
        ((requests - self.factor * accepted) / (requests + 1.0)).max(0.0)
    }

    // `sample` is uniformly distributed in `[0, 1)`.
    fn throttle_sample(&self, sample: f64) -> bool {
        sample < self.reject_probability()
    }
}

impl Default for AdaptiveThrottler {
    fn default() -> Self {
        Self::clamp(2.0)
    }
}

impl RetryThrottler for AdaptiveThrottler {
    fn throttle_retry_attempt(&self) -> bool {
        use rand::Rng;
        self.throttle_sample(rand::rng().random::<f64>())
    }

    fn on_retry_failure(&mut self, flow: &RetryResult) {
        self.requests += 1;
        if flow.is_permanent() {
            self.accepted += 1;
        }
    }

    fn on_success(&mut self) {
        self.requests += 1;
        self.accepted += 1;
    }
}

/// Rejects every retry while the token budget is at or below a threshold.
///
/// The budget starts full. Each retryable failure costs `error_cost` tokens,
/// each completed request (successful or permanently failed) refunds one
/// token up to the initial capacity. Concurrent failures may drain the budget
/// below the threshold.
#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    capacity: u64,
    threshold: u64,
    tokens: u64,
    error_cost: u64,
}

impl CircuitBreaker {
    /// Creates a breaker with `capacity` tokens that opens at `threshold`.
    ///
    /// ```
    /// # use aiplatform_gax::retry_throttler::*;
    /// let breaker = CircuitBreaker::new(1000, 250, 10)?;
    /// assert!(CircuitBreaker::new(100, 200, 10).is_err());
    /// # Ok::<(), Error>(())
    /// ```
    pub fn new(capacity: u64, threshold: u64, error_cost: u64) -> Result<Self, Error> {
        if threshold > capacity {
            return Err(Error::ThresholdAboveCapacity {
                threshold,
                capacity,
            });
        }
        Ok(Self::clamp(capacity, threshold, error_cost))
    }

    /// Creates a breaker, lowering `threshold` to `capacity` if needed.
    pub fn clamp(capacity: u64, threshold: u64, error_cost: u64) -> Self {
        Self {
            capacity,
            threshold: threshold.min(capacity),
            tokens: capacity,
            error_cost,
        }
    }

    /// The tokens left in the budget.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }
}

impl Default for CircuitBreaker {
    /// 100 tokens, opening at 50, with each failure costing 10 tokens.
    fn default() -> Self {
        Self::clamp(100, 50, 10)
    }
}

impl RetryThrottler for CircuitBreaker {
    fn throttle_retry_attempt(&self) -> bool {
        self.tokens <= self.threshold
    }

    fn on_retry_failure(&mut self, flow: &RetryResult) {
        if flow.is_permanent() {
            self.on_success();
        } else {
            self.tokens = self.tokens.saturating_sub(self.error_cost);
        }
    }

    fn on_success(&mut self) {
        self.tokens = (self.tokens + 1).min(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::rpc::{Code, Status};
    use test_case::test_case;

    fn unavailable() -> crate::error::Error {
        crate::error::Error::service(Status::default().set_code(Code::Unavailable))
    }

    fn transient() -> RetryResult {
        RetryResult::Continue(unavailable())
    }

    fn permanent() -> RetryResult {
        RetryResult::Permanent(unavailable())
    }

    #[test]
    fn arg_conversions() {
        let _ = RetryThrottlerArg::from(AdaptiveThrottler::default());
        let shared: SharedRetryThrottler = Arc::new(Mutex::new(CircuitBreaker::default()));
        let arg = RetryThrottlerArg::from(shared.clone());
        let back: SharedRetryThrottler = arg.into();
        assert!(Arc::ptr_eq(&back, &shared));
    }

    #[test_case(-1.0; "negative")]
    #[test_case(f64::NAN; "nan")]
    fn adaptive_invalid_factor(factor: f64) {
        let got = AdaptiveThrottler::new(factor);
        assert!(matches!(got, Err(Error::InvalidFactor(_))), "{got:?}");
        assert_eq!(AdaptiveThrottler::clamp(factor).factor, 0.0);
    }

    #[test]
    fn adaptive_counts() {
        let mut throttler = AdaptiveThrottler::default();
        assert_eq!(throttler.reject_probability(), 0.0);
        assert!(!throttler.throttle_retry_attempt(), "{throttler:?}");

        throttler.on_retry_failure(&transient());
        throttler.on_retry_failure(&RetryResult::Exhausted(unavailable()));
        assert_eq!((throttler.requests, throttler.accepted), (2, 0));
        throttler.on_success();
        throttler.on_retry_failure(&permanent());
        assert_eq!((throttler.requests, throttler.accepted), (4, 2));
    }

    #[test]
    fn adaptive_rejects_after_failures() {
        let mut throttler = AdaptiveThrottler::default();
        throttler.on_retry_failure(&transient());
        // (1 - 2 * 0) / (1 + 1)
        assert_eq!(throttler.reject_probability(), 0.5);
        assert!(throttler.throttle_sample(0.0), "{throttler:?}");
        assert!(throttler.throttle_sample(0.49), "{throttler:?}");
        assert!(!throttler.throttle_sample(0.5), "{throttler:?}");

        for _ in 0..8 {
            throttler.on_retry_failure(&transient());
        }
        assert_eq!(throttler.reject_probability(), 0.9);
    }

    #[test]
    fn adaptive_recovers_with_successes() -> anyhow::Result<()> {
        let mut throttler = AdaptiveThrottler::new(2.0)?;
        for _ in 0..4 {
            throttler.on_retry_failure(&transient());
        }
        for _ in 0..2 {
            throttler.on_success();
        }
        // (6 - 2 * 2) / 7 > 0
        assert!(throttler.reject_probability() > 0.0);
        throttler.on_success();
        // (7 - 2 * 3) / 8 > 0
        throttler.on_success();
        // (8 - 2 * 4) / 9 == 0
        assert_eq!(throttler.reject_probability(), 0.0);
        assert!(!throttler.throttle_sample(0.0), "{throttler:?}");
        Ok(())
    }

    #[test]
    fn breaker_validation() {
        let got = CircuitBreaker::new(100, 200, 1);
        assert!(
            matches!(
                got,
                Err(Error::ThresholdAboveCapacity {
                    threshold: 200,
                    capacity: 100
                })
            ),
            "{got:?}"
        );
        let breaker = CircuitBreaker::clamp(100, 200, 1);
        assert_eq!(breaker.threshold, 100);
        assert!(breaker.throttle_retry_attempt(), "{breaker:?}");
    }

    #[test]
    fn breaker_opens_and_closes() {
        let mut breaker = CircuitBreaker::default();
        for _ in 0..4 {
            breaker.on_retry_failure(&transient());
            assert!(!breaker.throttle_retry_attempt(), "{breaker:?}");
        }
        breaker.on_retry_failure(&RetryResult::Exhausted(unavailable()));
        assert_eq!(breaker.tokens(), 50);
        assert!(breaker.throttle_retry_attempt(), "{breaker:?}");

        breaker.on_retry_failure(&transient());
        assert_eq!(breaker.tokens(), 40);

        // Completed requests refund one token each.
        for _ in 0..10 {
            breaker.on_success();
        }
        assert!(breaker.throttle_retry_attempt(), "{breaker:?}");
        breaker.on_retry_failure(&permanent());
        assert_eq!(breaker.tokens(), 51);
        assert!(!breaker.throttle_retry_attempt(), "{breaker:?}");
    }

    #[test]
    fn breaker_tokens_are_bounded() {
        let mut breaker = CircuitBreaker::clamp(20, 5, 15);
        breaker.on_success();
        assert_eq!(breaker.tokens(), 20);
        breaker.on_retry_failure(&transient());
        breaker.on_retry_failure(&transient());
        assert_eq!(breaker.tokens(), 0);
    }
}
