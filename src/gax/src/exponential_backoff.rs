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

//! Truncated exponential backoff with proportional jitter.
//!
//! After the n-th attempt (or poll) the delay is:
//!
//! ```norust
//! base(n)  = min(maximum, initial * scaling^(n-1))
//! delay(n) = base(n) * uniform(1 - jitter, 1 + jitter)
//! ```
//!
//! [ExponentialBackoff] implements both [BackoffPolicy] and
//! [PollingBackoffPolicy]. The default jitter is `0.2`; set it to `0.0` for
//! deterministic delays.
//!
//! [BackoffPolicy]: crate::backoff_policy::BackoffPolicy
//! [PollingBackoffPolicy]: crate::backoff_policy::PollingBackoffPolicy

use crate::retry_state::RetryState;
use std::time::Duration;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAXIMUM_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_SCALING: f64 = 2.0;
const DEFAULT_JITTER: f64 = 0.2;

// Bounds used by `clamp()`.
const MAX_SCALING: f64 = 32.0;
const MIN_INITIAL_DELAY: Duration = Duration::from_millis(1);
const MIN_MAXIMUM_DELAY: Duration = Duration::from_secs(1);
const MAX_MAXIMUM_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Invalid exponential backoff parameters.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("the initial delay must be positive, got {0:?}")]
    ZeroInitialDelay(Duration),
    #[error("the maximum delay ({maximum:?}) is shorter than the initial delay ({initial:?})")]
    MaximumBelowInitial { initial: Duration, maximum: Duration },
    #[error("the scaling factor must be at least 1.0, got {0}")]
    ScalingBelowOne(f64),
    #[error("the jitter must be in the [0.0, 1.0] range, got {0}")]
    JitterOutOfRange(f64),
}

/// Builds an [ExponentialBackoff].
///
/// Starts from a 1 second initial delay, a 60 second maximum, a scaling
/// factor of 2 and 20% jitter.
///
/// # Example
/// ```
/// # use aiplatform_gax::exponential_backoff::ExponentialBackoffBuilder;
/// # use aiplatform_gax::backoff_policy::BackoffPolicy;
/// # use aiplatform_gax::retry_state::RetryState;
/// use std::time::Duration;
/// let backoff = ExponentialBackoffBuilder::new()
///     .with_initial_delay(Duration::from_millis(250))
///     .with_maximum_delay(Duration::from_secs(4))
///     .with_scaling(4.0)
///     .with_jitter(0.0)
///     .build()?;
/// let state = RetryState::new(true).set_attempt_count(2_u32);
/// assert_eq!(backoff.on_failure(&state), Duration::from_secs(1));
/// # Ok::<(), aiplatform_gax::exponential_backoff::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
    jitter: f64,
}

impl ExponentialBackoffBuilder {
    pub fn new() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            maximum_delay: DEFAULT_MAXIMUM_DELAY,
            scaling: DEFAULT_SCALING,
            jitter: DEFAULT_JITTER,
        }
    }

    /// The delay after the first failure.
    pub fn with_initial_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.initial_delay = v.into();
        self
    }

    /// The cap on the delay, applied before the jitter.
    pub fn with_maximum_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.maximum_delay = v.into();
        self
    }

    pub fn with_scaling<V: Into<f64>>(mut self, v: V) -> Self {
        self.scaling = v.into();
        self
    }

    /// The jitter fraction. `0.0` disables jitter.
    pub fn with_jitter<V: Into<f64>>(mut self, v: V) -> Self {
        self.jitter = v.into();
        self
    }

    /// Validates the parameters and creates the policy.
    pub fn build(self) -> Result<ExponentialBackoff, Error> {
        if self.initial_delay.is_zero() {
            return Err(Error::ZeroInitialDelay(self.initial_delay));
        }
        if self.maximum_delay < self.initial_delay {
            return Err(Error::MaximumBelowInitial {
                initial: self.initial_delay,
                maximum: self.maximum_delay,
            });
        }
        if self.scaling.is_nan() || self.scaling < 1.0 {
            return Err(Error::ScalingBelowOne(self.scaling));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::JitterOutOfRange(self.jitter));
        }
        Ok(ExponentialBackoff {
            initial_delay: self.initial_delay,
            maximum_delay: self.maximum_delay,
            scaling: self.scaling,
            jitter: self.jitter,
        })
    }

    /// Creates the policy, moving invalid parameters into a usable range.
    ///
    /// The maximum delay is clamped to `[1s, 24h]`, then the initial delay to
    /// `[1ms, maximum]`. The scaling factor is clamped to `[1.0, 32.0]` and
    /// the jitter to `[0.0, 1.0]`. NaN values take the lower bound.
    pub fn clamp(self) -> ExponentialBackoff {
        let maximum_delay = self
            .maximum_delay
            .clamp(MIN_MAXIMUM_DELAY, MAX_MAXIMUM_DELAY);
        ExponentialBackoff {
            initial_delay: self.initial_delay.clamp(MIN_INITIAL_DELAY, maximum_delay),
            maximum_delay,
            scaling: clamp_or(self.scaling, 1.0, MAX_SCALING),
            jitter: clamp_or(self.jitter, 0.0, 1.0),
        }
    }
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_or(v: f64, min: f64, max: f64) -> f64 {
    if v.is_nan() { min } else { v.clamp(min, max) }
}

/// Truncated exponential backoff with jitter.
///
/// Use [ExponentialBackoffBuilder] to create non-default instances.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    /// The delay after `attempt_count` attempts, before jitter.
    fn base_delay(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.scaling.powi(exponent);
        // Compare in f64 so large exponents saturate instead of overflowing
        // the `Duration` multiplication.
        if factor >= self.maximum_delay.div_duration_f64(self.initial_delay) {
            return self.maximum_delay;
        }
        self.initial_delay.mul_f64(factor)
    }

    // `sample` is uniformly distributed in `[0, 1)`.
    fn jittered(&self, attempt_count: u32, sample: f64) -> Duration {
        let base = self.base_delay(attempt_count);
        if self.jitter == 0.0 {
            return base;
        }
        base.mul_f64(1.0 - self.jitter + 2.0 * self.jitter * sample)
    }

    fn delay(&self, attempt_count: u32) -> Duration {
        use rand::Rng;
        let sample = if self.jitter == 0.0 {
            0.0
        } else {
            rand::rng().random::<f64>()
        };
        self.jittered(attempt_count, sample)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoffBuilder::new().clamp()
    }
}

impl crate::backoff_policy::BackoffPolicy for ExponentialBackoff {
    fn on_failure(&self, state: &RetryState) -> Duration {
        self.delay(state.attempt_count)
    }
}

impl crate::backoff_policy::PollingBackoffPolicy for ExponentialBackoff {
    fn wait_period(&self, state: &RetryState) -> Duration {
        self.delay(state.attempt_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff_policy::{BackoffPolicy, PollingBackoffPolicy};
    use test_case::test_case;

    fn fixed(initial_ms: u64, maximum_ms: u64) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_delay: Duration::from_millis(initial_ms),
            maximum_delay: Duration::from_millis(maximum_ms),
            scaling: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn build_rejects_delays() {
        let got = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::ZERO)
            .build();
        assert!(matches!(got, Err(Error::ZeroInitialDelay(_))), "{got:?}");

        let got = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(10))
            .with_maximum_delay(Duration::from_secs(5))
            .build();
        assert!(
            matches!(got, Err(Error::MaximumBelowInitial { .. })),
            "{got:?}"
        );
    }

    #[test_case(0.5; "below one")]
    #[test_case(-2.0; "negative")]
    #[test_case(f64::NAN; "nan")]
    fn build_rejects_scaling(scaling: f64) {
        let got = ExponentialBackoffBuilder::new().with_scaling(scaling).build();
        assert!(matches!(got, Err(Error::ScalingBelowOne(_))), "{got:?}");
    }

    #[test_case(-0.1; "negative")]
    #[test_case(1.5; "above one")]
    #[test_case(f64::NAN; "nan")]
    fn build_rejects_jitter(jitter: f64) {
        let got = ExponentialBackoffBuilder::new().with_jitter(jitter).build();
        assert!(matches!(got, Err(Error::JitterOutOfRange(_))), "{got:?}");
    }

    #[test]
    fn build_accepts_extremes() {
        let got = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_nanos(1))
            .with_maximum_delay(Duration::MAX)
            .with_scaling(1.0)
            .with_jitter(1.0)
            .build();
        assert!(got.is_ok(), "{got:?}");
    }

    #[test_case(Duration::ZERO, Duration::ZERO, 0.5, -1.0; "all below")]
    #[test_case(Duration::MAX, Duration::MAX, 1e9, 2.0; "all above")]
    #[test_case(Duration::from_secs(10), Duration::from_secs(2), f64::NAN, f64::NAN; "initial above maximum")]
    fn clamp(initial: Duration, maximum: Duration, scaling: f64, jitter: f64) {
        let got = ExponentialBackoffBuilder::new()
            .with_initial_delay(initial)
            .with_maximum_delay(maximum)
            .with_scaling(scaling)
            .with_jitter(jitter)
            .clamp();
        assert!((MIN_MAXIMUM_DELAY..=MAX_MAXIMUM_DELAY).contains(&got.maximum_delay), "{got:?}");
        assert!((MIN_INITIAL_DELAY..=got.maximum_delay).contains(&got.initial_delay), "{got:?}");
        assert!((1.0..=MAX_SCALING).contains(&got.scaling), "{got:?}");
        assert!((0.0..=1.0).contains(&got.jitter), "{got:?}");
    }

    #[test]
    fn base_delay_grows_and_saturates() {
        let backoff = fixed(10, 100);
        let got = [0, 1, 2, 3, 4, 5, u32::MAX].map(|n| backoff.base_delay(n));
        let want = [10, 10, 20, 40, 80, 100, 100].map(Duration::from_millis);
        assert_eq!(got, want);
    }

    #[test_case(0.0, 500; "low end")]
    #[test_case(0.5, 1000; "midpoint")]
    #[test_case(0.75, 1250; "upper half")]
    fn jitter_range(sample: f64, want_ms: u64) {
        let backoff = ExponentialBackoff {
            jitter: 0.5,
            ..fixed(1000, 1000)
        };
        let got = backoff.jittered(1, sample);
        let want = Duration::from_millis(want_ms);
        let diff = got.abs_diff(want);
        assert!(diff < Duration::from_micros(1), "{got:?} vs {want:?}");
    }

    #[test]
    fn policies_without_jitter() {
        let backoff = fixed(10, 100);
        for (attempt, want) in [(1_u32, 10), (2, 20), (3, 40), (6, 100)] {
            let state = RetryState::new(true).set_attempt_count(attempt);
            let want = Duration::from_millis(want);
            assert_eq!(backoff.on_failure(&state), want, "{attempt}");
            assert_eq!(backoff.wait_period(&state), want, "{attempt}");
        }
    }

    #[test]
    fn policies_with_jitter() {
        let backoff = ExponentialBackoff::default();
        for attempt in 1..10_u32 {
            let state = RetryState::new(true).set_attempt_count(attempt);
            let base = backoff.base_delay(attempt);
            let got = backoff.on_failure(&state);
            assert!(got >= base.mul_f64(0.8) && got <= base.mul_f64(1.2), "{got:?}");
        }
    }

    #[test]
    fn defaults() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.initial_delay, DEFAULT_INITIAL_DELAY);
        assert_eq!(backoff.maximum_delay, DEFAULT_MAXIMUM_DELAY);
        assert_eq!(backoff.scaling, DEFAULT_SCALING);
        assert_eq!(backoff.jitter, DEFAULT_JITTER);
        assert!(ExponentialBackoffBuilder::default().build().is_ok());
    }
}
