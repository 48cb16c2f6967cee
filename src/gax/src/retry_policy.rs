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

//! Decides whether a failed attempt is tried again.
//!
//! A failed call is retried only when the error is transient and the call is
//! [idempotent], or when the transport proves the request never left the
//! client. Applications that know more about their own requests can swap the
//! policy per client or per request.
//!
//! # Example
//! ```
//! # use aiplatform_gax::retry_policy::*;
//! # use aiplatform_gax::options::RequestOptions;
//! use std::time::Duration;
//! let policy = TransientErrors::default()
//!     .with_attempt_limit(4)
//!     .with_time_limit(Duration::from_secs(30));
//! let mut options = RequestOptions::default();
//! options.set_retry_policy(policy);
//! ```
//!
//! [idempotent]: https://en.wikipedia.org/wiki/Idempotence

use crate::error::Error;
use crate::error::rpc::Code;
use crate::loop_control::{RetryResult, ThrottleResult};
use crate::retry_state::RetryState;
use std::sync::Arc;
use std::time::Duration;

/// Classifies attempt errors and bounds the retry loop.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Called after each failed attempt, `state` already counts it.
    #[must_use = "the result of the policy decision must be used"]
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult;

    /// Called when the throttler suppresses a retry before it is sent.
    ///
    /// The default keeps looping, decorators with limits stop here too.
    fn on_throttle(&self, _state: &RetryState, error: Error) -> ThrottleResult {
        ThrottleResult::Continue(error)
    }

    /// Time left before the policy expires, `None` when it has no time limit.
    ///
    /// The runner caps each attempt deadline at this value.
    fn remaining_time(&self, _state: &RetryState) -> Option<Duration> {
        None
    }
}

/// Accepts any [RetryPolicy] in option setters.
#[derive(Clone, Debug)]
pub struct RetryPolicyArg(pub(crate) Arc<dyn RetryPolicy>);

impl<T: RetryPolicy + 'static> std::convert::From<T> for RetryPolicyArg {
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl std::convert::From<Arc<dyn RetryPolicy>> for RetryPolicyArg {
    fn from(value: Arc<dyn RetryPolicy>) -> Self {
        Self(value)
    }
}

impl From<RetryPolicyArg> for Arc<dyn RetryPolicy> {
    fn from(value: RetryPolicyArg) -> Arc<dyn RetryPolicy> {
        value.0
    }
}

/// Decorators available on every [RetryPolicy].
pub trait RetryPolicyExt: RetryPolicy + Sized {
    /// Stops retrying once `maximum_duration` has elapsed since the loop started.
    ///
    /// Backoff time counts. Past the limit, a [Continue][RetryResult::Continue]
    /// from the inner policy becomes [Exhausted][RetryResult::Exhausted].
    ///
    /// # Example
    /// ```
    /// # use aiplatform_gax::retry_policy::*;
    /// # use aiplatform_gax::retry_state::RetryState;
    /// use std::time::Duration;
    /// let policy = TransientErrors::default().with_time_limit(Duration::from_secs(10));
    /// let state = RetryState::new(true);
    /// assert_eq!(policy.remaining_time(&state), Some(Duration::from_secs(10)));
    /// ```
    fn with_time_limit(self, maximum_duration: Duration) -> LimitedElapsedTime<Self> {
        LimitedElapsedTime::custom(self, maximum_duration)
    }

    /// Stops retrying after `maximum_attempts` sends, the first one included.
    ///
    /// # Example
    /// ```
    /// # use aiplatform_gax::retry_policy::*;
    /// # use aiplatform_gax::retry_state::RetryState;
    /// # use aiplatform_gax::error::{Error, rpc::{Code, Status}};
    /// let policy = TransientErrors::default().with_attempt_limit(3);
    /// let unavailable = || Error::service(Status::default().set_code(Code::Unavailable));
    /// let state = RetryState::new(true);
    /// assert!(policy.on_error(&state.clone().set_attempt_count(1_u32), unavailable()).is_continue());
    /// assert!(policy.on_error(&state.set_attempt_count(3_u32), unavailable()).is_exhausted());
    /// ```
    fn with_attempt_limit(self, maximum_attempts: u32) -> LimitedAttemptCount<Self> {
        LimitedAttemptCount::custom(self, maximum_attempts)
    }
}

impl<T: RetryPolicy> RetryPolicyExt for T {}

/// The default retry policy.
///
/// For idempotent requests this policy retries:
/// - Service errors with code `UNAVAILABLE` or `RESOURCE_EXHAUSTED`.
/// - Service errors with code `INTERNAL` or `UNKNOWN` that carry a
///   `RetryInfo` detail, the service uses the detail to mark them as
///   transient.
/// - Transport errors and attempt timeouts.
/// - Optionally, service errors with code `ABORTED`, see
///   [with_aborted][TransientErrors::with_aborted].
///
/// For all requests the policy retries errors where the request never left
/// the client.
///
/// This policy should be decorated to limit the number of retry attempts or
/// the duration of the retry loop, see [RetryPolicyExt].
#[derive(Clone, Debug, Default)]
pub struct TransientErrors {
    retry_aborted: bool,
}

impl TransientErrors {
    /// Treat `ABORTED` as a transient error for idempotent requests.
    ///
    /// Services use `ABORTED` for concurrency conflicts. Retrying the same
    /// request is only useful if the conflict was transient, the default is to
    /// report the error to the application.
    pub fn with_aborted(mut self, v: bool) -> Self {
        self.retry_aborted = v;
        self
    }

    fn is_transient(&self, error: &Error) -> bool {
        if error.is_transport() || error.is_timeout() {
            return true;
        }
        let Some(status) = error.status() else {
            return false;
        };
        match status.code {
            Code::Unavailable | Code::ResourceExhausted => true,
            Code::Aborted => self.retry_aborted,
            Code::Internal | Code::Unknown => status.has_retry_info(),
            _ => false,
        }
    }
}

impl RetryPolicy for TransientErrors {
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult {
        if error.is_transient_and_before_rpc() {
            return RetryResult::Continue(error);
        }
        if state.idempotent && self.is_transient(&error) {
            return RetryResult::Continue(error);
        }
        RetryResult::Permanent(error)
    }
}

/// Retries only `UNAVAILABLE` service errors, following [AIP-194] to the letter.
///
/// Combine with [RetryPolicyExt] limits, it never stops on its own.
///
/// [AIP-194]: https://google.aip.dev/194
#[derive(Clone, Debug)]
pub struct Aip194Strict;

impl RetryPolicy for Aip194Strict {
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult {
        if error.is_transient_and_before_rpc() {
            return RetryResult::Continue(error);
        }
        if !state.idempotent {
            return RetryResult::Permanent(error);
        }
        if error.is_io() {
            return RetryResult::Continue(error);
        }
        if error.status().is_some_and(|s| s.code == Code::Unavailable) {
            return RetryResult::Continue(error);
        }
        RetryResult::Permanent(error)
    }
}

/// Treats every error as transient.
///
/// Unbounded unless decorated. Non-idempotent requests that may have reached
/// the service are still not retried.
#[derive(Clone, Debug)]
pub struct AlwaysRetry;

impl RetryPolicy for AlwaysRetry {
    fn on_error(&self, _state: &RetryState, error: Error) -> RetryResult {
        RetryResult::Continue(error)
    }
}

/// Fails on the first error. Operation polls use it, the poll loop retries.
#[derive(Clone, Debug)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn on_error(&self, _state: &RetryState, error: Error) -> RetryResult {
        RetryResult::Exhausted(error)
    }
    fn on_throttle(&self, _state: &RetryState, error: Error) -> ThrottleResult {
        ThrottleResult::Exhausted(error)
    }
}

/// Bounds the wall time of the retry loop, backoff included.
///
/// Once the limit passes, inner [Continue][RetryResult::Continue] decisions
/// turn into [Exhausted][RetryResult::Exhausted]. `remaining_time()` bottoms
/// out at [Duration::ZERO].
#[derive(Debug)]
pub struct LimitedElapsedTime<P = TransientErrors>
where
    P: RetryPolicy,
{
    inner: P,
    maximum_duration: Duration,
}

impl LimitedElapsedTime {
    /// Wraps [TransientErrors].
    pub fn new(maximum_duration: Duration) -> Self {
        Self::custom(TransientErrors::default(), maximum_duration)
    }
}

impl<P> LimitedElapsedTime<P>
where
    P: RetryPolicy,
{
    /// Wraps `inner`.
    pub fn custom(inner: P, maximum_duration: Duration) -> Self {
        Self {
            inner,
            maximum_duration,
        }
    }

    fn error_if_exhausted(&self, state: &RetryState, error: Error) -> Error {
        let deadline = state.start + self.maximum_duration;
        if state.now >= deadline {
            Error::exhausted(error)
        } else {
            error
        }
    }
}

impl<P> RetryPolicy for LimitedElapsedTime<P>
where
    P: RetryPolicy,
{
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult {
        match self.inner.on_error(state, error) {
            RetryResult::Permanent(e) => RetryResult::Permanent(e),
            RetryResult::Exhausted(e) => RetryResult::Exhausted(e),
            RetryResult::Continue(e) => {
                if state.elapsed() > self.maximum_duration {
                    RetryResult::Exhausted(self.error_if_exhausted(state, e))
                } else {
                    RetryResult::Continue(e)
                }
            }
        }
    }

    fn on_throttle(&self, state: &RetryState, error: Error) -> ThrottleResult {
        match self.inner.on_throttle(state, error) {
            ThrottleResult::Exhausted(e) => ThrottleResult::Exhausted(e),
            ThrottleResult::Continue(e) => {
                if state.elapsed() > self.maximum_duration {
                    ThrottleResult::Exhausted(self.error_if_exhausted(state, e))
                } else {
                    ThrottleResult::Continue(e)
                }
            }
        }
    }

    fn remaining_time(&self, state: &RetryState) -> Option<Duration> {
        let deadline = state.start + self.maximum_duration;
        let remaining = deadline.saturating_duration_since(state.now);
        if let Some(inner) = self.inner.remaining_time(state) {
            return Some(std::cmp::min(remaining, inner));
        }
        Some(remaining)
    }
}

/// Bounds the number of sends, the first one included.
///
/// A limit of 0 or 1 disables retries. At the limit, inner
/// [Continue][RetryResult::Continue] decisions turn into
/// [Exhausted][RetryResult::Exhausted], anything else passes through.
#[derive(Debug)]
pub struct LimitedAttemptCount<P = TransientErrors>
where
    P: RetryPolicy,
{
    inner: P,
    maximum_attempts: u32,
}

impl LimitedAttemptCount {
    /// Wraps [TransientErrors].
    pub fn new(maximum_attempts: u32) -> Self {
        Self::custom(TransientErrors::default(), maximum_attempts)
    }
}

impl<P> LimitedAttemptCount<P>
where
    P: RetryPolicy,
{
    /// Wraps `inner`.
    pub fn custom(inner: P, maximum_attempts: u32) -> Self {
        Self {
            inner,
            maximum_attempts,
        }
    }
}

impl<P> RetryPolicy for LimitedAttemptCount<P>
where
    P: RetryPolicy,
{
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult {
        match self.inner.on_error(state, error) {
            RetryResult::Continue(e) if state.attempt_count >= self.maximum_attempts => {
                RetryResult::Exhausted(e)
            }
            result => result,
        }
    }

    fn on_throttle(&self, state: &RetryState, error: Error) -> ThrottleResult {
        if state.attempt_count >= self.maximum_attempts {
            return ThrottleResult::Exhausted(error);
        }
        self.inner.on_throttle(state, error)
    }

    fn remaining_time(&self, state: &RetryState) -> Option<Duration> {
        self.inner.remaining_time(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::rpc::{RetryInfo, Status};
    use test_case::test_case;
    use tokio::time::Instant;

    // Verify `RetryPolicyArg` can be converted from the desired types.
    #[test]
    fn retry_policy_arg() {
        let policy = LimitedAttemptCount::new(3);
        let _ = RetryPolicyArg::from(policy);

        let policy: Arc<dyn RetryPolicy> = Arc::new(LimitedAttemptCount::new(3));
        let arg = RetryPolicyArg::from(policy);
        let _: Arc<dyn RetryPolicy> = arg.into();
    }

    fn idempotent_state(now: Instant) -> RetryState {
        RetryState::new(true).set_start(now).set_now(now)
    }

    fn non_idempotent_state(now: Instant) -> RetryState {
        RetryState::new(false).set_start(now).set_now(now)
    }

    fn status(code: Code) -> Error {
        Error::service(Status::default().set_code(code).set_message("simulated"))
    }

    fn transient_internal() -> Error {
        let info = RetryInfo::new().set_retry_delay(Duration::from_millis(100));
        Error::service(
            Status::default()
                .set_code(Code::Internal)
                .set_details([info]),
        )
    }

    #[test_case(status(Code::Unavailable), true)]
    #[test_case(status(Code::ResourceExhausted), true)]
    #[test_case(status(Code::Aborted), false)]
    #[test_case(status(Code::Internal), false)]
    #[test_case(status(Code::Unknown), false)]
    #[test_case(transient_internal(), true)]
    #[test_case(status(Code::FailedPrecondition), false)]
    #[test_case(status(Code::InvalidArgument), false)]
    #[test_case(status(Code::NotFound), false)]
    #[test_case(status(Code::AlreadyExists), false)]
    #[test_case(status(Code::PermissionDenied), false)]
    #[test_case(status(Code::Unauthenticated), false)]
    #[test_case(Error::io("broken pipe"), true)]
    #[test_case(Error::timeout("attempt timeout"), true)]
    #[test_case(Error::deser("bad json"), false)]
    #[test_case(Error::ser("bad request"), false)]
    #[test_case(Error::other("err"), false)]
    fn transient_errors_idempotent(error: Error, want: bool) {
        let p = TransientErrors::default();
        let now = Instant::now();
        let got = p.on_error(&idempotent_state(now), error);
        assert_eq!(got.is_continue(), want, "{got:?}");
        assert_eq!(got.is_permanent(), !want, "{got:?}");
    }

    #[test_case(status(Code::Unavailable))]
    #[test_case(status(Code::ResourceExhausted))]
    #[test_case(transient_internal())]
    #[test_case(Error::io("broken pipe"))]
    #[test_case(Error::timeout("attempt timeout"))]
    fn transient_errors_non_idempotent(error: Error) {
        let p = TransientErrors::default();
        let now = Instant::now();
        let got = p.on_error(&non_idempotent_state(now), error);
        assert!(got.is_permanent(), "{got:?}");
    }

    #[test]
    fn transient_errors_before_rpc() {
        let p = TransientErrors::default();
        let now = Instant::now();
        let got = p.on_error(&non_idempotent_state(now), Error::connect("refused"));
        assert!(got.is_continue(), "{got:?}");
        let got = p.on_error(&idempotent_state(now), Error::connect("refused"));
        assert!(got.is_continue(), "{got:?}");
    }

    #[test]
    fn transient_errors_aborted() {
        let p = TransientErrors::default().with_aborted(true);
        let now = Instant::now();
        let got = p.on_error(&idempotent_state(now), status(Code::Aborted));
        assert!(got.is_continue(), "{got:?}");
        let got = p.on_error(&non_idempotent_state(now), status(Code::Aborted));
        assert!(got.is_permanent(), "{got:?}");
    }

    #[test]
    fn transient_errors_defaults() {
        let p = TransientErrors::default();
        let now = Instant::now();
        assert!(p.remaining_time(&idempotent_state(now)).is_none());
        let got = p.on_throttle(&idempotent_state(now), status(Code::Unavailable));
        assert!(got.is_continue(), "{got:?}");
    }

    #[test]
    fn aip194_strict() {
        let p = Aip194Strict;
        let now = Instant::now();

        let got = p.on_error(&idempotent_state(now), status(Code::Unavailable));
        assert!(got.is_continue(), "{got:?}");
        let got = p.on_error(&non_idempotent_state(now), status(Code::Unavailable));
        assert!(got.is_permanent(), "{got:?}");

        let got = p.on_error(&idempotent_state(now), status(Code::ResourceExhausted));
        assert!(got.is_permanent(), "{got:?}");
        let got = p.on_error(&idempotent_state(now), status(Code::PermissionDenied));
        assert!(got.is_permanent(), "{got:?}");

        let got = p.on_error(&idempotent_state(now), Error::io("err"));
        assert!(got.is_continue(), "{got:?}");
        let got = p.on_error(&non_idempotent_state(now), Error::io("err"));
        assert!(got.is_permanent(), "{got:?}");

        let got = p.on_error(&non_idempotent_state(now), Error::connect("err"));
        assert!(got.is_continue(), "{got:?}");

        let got = p.on_error(&idempotent_state(now), Error::deser("err"));
        assert!(got.is_permanent(), "{got:?}");
        let got = p.on_error(&idempotent_state(now), Error::other("err"));
        assert!(got.is_permanent(), "{got:?}");

        assert!(p.remaining_time(&idempotent_state(now)).is_none());
    }

    #[test]
    fn always_and_never() {
        let now = Instant::now();
        let got = AlwaysRetry.on_error(&non_idempotent_state(now), status(Code::NotFound));
        assert!(got.is_continue(), "{got:?}");

        let got = NeverRetry.on_error(&idempotent_state(now), status(Code::Unavailable));
        assert!(got.is_exhausted(), "{got:?}");
        let got = NeverRetry.on_throttle(&idempotent_state(now), status(Code::Unavailable));
        assert!(got.is_exhausted(), "{got:?}");
    }

    mockall::mock! {
        #[derive(Debug)]
        Policy {}
        impl RetryPolicy for Policy {
            fn on_error(&self, state: &RetryState, error: Error) -> RetryResult;
            fn on_throttle(&self, state: &RetryState, error: Error) -> ThrottleResult;
            fn remaining_time(&self, state: &RetryState) -> Option<Duration>;
        }
    }

    #[test]
    fn test_limited_time_forwards() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(1..)
            .returning(|_, e| RetryResult::Continue(e));
        mock.expect_on_throttle()
            .times(1..)
            .returning(|_, e| ThrottleResult::Continue(e));
        mock.expect_remaining_time().times(1).returning(|_| None);

        let now = Instant::now();
        let policy = LimitedElapsedTime::custom(mock, Duration::from_secs(60));
        let rf = policy.on_error(&idempotent_state(now), Error::other("err"));
        assert!(rf.is_continue(), "{rf:?}");

        let rt = policy.remaining_time(&idempotent_state(now));
        assert_eq!(rt, Some(Duration::from_secs(60)));

        let rf = policy.on_throttle(&idempotent_state(now), Error::other("err"));
        assert!(rf.is_continue(), "{rf:?}");
    }

    #[test]
    fn test_limited_time_inner_continues() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(1..)
            .returning(|_, e| RetryResult::Continue(e));

        let now = Instant::now();
        let policy = LimitedElapsedTime::custom(mock, Duration::from_secs(60));
        let state = idempotent_state(now).set_now(now + Duration::from_secs(10));
        let rf = policy.on_error(&state, Error::other("err"));
        assert!(rf.is_continue(), "{rf:?}");

        let state = idempotent_state(now).set_now(now + Duration::from_secs(70));
        let rf = policy.on_error(&state, Error::other("err"));
        assert!(rf.is_exhausted(), "{rf:?}");
        if let RetryResult::Exhausted(e) = rf {
            assert!(e.is_exhausted(), "{e:?}");
        }
    }

    #[test]
    fn test_limited_time_inner_permanent() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(2)
            .returning(|_, e| RetryResult::Permanent(e));

        let now = Instant::now();
        let policy = LimitedElapsedTime::custom(mock, Duration::from_secs(60));
        let state = idempotent_state(now).set_now(now + Duration::from_secs(10));
        let rf = policy.on_error(&state, Error::other("err"));
        assert!(rf.is_permanent(), "{rf:?}");

        let state = idempotent_state(now).set_now(now + Duration::from_secs(70));
        let rf = policy.on_error(&state, Error::other("err"));
        assert!(rf.is_permanent(), "{rf:?}");
    }

    #[test]
    fn test_limited_time_throttle_exhausted() {
        let mut mock = MockPolicy::new();
        mock.expect_on_throttle()
            .times(1)
            .returning(|_, e| ThrottleResult::Continue(e));

        let now = Instant::now();
        let policy = LimitedElapsedTime::custom(mock, Duration::from_secs(60));
        let state = idempotent_state(now).set_now(now + Duration::from_secs(70));
        let rf = policy.on_throttle(&state, Error::other("err"));
        assert!(rf.is_exhausted(), "{rf:?}");
    }

    #[test_case(Some(Duration::from_secs(50)), Duration::from_secs(10))]
    #[test_case(Some(Duration::from_secs(5)), Duration::from_secs(5))]
    #[test_case(None, Duration::from_secs(10))]
    fn test_limited_time_remaining(inner: Option<Duration>, want: Duration) {
        let mut mock = MockPolicy::new();
        mock.expect_remaining_time()
            .times(1)
            .returning(move |_| inner);
        let now = Instant::now();
        let policy = LimitedElapsedTime::custom(mock, Duration::from_secs(60));
        let state = idempotent_state(now).set_now(now + Duration::from_secs(50));
        assert_eq!(policy.remaining_time(&state), Some(want));
    }

    #[test]
    fn test_limited_time_remaining_expired() {
        let policy = LimitedElapsedTime::new(Duration::from_secs(60));
        let now = Instant::now();
        let state = idempotent_state(now).set_now(now + Duration::from_secs(120));
        assert_eq!(policy.remaining_time(&state), Some(Duration::ZERO));
    }

    #[test]
    fn test_limited_attempt_count_on_error() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(1..)
            .returning(|_, e| RetryResult::Continue(e));

        let now = Instant::now();
        let policy = LimitedAttemptCount::custom(mock, 3);
        for attempt in 1..3_u32 {
            let rf = policy.on_error(
                &idempotent_state(now).set_attempt_count(attempt),
                Error::other("err"),
            );
            assert!(rf.is_continue(), "{attempt} {rf:?}");
        }
        let rf = policy.on_error(
            &idempotent_state(now).set_attempt_count(3_u32),
            Error::other("err"),
        );
        assert!(rf.is_exhausted(), "{rf:?}");
    }

    #[test]
    fn test_limited_attempt_count_inner_permanent() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(1)
            .returning(|_, e| RetryResult::Permanent(e));
        let now = Instant::now();
        let policy = LimitedAttemptCount::custom(mock, 3);
        let rf = policy.on_error(
            &idempotent_state(now).set_attempt_count(5_u32),
            Error::other("err"),
        );
        assert!(rf.is_permanent(), "{rf:?}");
    }

    #[test]
    fn test_limited_attempt_count_remaining_time() {
        let mut mock = MockPolicy::new();
        mock.expect_remaining_time()
            .times(1)
            .returning(|_| Some(Duration::from_secs(123)));
        let now = Instant::now();
        let policy = LimitedAttemptCount::custom(mock, 3);
        assert_eq!(
            policy.remaining_time(&idempotent_state(now)),
            Some(Duration::from_secs(123))
        );
    }

    #[test]
    fn test_limited_attempt_count_on_throttle() {
        let mut mock = MockPolicy::new();
        mock.expect_on_throttle()
            .times(1)
            .returning(|_, e| ThrottleResult::Exhausted(e));
        let now = Instant::now();
        let policy = LimitedAttemptCount::custom(mock, 3);
        let rf = policy.on_throttle(
            &idempotent_state(now).set_attempt_count(1_u32),
            Error::other("err"),
        );
        assert!(rf.is_exhausted(), "{rf:?}");
    }

    #[test]
    fn ext_composes() {
        let policy = TransientErrors::default()
            .with_attempt_limit(4)
            .with_time_limit(Duration::from_millis(100));
        let now = Instant::now();
        let state = idempotent_state(now).set_attempt_count(2_u32);
        let rf = policy.on_error(&state, status(Code::Unavailable));
        assert!(rf.is_continue(), "{rf:?}");
        let state = state.set_attempt_count(4_u32);
        let rf = policy.on_error(&state, status(Code::Unavailable));
        assert!(rf.is_exhausted(), "{rf:?}");
    }
}
