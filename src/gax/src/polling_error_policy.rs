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


//! Decides how operation futures react to failed polls.
//!
//! A failed poll says nothing about the operation itself: it may still be
//! running on the service. The policy only decides whether the future polls
//! again after a backoff, or stops and returns the error to the caller. Only
//! a completed operation with an error (or a `NOT_FOUND` poll) fails the
//! operation.
//!
//! The policy also bounds how long a future keeps polling an operation that
//! never completes, see [on_in_progress][PollingErrorPolicy::on_in_progress].
//!
//! # Example
//! ```
//! # use aiplatform_gax::polling_error_policy::*;
//! use std::time::Duration;
//! // Stop after 15 minutes or 50 polls, whichever comes first.
//! let policy = TransientErrors
//!     .with_time_limit(Duration::from_secs(15 * 60))
//!     .with_attempt_limit(50);
//! ```
//!
//! Set the policy per client with [ClientBuilder::with_polling_error_policy]
//! or per operation with [RequestOptionsBuilder::with_polling_error_policy].
//!
//! [ClientBuilder::with_polling_error_policy]: crate::client_builder::ClientBuilder::with_polling_error_policy
//! [RequestOptionsBuilder::with_polling_error_policy]: crate::options::RequestOptionsBuilder::with_polling_error_policy

use crate::error::Error;
use crate::error::rpc::Code;
use crate::loop_control::LoopState;
use crate::retry_state::RetryState;
use std::sync::Arc;
use std::time::Duration;

/// Classifies polling errors and bounds the polling loop.
pub trait PollingErrorPolicy: Send + Sync + std::fmt::Debug {
    /// Called after a failed poll.
    ///
    /// `state.attempt_count` counts the consecutive failed polls, including
    /// this one. `state.start` is when the future started polling.
    #[must_use = "the decision controls the polling loop"]
    fn on_error(&self, state: &RetryState, error: Error) -> LoopState;

    /// Called after a poll that found the operation still running.
    ///
    /// `state.attempt_count` counts all the polls so far. Returning an error
    /// stops the polling loop with that error.
    fn on_in_progress(&self, _state: &RetryState, _operation_name: &str) -> Option<Error> {
        None
    }
}

/// Converts polling error policies for the configuration types.
#[derive(Clone, Debug)]
pub struct PollingErrorPolicyArg(pub(crate) Arc<dyn PollingErrorPolicy>);

impl<T: PollingErrorPolicy + 'static> From<T> for PollingErrorPolicyArg {
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl From<Arc<dyn PollingErrorPolicy>> for PollingErrorPolicyArg {
    fn from(value: Arc<dyn PollingErrorPolicy>) -> Self {
        Self(value)
    }
}

impl From<PollingErrorPolicyArg> for Arc<dyn PollingErrorPolicy> {
    fn from(value: PollingErrorPolicyArg) -> Self {
        value.0
    }
}

/// Limits for any [PollingErrorPolicy].
pub trait PollingErrorPolicyExt: PollingErrorPolicy + Sized {
    /// Stops polling once `maximum_duration` has elapsed since the first
    /// poll.
    ///
    /// Errors the inner policy would continue on become
    /// [Exhausted][LoopState::Exhausted], and in-progress polls return an
    /// [exhausted][Error::is_exhausted] error.
    fn with_time_limit(self, maximum_duration: Duration) -> LimitedElapsedTime<Self> {
        LimitedElapsedTime::custom(self, maximum_duration)
    }

    /// Stops polling after `maximum_attempts` polls.
    ///
    /// # Example
    /// ```
    /// # use aiplatform_gax::polling_error_policy::*;
    /// # use aiplatform_gax::retry_state::RetryState;
    /// use aiplatform_gax::error::{Error, rpc::Code, rpc::Status};
    /// let policy = TransientErrors.with_attempt_limit(3);
    /// let state = RetryState::new(true).set_attempt_count(3_u32);
    /// let unavailable = Error::service(Status::default().set_code(Code::Unavailable));
    /// assert!(policy.on_error(&state, unavailable).is_exhausted());
    /// assert!(policy.on_in_progress(&state, "operations/123").is_some());
    /// ```
    fn with_attempt_limit(self, maximum_attempts: u32) -> LimitedAttemptCount<Self> {
        LimitedAttemptCount::custom(self, maximum_attempts)
    }
}

impl<T: PollingErrorPolicy> PollingErrorPolicyExt for T {}

/// The default policy: keep polling through transient errors.
///
/// Polls are always safe to repeat. The policy continues on transport
/// errors, attempt timeouts, `UNAVAILABLE`, `RESOURCE_EXHAUSTED`, and
/// `INTERNAL` or `UNKNOWN` errors carrying a `RetryInfo` detail. Any other
/// error stops the loop.
///
/// It never gives up on its own, decorate it with a limit if the operation
/// may never complete.
#[derive(Clone, Debug)]
pub struct TransientErrors;

impl PollingErrorPolicy for TransientErrors {
    fn on_error(&self, _state: &RetryState, error: Error) -> LoopState {
        if error.is_transport() || error.is_timeout() {
            return LoopState::Continue(error);
        }
        let Some(status) = error.status() else {
            return LoopState::Permanent(error);
        };
        match status.code {
            Code::Unavailable | Code::ResourceExhausted => LoopState::Continue(error),
            Code::Internal | Code::Unknown if status.has_retry_info() => {
                LoopState::Continue(error)
            }
            _ => LoopState::Permanent(error),
        }
    }
}

/// Keeps polling through any error. Use it with a limit.
///
/// # Example
/// ```
/// # use aiplatform_gax::polling_error_policy::*;
/// # use aiplatform_gax::retry_state::RetryState;
/// use aiplatform_gax::error::{Error, rpc::Code, rpc::Status};
/// let aborted = Error::service(Status::default().set_code(Code::Aborted));
/// assert!(AlwaysContinue.on_error(&RetryState::new(true), aborted).is_continue());
/// ```
#[derive(Clone, Debug)]
pub struct AlwaysContinue;

impl PollingErrorPolicy for AlwaysContinue {
    fn on_error(&self, _state: &RetryState, error: Error) -> LoopState {
        LoopState::Continue(error)
    }
}

/// Bounds the time spent polling, see
/// [with_time_limit][PollingErrorPolicyExt::with_time_limit].
#[derive(Debug)]
pub struct LimitedElapsedTime<P = TransientErrors>
where
    P: PollingErrorPolicy,
{
    inner: P,
    maximum_duration: Duration,
}

impl LimitedElapsedTime {
    /// Wraps [TransientErrors].
    pub fn new(maximum_duration: Duration) -> Self {
        Self::custom(TransientErrors, maximum_duration)
    }
}

impl<P> LimitedElapsedTime<P>
where
    P: PollingErrorPolicy,
{
    pub fn custom(inner: P, maximum_duration: Duration) -> Self {
        Self {
            inner,
            maximum_duration,
        }
    }

    fn expired(&self, state: &RetryState) -> bool {
        state.elapsed() >= self.maximum_duration
    }
}

impl<P> PollingErrorPolicy for LimitedElapsedTime<P>
where
    P: PollingErrorPolicy,
{
    fn on_error(&self, state: &RetryState, error: Error) -> LoopState {
        match self.inner.on_error(state, error) {
            LoopState::Continue(e) if self.expired(state) => LoopState::Exhausted(e),
            decision => decision,
        }
    }

    fn on_in_progress(&self, state: &RetryState, operation_name: &str) -> Option<Error> {
        if let Some(e) = self.inner.on_in_progress(state, operation_name) {
            return Some(e);
        }
        self.expired(state).then(|| {
            Error::exhausted(Exhausted::new(
                operation_name,
                "elapsed time",
                format!("{:?}", state.elapsed()),
                format!("{:?}", self.maximum_duration),
            ))
        })
    }
}

/// Bounds the number of polls, see
/// [with_attempt_limit][PollingErrorPolicyExt::with_attempt_limit].
#[derive(Debug)]
pub struct LimitedAttemptCount<P = TransientErrors>
where
    P: PollingErrorPolicy,
{
    inner: P,
    maximum_attempts: u32,
}

impl LimitedAttemptCount {
    /// Wraps [TransientErrors].
    pub fn new(maximum_attempts: u32) -> Self {
        Self::custom(TransientErrors, maximum_attempts)
    }
}

impl<P> LimitedAttemptCount<P>
where
    P: PollingErrorPolicy,
{
    pub fn custom(inner: P, maximum_attempts: u32) -> Self {
        Self {
            inner,
            maximum_attempts,
        }
    }

    fn reached(&self, state: &RetryState) -> bool {
        state.attempt_count >= self.maximum_attempts
    }
}

impl<P> PollingErrorPolicy for LimitedAttemptCount<P>
where
    P: PollingErrorPolicy,
{
    fn on_error(&self, state: &RetryState, error: Error) -> LoopState {
        match self.inner.on_error(state, error) {
            LoopState::Continue(e) if self.reached(state) => LoopState::Exhausted(e),
            decision => decision,
        }
    }

    fn on_in_progress(&self, state: &RetryState, operation_name: &str) -> Option<Error> {
        if let Some(e) = self.inner.on_in_progress(state, operation_name) {
            return Some(e);
        }
        self.reached(state).then(|| {
            Error::exhausted(Exhausted::new(
                operation_name,
                "attempt count",
                state.attempt_count.to_string(),
                self.maximum_attempts.to_string(),
            ))
        })
    }
}

/// The source of the error returned when a polling limit is reached.
#[derive(Debug)]
pub struct Exhausted {
    operation_name: String,
    limit_name: &'static str,
    value: String,
    limit: String,
}

impl Exhausted {
    pub fn new(
        operation_name: &str,
        limit_name: &'static str,
        value: String,
        limit: String,
    ) -> Self {
        Self {
            operation_name: operation_name.to_string(),
            limit_name,
            value,
            limit,
        }
    }
}

impl std::fmt::Display for Exhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stopped polling {}: {} {} reached the limit {}",
            self.operation_name, self.limit_name, self.value, self.limit
        )
    }
}

impl std::error::Error for Exhausted {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::rpc::{RetryInfo, Status};
    use std::error::Error as _;
    use test_case::test_case;
    use tokio::time::Instant;

    mockall::mock! {
        #[derive(Debug)]
        Policy {}
        impl PollingErrorPolicy for Policy {
            fn on_error(&self, state: &RetryState, error: Error) -> LoopState;
            fn on_in_progress(&self, state: &RetryState, operation_name: &str) -> Option<Error>;
        }
    }

    // Verify `PollingErrorPolicyArg` can be converted from the desired types.
    #[test]
    fn polling_policy_arg() {
        let policy = LimitedAttemptCount::new(3);
        let _ = PollingErrorPolicyArg::from(policy);

        let policy: Arc<dyn PollingErrorPolicy> = Arc::new(LimitedAttemptCount::new(3));
        let arg = PollingErrorPolicyArg::from(policy);
        let _: Arc<dyn PollingErrorPolicy> = arg.into();
    }

    fn status(code: Code) -> Error {
        Error::service(Status::default().set_code(code).set_message("simulated"))
    }

    fn transient_error() -> Error {
        status(Code::Unavailable)
    }

    fn permanent_error() -> Error {
        status(Code::PermissionDenied)
    }

    fn state_at(count: u32, elapsed: Duration) -> RetryState {
        let start = Instant::now();
        RetryState::new(true)
            .set_start(start)
            .set_now(start + elapsed)
            .set_attempt_count(count)
    }

    #[test_case(status(Code::Unavailable), true)]
    #[test_case(status(Code::ResourceExhausted), true)]
    #[test_case(status(Code::Internal), false)]
    #[test_case(status(Code::Aborted), false)]
    #[test_case(status(Code::NotFound), false)]
    #[test_case(status(Code::PermissionDenied), false)]
    #[test_case(Error::io("broken pipe"), true)]
    #[test_case(Error::connect("refused"), true)]
    #[test_case(Error::timeout("attempt timeout"), true)]
    #[test_case(Error::deser("bad json"), false)]
    #[test_case(Error::other("err"), false)]
    fn transient_errors(error: Error, want: bool) {
        let got = TransientErrors.on_error(&state_at(1, Duration::ZERO), error);
        assert_eq!(got.is_continue(), want, "{got:?}");
        assert_eq!(got.is_permanent(), !want, "{got:?}");
    }

    #[test]
    fn transient_errors_retry_info() {
        let status = Status::default()
            .set_code(Code::Unknown)
            .set_details([RetryInfo::new().set_retry_delay(Duration::from_secs(1))]);
        let got = TransientErrors.on_error(&state_at(1, Duration::ZERO), Error::service(status));
        assert!(got.is_continue(), "{got:?}");
    }

    #[test]
    fn transient_errors_in_progress() {
        let got = TransientErrors.on_in_progress(&state_at(100, Duration::from_secs(3600)), "op");
        assert!(got.is_none(), "{got:?}");
    }

    #[test]
    fn always_continue() {
        let p = AlwaysContinue;
        let got = p.on_error(&state_at(1, Duration::ZERO), permanent_error());
        assert!(got.is_continue(), "{got:?}");
        assert!(p.on_in_progress(&state_at(1, Duration::ZERO), "op").is_none());
    }

    #[test]
    fn with_time_limit() {
        let policy = AlwaysContinue.with_time_limit(Duration::from_secs(10));
        let got = policy.on_error(&state_at(1, Duration::from_secs(1)), permanent_error());
        assert!(got.is_continue(), "{got:?}");
        let got = policy.on_error(&state_at(1, Duration::from_secs(20)), permanent_error());
        assert!(got.is_exhausted(), "{got:?}");
    }

    #[test]
    fn with_attempt_limit() {
        let policy = AlwaysContinue.with_attempt_limit(3);
        let got = policy.on_error(&state_at(1, Duration::ZERO), permanent_error());
        assert!(got.is_continue(), "{got:?}");
        let got = policy.on_error(&state_at(3, Duration::ZERO), permanent_error());
        assert!(got.is_exhausted(), "{got:?}");
    }

    #[test]
    fn test_limited_elapsed_time_in_progress() {
        let policy = LimitedElapsedTime::new(Duration::from_secs(10));
        let got = policy.on_in_progress(&state_at(1, Duration::from_secs(5)), "op");
        assert!(got.is_none(), "{got:?}");

        let got = policy.on_in_progress(&state_at(1, Duration::from_secs(10)), "op");
        let err = got.expect("an error once the time limit expires");
        assert!(err.is_exhausted(), "{err:?}");
        let exhausted = err.source().and_then(|e| e.downcast_ref::<Exhausted>());
        assert!(exhausted.is_some(), "{err:?}");
        assert!(err.to_string().contains("elapsed time"), "{err}");
    }

    #[test]
    fn test_limited_time_forwards_in_progress() {
        let mut mock = MockPolicy::new();
        mock.expect_on_in_progress()
            .times(1)
            .returning(|_, name| Some(Error::other(format!("inner {name}"))));
        let policy = LimitedElapsedTime::custom(mock, Duration::from_secs(10));
        let got = policy.on_in_progress(&state_at(1, Duration::ZERO), "op-123");
        let err = got.expect("inner error is returned");
        assert!(err.to_string().contains("inner op-123"), "{err}");
    }

    #[test]
    fn test_limited_time_inner_permanent() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(2)
            .returning(|_, e| LoopState::Permanent(e));
        let policy = LimitedElapsedTime::custom(mock, Duration::from_secs(10));
        let got = policy.on_error(&state_at(1, Duration::ZERO), transient_error());
        assert!(got.is_permanent(), "{got:?}");
        let got = policy.on_error(&state_at(1, Duration::from_secs(20)), transient_error());
        assert!(got.is_permanent(), "{got:?}");
    }

    #[test]
    fn test_limited_time_inner_exhausted() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(1)
            .returning(|_, e| LoopState::Exhausted(e));
        let policy = LimitedElapsedTime::custom(mock, Duration::from_secs(10));
        let got = policy.on_error(&state_at(1, Duration::ZERO), transient_error());
        assert!(got.is_exhausted(), "{got:?}");
    }

    #[test]
    fn test_limited_attempt_count_in_progress() {
        let policy = LimitedAttemptCount::new(5);
        assert!(policy.on_in_progress(&state_at(4, Duration::ZERO), "op").is_none());
        let got = policy.on_in_progress(&state_at(5, Duration::ZERO), "op");
        let err = got.expect("an error once the attempt limit is reached");
        assert!(err.is_exhausted(), "{err:?}");
        assert!(err.to_string().contains("attempt count"), "{err}");
    }

    #[test]
    fn test_limited_attempt_count_inner_permanent() {
        let mut mock = MockPolicy::new();
        mock.expect_on_error()
            .times(2)
            .returning(|_, e| LoopState::Permanent(e));
        let policy = LimitedAttemptCount::custom(mock, 2);
        let got = policy.on_error(&state_at(1, Duration::ZERO), transient_error());
        assert!(got.is_permanent(), "{got:?}");
        let got = policy.on_error(&state_at(5, Duration::ZERO), transient_error());
        assert!(got.is_permanent(), "{got:?}");
    }

    #[test]
    fn test_limited_attempt_count_on_error() {
        let policy = LimitedAttemptCount::new(3);
        let got = policy.on_error(&state_at(2, Duration::ZERO), transient_error());
        assert!(got.is_continue(), "{got:?}");
        let got = policy.on_error(&state_at(3, Duration::ZERO), transient_error());
        assert!(got.is_exhausted(), "{got:?}");
        let got = policy.on_error(&state_at(1, Duration::ZERO), permanent_error());
        assert!(got.is_permanent(), "{got:?}");
    }

    #[test]
    fn test_exhausted_fmt() {
        let exhausted = Exhausted::new("op-name", "test-limit", "1".to_string(), "2".to_string());
        let fmt = exhausted.to_string();
        assert!(fmt.contains("op-name"), "{fmt}");
        assert!(fmt.contains("test-limit"), "{fmt}");
        assert!(fmt.contains("test-limit 1"), "{fmt}");
        assert!(fmt.contains("limit 2"), "{fmt}");
    }
}
