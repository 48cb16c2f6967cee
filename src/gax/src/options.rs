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

//! Options for a single call, and declarative settings for a client.
//!
//! Every field of [RequestOptions] is optional. The [CallRunner] resolves
//! each unset field from the client configuration when the call starts, so
//! a request only states what it wants to change.
//!
//! [CallSettings] is the serde form of the client defaults, in the shape
//! used by configuration files. Apply it with
//! [ClientBuilder::with_settings].
//!
//! [CallRunner]: crate::call_runner::CallRunner
//! [ClientBuilder::with_settings]: crate::client_builder::ClientBuilder::with_settings

use crate::backoff_policy::{
    BackoffPolicy, BackoffPolicyArg, PollingBackoffPolicy, PollingBackoffPolicyArg,
};
use crate::polling_error_policy::{PollingErrorPolicy, PollingErrorPolicyArg};
use crate::retry_policy::{RetryPolicy, RetryPolicyArg};
use crate::retry_throttler::{RetryThrottlerArg, SharedRetryThrottler};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Overrides for one call.
///
/// Most code sets these through [RequestOptionsBuilder] on a request builder
/// or an operation future. Tests use the struct directly to inspect what a
/// call was configured with.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    idempotent: Option<bool>,
    user_agent: Option<String>,
    overall_timeout: Option<Duration>,
    attempt_timeout: Option<Duration>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    backoff_policy: Option<Arc<dyn BackoffPolicy>>,
    retry_throttler: Option<SharedRetryThrottler>,
    polling_error_policy: Option<Arc<dyn PollingErrorPolicy>>,
    polling_backoff_policy: Option<Arc<dyn PollingBackoffPolicy>>,
    cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn idempotent(&self) -> Option<bool> {
        self.idempotent
    }

    /// Declares whether sending the request twice is safe.
    ///
    /// Failures that may have reached the service are only retried for
    /// idempotent calls. A non-idempotent call is retried only when the
    /// transport reports that the request never left the client.
    pub fn set_idempotency(&mut self, value: bool) {
        self.idempotent = Some(value);
    }

    // Keeps an explicit choice.
    pub(crate) fn set_default_idempotency(&mut self, default: bool) {
        self.idempotent.get_or_insert(default);
    }

    pub fn user_agent(&self) -> &Option<String> {
        &self.user_agent
    }

    /// Replaces the client user agent for this call.
    pub fn set_user_agent<T: Into<String>>(&mut self, v: T) {
        self.user_agent = Some(v.into());
    }

    pub fn overall_timeout(&self) -> &Option<Duration> {
        &self.overall_timeout
    }

    /// Bounds the whole call: every attempt and every backoff period.
    ///
    /// Once it expires the call fails with a
    /// [timeout][crate::error::Error::is_timeout] error. For operation
    /// futures this is the bound used by `until_done()`.
    pub fn set_overall_timeout<T: Into<Duration>>(&mut self, v: T) {
        self.overall_timeout = Some(v.into());
    }

    pub fn attempt_timeout(&self) -> &Option<Duration> {
        &self.attempt_timeout
    }

    /// Bounds each attempt. An attempt never outlives the overall deadline.
    pub fn set_attempt_timeout<T: Into<Duration>>(&mut self, v: T) {
        self.attempt_timeout = Some(v.into());
    }

    pub fn retry_policy(&self) -> &Option<Arc<dyn RetryPolicy>> {
        &self.retry_policy
    }

    pub fn set_retry_policy<V: Into<RetryPolicyArg>>(&mut self, v: V) {
        self.retry_policy = Some(v.into().into());
    }

    pub fn backoff_policy(&self) -> &Option<Arc<dyn BackoffPolicy>> {
        &self.backoff_policy
    }

    pub fn set_backoff_policy<V: Into<BackoffPolicyArg>>(&mut self, v: V) {
        self.backoff_policy = Some(v.into().into());
    }

    pub fn retry_throttler(&self) -> &Option<SharedRetryThrottler> {
        &self.retry_throttler
    }

    pub fn set_retry_throttler<V: Into<RetryThrottlerArg>>(&mut self, v: V) {
        self.retry_throttler = Some(v.into().into());
    }

    pub fn polling_error_policy(&self) -> &Option<Arc<dyn PollingErrorPolicy>> {
        &self.polling_error_policy
    }

    /// Decides which polling errors an operation future retries.
    pub fn set_polling_error_policy<V: Into<PollingErrorPolicyArg>>(&mut self, v: V) {
        self.polling_error_policy = Some(v.into().into());
    }

    pub fn polling_backoff_policy(&self) -> &Option<Arc<dyn PollingBackoffPolicy>> {
        &self.polling_backoff_policy
    }

    /// The delay between polls of an operation that is still running.
    pub fn set_polling_backoff_policy<V: Into<PollingBackoffPolicyArg>>(&mut self, v: V) {
        self.polling_backoff_policy = Some(v.into().into());
    }

    pub fn cancellation(&self) -> &Option<CancellationToken> {
        &self.cancellation
    }

    /// Interrupts the call when `v` is cancelled.
    ///
    /// Both in-flight attempts and backoff sleeps are interrupted, the call
    /// fails with a [cancelled][crate::error::Error::is_cancelled] error.
    pub fn set_cancellation(&mut self, v: CancellationToken) {
        self.cancellation = Some(v);
    }
}

/// Fluent setters for [RequestOptions] on any request builder.
///
/// Implemented for every type that implements
/// [internal::RequestBuilder]. Each method mirrors a `RequestOptions` setter.
pub trait RequestOptionsBuilder: internal::RequestBuilder {
    fn with_idempotency(self, v: bool) -> Self;
    fn with_user_agent<V: Into<String>>(self, v: V) -> Self;
    fn with_overall_timeout<V: Into<Duration>>(self, v: V) -> Self;
    fn with_attempt_timeout<V: Into<Duration>>(self, v: V) -> Self;
    fn with_retry_policy<V: Into<RetryPolicyArg>>(self, v: V) -> Self;
    fn with_backoff_policy<V: Into<BackoffPolicyArg>>(self, v: V) -> Self;
    fn with_retry_throttler<V: Into<RetryThrottlerArg>>(self, v: V) -> Self;
    fn with_polling_error_policy<V: Into<PollingErrorPolicyArg>>(self, v: V) -> Self;
    fn with_polling_backoff_policy<V: Into<PollingBackoffPolicyArg>>(self, v: V) -> Self;
    fn with_cancellation(self, v: CancellationToken) -> Self;
}

#[doc(hidden)]
pub mod internal {
    //! Implementation details shared with `aiplatform-lro`. Not part of the
    //! public API.
    use super::RequestOptions;

    /// Gives [super::RequestOptionsBuilder] access to the options of a
    /// builder.
    pub trait RequestBuilder {
        fn request_options(&mut self) -> &mut RequestOptions;
    }

    /// Sets the idempotency unless the caller already chose one.
    pub fn set_default_idempotency(mut options: RequestOptions, default: bool) -> RequestOptions {
        options.set_default_idempotency(default);
        options
    }
}

impl<T> RequestOptionsBuilder for T
where
    T: internal::RequestBuilder,
{
    fn with_idempotency(mut self, v: bool) -> Self {
        self.request_options().set_idempotency(v);
        self
    }

    fn with_user_agent<V: Into<String>>(mut self, v: V) -> Self {
        self.request_options().set_user_agent(v);
        self
    }

    fn with_overall_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.request_options().set_overall_timeout(v);
        self
    }

    fn with_attempt_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.request_options().set_attempt_timeout(v);
        self
    }

    fn with_retry_policy<V: Into<RetryPolicyArg>>(mut self, v: V) -> Self {
        self.request_options().set_retry_policy(v);
        self
    }

    fn with_backoff_policy<V: Into<BackoffPolicyArg>>(mut self, v: V) -> Self {
        self.request_options().set_backoff_policy(v);
        self
    }

    fn with_retry_throttler<V: Into<RetryThrottlerArg>>(mut self, v: V) -> Self {
        self.request_options().set_retry_throttler(v);
        self
    }

    fn with_polling_error_policy<V: Into<PollingErrorPolicyArg>>(mut self, v: V) -> Self {
        self.request_options().set_polling_error_policy(v);
        self
    }

    fn with_polling_backoff_policy<V: Into<PollingBackoffPolicyArg>>(mut self, v: V) -> Self {
        self.request_options().set_polling_backoff_policy(v);
        self
    }

    fn with_cancellation(mut self, v: CancellationToken) -> Self {
        self.request_options().set_cancellation(v);
        self
    }
}

/// Client defaults in configuration file form.
///
/// Field names are camelCase and durations are milliseconds. Missing fields
/// keep the client defaults.
///
/// # Example
/// ```
/// # use aiplatform_gax::options::CallSettings;
/// let settings: CallSettings = serde_json::from_value(serde_json::json!({
///     "overallDeadlineMs": 30000,
///     "perAttemptDeadlineMs": 5000,
///     "retryPolicy": { "initialMs": 100, "maxMs": 5000, "multiplier": 2.0, "jitter": 0.2, "maxAttempts": 5 },
///     "pollInterval": { "initialMs": 1000, "maxMs": 30000, "multiplier": 1.5 },
///     "userAgent": "my-app/1.0"
/// }))?;
/// assert_eq!(settings.retry_policy.and_then(|r| r.max_attempts), Some(5));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct CallSettings {
    pub overall_deadline_ms: Option<u64>,
    pub per_attempt_deadline_ms: Option<u64>,
    /// The retry backoff, and the attempt limit of the retry policy.
    pub retry_policy: Option<BackoffSettings>,
    /// Used for requests that do not set their own idempotency.
    pub idempotent: Option<bool>,
    /// The polling backoff for operation futures.
    pub poll_interval: Option<BackoffSettings>,
    pub user_agent: Option<String>,
}

impl CallSettings {
    pub fn overall_deadline(&self) -> Option<Duration> {
        self.overall_deadline_ms.map(Duration::from_millis)
    }

    pub fn per_attempt_deadline(&self) -> Option<Duration> {
        self.per_attempt_deadline_ms.map(Duration::from_millis)
    }
}

/// Exponential backoff parameters, see [ExponentialBackoffBuilder].
///
/// [ExponentialBackoffBuilder]: crate::exponential_backoff::ExponentialBackoffBuilder
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct BackoffSettings {
    pub initial_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub jitter: Option<f64>,
    /// Ignored by polling loops.
    pub max_attempts: Option<u32>,
}
