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

//! Provide types for client construction.
//!
//! A [CallRunner] is the entry point for all RPCs. Applications and client
//! libraries create it through a [ClientBuilder], which collects the default
//! configuration shared by all calls made through the runner.
//!
//! ## Example: create a runner with the default configuration.
//!
//! ```
//! # use aiplatform_gax::client_builder::{ClientBuilder, Result};
//! # use aiplatform_gax::transport::{SendOptions, Transport};
//! # #[derive(Debug)]
//! # struct MyTransport;
//! # #[async_trait::async_trait]
//! # impl Transport for MyTransport {
//! #     async fn send(&self, _m: &str, r: serde_json::Value, _o: &SendOptions) -> aiplatform_gax::Result<serde_json::Value> { Ok(r) }
//! # }
//! let runner = ClientBuilder::new()
//!     .with_transport(MyTransport)
//!     .build()?;
//! # Result::<()>::Ok(())
//! ```
//!
//! ## Example: change the retry configuration
//!
//! ```
//! # use aiplatform_gax::client_builder::{ClientBuilder, Result};
//! # use aiplatform_gax::transport::{SendOptions, Transport};
//! # #[derive(Debug)]
//! # struct MyTransport;
//! # #[async_trait::async_trait]
//! # impl Transport for MyTransport {
//! #     async fn send(&self, _m: &str, r: serde_json::Value, _o: &SendOptions) -> aiplatform_gax::Result<serde_json::Value> { Ok(r) }
//! # }
//! use aiplatform_gax::retry_policy::{RetryPolicyExt, TransientErrors};
//! use std::time::Duration;
//! let runner = ClientBuilder::new()
//!     .with_transport(MyTransport)
//!     .with_retry_policy(TransientErrors::default().with_attempt_limit(3))
//!     .with_overall_timeout(Duration::from_secs(30))
//!     .build()?;
//! # Result::<()>::Ok(())
//! ```
//!
//! [CallRunner]: crate::call_runner::CallRunner

use crate::backoff_policy::{
    BackoffPolicy, BackoffPolicyArg, PollingBackoffPolicy, PollingBackoffPolicyArg,
};
use crate::call_runner::CallRunner;
use crate::clock::{Clock, TokioClock};
use crate::exponential_backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use crate::options::{BackoffSettings, CallSettings};
use crate::polling_error_policy::{self, PollingErrorPolicy, PollingErrorPolicyArg};
use crate::retry_policy::{RetryPolicy, RetryPolicyArg, RetryPolicyExt, TransientErrors};
use crate::retry_throttler::{AdaptiveThrottler, RetryThrottlerArg, SharedRetryThrottler};
use crate::transport::Transport;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The environment variable that enables additional tracing diagnostics.
pub const LOGGING_VAR: &str = "AIPLATFORM_RUST_LOGGING";

/// The default method used to poll long-running operations.
pub const GET_OPERATION_METHOD: &str = "/google.longrunning.Operations/GetOperation";

/// The default method used to cancel long-running operations.
pub const CANCEL_OPERATION_METHOD: &str = "/google.longrunning.Operations/CancelOperation";

/// The result type for this module.
pub type Result<T> = std::result::Result<T, Error>;

/// Indicates a problem while constructing a client.
///
/// # Examples
/// ```
/// use aiplatform_gax::client_builder::{ClientBuilder, Error};
/// match ClientBuilder::new().build() {
///     Ok(_) => unreachable!("a transport is required"),
///     Err(e) if e.is_missing_transport() => println!("configure a transport: {e}"),
///     Err(e) => println!("error during client initialization {e}"),
/// }
/// ```
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// If true, the builder was not given a transport.
    pub fn is_missing_transport(&self) -> bool {
        matches!(&self.0, ErrorKind::MissingTransport)
    }

    /// If true, the call settings could not be converted to policies.
    pub fn is_invalid_settings(&self) -> bool {
        matches!(&self.0, ErrorKind::InvalidSettings(_))
    }

    fn settings<T: Into<BoxError>>(source: T) -> Self {
        Self(ErrorKind::InvalidSettings(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("a transport is required to build a client")]
    MissingTransport,
    #[error("invalid call settings")]
    InvalidSettings(#[source] BoxError),
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The configuration shared by all calls made through a [CallRunner].
///
/// Request options override these values for a single call.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub(crate) user_agent: Option<String>,
    pub(crate) tracing: bool,
    pub(crate) default_idempotency: Option<bool>,
    pub(crate) overall_timeout: Option<Duration>,
    pub(crate) attempt_timeout: Option<Duration>,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) backoff_policy: Arc<dyn BackoffPolicy>,
    pub(crate) retry_throttler: SharedRetryThrottler,
    pub(crate) polling_error_policy: Arc<dyn PollingErrorPolicy>,
    pub(crate) polling_backoff_policy: Arc<dyn PollingBackoffPolicy>,
    pub(crate) get_operation_method: String,
    pub(crate) cancel_operation_method: String,
}

impl ClientConfig {
    /// Returns true if tracing diagnostics are enabled.
    pub fn tracing_enabled(&self) -> bool {
        self.tracing
    }

    /// The user agent prefix for all requests, if any.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// The method used to poll long-running operations.
    pub fn get_operation_method(&self) -> &str {
        &self.get_operation_method
    }

    /// The method used to cancel long-running operations.
    pub fn cancel_operation_method(&self) -> &str {
        &self.cancel_operation_method
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            tracing: tracing_enabled_from_env(),
            default_idempotency: None,
            overall_timeout: None,
            attempt_timeout: None,
            retry_policy: Arc::new(
                TransientErrors::default().with_time_limit(Duration::from_secs(600)),
            ),
            backoff_policy: Arc::new(ExponentialBackoff::default()),
            retry_throttler: Arc::new(Mutex::new(AdaptiveThrottler::default())),
            polling_error_policy: Arc::new(polling_error_policy::TransientErrors),
            polling_backoff_policy: Arc::new(
                ExponentialBackoffBuilder::new()
                    .with_initial_delay(Duration::from_secs(1))
                    .with_maximum_delay(Duration::from_secs(60))
                    .with_scaling(1.5)
                    .with_jitter(0.0)
                    .clamp(),
            ),
            get_operation_method: GET_OPERATION_METHOD.to_string(),
            cancel_operation_method: CANCEL_OPERATION_METHOD.to_string(),
        }
    }
}

fn tracing_enabled_from_env() -> bool {
    std::env::var(LOGGING_VAR)
        .map(|v| v == "true")
        .unwrap_or(false)
}

/// A builder for [CallRunner].
///
/// # Example
/// ```
/// # use aiplatform_gax::client_builder::{ClientBuilder, Result};
/// # use aiplatform_gax::transport::{SendOptions, Transport};
/// # #[derive(Debug)]
/// # struct MyTransport;
/// # #[async_trait::async_trait]
/// # impl Transport for MyTransport {
/// #     async fn send(&self, _m: &str, r: serde_json::Value, _o: &SendOptions) -> aiplatform_gax::Result<serde_json::Value> { Ok(r) }
/// # }
/// let runner = ClientBuilder::new()
///     .with_transport(MyTransport)
///     .with_tracing()
///     .with_user_agent("my-app/1.2.3")
///     .build()?;
/// assert!(runner.config().tracing_enabled());
/// # Result::<()>::Ok(())
/// ```
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Arc<dyn Clock>,
}

impl ClientBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            clock: Arc::new(TokioClock),
        }
    }

    /// Creates the [CallRunner].
    ///
    /// Fails if no transport was configured.
    pub fn build(self) -> Result<CallRunner> {
        let transport = self
            .transport
            .ok_or(Error(ErrorKind::MissingTransport))?;
        Ok(CallRunner::new(self.config, transport, self.clock))
    }

    /// Sets the transport used to send each attempt.
    pub fn with_transport<T: Transport + 'static>(mut self, v: T) -> Self {
        self.transport = Some(Arc::new(v));
        self
    }

    /// Sets a transport shared with other runners.
    pub fn with_shared_transport(mut self, v: Arc<dyn Transport>) -> Self {
        self.transport = Some(v);
        self
    }

    /// Sets the clock used for deadlines and backoff.
    ///
    /// The default uses the [tokio] timer.
    pub fn with_clock<C: Clock + 'static>(mut self, v: C) -> Self {
        self.clock = Arc::new(v);
        self
    }

    /// Enables tracing diagnostics.
    ///
    /// The runner always creates [tracing] spans. Setting this flag enables
    /// additional warnings when calls fail. Setting the `AIPLATFORM_RUST_LOGGING`
    /// environment variable to `true` has the same effect.
    ///
    /// [tracing]: https://docs.rs/tracing/latest/tracing/
    pub fn with_tracing(mut self) -> Self {
        self.config.tracing = true;
        self
    }

    /// Sets the user agent prefix for all requests.
    pub fn with_user_agent<V: Into<String>>(mut self, v: V) -> Self {
        self.config.user_agent = Some(v.into());
        self
    }

    /// Sets the idempotency for requests that do not set their own.
    ///
    /// Without this setting, requests are assumed to be non-idempotent.
    pub fn with_default_idempotency(mut self, v: bool) -> Self {
        self.config.default_idempotency = Some(v);
        self
    }

    /// Sets the overall timeout for each request, including retries.
    pub fn with_overall_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.config.overall_timeout = Some(v.into());
        self
    }

    /// Sets the timeout for each attempt.
    pub fn with_attempt_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.config.attempt_timeout = Some(v.into());
        self
    }

    /// Configure the retry policy.
    ///
    /// The retry policy controls what errors are considered retryable, sets
    /// limits on the number of attempts or the time trying to make attempts.
    pub fn with_retry_policy<V: Into<RetryPolicyArg>>(mut self, v: V) -> Self {
        self.config.retry_policy = v.into().into();
        self
    }

    /// Configure the retry backoff policy.
    pub fn with_backoff_policy<V: Into<BackoffPolicyArg>>(mut self, v: V) -> Self {
        self.config.backoff_policy = v.into().into();
        self
    }

    /// Configure the retry throttler.
    ///
    /// Advanced applications may want to configure a retry throttler to
    /// [Address Cascading Failures] and when [Handling Overload] conditions.
    ///
    /// [Handling Overload]: https://sre.google/sre-book/handling-overload/
    /// [Address Cascading Failures]: https://sre.google/sre-book/addressing-cascading-failures/
    pub fn with_retry_throttler<V: Into<RetryThrottlerArg>>(mut self, v: V) -> Self {
        self.config.retry_throttler = v.into().into();
        self
    }

    /// Configure the polling error policy for long-running operations.
    pub fn with_polling_error_policy<V: Into<PollingErrorPolicyArg>>(mut self, v: V) -> Self {
        self.config.polling_error_policy = v.into().into();
        self
    }

    /// Configure the polling backoff policy for long-running operations.
    pub fn with_polling_backoff_policy<V: Into<PollingBackoffPolicyArg>>(mut self, v: V) -> Self {
        self.config.polling_backoff_policy = v.into().into();
        self
    }

    /// Overrides the methods used to poll and cancel long-running operations.
    ///
    /// Some services expose the operations API under their own service name.
    pub fn with_operation_methods<G, C>(mut self, get: G, cancel: C) -> Self
    where
        G: Into<String>,
        C: Into<String>,
    {
        self.config.get_operation_method = get.into();
        self.config.cancel_operation_method = cancel.into();
        self
    }

    /// Applies declarative [CallSettings].
    ///
    /// Missing fields keep their current value. The retry settings replace
    /// the backoff policy, and `maxAttempts` replaces the retry policy with
    /// the default retry policy limited to that many attempts.
    ///
    /// # Example
    /// ```
    /// # use aiplatform_gax::client_builder::ClientBuilder;
    /// # use aiplatform_gax::options::CallSettings;
    /// let settings: CallSettings = serde_json::from_str(r#"{
    ///     "overallDeadlineMs": 30000,
    ///     "retryPolicy": {"initialMs": 100, "maxMs": 5000, "multiplier": 2.0, "maxAttempts": 5}
    /// }"#)?;
    /// let builder = ClientBuilder::new().with_settings(&settings)?;
    /// # anyhow::Ok(())
    /// ```
    pub fn with_settings(mut self, settings: &CallSettings) -> Result<Self> {
        if let Some(v) = settings.overall_deadline() {
            self.config.overall_timeout = Some(v);
        }
        if let Some(v) = settings.per_attempt_deadline() {
            self.config.attempt_timeout = Some(v);
        }
        if let Some(retry) = &settings.retry_policy {
            self.config.backoff_policy = Arc::new(backoff_from_settings(retry, None)?);
            if let Some(n) = retry.max_attempts {
                self.config.retry_policy =
                    Arc::new(TransientErrors::default().with_attempt_limit(n));
            }
        }
        if let Some(poll) = &settings.poll_interval {
            self.config.polling_backoff_policy = Arc::new(backoff_from_settings(poll, Some(0.0))?);
        }
        if let Some(v) = settings.idempotent {
            self.config.default_idempotency = Some(v);
        }
        if let Some(v) = &settings.user_agent {
            self.config.user_agent = Some(v.clone());
        }
        Ok(self)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn backoff_from_settings(
    settings: &BackoffSettings,
    default_jitter: Option<f64>,
) -> Result<ExponentialBackoff> {
    let mut builder = ExponentialBackoffBuilder::new();
    if let Some(v) = settings.initial_ms {
        builder = builder.with_initial_delay(Duration::from_millis(v));
    }
    if let Some(v) = settings.max_ms {
        builder = builder.with_maximum_delay(Duration::from_millis(v));
    }
    if let Some(v) = settings.multiplier {
        builder = builder.with_scaling(v);
    }
    if let Some(v) = settings.jitter.or(default_jitter) {
        builder = builder.with_jitter(v);
    }
    builder.build().map_err(Error::settings)
}
