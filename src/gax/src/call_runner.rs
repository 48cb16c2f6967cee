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

//! Executes unary RPCs with deadlines, retries, and idempotency checks.
//!
//! A [CallRunner] composes the [Transport], the retry and backoff policies,
//! the retry throttler, and the [Clock]. Each call to [CallRunner::invoke]
//! runs one logical RPC:
//!
//! - The overall timeout is converted to an absolute deadline when the call
//!   starts. Each attempt gets the earliest of the overall deadline, the
//!   attempt timeout, and the time remaining in the retry policy.
//! - Non-idempotent calls are only retried if the transport reports that the
//!   request never left the client.
//! - Idempotent calls are retried while the retry policy allows it and the
//!   backoff delay does not reach past the overall deadline.
//! - Every suspension point (the attempt itself and the backoff sleep) races
//!   the caller's cancellation token.
//!
//! Errors returned by the runner carry the method name, the number of
//! attempts, the elapsed time, and a summary of any errors retried past.

use crate::Result;
use crate::backoff_policy::{BackoffPolicy, PollingBackoffPolicy};
use crate::client_builder::{ClientBuilder, ClientConfig};
use crate::clock::Clock;
use crate::error::{Breadcrumb, Error};
use crate::loop_control::{RetryResult, ThrottleResult};
use crate::options::RequestOptions;
use crate::polling_error_policy::PollingErrorPolicy;
use crate::retry_policy::RetryPolicy;
use crate::retry_state::RetryState;
use crate::retry_throttler::SharedRetryThrottler;
use crate::transport::{SendOptions, Transport};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Runs RPCs over a [Transport].
///
/// The runner is cheap to clone, clones share the transport, the clock, and
/// the retry throttler.
///
/// # Example
/// ```
/// # use aiplatform_gax::call_runner::CallRunner;
/// # use aiplatform_gax::options::RequestOptions;
/// # async fn sample(runner: &CallRunner) -> aiplatform_gax::Result<()> {
/// let mut options = RequestOptions::default();
/// options.set_idempotency(true);
/// let response = runner
///     .invoke("/google.cloud.aiplatform.v1.DatasetService/GetDataset",
///         serde_json::json!({"name": "projects/p/locations/l/datasets/d"}),
///         options)
///     .await?;
/// println!("{response:?}");
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct CallRunner {
    inner: Arc<RunnerInner>,
}

#[derive(Debug)]
struct RunnerInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

enum Attempt {
    // The first attempt.
    Initial,
    // (backoff delay, previous error)
    Retry(Duration, Error),
}

impl CallRunner {
    pub(crate) fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                config,
                transport,
                clock,
            }),
        }
    }

    /// Returns a builder for [CallRunner].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The configuration shared by all calls.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The clock used for deadlines and backoff.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// The effective idempotency of a request.
    ///
    /// Requests are non-idempotent unless the request options or the client
    /// configuration say otherwise.
    pub fn idempotency(&self, options: &RequestOptions) -> bool {
        options
            .idempotent()
            .or(self.inner.config.default_idempotency)
            .unwrap_or(false)
    }

    /// The effective retry policy of a request.
    pub fn retry_policy(&self, options: &RequestOptions) -> Arc<dyn RetryPolicy> {
        options
            .retry_policy()
            .clone()
            .unwrap_or_else(|| self.inner.config.retry_policy.clone())
    }

    /// The effective backoff policy of a request.
    pub fn backoff_policy(&self, options: &RequestOptions) -> Arc<dyn BackoffPolicy> {
        options
            .backoff_policy()
            .clone()
            .unwrap_or_else(|| self.inner.config.backoff_policy.clone())
    }

    /// The effective retry throttler of a request.
    pub fn retry_throttler(&self, options: &RequestOptions) -> SharedRetryThrottler {
        options
            .retry_throttler()
            .clone()
            .unwrap_or_else(|| self.inner.config.retry_throttler.clone())
    }

    /// The effective polling error policy of a long-running operation.
    pub fn polling_error_policy(&self, options: &RequestOptions) -> Arc<dyn PollingErrorPolicy> {
        options
            .polling_error_policy()
            .clone()
            .unwrap_or_else(|| self.inner.config.polling_error_policy.clone())
    }

    /// The effective polling backoff policy of a long-running operation.
    pub fn polling_backoff_policy(
        &self,
        options: &RequestOptions,
    ) -> Arc<dyn PollingBackoffPolicy> {
        options
            .polling_backoff_policy()
            .clone()
            .unwrap_or_else(|| self.inner.config.polling_backoff_policy.clone())
    }

    /// The effective overall timeout of a request.
    pub fn overall_timeout(&self, options: &RequestOptions) -> Option<Duration> {
        options.overall_timeout().or(self.inner.config.overall_timeout)
    }

    /// The effective attempt timeout of a request.
    pub fn attempt_timeout(&self, options: &RequestOptions) -> Option<Duration> {
        options.attempt_timeout().or(self.inner.config.attempt_timeout)
    }

    /// Sleeps for `delay` unless `cancel` fires first.
    ///
    /// Returns a [cancelled][Error::is_cancelled] error if the token fires.
    pub async fn sleep(&self, delay: Duration, cancel: Option<&CancellationToken>) -> Result<()> {
        let Some(token) = cancel else {
            self.inner.clock.sleep(delay).await;
            return Ok(());
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::cancelled("the request was cancelled during backoff")),
            _ = self.inner.clock.sleep(delay) => Ok(()),
        }
    }

    /// Sends a typed request and decodes the typed response.
    ///
    /// Requests that fail to serialize are never sent. Responses that fail to
    /// decode are reported as [deserialization][Error::is_deserialization]
    /// errors and are not retried.
    pub async fn execute<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        options: RequestOptions,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let request = serde_json::to_value(request).map_err(Error::ser)?;
        let response = self.invoke(method, request, options).await?;
        serde_json::from_value(response).map_err(Error::deser)
    }

    /// Runs one logical RPC, retrying as allowed by the request options and
    /// the client configuration.
    pub async fn invoke(
        &self,
        method: &str,
        request: Value,
        options: RequestOptions,
    ) -> Result<Value> {
        let idempotent = self.idempotency(&options);
        let span = tracing::info_span!(
            "client_request",
            rpc.method = method,
            rpc.idempotent = idempotent,
            rpc.attempt_count = tracing::field::Empty,
        );
        self.retry_loop(method, request, &options, idempotent)
            .instrument(span)
            .await
    }

    async fn retry_loop(
        &self,
        method: &str,
        request: Value,
        options: &RequestOptions,
        idempotent: bool,
    ) -> Result<Value> {
        let clock = &self.inner.clock;
        let retry_policy = self.retry_policy(options);
        let backoff_policy = self.backoff_policy(options);
        let throttler = self.retry_throttler(options);
        let attempt_timeout = self.attempt_timeout(options);
        let cancel = options.cancellation().as_ref();
        let user_agent = options
            .user_agent()
            .clone()
            .or_else(|| self.inner.config.user_agent.clone());

        let mut call = CallState {
            method,
            start: clock.now(),
            attempt_count: 0,
            breadcrumbs: Vec::new(),
            tracing: self.inner.config.tracing,
        };
        let overall_deadline = self.overall_timeout(options).map(|t| call.start + t);
        let mut attempt = Attempt::Initial;
        loop {
            let state = call.retry_state(idempotent, clock.now());
            if let Attempt::Retry(delay, prev) = attempt {
                if retry_policy
                    .remaining_time(&state)
                    .is_some_and(|remaining| remaining < delay)
                {
                    return Err(call.finish(clock.as_ref(), Error::exhausted(prev)));
                }
                if overall_deadline.is_some_and(|d| state.now + delay >= d) {
                    return Err(call.finish(clock.as_ref(), Error::timeout(prev)));
                }
                tracing::debug!(
                    attempt_count = call.attempt_count,
                    ?delay,
                    error = %prev,
                    "retrying request"
                );
                if let Err(e) = self.sleep(delay, cancel).await {
                    return Err(call.finish(clock.as_ref(), e));
                }
                if throttled(&throttler) {
                    let state = call.retry_state(idempotent, clock.now());
                    // A throttled attempt counts as a failure for the retry policy.
                    match retry_policy.on_throttle(&state, prev) {
                        ThrottleResult::Exhausted(e) => {
                            return Err(call.finish(clock.as_ref(), e));
                        }
                        ThrottleResult::Continue(e) => {
                            let delay = backoff_policy.on_failure(&state);
                            attempt = Attempt::Retry(delay, e);
                            continue;
                        }
                    }
                }
            }

            call.attempt_count += 1;
            tracing::Span::current().record("rpc.attempt_count", call.attempt_count);
            let now = clock.now();
            let remaining = retry_policy.remaining_time(&call.retry_state(idempotent, now));
            let deadline = [
                overall_deadline,
                attempt_timeout.map(|t| now + t),
                remaining.map(|t| now + t),
            ]
            .into_iter()
            .flatten()
            .min();
            if deadline.is_some_and(|d| d <= now) {
                let error = Error::timeout("the deadline expired before the attempt was sent");
                return Err(call.finish(clock.as_ref(), error));
            }

            let send_options = SendOptions::new(call.attempt_count)
                .set_deadline(deadline)
                .set_user_agent(user_agent.clone());
            let error = match self
                .send_attempt(method, request.clone(), &send_options, cancel)
                .await
            {
                Ok(response) => {
                    if let Ok(mut t) = throttler.lock() {
                        t.on_success();
                    }
                    return Ok(response);
                }
                Err(e) if e.is_cancelled() => return Err(call.finish(clock.as_ref(), e)),
                Err(e) => e,
            };

            let state = call.retry_state(idempotent, clock.now());
            let flow = if !idempotent && !error.is_transient_and_before_rpc() {
                RetryResult::Permanent(error)
            } else {
                retry_policy.on_error(&state, error)
            };
            let delay = backoff_policy.on_failure(&state);
            if let Ok(mut t) = throttler.lock() {
                t.on_retry_failure(&flow);
            }
            match flow {
                RetryResult::Permanent(e) | RetryResult::Exhausted(e) => {
                    return Err(call.finish(clock.as_ref(), e));
                }
                RetryResult::Continue(e) => {
                    call.breadcrumbs
                        .push(Breadcrumb::new(call.attempt_count, &e));
                    attempt = Attempt::Retry(delay, e);
                }
            }
        }
    }

    async fn send_attempt(
        &self,
        method: &str,
        request: Value,
        options: &SendOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match options.deadline {
                Some(deadline) => self.inner.clock.sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = cancelled => Err(Error::cancelled("the request was cancelled by the caller")),
            response = self.inner.transport.send(method, request, options) => response,
            _ = expired => Err(Error::timeout("the attempt deadline expired")),
        }
    }
}

struct CallState<'a> {
    method: &'a str,
    start: Instant,
    attempt_count: u32,
    breadcrumbs: Vec<Breadcrumb>,
    tracing: bool,
}

impl CallState<'_> {
    fn retry_state(&self, idempotent: bool, now: Instant) -> RetryState {
        RetryState::new(idempotent)
            .set_start(self.start)
            .set_now(now)
            .set_attempt_count(self.attempt_count)
    }

    fn finish(&mut self, clock: &dyn Clock, error: Error) -> Error {
        let elapsed = clock.now().saturating_duration_since(self.start);
        if self.tracing {
            tracing::warn!(
                rpc.method = self.method,
                attempt_count = self.attempt_count,
                ?elapsed,
                error = %error,
                "request failed"
            );
        }
        error
            .with_context(self.method, self.attempt_count, elapsed)
            .with_breadcrumbs(std::mem::take(&mut self.breadcrumbs))
    }
}

fn throttled(throttler: &SharedRetryThrottler) -> bool {
    throttler
        .lock()
        .map(|t| t.throttle_retry_attempt())
        .unwrap_or(false)
}
