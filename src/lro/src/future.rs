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

use crate::PollingResult;
use crate::details::{self, Outcome, PollStep};
use crate::model::{CancelOperationRequest, GetOperationRequest, Operation};
use crate::status::{OperationState, OperationStatus};
use futures::stream::{self, Stream};
use gax::Result;
use gax::backoff_policy::{BackoffPolicy, PollingBackoffPolicy};
use gax::call_runner::CallRunner;
use gax::clock::Clock;
use gax::error::{Breadcrumb, Error};
use gax::options::RequestOptions;
use gax::options::internal::set_default_idempotency;
use gax::retry_policy::NeverRetry;
use gax::retry_state::RetryState;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OnceCell, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A handle to a long-running operation.
///
/// The future polls the service until the operation reaches a terminal
/// state. The first poll happens as soon as a caller waits, later polls
/// follow the polling backoff policy. Transient polling errors (transport
/// errors, `UNAVAILABLE`, `RESOURCE_EXHAUSTED`) are retried after a delay
/// computed by the backoff policy. Only a completed operation with an error,
/// or a `NOT_FOUND` response to a poll, marks the operation as failed.
///
/// Handles are cheap to clone. Clones, and handles obtained from an
/// [OperationRegistry][crate::OperationRegistry], share the same state: at
/// most one poll is in flight at any time, and every waiter observes the same
/// terminal result.
///
/// Dropping a handle does not cancel the operation, use
/// [cancel()][OperationFuture::cancel].
///
/// # Parameters
/// * `R` - the response type, returned when the operation succeeds.
/// * `M` - the metadata type, reported while the operation is in progress.
///
/// # Example
/// ```no_run
/// # use aiplatform_lro::OperationFuture;
/// # use gax::call_runner::CallRunner;
/// # use std::time::Duration;
/// # async fn sample(runner: CallRunner) -> gax::Result<()> {
/// let request = serde_json::json!({"parent": "projects/p/locations/l", "name": "my-endpoint"});
/// let operation = OperationFuture::<serde_json::Value>::start(
///     &runner,
///     "/google.cloud.aiplatform.v1.EndpointService/CreateEndpoint",
///     &request,
///     Default::default(),
/// )
/// .await?;
/// let endpoint = operation.wait(Duration::from_secs(600)).await?;
/// println!("created {endpoint}");
/// # Ok(()) }
/// ```
pub struct OperationFuture<R = Value, M = Value> {
    shared: Arc<Shared>,
    options: RequestOptions,
    _types: PhantomData<fn() -> (R, M)>,
}

impl<R, M> OperationFuture<R, M>
where
    R: DeserializeOwned,
    M: DeserializeOwned,
{
    /// Starts a long-running operation.
    ///
    /// Sends `request` to `method` and returns a future for the operation in
    /// the response. The options apply to the initial request and to every
    /// poll.
    pub async fn start<Req>(
        runner: &CallRunner,
        method: &str,
        request: &Req,
        options: RequestOptions,
    ) -> Result<Self>
    where
        Req: Serialize,
    {
        let operation = runner
            .execute::<Req, Operation>(method, request, options.clone())
            .await?;
        tracing::debug!(method, operation = %operation.name, done = operation.done, "started long-running operation");
        let mut future = Self::from_operation(runner, operation)?;
        future.options = options;
        Ok(future)
    }

    /// Creates a future from an operation returned by the service.
    ///
    /// Fails with `INTERNAL` if the operation has no name.
    pub fn from_operation(runner: &CallRunner, operation: Operation) -> Result<Self> {
        let shared = Shared::from_operation(runner.clone(), operation)?;
        Ok(Self::from_shared(Arc::new(shared)))
    }

    /// Creates a future for an existing operation, given its name.
    ///
    /// This is useful to resume polling in a new process. Consider
    /// [OperationRegistry::get_or_create][crate::OperationRegistry::get_or_create]
    /// if other parts of the application may be waiting for the same
    /// operation.
    pub fn resume<T: Into<String>>(runner: &CallRunner, name: T) -> Result<Self> {
        let shared = Shared::with_name(runner.clone(), name.into())?;
        Ok(Self::from_shared(Arc::new(shared)))
    }

    /// Returns the last known status, without polling.
    pub fn status(&self) -> OperationStatus {
        self.shared.status()
    }

    /// Returns the metadata from the most recent poll.
    pub fn metadata(&self) -> Result<Option<M>> {
        let metadata = self
            .shared
            .record()
            .operation
            .as_ref()
            .and_then(|op| op.metadata.clone());
        details::as_metadata(metadata)
    }

    /// Polls the operation once.
    ///
    /// Makes exactly one `GetOperation` request, unless the operation is
    /// already in a terminal state, in which case no request is made. Polling
    /// errors are returned to the caller, and delay the next scheduled poll.
    pub async fn poll(&self) -> Result<OperationState> {
        match self.shared.poll_step(&self.options, None, true).await? {
            Polled::Retry(e) | Polled::Stop(e) => Err(e),
            Polled::Skipped | Polled::InProgress(_) | Polled::Terminal => Ok(self.state()),
        }
    }

    /// Waits for the operation to complete, for at most `timeout`.
    ///
    /// Returns a `DEADLINE_EXCEEDED` error if the operation is still running
    /// when the timeout expires. The operation continues on the service, and
    /// the application may wait again. The polling errors retried since the
    /// last successful poll are attached to this error as breadcrumbs.
    pub async fn wait(&self, timeout: Duration) -> Result<R> {
        let deadline = self.shared.runner.clock().now() + timeout;
        self.wait_until(deadline).await
    }

    /// Waits for the operation to complete, until `deadline`.
    pub async fn wait_until(&self, deadline: Instant) -> Result<R> {
        let outcome = self.shared.wait_outcome(&self.options, Some(deadline)).await;
        details::as_result(outcome)
    }

    /// Waits for the operation to complete.
    ///
    /// Waits forever, unless the request options for this future set an
    /// overall timeout.
    pub async fn until_done(&self) -> Result<R> {
        let deadline = self
            .options
            .overall_timeout()
            .map(|t| self.shared.runner.clock().now() + t);
        let outcome = self.shared.wait_outcome(&self.options, deadline).await;
        details::as_result(outcome)
    }

    /// Requests cancellation of the operation.
    ///
    /// Sends one `CancelOperation` request. Further calls, including calls
    /// from other handles to the same operation, return immediately. The
    /// operation reaches the [Cancelled][OperationState::Cancelled] state once
    /// a poll observes the cancellation.
    ///
    /// Cancellation is best effort, the service may complete the operation
    /// anyway.
    pub async fn cancel(&self) -> Result<()> {
        self.shared.cancel(&self.options).await
    }

    /// Converts the future into a stream of polling results.
    ///
    /// Each element is the result of one poll. The stream ends after the
    /// first [Completed][PollingResult::Completed] element.
    pub fn into_stream(self) -> impl Stream<Item = PollingResult<R, M>> {
        stream::unfold(Some(self), |state| async move {
            let future = state?;
            if let Some(outcome) = future.shared.outcome() {
                return Some((PollingResult::Completed(details::as_result(outcome)), None));
            }
            let item = match future.shared.next_step(&future.options, None).await {
                Err(e) => return Some((PollingResult::Completed(Err(e)), None)),
                Ok(Polled::Stop(e)) => return Some((PollingResult::Completed(Err(e)), None)),
                Ok(Polled::Retry(e)) => PollingResult::PollingError(e),
                Ok(Polled::InProgress(m)) => match details::as_metadata(m) {
                    Ok(m) => PollingResult::InProgress(m),
                    Err(e) => PollingResult::PollingError(e),
                },
                Ok(Polled::Skipped) | Ok(Polled::Terminal) => {
                    let outcome = future.shared.outcome()?;
                    return Some((PollingResult::Completed(details::as_result(outcome)), None));
                }
            };
            Some((item, Some(future)))
        })
    }
}

impl<R, M> OperationFuture<R, M> {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            options: RequestOptions::default(),
            _types: PhantomData,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn with_shared(self, shared: Arc<Shared>) -> Self {
        Self { shared, ..self }
    }

    /// The name of the operation.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The local state of the operation, without polling.
    pub fn state(&self) -> OperationState {
        self.shared.record().state
    }

    /// Returns `true` if the operation reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// The number of polls made so far, successful or not.
    pub fn attempt_count(&self) -> u32 {
        self.shared.record().poll_count
    }

    /// The operation as returned by the most recent poll.
    pub fn operation(&self) -> Option<Operation> {
        self.shared.record().operation.clone()
    }
}

impl<R, M> Clone for OperationFuture<R, M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            options: self.options.clone(),
            _types: PhantomData,
        }
    }
}

impl<R, M> std::fmt::Debug for OperationFuture<R, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationFuture")
            .field("shared", &self.shared)
            .field("options", &self.options)
            .finish()
    }
}

impl<R, M> gax::options::internal::RequestBuilder for OperationFuture<R, M> {
    fn request_options(&mut self) -> &mut RequestOptions {
        &mut self.options
    }
}

/// The result of a single step in the polling loop.
#[derive(Debug)]
pub(crate) enum Polled {
    /// No poll was needed, or the deadline expired before it could start.
    Skipped,
    InProgress(Option<Value>),
    Terminal,
    Retry(Error),
    Stop(Error),
}

// The most recent poll errors kept for the deadline error.
const MAX_BREADCRUMBS: usize = 16;

#[derive(Debug, Default)]
struct Record {
    state: OperationState,
    operation: Option<Operation>,
    outcome: Option<Outcome>,
    poll_count: u32,
    consecutive_errors: u32,
    poll_start: Option<Instant>,
    next_poll_at: Option<Instant>,
    breadcrumbs: Vec<Breadcrumb>,
}

/// The state shared by all the handles to one operation.
#[derive(Debug)]
pub(crate) struct Shared {
    name: String,
    runner: CallRunner,
    record: Mutex<Record>,
    // Held for the duration of each poll.
    poll_lock: tokio::sync::Mutex<()>,
    cancel_sent: OnceCell<()>,
    // Bumped on terminal transitions and schedule changes, wakes sleeping
    // waiters.
    changes: watch::Sender<u64>,
}

impl Shared {
    fn new(runner: CallRunner, name: String, record: Record) -> Self {
        let (changes, _) = watch::channel(0_u64);
        Self {
            name,
            runner,
            record: Mutex::new(record),
            poll_lock: tokio::sync::Mutex::new(()),
            cancel_sent: OnceCell::new(),
            changes,
        }
    }

    pub(crate) fn from_operation(runner: CallRunner, operation: Operation) -> Result<Self> {
        if operation.name.is_empty() {
            return Err(details::missing_name());
        }
        let mut record = Record::default();
        if operation.done {
            let (state, outcome) = details::as_outcome(&operation);
            record.state = state;
            record.outcome = Some(outcome);
        }
        let name = operation.name.clone();
        record.operation = Some(operation);
        Ok(Self::new(runner, name, record))
    }

    pub(crate) fn with_name(runner: CallRunner, name: String) -> Result<Self> {
        if name.is_empty() {
            return Err(details::missing_name());
        }
        Ok(Self::new(runner, name, Record::default()))
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn record(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.record().state.is_terminal()
    }

    fn outcome(&self) -> Option<Outcome> {
        self.record().outcome.clone()
    }

    fn notify(&self) {
        self.changes.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn status(&self) -> OperationStatus {
        let mut record = self.record();
        if record.state == OperationState::Submitted {
            record.state = OperationState::Polling;
        }
        OperationStatus {
            state: record.state,
            metadata: record.operation.as_ref().and_then(|op| op.metadata.clone()),
            error: record.outcome.as_ref().and_then(|o| o.as_ref().err().cloned()),
        }
    }

    async fn wait_outcome(&self, options: &RequestOptions, deadline: Option<Instant>) -> Outcome {
        let clock = self.runner.clock();
        let start = clock.now();
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            if deadline.is_some_and(|d| clock.now() >= d) {
                return Err(self.deadline_error(start));
            }
            if let Polled::Stop(e) = self.next_step(options, deadline).await? {
                return Err(e);
            }
        }
    }

    /// Sleeps until the next scheduled poll and performs it.
    ///
    /// Returns [Polled::Skipped] if `deadline` expires first.
    async fn next_step(
        &self,
        options: &RequestOptions,
        deadline: Option<Instant>,
    ) -> Result<Polled> {
        let clock = self.runner.clock();
        let cancel = options.cancellation().as_ref();
        let mut changes = self.changes.subscribe();
        loop {
            changes.borrow_and_update();
            if self.is_terminal() {
                return Ok(Polled::Terminal);
            }
            let now = clock.now();
            if deadline.is_some_and(|d| now >= d) {
                return Ok(Polled::Skipped);
            }
            let next = self.record().next_poll_at.unwrap_or(now);
            if next <= now {
                match self.poll_step(options, deadline, false).await? {
                    Polled::Skipped => continue,
                    polled => return Ok(polled),
                }
            }
            let wake = deadline.map_or(next, |d| d.min(next));
            tokio::select! {
                biased;
                _ = cancelled(cancel) => return Err(wait_cancelled(&self.name)),
                _ = changes.changed() => {},
                _ = clock.sleep_until(wake) => {},
            }
        }
    }

    /// Polls the operation, unless another caller polled it since the last
    /// scheduled time. With `force` the schedule is ignored.
    async fn poll_step(
        &self,
        options: &RequestOptions,
        deadline: Option<Instant>,
        force: bool,
    ) -> Result<Polled> {
        let clock = self.runner.clock();
        let _guard = tokio::select! {
            biased;
            _ = cancelled(options.cancellation().as_ref()) => return Err(wait_cancelled(&self.name)),
            _ = expired(clock.as_ref(), deadline) => return Ok(Polled::Skipped),
            guard = self.poll_lock.lock() => guard,
        };

        let now = clock.now();
        let poll_start = {
            let mut record = self.record();
            if record.state.is_terminal() {
                return Ok(Polled::Terminal);
            }
            if !force && record.next_poll_at.is_some_and(|t| t > now) {
                return Ok(Polled::Skipped);
            }
            record.state = OperationState::Polling;
            *record.poll_start.get_or_insert(now)
        };

        // The polling loop replaces the retry loop.
        let mut request_options = set_default_idempotency(options.clone(), true);
        request_options.set_retry_policy(NeverRetry);
        if let Some(d) = deadline {
            request_options.set_overall_timeout(d.saturating_duration_since(now));
        }
        let result = self
            .runner
            .execute::<_, Operation>(
                self.runner.config().get_operation_method(),
                &GetOperationRequest::new(self.name.as_str()),
                request_options,
            )
            .await;
        let result = match result {
            Err(e) if e.is_cancelled() => return Err(e),
            r => r,
        };

        let now = clock.now();
        let mut record = self.record();
        record.poll_count += 1;
        let state = RetryState::new(true)
            .set_start(poll_start)
            .set_now(now)
            .set_attempt_count(record.poll_count);
        let policy = self.runner.polling_error_policy(options);
        match details::handle_poll(policy.as_ref(), &state, &self.name, result) {
            PollStep::InProgress(op) => {
                let delay = self.runner.polling_backoff_policy(options).wait_period(&state);
                record.consecutive_errors = 0;
                record.breadcrumbs.clear();
                record.next_poll_at = Some(now + delay);
                let metadata = op.metadata.clone();
                record.operation = Some(op);
                tracing::debug!(operation = %self.name, poll = record.poll_count, ?delay, "operation in progress");
                Ok(Polled::InProgress(metadata))
            }
            PollStep::Retry(e) => {
                record.consecutive_errors += 1;
                let backoff = state.clone().set_attempt_count(record.consecutive_errors);
                let delay = self.runner.backoff_policy(options).on_failure(&backoff);
                record.next_poll_at = Some(now + delay);
                let crumb = Breadcrumb::new(record.poll_count, &e);
                if record.breadcrumbs.len() == MAX_BREADCRUMBS {
                    record.breadcrumbs.remove(0);
                }
                record.breadcrumbs.push(crumb);
                tracing::debug!(operation = %self.name, poll = record.poll_count, ?delay, error = %e, "retrying operation poll");
                Ok(Polled::Retry(e))
            }
            PollStep::Stop(e) => {
                tracing::debug!(operation = %self.name, poll = record.poll_count, error = %e, "stopped polling operation");
                Ok(Polled::Stop(e))
            }
            PollStep::Terminal(state, outcome, op) => {
                record.state = state;
                record.outcome = Some(outcome);
                if op.is_some() {
                    record.operation = op;
                }
                record.next_poll_at = None;
                tracing::info!(operation = %self.name, %state, polls = record.poll_count, "operation finished");
                drop(record);
                self.notify();
                Ok(Polled::Terminal)
            }
        }
    }

    async fn cancel(&self, options: &RequestOptions) -> Result<()> {
        if self.is_terminal() {
            return Ok(());
        }
        self.cancel_sent
            .get_or_try_init(|| async {
                let options = set_default_idempotency(options.clone(), true);
                self.runner
                    .execute::<_, Value>(
                        self.runner.config().cancel_operation_method(),
                        &CancelOperationRequest::new(self.name.as_str()),
                        options,
                    )
                    .await?;
                let now = self.runner.clock().now();
                // Poll soon to observe the cancellation.
                self.record().next_poll_at = Some(now);
                tracing::info!(operation = %self.name, "requested operation cancellation");
                self.notify();
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    fn deadline_error(&self, start: Instant) -> Error {
        let elapsed = self.runner.clock().now().saturating_duration_since(start);
        let record = self.record();
        Error::timeout(format!(
            "operation {} did not complete before the deadline",
            self.name
        ))
        .with_context(
            self.runner.config().get_operation_method(),
            record.poll_count,
            elapsed,
        )
        .with_breadcrumbs(record.breadcrumbs.clone())
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(t) => t.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn expired(clock: &dyn Clock, deadline: Option<Instant>) {
    match deadline {
        Some(d) => clock.sleep_until(d).await,
        None => std::future::pending().await,
    }
}

fn wait_cancelled(name: &str) -> Error {
    Error::cancelled(format!("the wait for operation {name} was cancelled"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gax::client_builder::ClientBuilder;
    use gax::error::rpc::{Code, Status};
    use gax::exponential_backoff::ExponentialBackoffBuilder;
    use gax::transport::{SendOptions, Transport};
    use serde_json::json;

    const GET: &str = "/google.longrunning.Operations/GetOperation";

    mockall::mock! {
        #[derive(Debug)]
        Transport {}
        #[async_trait::async_trait]
        impl Transport for Transport {
            async fn send(&self, method: &str, request: Value, options: &SendOptions) -> Result<Value>;
        }
    }

    fn runner(transport: MockTransport) -> anyhow::Result<CallRunner> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_millis(10))
            .with_maximum_delay(Duration::from_secs(1))
            .with_scaling(2.0)
            .with_jitter(0.0)
            .build()?;
        let runner = ClientBuilder::new()
            .with_transport(transport)
            .with_polling_backoff_policy(backoff.clone())
            .with_backoff_policy(backoff)
            .build()?;
        Ok(runner)
    }

    fn in_progress() -> Value {
        json!({"name": "ops/A", "metadata": {"progress": 50}})
    }

    fn succeeded() -> Value {
        json!({"name": "ops/A", "done": true, "response": {"id": 42}})
    }

    #[tokio::test(start_paused = true)]
    async fn poll_once() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|method, request, options| {
                method == GET && request == &json!({"name": "ops/A"}) && options.attempt == 1
            })
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(in_progress()));
        transport
            .expect_send()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(succeeded()));

        let future = OperationFuture::<Value, Value>::resume(&runner(transport)?, "ops/A")?;
        assert_eq!(future.state(), OperationState::Submitted);
        assert_eq!(future.poll().await?, OperationState::Polling);
        assert_eq!(future.metadata()?, Some(json!({"progress": 50})));
        assert_eq!(future.poll().await?, OperationState::Succeeded);
        assert_eq!(future.attempt_count(), 2);
        // Terminal states are sticky, this makes no request.
        assert_eq!(future.poll().await?, OperationState::Succeeded);
        assert_eq!(future.until_done().await?, json!({"id": 42}));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn poll_error_is_returned() -> anyhow::Result<()> {
        let mut transport = MockTransport::new();
        transport.expect_send().once().returning(|_, _, _| {
            Err(Error::service(
                Status::default().set_code(Code::Unavailable).set_message("try again"),
            ))
        });
        let future = OperationFuture::<Value, Value>::resume(&runner(transport)?, "ops/A")?;
        let err = future.poll().await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(future.state(), OperationState::Polling);
        assert_eq!(future.attempt_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn done_operation_never_polls() -> anyhow::Result<()> {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let runner = runner(transport)?;
        let op = serde_json::from_value::<Operation>(succeeded())?;
        let future = OperationFuture::<Value, Value>::from_operation(&runner, op)?;
        assert_eq!(future.state(), OperationState::Succeeded);
        assert_eq!(future.wait(Duration::ZERO).await?, json!({"id": 42}));
        assert_eq!(future.until_done().await?, json!({"id": 42}));
        future.cancel().await?;
        assert_eq!(future.attempt_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_name() -> anyhow::Result<()> {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let runner = runner(transport)?;
        let err = OperationFuture::<Value, Value>::from_operation(&runner, Operation::default())
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        let err = OperationFuture::<Value, Value>::resume(&runner, "").unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        Ok(())
    }

    #[tokio::test]
    async fn status_does_not_poll() -> anyhow::Result<()> {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let runner = runner(transport)?;
        let op = Operation::new("ops/A").set_metadata(json!({"progress": 5}));
        let future = OperationFuture::<Value, Value>::from_operation(&runner, op)?;
        assert_eq!(future.state(), OperationState::Submitted);
        let status = future.status();
        assert_eq!(status.state, OperationState::Polling);
        assert_eq!(status.metadata, Some(json!({"progress": 5})));
        assert!(status.error.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn typed_metadata_mismatch() -> anyhow::Result<()> {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let runner = runner(transport)?;
        let op = Operation::new("ops/A").set_metadata(json!("not a number"));
        let future = OperationFuture::<Value, u64>::from_operation(&runner, op)?;
        let err = future.metadata().unwrap_err();
        assert!(err.is_deserialization(), "{err:?}");
        Ok(())
    }

    #[test]
    fn send_and_sync() {
        static_assertions::assert_impl_all!(OperationFuture: Send, Sync, Clone);
    }
}
