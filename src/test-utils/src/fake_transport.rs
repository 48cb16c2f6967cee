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

//! A scripted [Transport] for tests.
//!
//! Tests queue responses per method. Each call pops the next response for
//! its method, or uses the method's fallback once the queue is empty. Every
//! call is recorded with the time it started, so tests can verify both the
//! number of attempts and their schedule.
//!
//! Responses may carry a delay. The fake sleeps with [tokio::time], so
//! tests using `#[tokio::test(start_paused = true)]` run instantly and
//! observe exact timestamps.

use gax::Result;
use gax::error::Error;
use gax::error::rpc::{Code, Status};
use gax::transport::{SendOptions, Transport};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// A call received by [FakeTransport].
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: String,
    pub request: Value,
    pub options: SendOptions,
    /// When the call started.
    pub at: Instant,
}

#[derive(Clone, Debug)]
struct Scripted {
    delay: Duration,
    result: Result<Value>,
}

#[derive(Debug, Default)]
struct State {
    queued: HashMap<String, VecDeque<Scripted>>,
    fallback: HashMap<String, Scripted>,
    calls: Vec<RecordedCall>,
}

/// A [Transport] returning scripted responses.
///
/// Clones share the script and the recorded calls.
///
/// # Example
/// ```
/// # use aiplatform_test_utils::fake_transport::FakeTransport;
/// # use gax::transport::{SendOptions, Transport};
/// # tokio_test::block_on(async {
/// let fake = FakeTransport::new();
/// fake.push_ok("/test.Service/Get", serde_json::json!({"name": "a"}));
/// let got = fake.send("/test.Service/Get", serde_json::json!({}), &SendOptions::new(1)).await?;
/// assert_eq!(got, serde_json::json!({"name": "a"}));
/// assert_eq!(fake.call_count("/test.Service/Get"), 1);
/// # gax::Result::<()>::Ok(()) });
/// ```
#[derive(Clone, Debug, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues a response for `method`.
    pub fn push(&self, method: &str, result: Result<Value>) -> &Self {
        self.push_delayed(method, Duration::ZERO, result)
    }

    /// Queues a successful response for `method`.
    pub fn push_ok(&self, method: &str, response: Value) -> &Self {
        self.push(method, Ok(response))
    }

    /// Queues an error for `method`.
    pub fn push_error(&self, method: &str, error: Error) -> &Self {
        self.push(method, Err(error))
    }

    /// Queues a service error with `code` for `method`.
    pub fn push_status(&self, method: &str, code: Code, message: &str) -> &Self {
        self.push_error(
            method,
            Error::service(Status::default().set_code(code).set_message(message)),
        )
    }

    /// Queues a response returned after `delay`.
    pub fn push_delayed(&self, method: &str, delay: Duration, result: Result<Value>) -> &Self {
        self.state()
            .queued
            .entry(method.to_string())
            .or_default()
            .push_back(Scripted { delay, result });
        self
    }

    /// Sets the response used once the queue for `method` is empty.
    pub fn set_fallback(&self, method: &str, result: Result<Value>) -> &Self {
        self.set_fallback_delayed(method, Duration::ZERO, result)
    }

    /// Sets a delayed response used once the queue for `method` is empty.
    pub fn set_fallback_delayed(
        &self,
        method: &str,
        delay: Duration,
        result: Result<Value>,
    ) -> &Self {
        self.state()
            .fallback
            .insert(method.to_string(), Scripted { delay, result });
        self
    }

    /// All the calls received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// The calls received so far for `method`, in order.
    pub fn calls_for(&self, method: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// The number of calls received so far for `method`.
    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// The number of queued responses not yet consumed, for all methods.
    pub fn pending(&self) -> usize {
        self.state().queued.values().map(VecDeque::len).sum()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, method: &str, request: Value, options: &SendOptions) -> Result<Value> {
        let scripted = {
            let mut state = self.state();
            state.calls.push(RecordedCall {
                method: method.to_string(),
                request,
                options: options.clone(),
                at: Instant::now(),
            });
            let next = state
                .queued
                .get_mut(method)
                .and_then(VecDeque::pop_front);
            next.or_else(|| state.fallback.get(method).cloned())
        };
        let Some(scripted) = scripted else {
            return Err(Error::service(
                Status::default()
                    .set_code(Code::Unimplemented)
                    .set_message(format!("no scripted response for {method}")),
            ));
        };
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        scripted.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GET: &str = "/test.Service/Get";

    #[tokio::test(start_paused = true)]
    async fn queue_then_fallback() -> anyhow::Result<()> {
        let fake = FakeTransport::new();
        fake.push_ok(GET, json!({"n": 1}))
            .push_status(GET, Code::Unavailable, "try-again")
            .set_fallback(GET, Ok(json!({"n": 0})));
        let options = SendOptions::new(1);
        assert_eq!(fake.send(GET, json!({}), &options).await?, json!({"n": 1}));
        let err = fake.send(GET, json!({}), &options).await.unwrap_err();
        assert_eq!(err.status().map(|s| s.code), Some(Code::Unavailable));
        assert_eq!(fake.pending(), 0);
        for _ in 0..3 {
            assert_eq!(fake.send(GET, json!({}), &options).await?, json!({"n": 0}));
        }
        assert_eq!(fake.call_count(GET), 5);
        Ok(())
    }

    #[tokio::test]
    async fn unscripted() {
        let fake = FakeTransport::new();
        let err = fake
            .send("/test.Service/Other", json!({}), &SendOptions::new(1))
            .await
            .unwrap_err();
        assert_eq!(err.status().map(|s| s.code), Some(Code::Unimplemented));
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_and_timestamps() -> anyhow::Result<()> {
        let fake = FakeTransport::new();
        fake.push_delayed(GET, Duration::from_millis(25), Ok(json!({})));
        fake.push_ok("/test.Service/List", json!({}));
        let start = Instant::now();
        let clone = fake.clone();
        clone.send(GET, json!({"a": 1}), &SendOptions::new(1)).await?;
        assert_eq!(start.elapsed(), Duration::from_millis(25));
        fake.send("/test.Service/List", json!({"b": 2}), &SendOptions::new(2))
            .await?;
        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].at, start);
        assert_eq!(calls[0].request, json!({"a": 1}));
        assert_eq!(calls[1].at, start + Duration::from_millis(25));
        assert_eq!(calls[1].options.attempt, 2);
        assert_eq!(fake.calls_for(GET).len(), 1);
        Ok(())
    }
}
