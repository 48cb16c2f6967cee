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

//! Defines the input to retry, backoff and polling policies.

use std::time::Duration;
use tokio::time::Instant;

/// The input into a retry, backoff, or polling policy query.
///
/// On an error, the call runner queries the retry policy as to whether it
/// should make a new attempt, and then the backoff policy for how long to
/// wait. Operation pollers use the same type to query polling policies. The
/// runner provides an instance of this type to the policies.
///
/// Times are measured with the runner's [Clock][crate::clock::Clock]. Policies
/// should use [elapsed()][RetryState::elapsed] instead of reading the system
/// time, so they work with paused or simulated clocks.
///
/// This struct may gain new fields in future versions of the client libraries.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct RetryState {
    /// If true, the request is idempotent and it is safe to retry.
    ///
    /// Some policies retry non-idempotent operations because they are safe for
    /// a given configuration of the service or client.
    pub idempotent: bool,

    /// The start time for this retry (or polling) loop.
    pub start: Instant,

    /// The time when the policy is queried.
    pub now: Instant,

    /// The number of times the request has been attempted.
    pub attempt_count: u32,
}

impl RetryState {
    /// Create a new instance.
    pub fn new(idempotent: bool) -> Self {
        Self::default().set_idempotent(idempotent)
    }

    /// Update the idempotency.
    pub fn set_idempotent(mut self, v: bool) -> Self {
        self.idempotent = v;
        self
    }

    /// Update the start time, useful in mocks.
    pub fn set_start<T: Into<Instant>>(mut self, v: T) -> Self {
        self.start = v.into();
        self
    }

    /// Update the current time, useful in mocks.
    pub fn set_now<T: Into<Instant>>(mut self, v: T) -> Self {
        self.now = v.into();
        self
    }

    /// Update the attempt count, useful in mocks.
    pub fn set_attempt_count<T: Into<u32>>(mut self, v: T) -> Self {
        self.attempt_count = v.into();
        self
    }

    /// The time spent in the loop so far.
    pub fn elapsed(&self) -> Duration {
        self.now.saturating_duration_since(self.start)
    }
}

impl std::default::Default for RetryState {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            now,
            idempotent: false,
            attempt_count: 0,
        }
    }
}
