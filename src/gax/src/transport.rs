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

//! Defines the interface between the runtime and the network.
//!
//! The runtime never opens connections, it hands each attempt to a
//! [Transport]. Production code wraps an HTTP or gRPC stack, tests use a
//! scripted fake.
//!
//! Transports classify their own failures:
//! - Service responses are reported with [Error::service].
//! - Failures where the request provably never left the client (DNS, connect
//!   refused) are reported with [Error::connect]. These are retried even for
//!   non-idempotent calls.
//! - Any other network failure is reported with [Error::io].
//!
//! [Error::service]: crate::error::Error::service
//! [Error::connect]: crate::error::Error::connect
//! [Error::io]: crate::error::Error::io

use crate::Result;
use tokio::time::Instant;

/// Sends a single attempt of a RPC.
///
/// Implementations must be cancellation safe: the call runner drops the
/// returned future when the attempt deadline expires or the caller cancels
/// the request.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Sends `request` to `method` and returns the decoded response.
    async fn send(
        &self,
        method: &str,
        request: serde_json::Value,
        options: &SendOptions,
    ) -> Result<serde_json::Value>;
}

/// Per-attempt information forwarded to the [Transport].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SendOptions {
    /// The deadline for this attempt.
    ///
    /// Transports that propagate deadlines to the service (e.g. the
    /// `grpc-timeout` header) should use this value.
    pub deadline: Option<Instant>,
    /// The attempt number, starting at 1.
    pub attempt: u32,
    /// The user agent configured for the request.
    pub user_agent: Option<String>,
}

impl SendOptions {
    pub fn new(attempt: u32) -> Self {
        Self {
            deadline: None,
            attempt,
            user_agent: None,
        }
    }

    pub fn set_deadline<T: Into<Option<Instant>>>(mut self, v: T) -> Self {
        self.deadline = v.into();
        self
    }

    pub fn set_user_agent<T: Into<Option<String>>>(mut self, v: T) -> Self {
        self.user_agent = v.into();
        self
    }
}
