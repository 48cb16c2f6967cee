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

//! Defines the time source used by the call runner and the operation pollers.
//!
//! All deadlines and backoff periods are measured against a [Clock]. The
//! default implementation delegates to [tokio::time], which means tests can
//! use `#[tokio::test(start_paused = true)]` and advance time
//! deterministically. Applications with special needs can provide their own
//! implementation.

use std::time::Duration;
use tokio::time::Instant;

/// A monotonic time source with the ability to suspend the current task.
#[async_trait::async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Suspends the current task for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Suspends the current task until `deadline`.
    ///
    /// Returns immediately if the deadline is in the past.
    async fn sleep_until(&self, deadline: Instant) {
        let now = self.now();
        if deadline > now {
            self.sleep(deadline - now).await;
        }
    }
}

/// The default [Clock], based on the [tokio] timer.
#[derive(Clone, Debug, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await
    }
}
