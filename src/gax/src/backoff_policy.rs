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

//! Traits for the delays between attempts.
//!
//! Two loops in the runtime wait between attempts, and each has its own
//! policy:
//! - The call runner waits [BackoffPolicy::on_failure] after a failed attempt,
//!   giving the service time to recover before the retry.
//! - Operation futures wait [PollingBackoffPolicy::wait_period] after a poll
//!   that found the operation still running, giving the operation time to make
//!   progress.
//!
//! [ExponentialBackoff] implements both traits. Retry backoff usually keeps
//! some jitter to spread retries from many clients, polling usually disables
//! it so the poll times are predictable.
//!
//! # Example
//! ```
//! # use aiplatform_gax::client_builder::ClientBuilder;
//! # use aiplatform_gax::exponential_backoff::ExponentialBackoffBuilder;
//! use std::time::Duration;
//! let retry = ExponentialBackoffBuilder::new()
//!     .with_initial_delay(Duration::from_millis(100))
//!     .with_maximum_delay(Duration::from_secs(5))
//!     .build()?;
//! let polling = ExponentialBackoffBuilder::new()
//!     .with_initial_delay(Duration::from_secs(1))
//!     .with_maximum_delay(Duration::from_secs(30))
//!     .with_jitter(0.0)
//!     .build()?;
//! let builder = ClientBuilder::new()
//!     .with_backoff_policy(retry)
//!     .with_polling_backoff_policy(polling);
//! # anyhow::Ok(())
//! ```
//!
//! [ExponentialBackoff]: crate::exponential_backoff::ExponentialBackoff

use crate::retry_state::RetryState;
use std::sync::Arc;
use std::time::Duration;

/// Computes the delay before a retry attempt.
pub trait BackoffPolicy: Send + Sync + std::fmt::Debug {
    /// The delay after a failed attempt.
    ///
    /// `state.attempt_count` is the number of attempts made so far, it is
    /// always at least 1.
    #[must_use = "the delay is the only result of this function"]
    fn on_failure(&self, state: &RetryState) -> Duration;
}

/// Computes the delay between polls of a long-running operation.
pub trait PollingBackoffPolicy: Send + Sync + std::fmt::Debug {
    /// The delay after a poll that found the operation in progress.
    ///
    /// `state.attempt_count` is the number of polls completed so far.
    #[must_use = "the delay is the only result of this function"]
    fn wait_period(&self, state: &RetryState) -> Duration;
}

/// Converts backoff policies for [ClientBuilder] and [RequestOptions].
///
/// [ClientBuilder]: crate::client_builder::ClientBuilder
/// [RequestOptions]: crate::options::RequestOptions
#[derive(Clone, Debug)]
pub struct BackoffPolicyArg(pub(crate) Arc<dyn BackoffPolicy>);

impl<T: BackoffPolicy + 'static> From<T> for BackoffPolicyArg {
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl From<Arc<dyn BackoffPolicy>> for BackoffPolicyArg {
    fn from(value: Arc<dyn BackoffPolicy>) -> Self {
        Self(value)
    }
}

impl From<BackoffPolicyArg> for Arc<dyn BackoffPolicy> {
    fn from(value: BackoffPolicyArg) -> Self {
        value.0
    }
}

/// Converts polling backoff policies for [ClientBuilder] and [RequestOptions].
///
/// [ClientBuilder]: crate::client_builder::ClientBuilder
/// [RequestOptions]: crate::options::RequestOptions
#[derive(Clone, Debug)]
pub struct PollingBackoffPolicyArg(pub(crate) Arc<dyn PollingBackoffPolicy>);

impl<T: PollingBackoffPolicy + 'static> From<T> for PollingBackoffPolicyArg {
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl From<Arc<dyn PollingBackoffPolicy>> for PollingBackoffPolicyArg {
    fn from(value: Arc<dyn PollingBackoffPolicy>) -> Self {
        Self(value)
    }
}

impl From<PollingBackoffPolicyArg> for Arc<dyn PollingBackoffPolicy> {
    fn from(value: PollingBackoffPolicyArg) -> Self {
        value.0
    }
}
