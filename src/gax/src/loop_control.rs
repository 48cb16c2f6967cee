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

//! Decisions returned by retry and polling policies.
//!
//! Each value carries the error that triggered the decision, so the loop can
//! return it (or keep it as a breadcrumb) without cloning. Applications only
//! need these types to implement their own policies.
//!
//! # Example
//! ```
//! # use aiplatform_gax::error::Error;
//! # use aiplatform_gax::loop_control::{RetryResult, ThrottleResult};
//! # use aiplatform_gax::retry_policy::RetryPolicy;
//! # use aiplatform_gax::retry_state::RetryState;
//! #[derive(Debug)]
//! struct FiveAttempts;
//! impl RetryPolicy for FiveAttempts {
//!     fn on_error(&self, state: &RetryState, error: Error) -> RetryResult {
//!         if state.attempt_count >= 5 {
//!             return RetryResult::Exhausted(error);
//!         }
//!         RetryResult::Continue(error)
//!     }
//!     fn on_throttle(&self, _state: &RetryState, error: Error) -> ThrottleResult {
//!         // Give up as soon as the throttler kicks in.
//!         ThrottleResult::Exhausted(error)
//!     }
//! }
//! ```

use crate::error::Error;

/// What the call runner does after a failed attempt.
#[derive(Debug)]
pub enum RetryResult {
    /// The error cannot be retried.
    Permanent(Error),
    /// The error could be retried, but the policy ran out of attempts or time.
    Exhausted(Error),
    /// Retry after the backoff delay.
    Continue(Error),
}

/// What the call runner does after the throttler skipped a retry attempt.
///
/// The runner counts the skipped attempt as a failure with the previous
/// error. See [RetryThrottler][crate::retry_throttler::RetryThrottler].
#[derive(Debug)]
pub enum ThrottleResult {
    /// Stop and return the previous error.
    Exhausted(Error),
    /// Back off and try again. The next attempt may be throttled too.
    Continue(Error),
}

/// What an operation future does after a failed poll.
///
/// Only the polling loop stops on `Permanent` and `Exhausted`, the operation
/// itself keeps running on the service.
#[derive(Debug)]
pub enum LoopState {
    /// The polling error cannot be retried.
    Permanent(Error),
    /// The polling error could be retried, but the policy gave up.
    Exhausted(Error),
    /// Poll again after the backoff delay.
    Continue(Error),
}

impl RetryResult {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }

    /// The error behind the decision.
    pub fn error(&self) -> &Error {
        match self {
            Self::Permanent(e) | Self::Exhausted(e) | Self::Continue(e) => e,
        }
    }
}

impl ThrottleResult {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }
}

impl LoopState {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }

    /// Consumes the decision and returns its error.
    pub fn into_error(self) -> Error {
        match self {
            Self::Permanent(e) | Self::Exhausted(e) | Self::Continue(e) => e,
        }
    }
}

impl From<RetryResult> for LoopState {
    fn from(value: RetryResult) -> Self {
        match value {
            RetryResult::Permanent(e) => Self::Permanent(e),
            RetryResult::Exhausted(e) => Self::Exhausted(e),
            RetryResult::Continue(e) => Self::Continue(e),
        }
    }
}
