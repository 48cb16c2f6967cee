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

use gax::error::Error;
use serde_json::Value;

/// The lifecycle of an [OperationFuture][crate::OperationFuture].
///
/// ```text
/// Submitted -> Polling -> Succeeded | Failed | Cancelled
/// ```
///
/// Terminal states are sticky, once reached the future never polls again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum OperationState {
    /// The operation was started, no caller has asked about it yet.
    #[default]
    Submitted,
    /// A caller is waiting for, or has polled, the operation.
    Polling,
    /// The operation completed with a response.
    Succeeded,
    /// The operation completed with an error, or the service no longer knows
    /// about it.
    Failed,
    /// The operation was cancelled.
    Cancelled,
}

impl OperationState {
    /// Returns `true` for [Succeeded][Self::Succeeded], [Failed][Self::Failed]
    /// and [Cancelled][Self::Cancelled].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Submitted => "SUBMITTED",
            Self::Polling => "POLLING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// A snapshot of an operation, as last observed by the client.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct OperationStatus {
    /// The local state.
    pub state: OperationState,
    /// The metadata from the most recent poll.
    pub metadata: Option<Value>,
    /// The terminal error, for failed or cancelled operations.
    pub error: Option<Error>,
}
