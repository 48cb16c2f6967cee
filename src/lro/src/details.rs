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

//! Classifies the result of each poll.

use crate::model::{Operation, OperationResult};
use crate::status::OperationState;
use gax::Result;
use gax::error::Error;
use gax::error::rpc::{Code, Status};
use gax::loop_control::LoopState;
use gax::polling_error_policy::PollingErrorPolicy;
use gax::retry_state::RetryState;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The final outcome of an operation, before conversion to the response type.
pub(crate) type Outcome = Result<Value>;

/// What one poll means for the polling loop.
#[derive(Debug)]
pub(crate) enum PollStep {
    /// The operation is still running.
    InProgress(Operation),
    /// The operation reached a terminal state.
    Terminal(OperationState, Outcome, Option<Operation>),
    /// The poll failed, the loop continues after a backoff.
    Retry(Error),
    /// The polling loop must stop. The operation may still be running.
    Stop(Error),
}

pub(crate) fn handle_poll(
    policy: &dyn PollingErrorPolicy,
    state: &RetryState,
    operation_name: &str,
    result: Result<Operation>,
) -> PollStep {
    match result {
        Err(e) if e.status().is_some_and(|s| s.code == Code::NotFound) => {
            PollStep::Terminal(OperationState::Failed, Err(e), None)
        }
        Err(e) => match policy.on_error(state, e) {
            LoopState::Continue(e) => PollStep::Retry(e),
            LoopState::Exhausted(e) | LoopState::Permanent(e) => PollStep::Stop(e),
        },
        Ok(op) if op.done => {
            let (state, outcome) = as_outcome(&op);
            PollStep::Terminal(state, outcome, Some(op))
        }
        Ok(op) => match policy.on_in_progress(state, operation_name) {
            None => PollStep::InProgress(op),
            Some(e) => PollStep::Stop(e),
        },
    }
}

/// Computes the terminal state of a completed operation.
pub(crate) fn as_outcome(op: &Operation) -> (OperationState, Outcome) {
    match &op.result {
        Some(OperationResult::Response(v)) => (OperationState::Succeeded, Ok(v.clone())),
        Some(OperationResult::Error(s)) if s.code == Code::Cancelled => {
            (OperationState::Cancelled, Err(Error::service(s.clone())))
        }
        Some(OperationResult::Error(s)) => (OperationState::Failed, Err(Error::service(s.clone()))),
        None => {
            let status = Status::default().set_code(Code::Internal).set_message(format!(
                "operation {} completed without a response or an error",
                op.name
            ));
            (OperationState::Failed, Err(Error::service(status)))
        }
    }
}

pub(crate) fn as_result<R>(outcome: Outcome) -> Result<R>
where
    R: DeserializeOwned,
{
    outcome.and_then(|v| serde_json::from_value::<R>(v).map_err(Error::deser))
}

pub(crate) fn as_metadata<M>(metadata: Option<Value>) -> Result<Option<M>>
where
    M: DeserializeOwned,
{
    metadata
        .map(|v| serde_json::from_value::<M>(v).map_err(Error::deser))
        .transpose()
}

/// The error returned when an operation is created without a name.
pub(crate) fn missing_name() -> Error {
    Error::service(
        Status::default()
            .set_code(Code::Internal)
            .set_message("the service returned a long-running operation without a name"),
    )
}
