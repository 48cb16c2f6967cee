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

//! The wire representation of long-running operations.
//!
//! These types mirror the `google.longrunning.Operation` message in its JSON
//! form. The metadata and the response are kept as [Value]s, the
//! [OperationFuture][crate::OperationFuture] converts them to the types
//! expected by the application.

use gax::error::rpc::Status;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A long-running operation, as returned by the service.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(from = "OperationWire", into = "OperationWire")]
#[non_exhaustive]
pub struct Operation {
    /// The server-assigned name, unique within the service.
    pub name: String,

    /// Service-specific progress information.
    pub metadata: Option<Value>,

    /// If `false`, the operation is still in progress.
    pub done: bool,

    /// The final outcome. Only meaningful when `done` is `true`.
    pub result: Option<OperationResult>,

    /// When the operation was created, in RFC 3339 format.
    pub create_time: Option<String>,

    /// When the operation was last updated, in RFC 3339 format.
    pub update_time: Option<String>,
}

impl Operation {
    /// Creates an in-progress operation named `name`.
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the value for [metadata][Operation::metadata].
    pub fn set_metadata<T: Into<Value>>(mut self, v: T) -> Self {
        self.metadata = Some(v.into());
        self
    }

    /// Sets the value for [done][Operation::done].
    pub fn set_done(mut self, v: bool) -> Self {
        self.done = v;
        self
    }

    /// Sets the value for [result][Operation::result].
    pub fn set_result<T: Into<Option<OperationResult>>>(mut self, v: T) -> Self {
        self.result = v.into();
        self
    }

    /// Sets the value for [create_time][Operation::create_time].
    pub fn set_create_time<T: Into<String>>(mut self, v: T) -> Self {
        self.create_time = Some(v.into());
        self
    }

    /// Sets the value for [update_time][Operation::update_time].
    pub fn set_update_time<T: Into<String>>(mut self, v: T) -> Self {
        self.update_time = Some(v.into());
        self
    }

    /// The response, if the operation completed successfully.
    pub fn response(&self) -> Option<&Value> {
        match &self.result {
            Some(OperationResult::Response(v)) => Some(v),
            _ => None,
        }
    }

    /// The error, if the operation failed.
    pub fn error(&self) -> Option<&Status> {
        match &self.result {
            Some(OperationResult::Error(s)) => Some(s),
            _ => None,
        }
    }
}

/// The outcome of a completed operation.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationResult {
    /// The operation failed.
    Error(Status),
    /// The operation succeeded.
    Response(Value),
}

/// The request sent to query an operation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[non_exhaustive]
pub struct GetOperationRequest {
    pub name: String,
}

impl GetOperationRequest {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self { name: name.into() }
    }
}

/// The request sent to cancel an operation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[non_exhaustive]
pub struct CancelOperationRequest {
    pub name: String,
}

impl CancelOperationRequest {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self { name: name.into() }
    }
}

// The JSON encoding flattens the `result` oneof into two optional fields.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
struct OperationWire {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
    done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    create_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_time: Option<String>,
}

impl From<OperationWire> for Operation {
    fn from(value: OperationWire) -> Self {
        // A malformed record with both fields set is treated as a failure.
        let result = match (value.error, value.response) {
            (Some(e), _) => Some(OperationResult::Error(e)),
            (None, Some(r)) => Some(OperationResult::Response(r)),
            (None, None) => None,
        };
        Self {
            name: value.name,
            metadata: value.metadata,
            done: value.done,
            result,
            create_time: value.create_time,
            update_time: value.update_time,
        }
    }
}

impl From<Operation> for OperationWire {
    fn from(value: Operation) -> Self {
        let (error, response) = match value.result {
            Some(OperationResult::Error(e)) => (Some(e), None),
            Some(OperationResult::Response(r)) => (None, Some(r)),
            None => (None, None),
        };
        Self {
            name: value.name,
            metadata: value.metadata,
            done: value.done,
            error,
            response,
            create_time: value.create_time,
            update_time: value.update_time,
        }
    }
}
