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

//! Types and functions to make LROs easier to use and to require less boilerplate.
//!
//! Many Vertex AI RPCs (creating endpoints, deploying models, running batch
//! predictions) start a long-running operation (LRO) on the service and
//! return immediately. The service reports progress through the
//! `google.longrunning.Operations` interface.
//!
//! [OperationFuture] wraps the polling loop: it queries the operation with
//! the configured backoff, retries transient polling errors, and converts
//! the final response or metadata into application types.
//! [OperationRegistry] lets independent parts of an application share one
//! polling loop per operation.

use gax::Result;
use gax::error::Error;

mod details;
mod future;
pub mod model;
mod registry;
mod status;

pub use future::OperationFuture;
pub use registry::OperationRegistry;
pub use status::{OperationState, OperationStatus};

/// The result of polling a Long-Running Operation (LRO).
///
/// # Parameters
/// * `R` - the response type. This is the type returned when the LRO completes
///   successfully.
/// * `M` - the metadata type. While operations are in progress the LRO may
///   return values of this type.
#[derive(Debug)]
pub enum PollingResult<R, M> {
    /// The operation is still in progress.
    InProgress(Option<M>),
    /// The operation completed. This includes the result.
    Completed(Result<R>),
    /// An error trying to poll the LRO.
    ///
    /// Not all errors indicate that the operation failed. For example, this
    /// may fail because it was not possible to connect to the service. Such
    /// transient errors may disappear in the next polling attempt. Metadata
    /// that does not decode as `M` is also reported here, polling continues.
    ///
    /// Errors that will never recover, such as `PERMISSION_DENIED`, are
    /// reported as [Completed][PollingResult::Completed].
    PollingError(Error),
}
