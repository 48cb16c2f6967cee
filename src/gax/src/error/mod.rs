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

mod core_error;
pub use core_error::*;

/// The service status payload and its typed details.
///
/// Client-side failures (connect, io, timeouts) carry no [rpc::Status]. Only
/// errors built with [Error::service] do.
///
/// ```
/// use aiplatform_gax::error::Error;
/// use aiplatform_gax::error::rpc::{Code, Status};
/// let e = Error::service(Status::default().set_code(Code::Aborted));
/// assert_eq!(e.status().map(|s| s.code), Some(Code::Aborted));
/// ```
pub mod rpc;
