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

//! Vertex AI client runtime helpers.
//!
//! This crate contains the pieces shared by every Vertex AI (AI Platform)
//! client: a [CallRunner][call_runner::CallRunner] that executes unary RPCs
//! with deadlines, retries and idempotency checks, a
//! [Paginator][paginator::Paginator] that turns list RPCs into lazy streams,
//! and the policies that control both.
//!
//! Long-running operations are implemented in the companion `aiplatform-lro`
//! crate, on top of the types defined here.
//!
//! The remote service is reached through a [Transport][transport::Transport].
//! This crate never opens connections or handles credentials, applications
//! and tests provide the transport.

/// An alias of [std::result::Result] where the error is always [crate::error::Error].
///
/// This is the result type used by all functions wrapping RPCs.
pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// The core error types used by the clients.
pub mod error;

pub mod backoff_policy;
pub mod call_runner;
pub mod client_builder;
pub mod clock;
pub mod exponential_backoff;
pub mod loop_control;
pub mod options;
pub mod paginator;
pub mod polling_error_policy;
pub mod retry_policy;
pub mod retry_state;
pub mod retry_throttler;
pub mod transport;
