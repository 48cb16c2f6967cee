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

//! Test helpers shared by the runtime crates.
//!
//! This crate is not published. It provides a scripted [Transport] fake and
//! helpers to capture [tracing] output in tests.
//!
//! [Transport]: gax::transport::Transport

pub mod fake_transport;
pub mod test_layer;
pub mod tracing;
