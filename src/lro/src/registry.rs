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

use crate::future::{OperationFuture, Shared};
use gax::Result;
use gax::call_runner::CallRunner;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

/// Tracks in-flight operations by name.
///
/// Reconstructing a future for an operation name already in the registry
/// returns a handle sharing the existing state, so all the waiters in the
/// process share one polling loop. Finished operations with no handles left
/// are dropped by the next lookup, or by [prune][OperationRegistry::prune].
///
/// # Example
/// ```
/// # use aiplatform_lro::OperationRegistry;
/// # use gax::call_runner::CallRunner;
/// # fn sample(runner: &CallRunner) -> gax::Result<()> {
/// let registry = OperationRegistry::new();
/// let a = registry.get_or_create::<serde_json::Value, serde_json::Value>(runner, "ops/123")?;
/// let b = registry.get_or_create::<serde_json::Value, serde_json::Value>(runner, "ops/123")?;
/// assert_eq!(registry.len(), 1);
/// # Ok(()) }
/// ```
#[derive(Debug, Default)]
pub struct OperationRegistry {
    entries: Mutex<HashMap<String, Arc<Shared>>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static OperationRegistry {
        static GLOBAL: LazyLock<OperationRegistry> = LazyLock::new(OperationRegistry::new);
        &GLOBAL
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<Shared>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a future for the operation named `name`, creating it if
    /// needed.
    ///
    /// New entries poll through `runner`. Existing entries keep the runner
    /// they were created with.
    pub fn get_or_create<R, M>(&self, runner: &CallRunner, name: &str) -> Result<OperationFuture<R, M>> {
        self.prune();
        let mut entries = self.entries();
        if let Some(shared) = entries.get(name) {
            return Ok(OperationFuture::from_shared(shared.clone()));
        }
        let shared = Arc::new(Shared::with_name(runner.clone(), name.to_string())?);
        entries.insert(name.to_string(), shared.clone());
        tracing::trace!(operation = name, "registered operation");
        Ok(OperationFuture::from_shared(shared))
    }

    /// Adds `future` to the registry.
    ///
    /// If the registry already tracks an operation with the same name,
    /// returns a handle to the existing entry instead. The request options
    /// of `future` are preserved.
    pub fn track<R, M>(&self, future: OperationFuture<R, M>) -> OperationFuture<R, M> {
        self.prune();
        let mut entries = self.entries();
        match entries.get(future.name()) {
            Some(shared) if !Arc::ptr_eq(shared, future.shared()) => {
                future.with_shared(shared.clone())
            }
            Some(_) => future,
            None => {
                tracing::trace!(operation = future.name(), "registered operation");
                entries.insert(future.name().to_string(), future.shared().clone());
                future
            }
        }
    }

    /// Returns a future for `name`, if the registry tracks it.
    ///
    /// Finished operations that no handle references are no longer tracked.
    pub fn get<R, M>(&self, name: &str) -> Option<OperationFuture<R, M>> {
        self.prune();
        self.entries()
            .get(name)
            .map(|shared| OperationFuture::from_shared(shared.clone()))
    }

    /// Stops tracking `name`. Existing handles are not affected.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.entries().remove(name).is_some();
        if removed {
            tracing::trace!(operation = name, "removed operation");
        }
        removed
    }

    /// Removes the operations in a terminal state that have no handles.
    pub fn prune(&self) {
        self.entries().retain(|name, shared| {
            let keep = !shared.is_terminal() || Arc::strong_count(shared) > 1;
            if !keep {
                tracing::trace!(operation = name.as_str(), "pruned operation");
            }
            keep
        });
    }

    /// The number of tracked operations.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
