// Copyright 2023 Bitwise IO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use crate::action::ActionTable;
use crate::config::CoordinatorConfig;
use crate::error::InvalidStateError;
use crate::process::ProcessId;
use crate::record::{ParticipantRegistry, RecordContext};
use crate::store::ObjectStore;
use crate::uid::Uid;

/// Everything a coordinator and its recovery manager share within one process.
///
/// A process normally has exactly one context. Tests build several contexts over one store to
/// model a process which crashed and was restarted.
pub struct CoordinatorContext {
    process: ProcessId,
    store: Arc<dyn ObjectStore>,
    actions: ActionTable,
    registry: Arc<ParticipantRegistry>,
    config: CoordinatorConfig,
}

impl CoordinatorContext {
    pub fn process(&self) -> ProcessId {
        self.process
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Creates a Uid owned by this context's process.
    pub fn new_uid(&self) -> Uid {
        Uid::with_process(self.process)
    }

    pub fn record_context(&self) -> RecordContext<'_> {
        RecordContext {
            store: self.store.as_ref(),
            process: self.process,
        }
    }
}

#[derive(Default)]
pub struct CoordinatorContextBuilder {
    process: Option<ProcessId>,
    store: Option<Arc<dyn ObjectStore>>,
    registry: Option<Arc<ParticipantRegistry>>,
    config: Option<CoordinatorConfig>,
}

impl CoordinatorContextBuilder {
    pub fn new() -> Self {
        CoordinatorContextBuilder::default()
    }

    /// Defaults to the id of the running process.
    pub fn with_process(mut self, process: ProcessId) -> Self {
        self.process = Some(process);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ParticipantRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<CoordinatorContext, InvalidStateError> {
        let store = self
            .store
            .ok_or_else(|| InvalidStateError::with_message("missing store field".into()))?;

        Ok(CoordinatorContext {
            process: self.process.unwrap_or_else(ProcessId::current),
            store,
            actions: ActionTable::new(),
            registry: self.registry.unwrap_or_default(),
            config: self.config.unwrap_or_default(),
        })
    }
}
