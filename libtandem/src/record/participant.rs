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

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CodecError;
use crate::state::{InputObjectState, OutputObjectState};

use super::{FinishOutcome, PrepareVote};

/// An external resource taking part in an action.
///
/// Calls arrive one at a time, in record list order, from the thread driving the action or from
/// the recovery scanner. A participant which can be recovered after a crash must save enough of
/// itself in [`save_state`](Participant::save_state) for the [`ParticipantFactory`] registered
/// under its [`type_name`](Participant::type_name) to rebuild it.
pub trait Participant: Send {
    /// The registry key of the factory which can rebuild this participant.
    fn type_name(&self) -> String;

    fn prepare(&mut self) -> PrepareVote;

    fn commit(&mut self) -> FinishOutcome;

    fn abort(&mut self) -> FinishOutcome;

    /// Prepares and commits in a single call when the participant is alone in its action.
    ///
    /// `FinishOutcome::Error` means the participant rolled back.
    fn one_phase_commit(&mut self) -> FinishOutcome {
        match self.prepare() {
            PrepareVote::Ok => self.commit(),
            PrepareVote::ReadOnly => FinishOutcome::Ok,
            PrepareVote::NotOk => {
                self.abort();
                FinishOutcome::Error
            }
        }
    }

    /// Discards a heuristic decision. Returns false if the participant still remembers it.
    fn forget(&mut self) -> bool {
        true
    }

    fn save_state(&self, state: &mut OutputObjectState) -> Result<(), CodecError>;
}

/// Rebuilds a participant from the state it saved.
pub trait ParticipantFactory: Send + Sync {
    fn restore(&self, state: &mut InputObjectState) -> Result<Box<dyn Participant>, CodecError>;
}

impl<F> ParticipantFactory for F
where
    F: Fn(&mut InputObjectState) -> Result<Box<dyn Participant>, CodecError> + Send + Sync,
{
    fn restore(&self, state: &mut InputObjectState) -> Result<Box<dyn Participant>, CodecError> {
        self(state)
    }
}

/// Participant factories keyed by participant type name.
#[derive(Default)]
pub struct ParticipantRegistry {
    factories: RwLock<HashMap<String, Arc<dyn ParticipantFactory>>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        ParticipantRegistry::default()
    }

    /// Registers `factory` for `type_name`, replacing any earlier registration.
    pub fn register<F>(&self, type_name: &str, factory: F)
    where
        F: ParticipantFactory + 'static,
    {
        self.factories
            .write()
            .insert(type_name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.read().contains_key(type_name)
    }

    /// Rebuilds a participant, returning `Ok(None)` if no factory is registered for `type_name`.
    pub fn restore(
        &self,
        type_name: &str,
        state: &mut InputObjectState,
    ) -> Result<Option<Box<dyn Participant>>, CodecError> {
        // The registry must not be locked while the factory runs.
        let factory = self.factories.read().get(type_name).cloned();
        match factory {
            Some(factory) => factory.restore(state).map(Some),
            None => Ok(None),
        }
    }
}
