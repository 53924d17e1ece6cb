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

//! Participants and objects shared by the unit tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CodecError;
use crate::record::{FinishOutcome, Participant, ParticipantRegistry, PrepareVote};
use crate::state::{InputObjectState, OutputObjectState, StateManaged};
use crate::uid::Uid;

pub const SCRIPTED_TYPE: &str = "/Test/ScriptedParticipant";
pub const COUNTER_TYPE: &str = "/StateManager/Test/Counter";

/// Records every call made to the participants sharing it, as `<name>:<call>`.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, name: &str, call: &str) {
        self.0.lock().push(format!("{}:{}", name, call));
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|call| *call == entry).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// A participant which answers with preset votes and outcomes.
pub struct Scripted {
    name: String,
    vote: PrepareVote,
    commit: FinishOutcome,
    abort: FinishOutcome,
    log: CallLog,
}

impl Scripted {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Scripted {
            name: name.to_string(),
            vote: PrepareVote::Ok,
            commit: FinishOutcome::Ok,
            abort: FinishOutcome::Ok,
            log: log.clone(),
        }
    }

    pub fn voting(mut self, vote: PrepareVote) -> Self {
        self.vote = vote;
        self
    }

    pub fn committing(mut self, outcome: FinishOutcome) -> Self {
        self.commit = outcome;
        self
    }

    pub fn aborting(mut self, outcome: FinishOutcome) -> Self {
        self.abort = outcome;
        self
    }

    pub fn boxed(self) -> Box<dyn Participant> {
        Box::new(self)
    }
}

impl Participant for Scripted {
    fn type_name(&self) -> String {
        SCRIPTED_TYPE.to_string()
    }

    fn prepare(&mut self) -> PrepareVote {
        self.log.push(&self.name, "prepare");
        self.vote
    }

    fn commit(&mut self) -> FinishOutcome {
        self.log.push(&self.name, "commit");
        self.commit
    }

    fn abort(&mut self) -> FinishOutcome {
        self.log.push(&self.name, "abort");
        self.abort
    }

    fn forget(&mut self) -> bool {
        self.log.push(&self.name, "forget");
        true
    }

    fn save_state(&self, state: &mut OutputObjectState) -> Result<(), CodecError> {
        state.pack_string(Some(&self.name))
    }
}

/// Registers a factory which rebuilds scripted participants that always succeed.
pub fn register_scripted(registry: &ParticipantRegistry, log: &CallLog) {
    let log = log.clone();
    registry.register(
        SCRIPTED_TYPE,
        move |state: &mut InputObjectState| -> Result<Box<dyn Participant>, CodecError> {
            let name = state.unpack_string()?.unwrap_or_default();
            Ok(Scripted::new(&name, &log).boxed())
        },
    );
}

/// A state-managed integer.
pub struct Counter {
    uid: Uid,
    pub value: i32,
}

impl Counter {
    pub fn shared(value: i32) -> Arc<Mutex<Counter>> {
        Arc::new(Mutex::new(Counter {
            uid: Uid::new(),
            value,
        }))
    }

    /// An empty counter standing in for an existing object, ready to load its stored state.
    pub fn with_uid(uid: Uid) -> Arc<Mutex<Counter>> {
        Arc::new(Mutex::new(Counter { uid, value: 0 }))
    }
}

impl StateManaged for Counter {
    fn uid(&self) -> Uid {
        self.uid
    }

    fn type_name(&self) -> String {
        COUNTER_TYPE.to_string()
    }

    fn save_state(&self, state: &mut OutputObjectState) -> Result<(), CodecError> {
        state.pack_int(self.value);
        Ok(())
    }

    fn restore_state(&mut self, state: &mut InputObjectState) -> Result<(), CodecError> {
        self.value = state.unpack_int()?;
        Ok(())
    }
}
