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

use std::collections::BTreeSet;

use crate::error::{CodecError, InvalidStateError, StoreError};
use crate::record::{AbstractRecord, InsertOutcome, ParticipantRegistry, RecordList};
use crate::state::{InputObjectState, OutputObjectState};
use crate::store::ObjectStore;
use crate::uid::Uid;

use super::ActionStatus;

/// The store type path of intentions logs.
pub const ACTION_TYPE: &str = "/StateManager/BasicAction/TwoPhaseCoordinator/AtomicAction";

/// A node of the action tree.
///
/// Records move between lists as the protocol advances: enlisted records wait in `pending` and
/// records which voted to commit move to `prepared`. After the second phase heuristic records stay
/// in `heuristic` until forgotten, while records which failed live only in the intentions log,
/// where recovery picks them up.
pub struct Action {
    uid: Uid,
    parent: Option<Uid>,
    children: BTreeSet<Uid>,
    status: ActionStatus,
    pub(super) pending: RecordList,
    pub(super) prepared: RecordList,
    pub(super) heuristic: RecordList,
    pub(super) logged: bool,
}

impl Action {
    pub fn new(uid: Uid, parent: Option<Uid>) -> Self {
        Action {
            uid,
            parent,
            children: BTreeSet::new(),
            status: ActionStatus::Running,
            pending: RecordList::new(),
            prepared: RecordList::new(),
            heuristic: RecordList::new(),
            logged: false,
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn parent(&self) -> Option<&Uid> {
        self.parent.as_ref()
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    pub fn children(&self) -> Vec<Uid> {
        self.children.iter().copied().collect()
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub(super) fn set_status(&mut self, status: ActionStatus) {
        debug!("Action {} is {}", self.uid, status);
        self.status = status;
    }

    pub fn pending(&self) -> &RecordList {
        &self.pending
    }

    pub fn prepared(&self) -> &RecordList {
        &self.prepared
    }

    pub fn heuristic(&self) -> &RecordList {
        &self.heuristic
    }

    /// Returns true if the action still holds heuristic records awaiting `forget`.
    pub fn has_heuristics(&self) -> bool {
        !self.heuristic.is_empty()
    }

    pub(super) fn add_child(&mut self, child: Uid) -> Result<(), InvalidStateError> {
        self.check_running("begin a sub-action")?;
        self.children.insert(child);
        Ok(())
    }

    pub(super) fn remove_child(&mut self, child: &Uid) -> bool {
        self.children.remove(child)
    }

    /// Adds a record to the pending list under the merge policy.
    pub fn enlist(&mut self, mut record: AbstractRecord) -> Result<InsertOutcome, InvalidStateError> {
        self.check_running("enlist a record")?;
        record.set_owner(self.uid);
        Ok(self.pending.insert(record))
    }

    pub(super) fn check_running(&self, operation: &str) -> Result<(), InvalidStateError> {
        if self.status != ActionStatus::Running {
            return Err(InvalidStateError::with_message(format!(
                "cannot {} in action {}: action is {}",
                operation, self.uid, self.status
            )));
        }
        Ok(())
    }

    // Writes the intentions log holding `outstanding` and the heuristic records, or removes it
    // once neither holds anything durable. Returns whether a log now exists.
    pub(super) fn write_log(
        &self,
        store: &dyn ObjectStore,
        outstanding: &RecordList,
    ) -> Result<bool, StoreError> {
        if outstanding.has_durable() || self.heuristic.has_durable() {
            let log = ActionLog::encode(&self.uid, self.status, outstanding, &self.heuristic)?;
            store.write_committed(&self.uid, ACTION_TYPE, &log)?;
            Ok(true)
        } else {
            if self.logged {
                store.remove_committed(&self.uid, ACTION_TYPE)?;
            }
            Ok(false)
        }
    }

    // Rewrites the log with the current heuristic records, keeping whatever is still outstanding
    // in it. Recovery may have completed part of the log since it was written.
    pub(super) fn rewrite_heuristics(
        &mut self,
        store: &dyn ObjectStore,
        registry: &ParticipantRegistry,
    ) -> Result<(), StoreError> {
        if !self.logged {
            return Ok(());
        }
        let outstanding = match ActionLog::read(store, &self.uid, registry)? {
            Some(log) => log.records,
            None => RecordList::new(),
        };
        self.logged = self.write_log(store, &outstanding)?;
        Ok(())
    }

    pub(super) fn remove_log(&mut self, store: &dyn ObjectStore) -> Result<(), StoreError> {
        if self.logged {
            store.remove_committed(&self.uid, ACTION_TYPE)?;
            self.logged = false;
        }
        Ok(())
    }
}

/// An intentions log read back from the store.
///
/// `records` holds everything still to be completed: the prepared records, or after a completion
/// attempt those which failed. `heuristic` holds records awaiting `forget`.
pub struct ActionLog {
    pub uid: Uid,
    pub status: ActionStatus,
    pub records: RecordList,
    pub heuristic: RecordList,
}

impl ActionLog {
    fn encode(
        uid: &Uid,
        status: ActionStatus,
        records: &RecordList,
        heuristic: &RecordList,
    ) -> Result<OutputObjectState, CodecError> {
        let mut state = OutputObjectState::new(*uid, ACTION_TYPE);
        state.pack_int(status.code());
        records.save_state(&mut state)?;
        heuristic.save_state(&mut state)?;
        Ok(state)
    }

    pub fn decode(
        state: &mut InputObjectState,
        registry: &ParticipantRegistry,
    ) -> Result<ActionLog, CodecError> {
        let code = state.unpack_int()?;
        let status = ActionStatus::from_code(code)
            .ok_or_else(|| CodecError::InvalidValue(format!("unknown action status {}", code)))?;
        let records = RecordList::restore_state(state, registry)?;
        let heuristic = RecordList::restore_state(state, registry)?;

        Ok(ActionLog {
            uid: *state.uid(),
            status,
            records,
            heuristic,
        })
    }

    /// Reads the committed log of `uid`, if there is one.
    pub fn read(
        store: &dyn ObjectStore,
        uid: &Uid,
        registry: &ParticipantRegistry,
    ) -> Result<Option<ActionLog>, StoreError> {
        match store.read_committed(uid, ACTION_TYPE)? {
            Some(mut state) => Ok(Some(ActionLog::decode(&mut state, registry)?)),
            None => Ok(None),
        }
    }

    /// Writes the log back, or removes it once nothing is left in it.
    pub fn write(&self, store: &dyn ObjectStore) -> Result<(), StoreError> {
        if self.records.is_empty() && self.heuristic.is_empty() {
            store.remove_committed(&self.uid, ACTION_TYPE)?;
        } else {
            let log = ActionLog::encode(&self.uid, self.status, &self.records, &self.heuristic)?;
            store.write_committed(&self.uid, ACTION_TYPE, &log)?;
        }
        Ok(())
    }
}
