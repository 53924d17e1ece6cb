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

//! The persistent store contract.
//!
//! A store keeps object states keyed by a [`Uid`] and a hierarchical type path such as
//! `/StateManager/BasicAction/TwoPhaseCoordinator/AtomicAction`. Each key has two independent
//! slots: the uncommitted slot, written while an action prepares, and the committed slot, which
//! holds durable state and intentions logs. The coordinator and the recovery manager only ever
//! reach storage through [`ObjectStore`].

mod enumerate;
mod memory;

pub use enumerate::{pack_types, pack_uids, TypeIter, UidIter};
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::state::{InputObjectState, OutputObjectState};
use crate::uid::Uid;

/// One of the two slots kept for every key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateSlot {
    Committed,
    Uncommitted,
}

/// Which slots currently hold state for a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateStatus {
    Unknown,
    Committed,
    Uncommitted,
    CommittedAndUncommitted,
}

impl StateStatus {
    pub fn from_slots(committed: bool, uncommitted: bool) -> Self {
        match (committed, uncommitted) {
            (false, false) => StateStatus::Unknown,
            (true, false) => StateStatus::Committed,
            (false, true) => StateStatus::Uncommitted,
            (true, true) => StateStatus::CommittedAndUncommitted,
        }
    }

    pub fn has_committed(&self) -> bool {
        matches!(
            self,
            StateStatus::Committed | StateStatus::CommittedAndUncommitted
        )
    }

    pub fn has_uncommitted(&self) -> bool {
        matches!(
            self,
            StateStatus::Uncommitted | StateStatus::CommittedAndUncommitted
        )
    }
}

/// Durable storage for object states.
///
/// Every method concerns a single entry; an error reading or writing one entry says nothing about
/// any other.
pub trait ObjectStore: Send + Sync {
    fn read_committed(
        &self,
        uid: &Uid,
        type_name: &str,
    ) -> Result<Option<InputObjectState>, StoreError>;

    fn read_uncommitted(
        &self,
        uid: &Uid,
        type_name: &str,
    ) -> Result<Option<InputObjectState>, StoreError>;

    fn write_committed(
        &self,
        uid: &Uid,
        type_name: &str,
        state: &OutputObjectState,
    ) -> Result<(), StoreError>;

    fn write_uncommitted(
        &self,
        uid: &Uid,
        type_name: &str,
        state: &OutputObjectState,
    ) -> Result<(), StoreError>;

    /// Removes the committed slot, returning false if it was already empty.
    fn remove_committed(&self, uid: &Uid, type_name: &str) -> Result<bool, StoreError>;

    /// Removes the uncommitted slot, returning false if it was already empty.
    fn remove_uncommitted(&self, uid: &Uid, type_name: &str) -> Result<bool, StoreError>;

    /// Promotes the uncommitted slot to the committed slot without re-serialising it.
    ///
    /// Returns false, and changes nothing, if there is no uncommitted state.
    fn commit_state(&self, uid: &Uid, type_name: &str) -> Result<bool, StoreError>;

    fn current_state(&self, uid: &Uid, type_name: &str) -> Result<StateStatus, StoreError>;

    /// Returns the Uids holding state of `type_name` in `slot`, packed one after another and
    /// terminated by the null Uid. See [`UidIter`].
    fn all_obj_uids(&self, type_name: &str, slot: StateSlot)
        -> Result<InputObjectState, StoreError>;

    /// Returns every type path with at least one entry, packed as strings and terminated by an
    /// absent string. See [`TypeIter`].
    fn all_types(&self) -> Result<InputObjectState, StoreError>;

    /// Collects [`all_obj_uids`](ObjectStore::all_obj_uids) into a vector.
    fn uids(&self, type_name: &str, slot: StateSlot) -> Result<Vec<Uid>, StoreError> {
        UidIter::new(self.all_obj_uids(type_name, slot)?)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// Collects [`all_types`](ObjectStore::all_types) into a vector.
    fn types(&self) -> Result<Vec<String>, StoreError> {
        TypeIter::new(self.all_types()?)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }
}
