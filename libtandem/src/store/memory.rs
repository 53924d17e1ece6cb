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

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::state::{InputObjectState, OutputObjectState};
use crate::uid::Uid;

use super::{pack_types, pack_uids, ObjectStore, StateSlot, StateStatus};

#[derive(Default)]
struct Slots {
    committed: Option<Vec<u8>>,
    uncommitted: Option<Vec<u8>>,
}

impl Slots {
    fn is_empty(&self) -> bool {
        self.committed.is_none() && self.uncommitted.is_none()
    }
}

/// An [`ObjectStore`] held in memory.
///
/// States are copied in and out, so no buffer is shared with a caller. Sharing one `MemoryStore`
/// between two coordinator contexts models a process which crashed and restarted against the same
/// durable storage.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, BTreeMap<Uid, Slots>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn read(
        &self,
        uid: &Uid,
        type_name: &str,
        slot: StateSlot,
    ) -> Result<Option<InputObjectState>, StoreError> {
        let entries = self.entries.read();
        let bytes = entries
            .get(type_name)
            .and_then(|uids| uids.get(uid))
            .and_then(|slots| match slot {
                StateSlot::Committed => slots.committed.clone(),
                StateSlot::Uncommitted => slots.uncommitted.clone(),
            });

        match bytes {
            Some(bytes) => Ok(Some(InputObjectState::from_bytes(*uid, type_name, bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, uid: &Uid, type_name: &str, state: &OutputObjectState, slot: StateSlot) {
        let mut entries = self.entries.write();
        let slots = entries
            .entry(type_name.to_string())
            .or_default()
            .entry(*uid)
            .or_default();
        let bytes = Some(state.buffer().to_vec());
        match slot {
            StateSlot::Committed => slots.committed = bytes,
            StateSlot::Uncommitted => slots.uncommitted = bytes,
        }
    }

    fn remove(&self, uid: &Uid, type_name: &str, slot: StateSlot) -> bool {
        let mut entries = self.entries.write();
        let uids = match entries.get_mut(type_name) {
            Some(uids) => uids,
            None => return false,
        };
        let removed = match uids.get_mut(uid) {
            Some(slots) => match slot {
                StateSlot::Committed => slots.committed.take().is_some(),
                StateSlot::Uncommitted => slots.uncommitted.take().is_some(),
            },
            None => false,
        };

        if uids.get(uid).map(Slots::is_empty).unwrap_or(false) {
            uids.remove(uid);
        }
        if uids.is_empty() {
            entries.remove(type_name);
        }
        removed
    }
}

impl ObjectStore for MemoryStore {
    fn read_committed(
        &self,
        uid: &Uid,
        type_name: &str,
    ) -> Result<Option<InputObjectState>, StoreError> {
        self.read(uid, type_name, StateSlot::Committed)
    }

    fn read_uncommitted(
        &self,
        uid: &Uid,
        type_name: &str,
    ) -> Result<Option<InputObjectState>, StoreError> {
        self.read(uid, type_name, StateSlot::Uncommitted)
    }

    fn write_committed(
        &self,
        uid: &Uid,
        type_name: &str,
        state: &OutputObjectState,
    ) -> Result<(), StoreError> {
        self.write(uid, type_name, state, StateSlot::Committed);
        Ok(())
    }

    fn write_uncommitted(
        &self,
        uid: &Uid,
        type_name: &str,
        state: &OutputObjectState,
    ) -> Result<(), StoreError> {
        self.write(uid, type_name, state, StateSlot::Uncommitted);
        Ok(())
    }

    fn remove_committed(&self, uid: &Uid, type_name: &str) -> Result<bool, StoreError> {
        Ok(self.remove(uid, type_name, StateSlot::Committed))
    }

    fn remove_uncommitted(&self, uid: &Uid, type_name: &str) -> Result<bool, StoreError> {
        Ok(self.remove(uid, type_name, StateSlot::Uncommitted))
    }

    fn commit_state(&self, uid: &Uid, type_name: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write();
        let slots = match entries
            .get_mut(type_name)
            .and_then(|uids| uids.get_mut(uid))
        {
            Some(slots) => slots,
            None => return Ok(false),
        };

        match slots.uncommitted.take() {
            Some(bytes) => {
                slots.committed = Some(bytes);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn current_state(&self, uid: &Uid, type_name: &str) -> Result<StateStatus, StoreError> {
        let entries = self.entries.read();
        Ok(entries
            .get(type_name)
            .and_then(|uids| uids.get(uid))
            .map(|slots| {
                StateStatus::from_slots(slots.committed.is_some(), slots.uncommitted.is_some())
            })
            .unwrap_or(StateStatus::Unknown))
    }

    fn all_obj_uids(
        &self,
        type_name: &str,
        slot: StateSlot,
    ) -> Result<InputObjectState, StoreError> {
        let entries = self.entries.read();
        let uids: Vec<Uid> = entries
            .get(type_name)
            .map(|uids| {
                uids.iter()
                    .filter(|(_, slots)| match slot {
                        StateSlot::Committed => slots.committed.is_some(),
                        StateSlot::Uncommitted => slots.uncommitted.is_some(),
                    })
                    .map(|(uid, _)| *uid)
                    .collect()
            })
            .unwrap_or_default();

        Ok(pack_uids(&uids))
    }

    fn all_types(&self) -> Result<InputObjectState, StoreError> {
        let entries = self.entries.read();
        Ok(pack_types(entries.keys().map(String::as_str))?)
    }
}
