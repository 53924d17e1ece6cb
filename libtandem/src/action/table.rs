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

use parking_lot::{Mutex, RwLock};

use crate::uid::Uid;

use super::{Action, ActionStatus};

/// The arena of live actions, keyed by Uid.
///
/// The map lock is only held to look up, insert or remove an entry. Each action has its own lock,
/// taken after the map lock has been released.
#[derive(Default)]
pub struct ActionTable {
    actions: RwLock<HashMap<Uid, Arc<Mutex<Action>>>>,
}

impl ActionTable {
    pub fn new() -> Self {
        ActionTable::default()
    }

    pub fn insert(&self, action: Action) -> Arc<Mutex<Action>> {
        let uid = *action.uid();
        let action = Arc::new(Mutex::new(action));
        self.actions.write().insert(uid, action.clone());
        action
    }

    pub fn get(&self, uid: &Uid) -> Option<Arc<Mutex<Action>>> {
        self.actions.read().get(uid).cloned()
    }

    pub fn remove(&self, uid: &Uid) -> Option<Arc<Mutex<Action>>> {
        self.actions.write().remove(uid)
    }

    pub fn contains(&self, uid: &Uid) -> bool {
        self.actions.read().contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.actions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.read().is_empty()
    }

    /// Returns the status of `uid`, waiting for the action's lock if it is busy.
    pub fn status(&self, uid: &Uid) -> Option<ActionStatus> {
        let action = self.get(uid)?;
        let status = action.lock().status();
        Some(status)
    }
}
