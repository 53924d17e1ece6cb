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

use crate::action::{ActionStatus, ACTION_TYPE};
use crate::context::CoordinatorContext;
use crate::uid::Uid;

use super::connection::ConnectionManager;

/// What recovery learned about the action owning some state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerStatus {
    /// The owning process answered with the action's status.
    Known(ActionStatus),
    /// The owning process is alive but no longer knows the action.
    NotFound,
    /// The owning process is gone.
    Dead,
    /// The owner could not be asked this time; try again on a later scan.
    Unreachable,
}

impl OwnerStatus {
    /// Returns true if the owner may still complete the action itself.
    pub fn is_live(&self) -> bool {
        match self {
            OwnerStatus::Known(status) => status.is_live(),
            OwnerStatus::Unreachable => true,
            OwnerStatus::NotFound | OwnerStatus::Dead => false,
        }
    }
}

/// Finds out whether the action owning a piece of state is still in progress.
///
/// Actions created by this process are looked up directly; any other action is asked about over
/// the liveness protocol of the process which created it.
pub struct StatusChecker {
    context: Arc<CoordinatorContext>,
    connections: ConnectionManager,
}

impl StatusChecker {
    pub fn new(context: Arc<CoordinatorContext>, connections: ConnectionManager) -> Self {
        StatusChecker {
            context,
            connections,
        }
    }

    pub fn check(&self, action: &Uid) -> OwnerStatus {
        if action.process() == self.context.process() {
            return match self.context.actions().status(action) {
                Some(status) => OwnerStatus::Known(status),
                None => OwnerStatus::NotFound,
            };
        }
        self.connections.query(ACTION_TYPE, action)
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }
}
