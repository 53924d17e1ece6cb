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
use crate::error::StoreError;
use crate::record::{AbstractRecord, Decision, FinishOutcome};
use crate::state::StateHeader;
use crate::store::StateSlot;
use crate::uid::Uid;

use super::module::RecoveryModule;
use super::status::{OwnerStatus, StatusChecker};

/// Completes uncommitted object states left behind by actions which never finished.
///
/// The owner of a state is read from its header. A committed owner gets the state promoted and an
/// aborted owner gets it discarded. When the owner cannot say, an intentions log for it means the
/// action reached its commit point; without one the state is rolled back.
pub struct ObjectStateRecoveryModule {
    context: Arc<CoordinatorContext>,
    checker: Arc<StatusChecker>,
    candidates: Vec<(String, Uid)>,
}

impl ObjectStateRecoveryModule {
    pub fn new(context: Arc<CoordinatorContext>, checker: Arc<StatusChecker>) -> Self {
        ObjectStateRecoveryModule {
            context,
            checker,
            candidates: Vec::new(),
        }
    }

    fn collect(&mut self) -> Result<(), StoreError> {
        let store = self.context.store();
        for type_name in store.types()? {
            if type_name == ACTION_TYPE {
                continue;
            }
            for uid in store.uids(&type_name, StateSlot::Uncommitted)? {
                self.candidates.push((type_name.clone(), uid));
            }
        }
        Ok(())
    }

    fn recover(&self, type_name: &str, uid: &Uid) -> Result<(), StoreError> {
        let store = self.context.store();
        if !store.current_state(uid, type_name)?.has_uncommitted() {
            debug!("{} ({}) completed since the first pass", uid, type_name);
            return Ok(());
        }
        let mut stored = match store.read_uncommitted(uid, type_name)? {
            Some(stored) => stored,
            None => return Ok(()),
        };
        let (header, _) = StateHeader::unwrap(&mut stored)?;
        let owner = header.action;

        let decision = match self.checker.check(&owner) {
            status if status.is_live() => {
                debug!("Owner {} of {} is still running", owner, uid);
                return Ok(());
            }
            OwnerStatus::Known(ActionStatus::Committed)
            | OwnerStatus::Known(ActionStatus::HeuristicCommit) => Decision::Commit,
            OwnerStatus::Known(ActionStatus::Aborted)
            | OwnerStatus::Known(ActionStatus::HeuristicRollback) => Decision::Rollback,
            _ => {
                if store.current_state(&owner, ACTION_TYPE)?.has_committed() {
                    Decision::Commit
                } else {
                    Decision::Rollback
                }
            }
        };

        let ctx = self.context.record_context();
        let mut record = AbstractRecord::recovery(*uid, owner, type_name);
        let outcome = match decision {
            Decision::Commit => record.commit(&ctx, true),
            Decision::Rollback => record.abort(&ctx, true),
        };
        match outcome {
            FinishOutcome::Ok => info!(
                "Recovered {} ({}) of action {}: {:?}",
                uid, type_name, owner, decision
            ),
            other => warn!(
                "Unable to recover {} ({}) of action {}: {:?}",
                uid, type_name, owner, other
            ),
        }
        Ok(())
    }
}

impl RecoveryModule for ObjectStateRecoveryModule {
    fn name(&self) -> &str {
        "object state"
    }

    fn first_pass(&mut self) {
        self.candidates.clear();
        if let Err(err) = self.collect() {
            error!("Unable to list uncommitted object states: {}", err);
        }
        debug!("{} uncommitted object states", self.candidates.len());
    }

    fn second_pass(&mut self) {
        for (type_name, uid) in std::mem::take(&mut self.candidates) {
            if let Err(err) = self.recover(&type_name, &uid) {
                error!("Unable to recover {} ({}): {}", uid, type_name, err);
            }
        }
    }
}
