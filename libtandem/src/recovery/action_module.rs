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

use crate::action::{ActionLog, ActionStatus, ACTION_TYPE};
use crate::context::CoordinatorContext;
use crate::error::StoreError;
use crate::record::{Decision, PhaseOutcome};
use crate::store::StateSlot;
use crate::uid::Uid;

use super::module::RecoveryModule;
use super::status::{OwnerStatus, StatusChecker};

/// Replays the second phase of actions whose intentions logs outlived them.
///
/// Records which complete are dropped from the log; the log is rewritten with the rest, or
/// removed once nothing is left in it. Heuristic records stay until forgotten.
pub struct ActionRecoveryModule {
    context: Arc<CoordinatorContext>,
    checker: Arc<StatusChecker>,
    candidates: Vec<Uid>,
}

impl ActionRecoveryModule {
    pub fn new(context: Arc<CoordinatorContext>, checker: Arc<StatusChecker>) -> Self {
        ActionRecoveryModule {
            context,
            checker,
            candidates: Vec::new(),
        }
    }

    fn replay(&self, uid: &Uid) -> Result<(), StoreError> {
        let store = self.context.store().as_ref();
        if !store.current_state(uid, ACTION_TYPE)?.has_committed() {
            debug!("Intentions log of {} removed since the first pass", uid);
            return Ok(());
        }

        let decision = match self.checker.check(uid) {
            status if status.is_live() => {
                debug!("Action {} is still running", uid);
                return Ok(());
            }
            OwnerStatus::Known(ActionStatus::Aborted)
            | OwnerStatus::Known(ActionStatus::HeuristicRollback) => Decision::Rollback,
            _ => Decision::Commit,
        };

        let mut log = match ActionLog::read(store, uid, self.context.registry())? {
            Some(log) => log,
            None => return Ok(()),
        };
        if log.records.is_empty() {
            debug!("Intentions log of {} holds only heuristic records", uid);
            return Ok(());
        }

        let ctx = self.context.record_context();
        let attempted = log.records.len();
        let phase = match decision {
            Decision::Commit => log.records.finish_commit(&ctx, true),
            Decision::Rollback => log.records.finish_abort(&ctx, true),
        };
        let PhaseOutcome {
            failed, heuristic, ..
        } = phase;
        info!(
            "Replayed {:?} of action {}: {} of {} records completed",
            decision,
            uid,
            attempted.saturating_sub(failed.len() + heuristic.len()),
            attempted
        );

        log.records = failed;
        log.heuristic.append(heuristic);
        log.write(store)
    }
}

impl RecoveryModule for ActionRecoveryModule {
    fn name(&self) -> &str {
        "action"
    }

    fn first_pass(&mut self) {
        self.candidates = match self
            .context
            .store()
            .uids(ACTION_TYPE, StateSlot::Committed)
        {
            Ok(uids) => uids,
            Err(err) => {
                error!("Unable to list intentions logs: {}", err);
                Vec::new()
            }
        };
        debug!("{} intentions logs", self.candidates.len());
    }

    fn second_pass(&mut self) {
        for uid in std::mem::take(&mut self.candidates) {
            if let Err(err) = self.replay(&uid) {
                error!("Unable to replay action {}: {}", uid, err);
            }
        }
    }
}
