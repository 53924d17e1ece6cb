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

use parking_lot::Mutex;

use crate::context::CoordinatorContext;
use crate::error::{ActionError, InvalidArgumentError, InvalidStateError};
use crate::record::{
    AbstractRecord, InsertOutcome, Participant, PrepareVote, RecordList, SharedObject,
};
use crate::uid::Uid;

use super::{Action, ActionStatus};

/// Drives actions through the two-phase commit protocol.
///
/// A `Coordinator` is a cheap handle onto a [`CoordinatorContext`]; clones share the same actions.
/// At most one action lock is held at any time. Work which crosses from a sub-action to its
/// parent completes on the child first and then takes the parent's lock.
#[derive(Clone)]
pub struct Coordinator {
    context: Arc<CoordinatorContext>,
}

impl Coordinator {
    pub fn new(context: Arc<CoordinatorContext>) -> Self {
        Coordinator { context }
    }

    pub fn context(&self) -> &Arc<CoordinatorContext> {
        &self.context
    }

    /// Begins a top-level action.
    pub fn begin(&self) -> Uid {
        let uid = self.context.new_uid();
        self.context.actions().insert(Action::new(uid, None));
        debug!("Began action {}", uid);
        uid
    }

    /// Begins a sub-action of a running action.
    pub fn begin_nested(&self, parent: &Uid) -> Result<Uid, ActionError> {
        let uid = self.context.new_uid();
        self.lookup(parent)?.lock().add_child(uid)?;
        self.context.actions().insert(Action::new(uid, Some(*parent)));
        debug!("Began action {} nested in {}", uid, parent);
        Ok(uid)
    }

    pub fn status(&self, action: &Uid) -> Option<ActionStatus> {
        self.context.actions().status(action)
    }

    /// Adds a record to a running action under the merge policy.
    pub fn enlist(
        &self,
        action: &Uid,
        record: AbstractRecord,
    ) -> Result<InsertOutcome, ActionError> {
        Ok(self.lookup(action)?.lock().enlist(record)?)
    }

    /// Enlists a durable participant, returning the Uid of its record.
    pub fn enlist_participant(
        &self,
        action: &Uid,
        participant: Box<dyn Participant>,
    ) -> Result<Uid, ActionError> {
        let uid = self.context.new_uid();
        self.enlist(action, AbstractRecord::resource(uid, *action, participant))?;
        Ok(uid)
    }

    /// Enlists a participant which is never written to an intentions log.
    pub fn enlist_volatile(
        &self,
        action: &Uid,
        participant: Box<dyn Participant>,
    ) -> Result<Uid, ActionError> {
        let uid = self.context.new_uid();
        self.enlist(action, AbstractRecord::volatile(uid, *action, participant))?;
        Ok(uid)
    }

    /// Enlists an object about to be modified. Its current state is restored if the action aborts.
    pub fn enlist_object(
        &self,
        action: &Uid,
        object: SharedObject,
    ) -> Result<InsertOutcome, ActionError> {
        let record = AbstractRecord::persistence(*action, object)?;
        self.enlist(action, record)
    }

    /// Marks an object as destroyed. Its stored state is removed if the action commits.
    pub fn destroy_object(
        &self,
        action: &Uid,
        object: SharedObject,
    ) -> Result<InsertOutcome, ActionError> {
        let record = AbstractRecord::cadaver(*action, object)?;
        self.enlist(action, record)
    }

    /// Runs the first phase of a top-level action.
    ///
    /// Returns `Prepared` on success, after which the action may be committed or aborted. Any
    /// other status means the action has already aborted.
    pub fn prepare(&self, action: &Uid) -> Result<ActionStatus, ActionError> {
        let handle = self.lookup(action)?;
        let status = {
            let mut guard = handle.lock();
            if !guard.is_top_level() {
                return Err(InvalidStateError::with_message(format!(
                    "sub-action {} cannot be prepared on its own",
                    action
                ))
                .into());
            }
            guard.check_running("prepare")?;
            if !guard.children().is_empty() {
                return Err(InvalidStateError::with_message(format!(
                    "action {} has running sub-actions",
                    action
                ))
                .into());
            }
            guard.prepare(&self.context.record_context())
        };

        if status != ActionStatus::Prepared {
            self.retire(action, &handle);
        }
        Ok(status)
    }

    /// Commits an action.
    ///
    /// An action with running sub-actions cannot commit: the sub-actions are aborted, then the
    /// action itself, and `Aborted` is returned.
    pub fn commit(&self, action: &Uid) -> Result<ActionStatus, ActionError> {
        let handle = self.lookup(action)?;
        let (parent, children) = {
            let guard = handle.lock();
            match guard.status() {
                ActionStatus::Running => (),
                ActionStatus::Prepared if guard.is_top_level() => (),
                status => {
                    return Err(InvalidStateError::with_message(format!(
                        "cannot commit action {}: action is {}",
                        action, status
                    ))
                    .into())
                }
            }
            (guard.parent().copied(), guard.children())
        };

        if !children.is_empty() {
            warn!(
                "Action {} committed with {} running sub-actions; aborting",
                action,
                children.len()
            );
            self.abort_children(&children);
            self.abort_action(action, &handle, parent)?;
            return Ok(ActionStatus::Aborted);
        }

        match parent {
            Some(parent) => self.commit_nested(action, &handle, &parent),
            None => self.commit_top_level(action, &handle),
        }
    }

    /// Aborts an action and, first, every running sub-action beneath it.
    pub fn abort(&self, action: &Uid) -> Result<ActionStatus, ActionError> {
        let handle = self.lookup(action)?;
        let (parent, children) = {
            let guard = handle.lock();
            match guard.status() {
                ActionStatus::Running | ActionStatus::Prepared => (),
                status => {
                    return Err(InvalidStateError::with_message(format!(
                        "cannot abort action {}: action is {}",
                        action, status
                    ))
                    .into())
                }
            }
            (guard.parent().copied(), guard.children())
        };

        self.abort_children(&children);
        self.abort_action(action, &handle, parent)
    }

    /// Forgets the heuristic records of a completed action.
    ///
    /// Returns true once nothing is left; the action is then discarded.
    pub fn forget(&self, action: &Uid) -> Result<bool, ActionError> {
        let handle = self.lookup(action)?;
        let forgotten = {
            let mut guard = handle.lock();
            if guard.status().is_live() {
                return Err(InvalidStateError::with_message(format!(
                    "cannot forget action {}: action is {}",
                    action,
                    guard.status()
                ))
                .into());
            }
            guard.forget(&self.context.record_context(), self.context.registry())
        };

        if forgotten {
            self.retire(action, &handle);
        }
        Ok(forgotten)
    }

    fn commit_top_level(
        &self,
        action: &Uid,
        handle: &Arc<Mutex<Action>>,
    ) -> Result<ActionStatus, ActionError> {
        let config = self.context.config();
        let ctx = self.context.record_context();
        let status = {
            let mut guard = handle.lock();
            match guard.status() {
                ActionStatus::Running
                    if config.one_phase_commit() && guard.pending().len() == 1 =>
                {
                    guard.one_phase_commit(&ctx, config.maintain_heuristics())
                }
                ActionStatus::Running => match guard.prepare(&ctx) {
                    ActionStatus::Prepared => {
                        guard.phase_two_commit(&ctx, config.maintain_heuristics())
                    }
                    status => status,
                },
                ActionStatus::Prepared => {
                    guard.phase_two_commit(&ctx, config.maintain_heuristics())
                }
                status => {
                    return Err(InvalidStateError::with_message(format!(
                        "cannot commit action {}: action is {}",
                        action, status
                    ))
                    .into())
                }
            }
        };

        debug!("Action {} completed: {}", action, status);
        self.retire(action, handle);
        Ok(status)
    }

    fn commit_nested(
        &self,
        action: &Uid,
        handle: &Arc<Mutex<Action>>,
        parent: &Uid,
    ) -> Result<ActionStatus, ActionError> {
        let ctx = self.context.record_context();
        let vote = handle.lock().nested_prepare(&ctx);
        if vote == PrepareVote::NotOk {
            info!("Sub-action {} failed to prepare; aborting", action);
            return self.abort_action(action, handle, Some(*parent));
        }

        let records = handle.lock().take_prepared();
        self.context.actions().remove(action);

        let parent_handle = self.lookup(parent)?;
        let mut parent_guard = parent_handle.lock();
        parent_guard.remove_child(action);
        if !records.is_empty() {
            let nested = AbstractRecord::nested(*parent, *action, records);
            if let Err(err) = parent_guard.enlist(nested) {
                warn!("Unable to hand sub-action {} to its parent: {}", action, err);
            }
        }
        debug!("Sub-action {} committed into {}", action, parent);
        Ok(ActionStatus::Committed)
    }

    fn abort_action(
        &self,
        action: &Uid,
        handle: &Arc<Mutex<Action>>,
        parent: Option<Uid>,
    ) -> Result<ActionStatus, ActionError> {
        let ctx = self.context.record_context();
        let parent = match parent {
            Some(parent) => parent,
            None => {
                let status = handle.lock().abort_records(&ctx, true);
                debug!("Action {} completed: {}", action, status);
                self.retire(action, handle);
                return Ok(status);
            }
        };

        let (status, propagating) = {
            let mut guard = handle.lock();
            let propagating = guard.take_propagating();
            (guard.abort_records(&ctx, false), propagating)
        };
        self.context.actions().remove(action);

        let parent_handle = self.lookup(&parent)?;
        let mut parent_guard = parent_handle.lock();
        parent_guard.remove_child(action);
        hand_to_parent(&mut parent_guard, propagating);
        debug!("Sub-action {} aborted: {}", action, status);
        Ok(status)
    }

    fn abort_children(&self, children: &[Uid]) {
        for child in children {
            if let Err(err) = self.abort(child) {
                warn!("Unable to abort sub-action {}: {}", child, err);
            }
        }
    }

    // Removes a finished action from the arena unless it still holds heuristic records.
    fn retire(&self, action: &Uid, handle: &Arc<Mutex<Action>>) {
        let keep = {
            let guard = handle.lock();
            guard.status().is_live() || guard.has_heuristics()
        };
        if !keep {
            self.context.actions().remove(action);
        }
    }

    fn lookup(&self, action: &Uid) -> Result<Arc<Mutex<Action>>, ActionError> {
        self.context.actions().get(action).ok_or_else(|| {
            ActionError::from(InvalidArgumentError::new(
                "action".to_string(),
                format!("unknown action {}", action),
            ))
        })
    }
}

fn hand_to_parent(parent: &mut Action, records: RecordList) {
    for record in records {
        debug!(
            "Moving {:?} record {} to action {}",
            record.record_type(),
            record.uid(),
            parent.uid()
        );
        if let Err(err) = parent.enlist(record) {
            warn!("Unable to move record to action {}: {}", parent.uid(), err);
        }
    }
}
