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

//! The two-phase commit protocol over one action's records.
//!
//! These methods run with the action's lock held and never touch another action; moving records
//! between a sub-action and its parent is left to the coordinator.

use crate::record::{
    Decision, FinishOutcome, OutcomeTally, ParticipantRegistry, PhaseOutcome, PrepareVote,
    RecordContext, RecordList,
};

use super::{Action, ActionStatus};

impl Action {
    /// Runs the first phase of a top-level action.
    ///
    /// Returns `Prepared` once every record has voted to commit and the intentions log, if one is
    /// needed, is durable. Any other result means the action has aborted.
    pub fn prepare(&mut self, ctx: &RecordContext) -> ActionStatus {
        self.set_status(ActionStatus::Preparing);

        match self.pending.prepare(ctx, true) {
            PrepareVote::NotOk => {
                info!("Action {} failed to prepare; aborting", self.uid());
                return self.abort_records(ctx, true);
            }
            PrepareVote::ReadOnly => debug!("Action {} is read only", self.uid()),
            PrepareVote::Ok => (),
        }

        let pending = self.pending.take();
        self.prepared.append(pending);
        self.set_status(ActionStatus::Prepared);

        match self.write_log(ctx.store, &self.prepared) {
            Ok(logged) => self.logged = logged,
            Err(err) => {
                error!("Unable to write intentions log of {}: {}", self.uid(), err);
                return self.abort_records(ctx, true);
            }
        }
        ActionStatus::Prepared
    }

    /// Runs the second phase of a top-level action which has been prepared.
    ///
    /// Records which fail are left in the intentions log for recovery to retry. Heuristic records
    /// are kept until forgotten, unless `maintain_heuristics` is false.
    pub fn phase_two_commit(
        &mut self,
        ctx: &RecordContext,
        maintain_heuristics: bool,
    ) -> ActionStatus {
        self.set_status(ActionStatus::Committing);

        let phase = self.prepared.finish_commit(ctx, true);
        let (status, failed) =
            self.absorb_phase(phase, maintain_heuristics, ActionStatus::Committed);
        self.set_status(status);

        match self.write_log(ctx.store, &failed) {
            Ok(logged) => self.logged = logged,
            Err(err) => error!("Unable to update intentions log of {}: {}", self.uid(), err),
        }
        status
    }

    /// Commits a top-level action holding a single record without a separate prepare.
    ///
    /// No intentions log is written. An action holding any other number of records runs both
    /// phases instead.
    pub fn one_phase_commit(
        &mut self,
        ctx: &RecordContext,
        maintain_heuristics: bool,
    ) -> ActionStatus {
        if self.pending.len() != 1 {
            return match self.prepare(ctx) {
                ActionStatus::Prepared => self.phase_two_commit(ctx, maintain_heuristics),
                status => status,
            };
        }
        let mut record = match self.pending.take().into_iter().next() {
            Some(record) => record,
            None => return self.status(),
        };

        self.set_status(ActionStatus::Committing);
        let outcome = record.one_phase_commit(ctx);
        let mut tally = OutcomeTally::new(Decision::Commit);
        tally.record(&outcome);

        let status = match outcome {
            FinishOutcome::Ok => ActionStatus::Committed,
            FinishOutcome::Error | FinishOutcome::NotPrepared => ActionStatus::Aborted,
            FinishOutcome::Heuristic(heuristic) => {
                warn!("Record {} reported heuristic {:?}", record.uid(), heuristic);
                if maintain_heuristics {
                    record.set_heuristic(heuristic);
                    self.heuristic.push(record);
                }
                tally
                    .heuristic()
                    .map(ActionStatus::from_heuristic)
                    .unwrap_or(ActionStatus::Committed)
            }
        };
        self.set_status(status);
        status
    }

    /// Runs the first phase of a sub-action.
    ///
    /// Nothing is written to the store; records only capture what they will need once the
    /// top-level action prepares. On `NotOk` every record is left pending for the caller to
    /// abort.
    pub fn nested_prepare(&mut self, ctx: &RecordContext) -> PrepareVote {
        self.set_status(ActionStatus::Preparing);

        let vote = self.pending.prepare(ctx, false);
        if vote != PrepareVote::NotOk {
            let pending = self.pending.take();
            self.prepared.append(pending);
            self.set_status(ActionStatus::Committed);
        }
        vote
    }

    /// Removes the records a committed sub-action hands to its parent.
    pub fn take_prepared(&mut self) -> RecordList {
        self.prepared.take()
    }

    /// Removes the records which move to the parent if this sub-action aborts.
    pub fn take_propagating(&mut self) -> RecordList {
        let mut propagating = self.pending.take_propagating();
        propagating.append(self.prepared.take_propagating());
        propagating
    }

    /// Aborts every prepared and pending record, in reverse list order.
    ///
    /// A top-level action removes its intentions log first, so that recovery never commits an
    /// action which has started to abort.
    pub fn abort_records(&mut self, ctx: &RecordContext, top_level: bool) -> ActionStatus {
        self.set_status(ActionStatus::Aborting);

        if top_level {
            if let Err(err) = self.remove_log(ctx.store) {
                error!("Unable to remove intentions log of {}: {}", self.uid(), err);
            }
        }

        let mut records = self.prepared.take();
        records.append(self.pending.take());
        let phase = records.finish_abort(ctx, top_level);
        let (status, failed) = self.absorb_phase(phase, true, ActionStatus::Aborted);
        if !failed.is_empty() {
            warn!(
                "{} records of action {} failed to abort",
                failed.len(),
                self.uid()
            );
        }
        self.set_status(status);
        status
    }

    /// Forgets heuristic records. Returns true once none are left.
    pub fn forget(&mut self, ctx: &RecordContext, registry: &ParticipantRegistry) -> bool {
        let forgotten = self.heuristic.forget();
        if let Err(err) = self.rewrite_heuristics(ctx.store, registry) {
            error!("Unable to update intentions log of {}: {}", self.uid(), err);
        }
        forgotten
    }

    // Keeps the heuristic records of a finished phase and hands back its status and failures.
    fn absorb_phase(
        &mut self,
        phase: PhaseOutcome,
        maintain_heuristics: bool,
        decided: ActionStatus,
    ) -> (ActionStatus, RecordList) {
        let status = phase
            .tally()
            .heuristic()
            .map(ActionStatus::from_heuristic)
            .unwrap_or(decided);

        let PhaseOutcome {
            failed, heuristic, ..
        } = phase;
        if maintain_heuristics {
            self.heuristic.append(heuristic);
        } else if !heuristic.is_empty() {
            info!(
                "Discarding {} heuristic records of action {}",
                heuristic.len(),
                self.uid()
            );
        }
        (status, failed)
    }
}
