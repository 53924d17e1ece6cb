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

use std::mem;

use crate::error::CodecError;
use crate::state::{InputObjectState, OutputObjectState};
use crate::uid::Uid;

use super::{
    AbstractRecord, Decision, FinishOutcome, OutcomeTally, ParticipantRegistry, PrepareVote,
    RecordContext,
};

/// What [`RecordList::insert`] did with a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// No record with the same identity was present.
    Added,
    /// The existing record absorbed the incoming one.
    Merged,
    /// The incoming record absorbed the existing one and took its place.
    Replaced,
    /// The existing record was kept and the incoming one dropped.
    Duplicate,
}

/// Returns true if `incoming` should be folded into `existing`.
///
/// A second record of the same kind never merges; the first one keeps the image the object had
/// when it joined the action.
pub fn should_merge(existing: &AbstractRecord, incoming: &AbstractRecord) -> bool {
    existing.uid() == incoming.uid()
        && existing.record_type() != incoming.record_type()
        && existing.record_type().carries_state()
        && incoming.record_type().is_recoverable()
}

/// Returns true if `incoming` should take the place of `existing`.
pub fn should_replace(existing: &AbstractRecord, incoming: &AbstractRecord) -> bool {
    existing.uid() == incoming.uid()
        && existing.record_type().is_recoverable()
        && incoming.propagates_on_abort()
}

/// The result of running the second phase over a record list.
pub struct PhaseOutcome {
    tally: OutcomeTally,
    /// Records which failed and should be retried.
    pub failed: RecordList,
    /// Records which made a heuristic decision.
    pub heuristic: RecordList,
}

impl PhaseOutcome {
    pub fn tally(&self) -> &OutcomeTally {
        &self.tally
    }

    /// Collapses the phase into the outcome of a single record.
    pub fn outcome(&self) -> FinishOutcome {
        if let Some(heuristic) = self.tally.heuristic() {
            FinishOutcome::Heuristic(heuristic)
        } else if !self.failed.is_empty() {
            FinishOutcome::Error
        } else {
            FinishOutcome::Ok
        }
    }

    /// The failed records followed by the heuristic ones.
    pub fn into_retained(self) -> RecordList {
        let mut retained = self.failed;
        retained.append(self.heuristic);
        retained
    }
}

/// An ordered list of records in which each identity appears at most once.
///
/// Insertion order is prepare order. Commit visits records in list order and abort visits them in
/// reverse.
#[derive(Default)]
pub struct RecordList {
    records: Vec<AbstractRecord>,
}

impl RecordList {
    pub fn new() -> Self {
        RecordList::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AbstractRecord> {
        self.records.iter()
    }

    pub fn find(&self, uid: &Uid) -> Option<&AbstractRecord> {
        self.records.iter().find(|record| record.uid() == uid)
    }

    /// Returns true if any record must be written to an intentions log.
    pub fn has_durable(&self) -> bool {
        self.records.iter().any(AbstractRecord::is_durable)
    }

    /// Adds `record`, applying the merge policy against a record with the same identity.
    pub fn insert(&mut self, record: AbstractRecord) -> InsertOutcome {
        let index = match self.records.iter().position(|r| r.uid() == record.uid()) {
            Some(index) => index,
            None => {
                self.records.push(record);
                return InsertOutcome::Added;
            }
        };

        if should_replace(&self.records[index], &record) {
            let existing = mem::replace(&mut self.records[index], record);
            match self.records[index].merge(existing) {
                Ok(()) => InsertOutcome::Replaced,
                Err(existing) => {
                    warn!(
                        "Unable to replace record {}; keeping {:?}",
                        existing.uid(),
                        existing.record_type()
                    );
                    self.records[index] = existing;
                    InsertOutcome::Duplicate
                }
            }
        } else if should_merge(&self.records[index], &record) {
            match self.records[index].merge(record) {
                Ok(()) => InsertOutcome::Merged,
                Err(incoming) => {
                    warn!(
                        "Unable to merge record {} ({:?}); keeping existing record",
                        incoming.uid(),
                        incoming.record_type()
                    );
                    InsertOutcome::Duplicate
                }
            }
        } else {
            debug!(
                "Dropping {:?} record {}; already tracked by {:?}",
                record.record_type(),
                record.uid(),
                self.records[index].record_type()
            );
            InsertOutcome::Duplicate
        }
    }

    /// Appends `record` without applying the merge policy.
    pub fn push(&mut self, record: AbstractRecord) {
        self.records.push(record);
    }

    /// Appends every record of `other`, in order, without applying the merge policy.
    pub fn append(&mut self, mut other: RecordList) {
        self.records.append(&mut other.records);
    }

    /// Removes and returns every record.
    pub fn take(&mut self) -> RecordList {
        mem::take(self)
    }

    pub fn set_owner(&mut self, owner: Uid) {
        for record in &mut self.records {
            record.set_owner(owner);
        }
    }

    /// Removes the records which move to the parent when a sub-action aborts.
    pub fn take_propagating(&mut self) -> RecordList {
        let (propagating, kept) = mem::take(&mut self.records)
            .into_iter()
            .partition(AbstractRecord::propagates_on_abort);
        self.records = kept;
        RecordList {
            records: propagating,
        }
    }

    /// Runs the first phase.
    ///
    /// Read-only records are dropped. On a `NotOk` vote preparation stops and every record,
    /// prepared or not, stays in the list so that the caller can abort them.
    pub fn prepare(&mut self, ctx: &RecordContext, top_level: bool) -> PrepareVote {
        let mut vote = PrepareVote::ReadOnly;
        let mut kept = Vec::with_capacity(self.records.len());
        let mut pending = mem::take(&mut self.records).into_iter();

        while let Some(mut record) = pending.next() {
            match record.prepare(ctx, top_level) {
                PrepareVote::Ok => {
                    kept.push(record);
                    vote = PrepareVote::Ok;
                }
                PrepareVote::ReadOnly => {
                    debug!("Record {} is read only", record.uid());
                }
                PrepareVote::NotOk => {
                    debug!("Record {} voted to abort", record.uid());
                    kept.push(record);
                    kept.extend(pending);
                    self.records = kept;
                    return PrepareVote::NotOk;
                }
            }
        }

        self.records = kept;
        vote
    }

    /// Commits every record, in list order, leaving the list empty.
    pub fn finish_commit(&mut self, ctx: &RecordContext, top_level: bool) -> PhaseOutcome {
        let records = mem::take(&mut self.records);
        finish(records.into_iter(), ctx, Decision::Commit, top_level)
    }

    /// Aborts every record, in reverse list order, leaving the list empty.
    pub fn finish_abort(&mut self, ctx: &RecordContext, top_level: bool) -> PhaseOutcome {
        let records = mem::take(&mut self.records);
        finish(records.into_iter().rev(), ctx, Decision::Rollback, top_level)
    }

    /// Forgets heuristic decisions, dropping every heuristic record which agreed to forget.
    ///
    /// Returns true if the list is empty afterwards.
    pub fn forget(&mut self) -> bool {
        self.records
            .retain_mut(|record| record.heuristic().is_none() || !record.forget());
        self.records.is_empty()
    }

    /// Packs the durable records, preceded by their count.
    pub fn save_state(&self, state: &mut OutputObjectState) -> Result<(), CodecError> {
        let durable: Vec<&AbstractRecord> = self
            .records
            .iter()
            .filter(|record| record.is_durable())
            .collect();

        let count = i32::try_from(durable.len()).map_err(|_| CodecError::TooLarge(durable.len()))?;
        state.pack_int(count);
        for record in durable {
            record.save_state(state)?;
        }
        Ok(())
    }

    pub fn restore_state(
        state: &mut InputObjectState,
        registry: &ParticipantRegistry,
    ) -> Result<RecordList, CodecError> {
        let count = state.unpack_int()?;
        if count < 0 {
            return Err(CodecError::InvalidValue(format!(
                "negative record count {}",
                count
            )));
        }

        let mut records = Vec::new();
        for _ in 0..count {
            records.push(AbstractRecord::restore(state, registry)?);
        }
        Ok(RecordList { records })
    }
}

impl IntoIterator for RecordList {
    type Item = AbstractRecord;
    type IntoIter = std::vec::IntoIter<AbstractRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

fn finish<I>(records: I, ctx: &RecordContext, decision: Decision, top_level: bool) -> PhaseOutcome
where
    I: Iterator<Item = AbstractRecord>,
{
    let mut phase = PhaseOutcome {
        tally: OutcomeTally::new(decision),
        failed: RecordList::new(),
        heuristic: RecordList::new(),
    };

    for mut record in records {
        // Already reported; kept until forgotten.
        if record.heuristic().is_some() {
            phase.heuristic.push(record);
            continue;
        }

        let outcome = match decision {
            Decision::Commit => record.commit(ctx, top_level),
            Decision::Rollback => record.abort(ctx, top_level),
        };
        phase.tally.record(&outcome);

        match outcome {
            FinishOutcome::Ok => (),
            FinishOutcome::NotPrepared if decision == Decision::Rollback => (),
            FinishOutcome::Error | FinishOutcome::NotPrepared => {
                warn!(
                    "Record {} failed to {}; retaining it",
                    record.uid(),
                    match decision {
                        Decision::Commit => "commit",
                        Decision::Rollback => "abort",
                    }
                );
                phase.failed.push(record);
            }
            FinishOutcome::Heuristic(heuristic) => {
                warn!("Record {} reported heuristic {:?}", record.uid(), heuristic);
                record.set_heuristic(heuristic);
                phase.heuristic.push(record);
            }
        }
    }

    phase
}
