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

use std::fmt;

use crate::error::CodecError;
use crate::process::ProcessId;
use crate::state::{InputObjectState, OutputObjectState};
use crate::store::ObjectStore;
use crate::uid::Uid;

use super::state_record::{SharedObject, StateRecord};
use super::{
    Decision, FinishOutcome, HeuristicOutcome, Participant, ParticipantRegistry, PrepareVote,
    RecordList, RecordType,
};

/// What a record needs from its surroundings while it runs.
pub struct RecordContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub process: ProcessId,
}

/// An external participant and the state it saved, if it could not be rebuilt.
pub struct ResourceRecord {
    participant: Option<Box<dyn Participant>>,
    type_name: String,
    saved: Option<InputObjectState>,
}

impl ResourceRecord {
    fn new(participant: Box<dyn Participant>) -> Self {
        ResourceRecord {
            type_name: participant.type_name(),
            participant: Some(participant),
            saved: None,
        }
    }

    fn prepare(&mut self, uid: &Uid, top_level: bool) -> PrepareVote {
        if !top_level {
            return PrepareVote::Ok;
        }
        match self.participant.as_mut() {
            Some(participant) => participant.prepare(),
            None => {
                warn!("Participant {} ({}) cannot be prepared", uid, self.type_name);
                PrepareVote::NotOk
            }
        }
    }

    fn call<F>(&mut self, uid: &Uid, op: F) -> FinishOutcome
    where
        F: FnOnce(&mut Box<dyn Participant>) -> FinishOutcome,
    {
        match self.participant.as_mut() {
            Some(participant) => op(participant),
            None => {
                warn!(
                    "No participant factory registered for {}; {} left for a later attempt",
                    self.type_name, uid
                );
                FinishOutcome::Error
            }
        }
    }

    fn save_state(&self, uid: &Uid, state: &mut OutputObjectState) -> Result<(), CodecError> {
        state.pack_string(Some(&self.type_name))?;
        let body = match (&self.participant, &self.saved) {
            (Some(participant), _) => {
                let mut body = OutputObjectState::new(*uid, self.type_name.clone());
                participant.save_state(&mut body)?;
                body
            }
            (None, Some(saved)) => saved.copy().into_output(),
            (None, None) => OutputObjectState::new(*uid, self.type_name.clone()),
        };
        state.pack_state(&body)
    }

    fn restore(
        state: &mut InputObjectState,
        registry: &ParticipantRegistry,
    ) -> Result<ResourceRecord, CodecError> {
        let type_name = state
            .unpack_string()?
            .ok_or_else(|| CodecError::InvalidValue("missing participant type name".into()))?;
        let body = state.unpack_state()?;

        match registry.restore(&type_name, &mut body.copy())? {
            Some(participant) => Ok(ResourceRecord {
                participant: Some(participant),
                type_name,
                saved: None,
            }),
            None => Ok(ResourceRecord {
                participant: None,
                type_name,
                saved: Some(body),
            }),
        }
    }
}

/// The records a committed sub-action handed to its parent.
pub struct NestedRecord {
    records: RecordList,
}

impl NestedRecord {
    pub fn records(&self) -> &RecordList {
        &self.records
    }

    // Runs the second phase over the inner records, keeping those which failed or went
    // heuristic.
    fn finish(
        &mut self,
        ctx: &RecordContext,
        decision: Decision,
        top_level: bool,
    ) -> FinishOutcome {
        let phase = match decision {
            Decision::Commit => self.records.finish_commit(ctx, top_level),
            Decision::Rollback => self.records.finish_abort(ctx, top_level),
        };
        let outcome = phase.outcome();
        self.records = phase.into_retained();
        outcome
    }
}

enum RecordKind {
    Resource(ResourceRecord),
    Volatile(ResourceRecord),
    Nested(NestedRecord),
    Persistence(StateRecord),
    Cadaver(StateRecord),
    Recovery(StateRecord),
}

/// One entry of an action's record list.
///
/// The record's identity is the Uid of whatever it tracks: the object for state records, the
/// sub-action for nested records and an enlistment Uid for external participants.
pub struct AbstractRecord {
    uid: Uid,
    owner: Uid,
    kind: RecordKind,
    heuristic: Option<HeuristicOutcome>,
}

impl AbstractRecord {
    pub fn resource(uid: Uid, owner: Uid, participant: Box<dyn Participant>) -> Self {
        AbstractRecord::with_kind(
            uid,
            owner,
            RecordKind::Resource(ResourceRecord::new(participant)),
        )
    }

    pub fn volatile(uid: Uid, owner: Uid, participant: Box<dyn Participant>) -> Self {
        AbstractRecord::with_kind(
            uid,
            owner,
            RecordKind::Volatile(ResourceRecord::new(participant)),
        )
    }

    /// Tracks a live object, capturing its current state so that an abort can restore it.
    pub fn persistence(owner: Uid, object: SharedObject) -> Result<Self, CodecError> {
        let (uid, record) = StateRecord::attach(object, true)?;
        Ok(AbstractRecord::with_kind(
            uid,
            owner,
            RecordKind::Persistence(record),
        ))
    }

    /// Tracks an object which is destroyed if the action commits.
    pub fn cadaver(owner: Uid, object: SharedObject) -> Result<Self, CodecError> {
        let (uid, record) = StateRecord::attach(object, false)?;
        Ok(AbstractRecord::with_kind(uid, owner, RecordKind::Cadaver(record)))
    }

    /// Drives an uncommitted state found in the store to completion.
    pub fn recovery(uid: Uid, owner: Uid, type_name: &str) -> Self {
        AbstractRecord::with_kind(
            uid,
            owner,
            RecordKind::Recovery(StateRecord::detached(type_name.to_string())),
        )
    }

    /// Wraps the records of a committed sub-action so its parent can complete them. The records
    /// are re-owned by the parent, whose outcome now decides theirs.
    pub fn nested(owner: Uid, child: Uid, mut records: RecordList) -> Self {
        records.set_owner(owner);
        AbstractRecord::with_kind(child, owner, RecordKind::Nested(NestedRecord { records }))
    }

    fn with_kind(uid: Uid, owner: Uid, kind: RecordKind) -> Self {
        AbstractRecord {
            uid,
            owner,
            kind,
            heuristic: None,
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn owner(&self) -> &Uid {
        &self.owner
    }

    pub fn set_owner(&mut self, owner: Uid) {
        self.owner = owner;
        if let RecordKind::Nested(nested) = &mut self.kind {
            nested.records.set_owner(owner);
        }
    }

    pub fn heuristic(&self) -> Option<HeuristicOutcome> {
        self.heuristic
    }

    pub(crate) fn set_heuristic(&mut self, heuristic: HeuristicOutcome) {
        self.heuristic = Some(heuristic);
    }

    pub fn record_type(&self) -> RecordType {
        match &self.kind {
            RecordKind::Resource(_) => RecordType::Resource,
            RecordKind::Volatile(_) => RecordType::Volatile,
            RecordKind::Nested(_) => RecordType::Nested,
            RecordKind::Persistence(_) => RecordType::Persistence,
            RecordKind::Cadaver(_) => RecordType::Cadaver,
            RecordKind::Recovery(_) => RecordType::Recovery,
        }
    }

    /// The state carried by persistence, cadaver and recovery records.
    pub fn state(&self) -> Option<&StateRecord> {
        match &self.kind {
            RecordKind::Persistence(record)
            | RecordKind::Cadaver(record)
            | RecordKind::Recovery(record) => Some(record),
            _ => None,
        }
    }

    pub fn nested_records(&self) -> Option<&RecordList> {
        match &self.kind {
            RecordKind::Nested(nested) => Some(nested.records()),
            _ => None,
        }
    }

    /// Returns true if the record must be written to an intentions log.
    pub fn is_durable(&self) -> bool {
        match &self.kind {
            RecordKind::Nested(nested) => nested.records.has_durable(),
            _ => self.record_type().is_durable(),
        }
    }

    pub fn propagates_on_abort(&self) -> bool {
        self.record_type().propagates_on_abort()
    }

    /// Folds `other` into this record.
    ///
    /// Only records carrying state can be merged. On failure `other` is handed back untouched.
    pub fn merge(&mut self, other: AbstractRecord) -> Result<(), AbstractRecord> {
        let survivor = match &mut self.kind {
            RecordKind::Persistence(record)
            | RecordKind::Cadaver(record)
            | RecordKind::Recovery(record) => record,
            _ => return Err(other),
        };

        match other.kind {
            RecordKind::Persistence(absorbed)
            | RecordKind::Cadaver(absorbed)
            | RecordKind::Recovery(absorbed) => {
                survivor.absorb(absorbed);
                Ok(())
            }
            kind => Err(AbstractRecord {
                uid: other.uid,
                owner: other.owner,
                kind,
                heuristic: other.heuristic,
            }),
        }
    }

    pub fn prepare(&mut self, ctx: &RecordContext, top_level: bool) -> PrepareVote {
        let record_type = self.record_type();
        match &mut self.kind {
            RecordKind::Resource(record) | RecordKind::Volatile(record) => {
                record.prepare(&self.uid, top_level)
            }
            RecordKind::Nested(nested) => match nested.records.prepare(ctx, top_level) {
                PrepareVote::NotOk => {
                    nested.finish(ctx, Decision::Rollback, top_level);
                    PrepareVote::NotOk
                }
                vote => vote,
            },
            RecordKind::Persistence(record)
            | RecordKind::Cadaver(record)
            | RecordKind::Recovery(record) => {
                record.prepare(ctx, &self.uid, &self.owner, record_type, top_level)
            }
        }
    }

    pub fn commit(&mut self, ctx: &RecordContext, top_level: bool) -> FinishOutcome {
        let record_type = self.record_type();
        match &mut self.kind {
            RecordKind::Resource(record) | RecordKind::Volatile(record) => {
                if !top_level {
                    return FinishOutcome::Ok;
                }
                record.call(&self.uid, |participant| participant.commit())
            }
            RecordKind::Nested(nested) => nested.finish(ctx, Decision::Commit, top_level),
            RecordKind::Persistence(record)
            | RecordKind::Cadaver(record)
            | RecordKind::Recovery(record) => record.commit(ctx, &self.uid, record_type, top_level),
        }
    }

    pub fn abort(&mut self, ctx: &RecordContext, top_level: bool) -> FinishOutcome {
        match &mut self.kind {
            RecordKind::Resource(record) | RecordKind::Volatile(record) => {
                record.call(&self.uid, |participant| participant.abort())
            }
            RecordKind::Nested(nested) => nested.finish(ctx, Decision::Rollback, top_level),
            RecordKind::Persistence(record)
            | RecordKind::Cadaver(record)
            | RecordKind::Recovery(record) => record.abort(ctx, &self.uid, top_level),
        }
    }

    /// Prepares and commits a record which is alone in a top-level action.
    pub fn one_phase_commit(&mut self, ctx: &RecordContext) -> FinishOutcome {
        let record_type = self.record_type();
        match &mut self.kind {
            RecordKind::Resource(record) | RecordKind::Volatile(record) => {
                record.call(&self.uid, |participant| participant.one_phase_commit())
            }
            RecordKind::Nested(nested) => match nested.records.prepare(ctx, true) {
                PrepareVote::Ok => nested.finish(ctx, Decision::Commit, true),
                PrepareVote::ReadOnly => FinishOutcome::Ok,
                PrepareVote::NotOk => {
                    nested.finish(ctx, Decision::Rollback, true);
                    FinishOutcome::Error
                }
            },
            RecordKind::Persistence(record)
            | RecordKind::Cadaver(record)
            | RecordKind::Recovery(record) => {
                record.one_phase_commit(ctx, &self.uid, &self.owner, record_type)
            }
        }
    }

    /// Discards the record's heuristic decision. Returns false if it must be kept.
    pub fn forget(&mut self) -> bool {
        let forgotten = match &mut self.kind {
            RecordKind::Resource(record) | RecordKind::Volatile(record) => {
                match record.participant.as_mut() {
                    Some(participant) => participant.forget(),
                    None => false,
                }
            }
            RecordKind::Nested(nested) => nested.records.forget(),
            _ => true,
        };
        if forgotten {
            self.heuristic = None;
        }
        forgotten
    }

    pub fn save_state(&self, state: &mut OutputObjectState) -> Result<(), CodecError> {
        state.pack_int(self.record_type().code());
        state.pack_uid(&self.uid);
        state.pack_uid(&self.owner);
        state.pack_int(self.heuristic.map(|h| h.code()).unwrap_or(-1));

        match &self.kind {
            RecordKind::Resource(record) | RecordKind::Volatile(record) => {
                record.save_state(&self.uid, state)
            }
            RecordKind::Nested(nested) => nested.records.save_state(state),
            RecordKind::Persistence(record)
            | RecordKind::Cadaver(record)
            | RecordKind::Recovery(record) => record.save_state(state),
        }
    }

    /// Rebuilds a record saved with [`save_state`](AbstractRecord::save_state).
    ///
    /// Persistence records come back as recovery records: the object they tracked no longer
    /// exists in memory, only its stored state does.
    pub fn restore(
        state: &mut InputObjectState,
        registry: &ParticipantRegistry,
    ) -> Result<AbstractRecord, CodecError> {
        let code = state.unpack_int()?;
        let record_type = RecordType::from_code(code)
            .ok_or_else(|| CodecError::InvalidValue(format!("unknown record type {}", code)))?;
        let uid = state.unpack_uid()?;
        let owner = state.unpack_uid()?;
        let heuristic = HeuristicOutcome::from_code(state.unpack_int()?);

        let kind = match record_type {
            RecordType::Resource => RecordKind::Resource(ResourceRecord::restore(state, registry)?),
            RecordType::Volatile => RecordKind::Volatile(ResourceRecord::restore(state, registry)?),
            RecordType::Nested => RecordKind::Nested(NestedRecord {
                records: RecordList::restore_state(state, registry)?,
            }),
            RecordType::Persistence | RecordType::Recovery => {
                RecordKind::Recovery(StateRecord::restore(state)?)
            }
            RecordType::Cadaver => RecordKind::Cadaver(StateRecord::restore(state)?),
        };

        Ok(AbstractRecord {
            uid,
            owner,
            kind,
            heuristic,
        })
    }
}

impl fmt::Debug for AbstractRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AbstractRecord")
            .field("uid", &self.uid)
            .field("owner", &self.owner)
            .field("type", &self.record_type())
            .field("heuristic", &self.heuristic)
            .finish()
    }
}
