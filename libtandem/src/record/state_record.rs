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

use crate::error::CodecError;
use crate::state::{capture_state, InputObjectState, OutputObjectState, StateHeader, StateManaged};
use crate::uid::Uid;

use super::{FinishOutcome, PrepareVote, RecordContext, RecordType};

/// A state-managed object shared between the application and the records tracking it.
pub type SharedObject = Arc<Mutex<dyn StateManaged>>;

/// The state carried by persistence, cadaver and recovery records.
///
/// `prior_state` is the object's image when it joined the action and is what an abort restores.
/// `new_state` is the image captured at prepare time. Both are unwrapped bodies; the state header
/// is only added when a body is written to the store.
pub struct StateRecord {
    type_name: String,
    object: Option<SharedObject>,
    prior_state: Option<OutputObjectState>,
    new_state: Option<OutputObjectState>,
}

impl StateRecord {
    /// Tracks `object`, optionally capturing its current image as the prior state.
    pub(super) fn attach(
        object: SharedObject,
        capture_prior: bool,
    ) -> Result<(Uid, StateRecord), CodecError> {
        let (uid, type_name, prior_state) = {
            let guard = object.lock();
            let prior = if capture_prior {
                Some(capture_state(&*guard)?)
            } else {
                None
            };
            (guard.uid(), guard.type_name(), prior)
        };

        Ok((
            uid,
            StateRecord {
                type_name,
                object: Some(object),
                prior_state,
                new_state: None,
            },
        ))
    }

    /// A record for a stored state with no object in memory.
    pub(super) fn detached(type_name: String) -> StateRecord {
        StateRecord {
            type_name,
            object: None,
            prior_state: None,
            new_state: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn prior_state(&self) -> Option<&OutputObjectState> {
        self.prior_state.as_ref()
    }

    pub fn new_state(&self) -> Option<&OutputObjectState> {
        self.new_state.as_ref()
    }

    /// Takes over the prior state of `other` when this record has neither a prior nor a new state
    /// of its own.
    pub(super) fn absorb(&mut self, other: StateRecord) {
        if self.new_state.is_none() && self.prior_state.is_none() {
            if let Some(prior) = other.prior_state {
                self.prior_state = Some(prior);
            }
        }
        if self.object.is_none() {
            self.object = other.object;
        }
    }

    pub(super) fn prepare(
        &mut self,
        ctx: &RecordContext,
        uid: &Uid,
        owner: &Uid,
        kind: RecordType,
        top_level: bool,
    ) -> PrepareVote {
        if kind == RecordType::Recovery {
            return PrepareVote::Ok;
        }

        if let Err(err) = self.capture_new_state() {
            warn!("Unable to capture state of {} ({}): {}", uid, self.type_name, err);
            return PrepareVote::NotOk;
        }

        if kind == RecordType::Cadaver {
            return PrepareVote::Ok;
        }

        let new_state = match &self.new_state {
            Some(new_state) => new_state,
            None => {
                warn!("Persistence record {} has no object to prepare", uid);
                return PrepareVote::NotOk;
            }
        };
        if let Some(prior) = &self.prior_state {
            if prior.buffer() == new_state.buffer() {
                return PrepareVote::ReadOnly;
            }
        }
        if !top_level {
            return PrepareVote::Ok;
        }

        let written = StateHeader::new(*owner, ctx.process)
            .wrap(new_state)
            .map_err(|err| err.to_string())
            .and_then(|wrapped| {
                ctx.store
                    .write_uncommitted(uid, &self.type_name, &wrapped)
                    .map_err(|err| err.to_string())
            });
        match written {
            Ok(()) => PrepareVote::Ok,
            Err(err) => {
                error!("Unable to write shadow state of {}: {}", uid, err);
                PrepareVote::NotOk
            }
        }
    }

    pub(super) fn commit(
        &mut self,
        ctx: &RecordContext,
        uid: &Uid,
        kind: RecordType,
        top_level: bool,
    ) -> FinishOutcome {
        if !top_level {
            return FinishOutcome::Ok;
        }

        let result = match kind {
            RecordType::Cadaver => ctx
                .store
                .remove_committed(uid, &self.type_name)
                .and_then(|_| ctx.store.remove_uncommitted(uid, &self.type_name)),
            _ => ctx.store.commit_state(uid, &self.type_name),
        };

        match result {
            Ok(true) => FinishOutcome::Ok,
            Ok(false) => {
                debug!("Nothing to commit for {} ({})", uid, self.type_name);
                FinishOutcome::Ok
            }
            Err(err) => {
                error!("Unable to commit state of {}: {}", uid, err);
                FinishOutcome::Error
            }
        }
    }

    pub(super) fn abort(
        &mut self,
        ctx: &RecordContext,
        uid: &Uid,
        top_level: bool,
    ) -> FinishOutcome {
        let mut outcome = FinishOutcome::Ok;
        if top_level {
            if let Err(err) = ctx.store.remove_uncommitted(uid, &self.type_name) {
                error!("Unable to remove shadow state of {}: {}", uid, err);
                outcome = FinishOutcome::Error;
            }
        }

        self.new_state = None;
        if let Err(err) = self.restore_prior() {
            warn!("Unable to restore prior state of {}: {}", uid, err);
        }
        outcome
    }

    /// Writes the new state straight to the committed slot.
    pub(super) fn one_phase_commit(
        &mut self,
        ctx: &RecordContext,
        uid: &Uid,
        owner: &Uid,
        kind: RecordType,
    ) -> FinishOutcome {
        if kind != RecordType::Persistence {
            return self.commit(ctx, uid, kind, true);
        }

        if let Err(err) = self.capture_new_state() {
            warn!("Unable to capture state of {} ({}): {}", uid, self.type_name, err);
            return rolled_back(self.abort(ctx, uid, false));
        }
        let new_state = match &self.new_state {
            Some(new_state) => new_state,
            None => return FinishOutcome::Error,
        };

        let written = StateHeader::new(*owner, ctx.process)
            .wrap(new_state)
            .map_err(|err| err.to_string())
            .and_then(|wrapped| {
                ctx.store
                    .write_committed(uid, &self.type_name, &wrapped)
                    .map_err(|err| err.to_string())
            });
        match written {
            Ok(()) => FinishOutcome::Ok,
            Err(err) => {
                error!("Unable to write state of {}: {}", uid, err);
                rolled_back(self.abort(ctx, uid, false))
            }
        }
    }

    pub(super) fn save_state(&self, state: &mut OutputObjectState) -> Result<(), CodecError> {
        state.pack_string(Some(&self.type_name))?;
        for image in [&self.prior_state, &self.new_state] {
            state.pack_bool(image.is_some());
            if let Some(image) = image {
                state.pack_state(image)?;
            }
        }
        Ok(())
    }

    pub(super) fn restore(state: &mut InputObjectState) -> Result<StateRecord, CodecError> {
        let type_name = state
            .unpack_string()?
            .ok_or_else(|| CodecError::InvalidValue("missing record type name".into()))?;
        let prior_state = if state.unpack_bool()? {
            Some(state.unpack_state()?.into_output())
        } else {
            None
        };
        let new_state = if state.unpack_bool()? {
            Some(state.unpack_state()?.into_output())
        } else {
            None
        };

        Ok(StateRecord {
            type_name,
            object: None,
            prior_state,
            new_state,
        })
    }

    fn capture_new_state(&mut self) -> Result<(), CodecError> {
        if let Some(object) = &self.object {
            let image = capture_state(&*object.lock())?;
            self.new_state = Some(image);
        }
        Ok(())
    }

    fn restore_prior(&self) -> Result<(), CodecError> {
        if let (Some(object), Some(prior)) = (&self.object, &self.prior_state) {
            let mut image = InputObjectState::from(prior);
            object.lock().restore_state(&mut image)?;
        }
        Ok(())
    }
}

// A rollback performed while committing is reported as an error.
fn rolled_back(outcome: FinishOutcome) -> FinishOutcome {
    match outcome {
        FinishOutcome::Ok => FinishOutcome::Error,
        other => other,
    }
}
