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

//! Records of the participants taking part in an action.
//!
//! An action does not call its participants directly. Each participant, live object or committed
//! sub-action is wrapped in an [`AbstractRecord`] whose kind decides how it prepares, commits,
//! aborts, merges with other records and is written to an intentions log. An action keeps its
//! records in [`RecordList`]s, which enforce the merge policy on insertion.

mod abstract_record;
mod kind;
mod outcome;
mod participant;
mod record_list;
mod state_record;

pub use abstract_record::{AbstractRecord, NestedRecord, RecordContext};
pub use kind::RecordType;
pub use outcome::{Decision, FinishOutcome, HeuristicOutcome, OutcomeTally, PrepareVote};
pub use participant::{Participant, ParticipantFactory, ParticipantRegistry};
pub use record_list::{should_merge, should_replace, InsertOutcome, PhaseOutcome, RecordList};
pub use state_record::{SharedObject, StateRecord};
