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

/// The kind of an [`AbstractRecord`](super::AbstractRecord).
///
/// The kind decides how a record takes part in the merge policy and which store path it is
/// filed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// A durable external participant.
    Resource,
    /// An external participant whose work need not survive a crash.
    Volatile,
    /// The surviving records of a committed sub-action.
    Nested,
    /// A live state-managed object modified within the action.
    Persistence,
    /// A state-managed object destroyed within the action.
    Cadaver,
    /// An object state found in the store with no live record to drive it.
    Recovery,
}

impl RecordType {
    pub fn code(&self) -> i32 {
        match self {
            RecordType::Resource => 1,
            RecordType::Volatile => 2,
            RecordType::Nested => 3,
            RecordType::Persistence => 4,
            RecordType::Cadaver => 5,
            RecordType::Recovery => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(RecordType::Resource),
            2 => Some(RecordType::Volatile),
            3 => Some(RecordType::Nested),
            4 => Some(RecordType::Persistence),
            5 => Some(RecordType::Cadaver),
            6 => Some(RecordType::Recovery),
            _ => None,
        }
    }

    pub fn type_path(&self) -> &'static str {
        match self {
            RecordType::Resource => "/StateManager/AbstractRecord/ResourceRecord",
            RecordType::Volatile => "/StateManager/AbstractRecord/VolatileRecord",
            RecordType::Nested => "/StateManager/AbstractRecord/NestedRecord",
            RecordType::Persistence => "/StateManager/AbstractRecord/PersistenceRecord",
            RecordType::Cadaver => "/StateManager/AbstractRecord/CadaverRecord",
            RecordType::Recovery => "/StateManager/AbstractRecord/RecoveryRecord",
        }
    }

    /// Persistence, cadaver and recovery records carry object state.
    pub fn carries_state(&self) -> bool {
        matches!(
            self,
            RecordType::Persistence | RecordType::Cadaver | RecordType::Recovery
        )
    }

    /// Persistence and recovery records may be merged into a record already holding state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RecordType::Persistence | RecordType::Recovery)
    }

    /// Records of this kind move to the parent when a sub-action aborts.
    pub fn propagates_on_abort(&self) -> bool {
        matches!(self, RecordType::Cadaver)
    }

    /// Volatile records are never written to an intentions log.
    pub fn is_durable(&self) -> bool {
        !matches!(self, RecordType::Volatile)
    }
}
