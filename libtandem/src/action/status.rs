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

use crate::record::HeuristicOutcome;

/// The state of an action.
///
/// Codes are stable: they are exchanged by the liveness protocol and written to intentions logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionStatus {
    Running,
    Preparing,
    Aborting,
    Aborted,
    Prepared,
    Committing,
    Committed,
    HeuristicRollback,
    HeuristicCommit,
    HeuristicMixed,
    HeuristicHazard,
}

impl ActionStatus {
    pub fn code(&self) -> i32 {
        match self {
            ActionStatus::Running => 0,
            ActionStatus::Preparing => 1,
            ActionStatus::Aborting => 2,
            ActionStatus::Aborted => 4,
            ActionStatus::Prepared => 5,
            ActionStatus::Committing => 6,
            ActionStatus::Committed => 7,
            ActionStatus::HeuristicRollback => 11,
            ActionStatus::HeuristicCommit => 12,
            ActionStatus::HeuristicMixed => 13,
            ActionStatus::HeuristicHazard => 14,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ActionStatus::Running),
            1 => Some(ActionStatus::Preparing),
            2 => Some(ActionStatus::Aborting),
            4 => Some(ActionStatus::Aborted),
            5 => Some(ActionStatus::Prepared),
            6 => Some(ActionStatus::Committing),
            7 => Some(ActionStatus::Committed),
            11 => Some(ActionStatus::HeuristicRollback),
            12 => Some(ActionStatus::HeuristicCommit),
            13 => Some(ActionStatus::HeuristicMixed),
            14 => Some(ActionStatus::HeuristicHazard),
            _ => None,
        }
    }

    pub fn from_heuristic(heuristic: HeuristicOutcome) -> Self {
        match heuristic {
            HeuristicOutcome::Rollback => ActionStatus::HeuristicRollback,
            HeuristicOutcome::Commit => ActionStatus::HeuristicCommit,
            HeuristicOutcome::Mixed => ActionStatus::HeuristicMixed,
            HeuristicOutcome::Hazard => ActionStatus::HeuristicHazard,
        }
    }

    /// Returns true while the action's outcome is still being decided or carried out.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ActionStatus::Running
                | ActionStatus::Preparing
                | ActionStatus::Prepared
                | ActionStatus::Committing
                | ActionStatus::Aborting
        )
    }

    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            ActionStatus::HeuristicRollback
                | ActionStatus::HeuristicCommit
                | ActionStatus::HeuristicMixed
                | ActionStatus::HeuristicHazard
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ActionStatus::Running => "running",
            ActionStatus::Preparing => "preparing",
            ActionStatus::Aborting => "aborting",
            ActionStatus::Aborted => "aborted",
            ActionStatus::Prepared => "prepared",
            ActionStatus::Committing => "committing",
            ActionStatus::Committed => "committed",
            ActionStatus::HeuristicRollback => "heuristic rollback",
            ActionStatus::HeuristicCommit => "heuristic commit",
            ActionStatus::HeuristicMixed => "heuristic mixed",
            ActionStatus::HeuristicHazard => "heuristic hazard",
        };
        f.write_str(name)
    }
}
