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

/// A participant's vote in the first phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrepareVote {
    /// The participant is prepared and must be told the outcome.
    Ok,
    /// The participant cannot prepare; the action must abort.
    NotOk,
    /// The participant made no changes and takes no part in the second phase.
    ReadOnly,
}

/// A decision made unilaterally by a participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeuristicOutcome {
    Rollback,
    Commit,
    /// Some of the participant's work committed and some rolled back.
    Mixed,
    /// The participant cannot tell what happened to its work.
    Hazard,
}

impl HeuristicOutcome {
    pub fn code(&self) -> i32 {
        match self {
            HeuristicOutcome::Rollback => 0,
            HeuristicOutcome::Commit => 1,
            HeuristicOutcome::Mixed => 2,
            HeuristicOutcome::Hazard => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(HeuristicOutcome::Rollback),
            1 => Some(HeuristicOutcome::Commit),
            2 => Some(HeuristicOutcome::Mixed),
            3 => Some(HeuristicOutcome::Hazard),
            _ => None,
        }
    }
}

/// The result of asking a participant to commit or abort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishOutcome {
    Ok,
    /// The participant failed and should be asked again later.
    Error,
    /// The participant was never prepared.
    NotPrepared,
    Heuristic(HeuristicOutcome),
}

/// The direction of a decision made by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Commit,
    Rollback,
}

impl Decision {
    fn heuristic(&self) -> HeuristicOutcome {
        match self {
            Decision::Commit => HeuristicOutcome::Commit,
            Decision::Rollback => HeuristicOutcome::Rollback,
        }
    }

    fn opposite(&self) -> HeuristicOutcome {
        match self {
            Decision::Commit => HeuristicOutcome::Rollback,
            Decision::Rollback => HeuristicOutcome::Commit,
        }
    }
}

/// Aggregates the results of the second phase into a single heuristic outcome.
///
/// Each result either followed the decision, went the other way, or was mixed or hazardous.
/// Failures which will be retried count as neither.
#[derive(Debug)]
pub struct OutcomeTally {
    decision: Decision,
    followed: usize,
    other_way: usize,
    mixed: bool,
    hazard: bool,
}

impl OutcomeTally {
    pub fn new(decision: Decision) -> Self {
        OutcomeTally {
            decision,
            followed: 0,
            other_way: 0,
            mixed: false,
            hazard: false,
        }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn record(&mut self, outcome: &FinishOutcome) {
        match outcome {
            FinishOutcome::Ok => self.followed += 1,
            FinishOutcome::Error | FinishOutcome::NotPrepared => (),
            FinishOutcome::Heuristic(HeuristicOutcome::Mixed) => self.mixed = true,
            FinishOutcome::Heuristic(HeuristicOutcome::Hazard) => self.hazard = true,
            FinishOutcome::Heuristic(h) if *h == self.decision.heuristic() => self.followed += 1,
            FinishOutcome::Heuristic(_) => self.other_way += 1,
        }
    }

    /// Returns the heuristic outcome of the whole action, or `None` if the decision stands.
    pub fn heuristic(&self) -> Option<HeuristicOutcome> {
        if self.mixed || (self.followed > 0 && self.other_way > 0) {
            Some(HeuristicOutcome::Mixed)
        } else if self.hazard {
            Some(HeuristicOutcome::Hazard)
        } else if self.other_way > 0 {
            Some(self.decision.opposite())
        } else {
            None
        }
    }
}
