// Copyright 2021-2022 Cargill Incorporated
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

//! Tandem coordinates distributed transactions.
//!
//! Applications begin actions on a [`Coordinator`], enlist participants and state-managed objects
//! in them, and commit or abort them with the two-phase commit protocol. Sub-actions nest inside
//! top-level actions. Everything needed to finish a committed action is written to an
//! [`ObjectStore`](store::ObjectStore) before the commit decision is acted on, so that after a
//! crash a [`RecoveryManager`](recovery::RecoveryManager) can drive it to completion.

#[macro_use]
extern crate log;

pub mod action;
pub mod config;
mod context;
pub mod error;
mod process;
pub mod record;
#[cfg(feature = "recovery")]
pub mod recovery;
pub mod state;
pub mod store;
#[cfg(test)]
mod testing;
#[cfg(feature = "time")]
mod time;
mod uid;

pub use action::{ActionStatus, Coordinator};
pub use context::{CoordinatorContext, CoordinatorContextBuilder};
pub use process::ProcessId;
#[cfg(feature = "time")]
pub use time::{ManualTime, SystemTimeFactory, TimeSource};
pub use uid::Uid;
