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

//! Crash recovery.
//!
//! A [`RecoveryManager`] periodically scans the store for work left behind by actions which did
//! not finish: intentions logs whose second phase never completed, and uncommitted object states
//! whose owner never decided. Before acting on anything it asks the owning action's process,
//! through that process's liveness service, whether the action is still in progress.

mod action_module;
mod connection;
mod contact;
mod expiry;
mod liveness;
mod manager;
mod module;
mod periodic;
mod service;
mod state_module;
mod status;
mod worker;

pub use action_module::ActionRecoveryModule;
pub use connection::ConnectionManager;
pub use contact::{ContactRecord, CONTACT_TYPE};
pub use expiry::{ContactExpiryScanner, ExpiryScanner};
pub use liveness::LivenessServer;
pub use manager::RecoveryManager;
pub use module::RecoveryModule;
pub use periodic::{PeriodicScanner, ScanControl};
pub use service::ServiceHandle;
pub use state_module::ObjectStateRecoveryModule;
pub use status::{OwnerStatus, StatusChecker};
pub use worker::RecoveryDriver;
