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

//! Errors returned by tandem.
//!
//! The general purpose errors `InternalError`, `InvalidArgumentError` and `InvalidStateError` come
//! from `errling`; the remaining errors are specific to a layer of the coordinator.

mod action;
mod codec;
#[cfg(feature = "recovery")]
mod recovery;
mod store;

pub use errling::{InternalError, InvalidArgumentError, InvalidStateError};

pub use action::ActionError;
pub use codec::CodecError;
#[cfg(feature = "recovery")]
pub use recovery::RecoveryError;
pub use store::StoreError;
