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

//! Contains RecoveryError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::io;

use super::InternalError;
use super::InvalidStateError;
use super::StoreError;

/// An error which can occur while starting or talking to the recovery services.
#[derive(Debug)]
pub enum RecoveryError {
    /// A listener or connection failed.
    Io(io::Error),

    /// The recovery manager is not in a state which permits the operation.
    InvalidState(InvalidStateError),

    /// The peer replied with something other than the protocol allows.
    Protocol(String),

    /// An unexpected internal error.
    Internal(InternalError),
}

impl Error for RecoveryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RecoveryError::Io(e) => Some(e),
            RecoveryError::InvalidState(e) => Some(e),
            RecoveryError::Protocol(_) => None,
            RecoveryError::Internal(e) => Some(e),
        }
    }
}

impl Display for RecoveryError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            RecoveryError::Io(e) => write!(f, "recovery i/o failed: {}", e),
            RecoveryError::InvalidState(e) => write!(f, "{}", e),
            RecoveryError::Protocol(msg) => write!(f, "unexpected reply: {}", msg),
            RecoveryError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<io::Error> for RecoveryError {
    fn from(err: io::Error) -> Self {
        RecoveryError::Io(err)
    }
}

impl From<InvalidStateError> for RecoveryError {
    fn from(err: InvalidStateError) -> Self {
        RecoveryError::InvalidState(err)
    }
}

impl From<StoreError> for RecoveryError {
    fn from(err: StoreError) -> Self {
        RecoveryError::Internal(InternalError::from_source(Box::new(err)))
    }
}
