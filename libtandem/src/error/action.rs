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

//! Contains ActionError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use super::InternalError;
use super::InvalidArgumentError;
use super::InvalidStateError;
use super::{CodecError, StoreError};

/// An error returned when an operation on an action cannot be carried out.
///
/// Protocol outcomes (a participant voting no, a heuristic decision) are not errors; they are
/// reported through `ActionStatus`. This error covers misuse, such as committing an action which is
/// not running, and failures which leave no decision to report.
#[derive(Debug)]
pub enum ActionError {
    /// The action is not in a state which permits the operation.
    InvalidState(InvalidStateError),

    /// An argument, such as an action id, does not refer to anything known.
    InvalidArgument(InvalidArgumentError),

    /// The operation failed due to an unexpected internal error.
    Internal(InternalError),
}

impl Error for ActionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ActionError::InvalidState(e) => Some(e),
            ActionError::InvalidArgument(e) => Some(e),
            ActionError::Internal(e) => Some(e),
        }
    }
}

impl Display for ActionError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            ActionError::InvalidState(e) => write!(f, "{}", e),
            ActionError::InvalidArgument(e) => write!(f, "{}", e),
            ActionError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<InvalidStateError> for ActionError {
    fn from(err: InvalidStateError) -> Self {
        ActionError::InvalidState(err)
    }
}

impl From<InvalidArgumentError> for ActionError {
    fn from(err: InvalidArgumentError) -> Self {
        ActionError::InvalidArgument(err)
    }
}

impl From<InternalError> for ActionError {
    fn from(err: InternalError) -> Self {
        ActionError::Internal(err)
    }
}

impl From<CodecError> for ActionError {
    fn from(err: CodecError) -> Self {
        ActionError::Internal(InternalError::from_source(Box::new(err)))
    }
}

impl From<StoreError> for ActionError {
    fn from(err: StoreError) -> Self {
        ActionError::Internal(InternalError::from_source(Box::new(err)))
    }
}
