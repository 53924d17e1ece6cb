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

//! Contains StoreError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::io;

use super::CodecError;
use super::InternalError;

/// An error which can occur while reading, writing or enumerating entries of an object store.
///
/// A store error concerns a single entry; it never implies that other entries are damaged.
#[derive(Debug)]
pub enum StoreError {
    /// The stored bytes could not be decoded.
    Codec(CodecError),

    /// The underlying storage failed.
    Io(io::Error),

    /// The store could not complete the operation due to an unexpected internal error.
    Internal(InternalError),
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Codec(e) => Some(e),
            StoreError::Io(e) => Some(e),
            StoreError::Internal(e) => Some(e),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            StoreError::Codec(e) => write!(f, "{}", e),
            StoreError::Io(e) => write!(f, "store i/o failed: {}", e),
            StoreError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        StoreError::Codec(err)
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<InternalError> for StoreError {
    fn from(err: InternalError) -> Self {
        StoreError::Internal(err)
    }
}
