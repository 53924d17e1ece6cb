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

//! Contains CodecError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

/// An error which can occur while packing or unpacking an object state buffer.
///
/// Once an `InputObjectState` has returned one of these errors it is permanently invalid and every
/// later read returns `CodecError::BufferInvalid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer was invalidated by an earlier failure.
    BufferInvalid,

    /// The buffer does not start with a recognised header.
    BadHeader(String),

    /// The buffer ended before the value could be read.
    ShortRead { needed: usize, remaining: usize },

    /// The next value in the buffer is not of the requested type.
    TagMismatch { expected: u8, found: u8 },

    /// A packed string was not NUL terminated UTF-8.
    InvalidString(String),

    /// A packed char was not a valid Unicode scalar value.
    InvalidChar(u32),

    /// A value is too long to be length-prefixed.
    TooLarge(usize),

    /// A value was read successfully but has no meaning in its position.
    InvalidValue(String),
}

impl Error for CodecError {}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            CodecError::BufferInvalid => f.write_str("buffer invalid"),
            CodecError::BadHeader(msg) => write!(f, "bad buffer header: {}", msg),
            CodecError::ShortRead { needed, remaining } => write!(
                f,
                "short read: needed {} bytes, {} remaining",
                needed, remaining
            ),
            CodecError::TagMismatch { expected, found } => write!(
                f,
                "type tag mismatch: expected {}, found {}",
                expected, found
            ),
            CodecError::InvalidString(msg) => write!(f, "invalid string: {}", msg),
            CodecError::InvalidChar(value) => write!(f, "invalid char value: {:#x}", value),
            CodecError::TooLarge(len) => write!(f, "value of {} bytes is too large to pack", len),
            CodecError::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
        }
    }
}
