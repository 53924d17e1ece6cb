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

use crate::error::CodecError;
use crate::uid::Uid;

use super::format::{check_header, padding, ValueTag, HEADER_SIZE};
use super::OutputObjectState;

/// A buffer being unpacked.
///
/// Values must be unpacked in the order and with the types they were packed. Any failure leaves
/// the buffer permanently invalid: every later call returns [`CodecError::BufferInvalid`] rather
/// than reading from a cursor which may point into the middle of a value.
#[derive(Debug)]
pub struct InputObjectState {
    uid: Uid,
    type_name: String,
    buffer: Vec<u8>,
    cursor: usize,
    valid: bool,
}

impl InputObjectState {
    /// Wraps stored bytes for reading, checking the format header.
    pub fn from_bytes<T: Into<String>>(
        uid: Uid,
        type_name: T,
        bytes: Vec<u8>,
    ) -> Result<Self, CodecError> {
        check_header(&bytes).map_err(CodecError::BadHeader)?;
        Ok(InputObjectState {
            uid,
            type_name: type_name.into(),
            buffer: bytes,
            cursor: HEADER_SIZE,
            valid: true,
        })
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if the buffer holds no values after the header.
    pub fn is_empty(&self) -> bool {
        self.buffer.len() == HEADER_SIZE
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Bytes left after the read cursor.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Returns a deep copy whose read cursor is positioned just past the header.
    pub fn copy(&self) -> Self {
        InputObjectState {
            uid: self.uid,
            type_name: self.type_name.clone(),
            buffer: self.buffer.clone(),
            cursor: HEADER_SIZE,
            valid: self.valid,
        }
    }

    /// Moves the read cursor back to the first value. An invalid buffer stays invalid.
    pub fn rewind(&mut self) {
        self.cursor = HEADER_SIZE;
    }

    /// Converts the bytes back into a buffer which can be appended to or re-stored.
    pub fn into_output(self) -> OutputObjectState {
        // The header was checked when this buffer was created.
        OutputObjectState::with_checked_buffer(self.uid, self.type_name, self.buffer)
    }

    pub fn unpack_byte(&mut self) -> Result<u8, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Byte)?;
            Ok(s.take_array::<1>()?[0])
        })
    }

    pub fn unpack_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Bytes)?;
            let len = u32::from_be_bytes(s.take_array()?) as usize;
            Ok(s.take(len)?.to_vec())
        })
    }

    pub fn unpack_bool(&mut self) -> Result<bool, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Bool)?;
            Ok(s.take_array::<1>()?[0] != 0)
        })
    }

    pub fn unpack_char(&mut self) -> Result<char, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Char)?;
            let value = u32::from_be_bytes(s.take_array()?);
            char::from_u32(value).ok_or(CodecError::InvalidChar(value))
        })
    }

    pub fn unpack_short(&mut self) -> Result<i16, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Short)?;
            Ok(i16::from_be_bytes(s.take_array()?))
        })
    }

    pub fn unpack_int(&mut self) -> Result<i32, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Int)?;
            Ok(i32::from_be_bytes(s.take_array()?))
        })
    }

    pub fn unpack_long(&mut self) -> Result<i64, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Long)?;
            Ok(i64::from_be_bytes(s.take_array()?))
        })
    }

    pub fn unpack_float(&mut self) -> Result<f32, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Float)?;
            Ok(f32::from_bits(u32::from_be_bytes(s.take_array()?)))
        })
    }

    pub fn unpack_double(&mut self) -> Result<f64, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Double)?;
            Ok(f64::from_bits(u64::from_be_bytes(s.take_array()?)))
        })
    }

    /// Unpacks an optional string; a zero length decodes to `None`.
    pub fn unpack_string(&mut self) -> Result<Option<String>, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::String)?;
            let len = u32::from_be_bytes(s.take_array()?) as usize;
            if len == 0 {
                return Ok(None);
            }

            let bytes = s.take(len)?;
            let (nul, text) = bytes
                .split_last()
                .ok_or_else(|| CodecError::InvalidString("missing terminator".into()))?;
            if *nul != 0 {
                return Err(CodecError::InvalidString("missing terminator".into()));
            }
            String::from_utf8(text.to_vec())
                .map(Some)
                .map_err(|e| CodecError::InvalidString(e.to_string()))
        })
    }

    pub fn unpack_uid(&mut self) -> Result<Uid, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::Uid)?;
            s.take_uid()
        })
    }

    /// Unpacks a nested buffer packed with [`OutputObjectState::pack_state`].
    pub fn unpack_state(&mut self) -> Result<InputObjectState, CodecError> {
        self.guarded(|s| {
            s.expect_tag(ValueTag::State)?;
            let uid = s.take_uid()?;
            let type_len = u32::from_be_bytes(s.take_array()?) as usize;
            let type_name = String::from_utf8(s.take(type_len)?.to_vec())
                .map_err(|e| CodecError::InvalidString(e.to_string()))?;
            let buffer_len = u32::from_be_bytes(s.take_array()?) as usize;
            let bytes = s.take(buffer_len)?.to_vec();
            InputObjectState::from_bytes(uid, type_name, bytes)
        })
    }

    // Runs a single read, aligning the cursor on success and invalidating the buffer on failure.
    fn guarded<T, F>(&mut self, read: F) -> Result<T, CodecError>
    where
        F: FnOnce(&mut Self) -> Result<T, CodecError>,
    {
        if !self.valid {
            return Err(CodecError::BufferInvalid);
        }

        match read(self) {
            Ok(value) => {
                let pad = padding(self.cursor).min(self.remaining());
                self.cursor += pad;
                Ok(value)
            }
            Err(err) => {
                debug!(
                    "Invalidating state buffer {} ({}): {}",
                    self.uid, self.type_name, err
                );
                self.valid = false;
                Err(err)
            }
        }
    }

    fn expect_tag(&mut self, tag: ValueTag) -> Result<(), CodecError> {
        let found = self.take_array::<1>()?[0];
        if found != tag as u8 {
            return Err(CodecError::TagMismatch {
                expected: tag as u8,
                found,
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&[u8], CodecError> {
        let remaining = self.remaining();
        if remaining < len {
            return Err(CodecError::ShortRead {
                needed: len,
                remaining,
            });
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.buffer[start..start + len])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take_uid(&mut self) -> Result<Uid, CodecError> {
        let process = u64::from_be_bytes(self.take_array()?);
        let timestamp = u32::from_be_bytes(self.take_array()?);
        let sequence = u32::from_be_bytes(self.take_array()?);
        Ok(Uid::from_parts(process, timestamp, sequence))
    }
}

impl From<&OutputObjectState> for InputObjectState {
    fn from(output: &OutputObjectState) -> Self {
        InputObjectState {
            uid: *output.uid(),
            type_name: output.type_name().to_string(),
            buffer: output.buffer().to_vec(),
            cursor: HEADER_SIZE,
            valid: true,
        }
    }
}

impl From<OutputObjectState> for InputObjectState {
    fn from(output: OutputObjectState) -> Self {
        let uid = *output.uid();
        let type_name = output.type_name().to_string();
        InputObjectState {
            uid,
            type_name,
            buffer: output.into_buffer(),
            cursor: HEADER_SIZE,
            valid: true,
        }
    }
}
