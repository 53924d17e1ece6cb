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

use super::format::{padding, ValueTag, HEADER, HEADER_SIZE};

/// A buffer being packed.
///
/// Values are appended in order, each as a type tag followed by its big-endian payload and padded
/// to the next 4-byte boundary. The buffer always starts with the fixed format header.
#[derive(Clone, Debug)]
pub struct OutputObjectState {
    uid: Uid,
    type_name: String,
    buffer: Vec<u8>,
}

impl OutputObjectState {
    pub fn new<T: Into<String>>(uid: Uid, type_name: T) -> Self {
        OutputObjectState {
            uid,
            type_name: type_name.into(),
            buffer: HEADER.to_vec(),
        }
    }

    /// Wraps previously packed bytes so that more values can be appended to them.
    pub fn from_bytes<T: Into<String>>(
        uid: Uid,
        type_name: T,
        bytes: Vec<u8>,
    ) -> Result<Self, CodecError> {
        super::format::check_header(&bytes).map_err(CodecError::BadHeader)?;
        Ok(OutputObjectState {
            uid,
            type_name: type_name.into(),
            buffer: bytes,
        })
    }

    pub(super) fn with_checked_buffer(uid: Uid, type_name: String, buffer: Vec<u8>) -> Self {
        OutputObjectState {
            uid,
            type_name,
            buffer,
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The packed bytes, header included.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }

    /// Total length in bytes, header included.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been packed after the header.
    pub fn is_empty(&self) -> bool {
        self.buffer.len() == HEADER_SIZE
    }

    /// Discards every packed value so the buffer can be re-written from the start.
    pub fn rewind(&mut self) {
        self.buffer.truncate(HEADER_SIZE);
    }

    pub fn pack_byte(&mut self, value: u8) {
        self.put(ValueTag::Byte, &[value]);
    }

    pub fn pack_bytes(&mut self, value: &[u8]) -> Result<(), CodecError> {
        let len = length_prefix(value.len())?;
        self.buffer.push(ValueTag::Bytes as u8);
        self.buffer.extend_from_slice(&len);
        self.buffer.extend_from_slice(value);
        self.align();
        Ok(())
    }

    pub fn pack_bool(&mut self, value: bool) {
        self.put(ValueTag::Bool, &[u8::from(value)]);
    }

    pub fn pack_char(&mut self, value: char) {
        self.put(ValueTag::Char, &u32::from(value).to_be_bytes());
    }

    pub fn pack_short(&mut self, value: i16) {
        self.put(ValueTag::Short, &value.to_be_bytes());
    }

    pub fn pack_int(&mut self, value: i32) {
        self.put(ValueTag::Int, &value.to_be_bytes());
    }

    pub fn pack_long(&mut self, value: i64) {
        self.put(ValueTag::Long, &value.to_be_bytes());
    }

    pub fn pack_float(&mut self, value: f32) {
        self.put(ValueTag::Float, &value.to_bits().to_be_bytes());
    }

    pub fn pack_double(&mut self, value: f64) {
        self.put(ValueTag::Double, &value.to_bits().to_be_bytes());
    }

    /// Packs an optional string.
    ///
    /// `None` is packed as a zero length. A present string is packed with a trailing NUL which is
    /// counted in the length, so the empty string has length one and stays distinguishable from
    /// `None`.
    pub fn pack_string(&mut self, value: Option<&str>) -> Result<(), CodecError> {
        let len = match value {
            None => 0u32.to_be_bytes(),
            Some(s) => length_prefix(s.len() + 1)?,
        };

        self.buffer.push(ValueTag::String as u8);
        self.buffer.extend_from_slice(&len);
        if let Some(s) = value {
            self.buffer.extend_from_slice(s.as_bytes());
            self.buffer.push(0);
        }
        self.align();
        Ok(())
    }

    pub fn pack_uid(&mut self, uid: &Uid) {
        let mut payload = [0u8; 16];
        payload[..8].copy_from_slice(&uid.raw_process().to_be_bytes());
        payload[8..12].copy_from_slice(&uid.timestamp().to_be_bytes());
        payload[12..].copy_from_slice(&uid.sequence().to_be_bytes());
        self.put(ValueTag::Uid, &payload);
    }

    /// Packs a complete nested buffer, including its Uid and type name.
    pub fn pack_state(&mut self, state: &OutputObjectState) -> Result<(), CodecError> {
        let type_len = length_prefix(state.type_name.len())?;
        let buffer_len = length_prefix(state.buffer.len())?;

        self.buffer.push(ValueTag::State as u8);
        self.buffer
            .extend_from_slice(&state.uid.raw_process().to_be_bytes());
        self.buffer
            .extend_from_slice(&state.uid.timestamp().to_be_bytes());
        self.buffer
            .extend_from_slice(&state.uid.sequence().to_be_bytes());
        self.buffer.extend_from_slice(&type_len);
        self.buffer.extend_from_slice(state.type_name.as_bytes());
        self.buffer.extend_from_slice(&buffer_len);
        self.buffer.extend_from_slice(&state.buffer);
        self.align();
        Ok(())
    }

    fn put(&mut self, tag: ValueTag, payload: &[u8]) {
        self.buffer.push(tag as u8);
        self.buffer.extend_from_slice(payload);
        self.align();
    }

    fn align(&mut self) {
        let pad = padding(self.buffer.len());
        self.buffer.resize(self.buffer.len() + pad, 0);
    }
}

fn length_prefix(len: usize) -> Result<[u8; 4], CodecError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| CodecError::TooLarge(len))
}
