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
use crate::process::ProcessId;
use crate::uid::Uid;

use super::{InputObjectState, OutputObjectState};

/// Identifies the action and process which wrote a stored object state.
///
/// Object states written by a coordinator are wrapped with this header so that an uncommitted
/// state left behind by a crash can be traced back to the action which wrote it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateHeader {
    pub action: Uid,
    pub process: ProcessId,
}

impl StateHeader {
    pub fn new(action: Uid, process: ProcessId) -> Self {
        StateHeader { action, process }
    }

    /// Builds the stored form of `body`: this header followed by the body as a nested buffer.
    pub fn wrap(&self, body: &OutputObjectState) -> Result<OutputObjectState, CodecError> {
        let mut wrapped = OutputObjectState::new(*body.uid(), body.type_name());
        wrapped.pack_uid(&self.action);
        wrapped.pack_long(self.process.as_u64() as i64);
        wrapped.pack_state(body)?;
        Ok(wrapped)
    }

    /// Splits a stored state into its header and body.
    pub fn unwrap(
        stored: &mut InputObjectState,
    ) -> Result<(StateHeader, InputObjectState), CodecError> {
        let action = stored.unpack_uid()?;
        let process = ProcessId::from_raw(stored.unpack_long()? as u64);
        let body = stored.unpack_state()?;
        Ok((StateHeader { action, process }, body))
    }
}
