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

use crate::error::{CodecError, StoreError};
use crate::store::ObjectStore;
use crate::uid::Uid;

use super::{InputObjectState, OutputObjectState, StateHeader};

/// An application object whose state is saved to, and restored from, an object store.
///
/// Implementations describe their own fields; nothing is captured by introspection. `save_state`
/// and `restore_state` must pack and unpack the same values in the same order.
pub trait StateManaged: Send {
    /// The identity of the object; the key of its state in the store.
    fn uid(&self) -> Uid;

    /// The store type path under which the object's state is kept.
    fn type_name(&self) -> String;

    fn save_state(&self, state: &mut OutputObjectState) -> Result<(), CodecError>;

    fn restore_state(&mut self, state: &mut InputObjectState) -> Result<(), CodecError>;
}

/// Captures the current state of `object` as an unwrapped body.
pub fn capture_state(object: &dyn StateManaged) -> Result<OutputObjectState, CodecError> {
    let mut body = OutputObjectState::new(object.uid(), object.type_name());
    object.save_state(&mut body)?;
    Ok(body)
}

/// Loads the committed state of `object` from the store.
///
/// Returns `Ok(None)` if the store holds no committed state for the object, and otherwise the
/// header of the action which last committed it.
pub fn load_committed(
    store: &dyn ObjectStore,
    object: &mut dyn StateManaged,
) -> Result<Option<StateHeader>, StoreError> {
    let mut stored = match store.read_committed(&object.uid(), &object.type_name())? {
        Some(stored) => stored,
        None => return Ok(None),
    };

    let (header, mut body) = StateHeader::unwrap(&mut stored)?;
    object.restore_state(&mut body)?;
    Ok(Some(header))
}
