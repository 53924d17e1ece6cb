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
use crate::state::{InputObjectState, OutputObjectState};
use crate::uid::Uid;

const UIDS_TYPE: &str = "/ObjectStore/Uids";
const TYPES_TYPE: &str = "/ObjectStore/Types";

/// Packs `uids` followed by the null Uid terminator.
pub fn pack_uids<'a, I>(uids: I) -> InputObjectState
where
    I: IntoIterator<Item = &'a Uid>,
{
    let mut os = OutputObjectState::new(Uid::null(), UIDS_TYPE);
    for uid in uids {
        os.pack_uid(uid);
    }
    os.pack_uid(&Uid::null());
    os.into()
}

/// Packs type paths followed by an absent string terminator.
pub fn pack_types<'a, I>(types: I) -> Result<InputObjectState, CodecError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut os = OutputObjectState::new(Uid::null(), TYPES_TYPE);
    for type_name in types {
        os.pack_string(Some(type_name))?;
    }
    os.pack_string(None)?;
    Ok(os.into())
}

/// Iterates a Uid enumeration up to, not including, the null Uid.
///
/// A malformed enumeration yields one error and then ends.
pub struct UidIter {
    state: InputObjectState,
    done: bool,
}

impl UidIter {
    pub fn new(state: InputObjectState) -> Self {
        UidIter { state, done: false }
    }
}

impl Iterator for UidIter {
    type Item = Result<Uid, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.state.unpack_uid() {
            Ok(uid) if uid.is_null() => {
                self.done = true;
                None
            }
            Ok(uid) => Some(Ok(uid)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Iterates a type enumeration up to the absent-string terminator.
pub struct TypeIter {
    state: InputObjectState,
    done: bool,
}

impl TypeIter {
    pub fn new(state: InputObjectState) -> Self {
        TypeIter { state, done: false }
    }
}

impl Iterator for TypeIter {
    type Item = Result<String, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.state.unpack_string() {
            Ok(Some(type_name)) => Some(Ok(type_name)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_iteration_stops_at_null() {
        let uids = vec![Uid::new(), Uid::new()];
        let found: Vec<Uid> = UidIter::new(pack_uids(&uids))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(found, uids);
    }

    #[test]
    fn missing_terminator_is_an_error() {
        let mut os = OutputObjectState::new(Uid::null(), UIDS_TYPE);
        os.pack_uid(&Uid::new());

        let results: Vec<_> = UidIter::new(os.into()).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn type_iteration_stops_at_absent_string() {
        let state = pack_types(["/A", "/A/B"]).unwrap();
        let found: Vec<String> = TypeIter::new(state).collect::<Result<_, _>>().unwrap();
        assert_eq!(found, vec!["/A".to_string(), "/A/B".to_string()]);
    }
}
