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

use std::net::SocketAddr;

use crate::error::{CodecError, StoreError};
use crate::process::ProcessId;
use crate::state::{InputObjectState, OutputObjectState};
use crate::store::{ObjectStore, StateSlot};
use crate::uid::Uid;

/// The store type path of contact records.
pub const CONTACT_TYPE: &str = "/Recovery/TransactionStatusManager";

/// Where the liveness service of a process can be reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactRecord {
    pub process: ProcessId,
    pub host: String,
    pub port: u16,
    /// Seconds since the Unix epoch at which the record was written.
    pub created: u64,
    /// Seconds since the Unix epoch at which another process first found this one dead.
    pub dead_since: Option<u64>,
}

impl ContactRecord {
    pub fn new(process: ProcessId, address: SocketAddr, created: u64) -> Self {
        ContactRecord {
            process,
            host: address.ip().to_string(),
            port: address.port(),
            created,
            dead_since: None,
        }
    }

    pub fn uid(&self) -> Uid {
        Uid::for_process(self.process)
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn save_state(&self, state: &mut OutputObjectState) -> Result<(), CodecError> {
        state.pack_string(Some(&self.host))?;
        state.pack_int(i32::from(self.port));
        state.pack_long(self.process.as_u64() as i64);
        state.pack_long(self.created as i64);
        state.pack_bool(self.dead_since.is_some());
        if let Some(dead_since) = self.dead_since {
            state.pack_long(dead_since as i64);
        }
        Ok(())
    }

    pub fn restore(state: &mut InputObjectState) -> Result<Self, CodecError> {
        let host = state
            .unpack_string()?
            .ok_or_else(|| CodecError::InvalidValue("contact record without a host".into()))?;
        let port = state.unpack_int()?;
        let port = u16::try_from(port)
            .map_err(|_| CodecError::InvalidValue(format!("invalid port {}", port)))?;
        let process = ProcessId::from_raw(state.unpack_long()? as u64);
        let created = state.unpack_long()? as u64;
        let dead_since = if state.unpack_bool()? {
            Some(state.unpack_long()? as u64)
        } else {
            None
        };

        Ok(ContactRecord {
            process,
            host,
            port,
            created,
            dead_since,
        })
    }

    pub fn write(&self, store: &dyn ObjectStore) -> Result<(), StoreError> {
        let mut state = OutputObjectState::new(self.uid(), CONTACT_TYPE);
        self.save_state(&mut state)?;
        store.write_committed(&self.uid(), CONTACT_TYPE, &state)
    }

    pub fn read(store: &dyn ObjectStore, process: ProcessId) -> Result<Option<Self>, StoreError> {
        match store.read_committed(&Uid::for_process(process), CONTACT_TYPE)? {
            Some(mut state) => Ok(Some(ContactRecord::restore(&mut state)?)),
            None => Ok(None),
        }
    }

    /// Notes that `process` was found dead at `now`, unless an earlier death is already noted.
    ///
    /// Returns false if `process` has no contact record.
    pub fn record_death(
        store: &dyn ObjectStore,
        process: ProcessId,
        now: u64,
    ) -> Result<bool, StoreError> {
        match ContactRecord::read(store, process)? {
            Some(contact) if contact.dead_since.is_some() => Ok(true),
            Some(mut contact) => {
                contact.dead_since = Some(now);
                contact.write(store)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove(store: &dyn ObjectStore, process: ProcessId) -> Result<bool, StoreError> {
        store.remove_committed(&Uid::for_process(process), CONTACT_TYPE)
    }

    /// Every contact record in the store. Unreadable records are skipped.
    pub fn all(store: &dyn ObjectStore) -> Result<Vec<ContactRecord>, StoreError> {
        let mut contacts = Vec::new();
        for uid in store.uids(CONTACT_TYPE, StateSlot::Committed)? {
            match store.read_committed(&uid, CONTACT_TYPE)? {
                Some(mut state) => match ContactRecord::restore(&mut state) {
                    Ok(contact) => contacts.push(contact),
                    Err(err) => warn!("Skipping unreadable contact record {}: {}", uid, err),
                },
                None => continue,
            }
        }
        Ok(contacts)
    }
}
