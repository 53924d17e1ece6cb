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

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::action::ActionStatus;
use crate::process::ProcessId;
use crate::store::ObjectStore;
use crate::time::{SystemTimeFactory, TimeSource};
use crate::uid::Uid;

use super::contact::ContactRecord;
use super::liveness::{REPLY_DEAD, REPLY_OK, UNKNOWN_STATUS};
use super::service::LineClient;
use super::status::OwnerStatus;

// How one attempt to reach a process ended.
enum Attempt {
    Answered(OwnerStatus),
    // the process refused to answer for the id it was asked about
    Dead,
    Failed(io::Error),
}

/// Asks other processes about their actions through their liveness services.
///
/// A process is marked dead, permanently, when it has no contact record, when its liveness
/// service says it is a different process, or when every one of `attempts` connections fails.
/// The time of death is noted on the process's contact record, which is what lets the contact
/// expiry scanner remove it later.
pub struct ConnectionManager {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn TimeSource>,
    timeout: Duration,
    attempts: u32,
    connections: Mutex<HashMap<ProcessId, LineClient>>,
    dead: Mutex<HashSet<ProcessId>>,
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration, attempts: u32) -> Self {
        ConnectionManager {
            store,
            clock: Arc::new(SystemTimeFactory::new()),
            timeout,
            attempts: attempts.max(1),
            connections: Mutex::new(HashMap::new()),
            dead: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_dead(&self, process: ProcessId) -> bool {
        self.dead.lock().contains(&process)
    }

    pub fn mark_dead(&self, process: ProcessId) {
        if self.dead.lock().insert(process) {
            info!("Process {} is dead", process);
            let now = self.clock.epoch_seconds();
            if let Err(err) = ContactRecord::record_death(self.store.as_ref(), process, now) {
                error!("Unable to record death of process {}: {}", process, err);
            }
        }
        self.connections.lock().remove(&process);
    }

    /// Asks the process which created `uid` for the status of that action.
    pub fn query(&self, type_name: &str, uid: &Uid) -> OwnerStatus {
        let process = uid.process();
        if self.is_dead(process) {
            return OwnerStatus::Dead;
        }

        let contact = match ContactRecord::read(self.store.as_ref(), process) {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                debug!("No contact record for process {}", process);
                self.mark_dead(process);
                return OwnerStatus::Dead;
            }
            Err(err) => {
                error!("Unable to read contact record of {}: {}", process, err);
                return OwnerStatus::Unreachable;
            }
        };

        for attempt in 1..=self.attempts {
            match self.attempt(&contact, type_name, uid) {
                Attempt::Answered(status) => return status,
                Attempt::Dead => {
                    self.mark_dead(process);
                    return OwnerStatus::Dead;
                }
                Attempt::Failed(err) => {
                    warn!(
                        "Liveness check {} of {} for process {} at {} failed: {}",
                        attempt,
                        self.attempts,
                        process,
                        contact.address(),
                        err
                    );
                    self.connections.lock().remove(&process);
                }
            }
        }

        self.mark_dead(process);
        OwnerStatus::Dead
    }

    fn attempt(&self, contact: &ContactRecord, type_name: &str, uid: &Uid) -> Attempt {
        let request = format!("{} {}", type_name, uid);

        let cached = self.connections.lock().remove(&contact.process);
        let answered = match cached {
            Some(mut client) => match ask(&mut client, &request) {
                Ok(code) => Some((client, code)),
                Err(err) => {
                    debug!("Dropping stale connection to {}: {}", contact.process, err);
                    None
                }
            },
            None => None,
        };

        let (client, code) = match answered {
            Some(answered) => answered,
            None => {
                let mut client = match self.connect(contact) {
                    Ok(Some(client)) => client,
                    Ok(None) => return Attempt::Dead,
                    Err(err) => return Attempt::Failed(err),
                };
                match ask(&mut client, &request) {
                    Ok(code) => (client, code),
                    Err(err) => return Attempt::Failed(err),
                }
            }
        };
        self.connections.lock().insert(contact.process, client);

        if code == UNKNOWN_STATUS {
            return Attempt::Answered(OwnerStatus::NotFound);
        }
        match ActionStatus::from_code(code) {
            Some(status) => Attempt::Answered(OwnerStatus::Known(status)),
            None => {
                warn!("Process {} sent unknown status code {}", contact.process, code);
                Attempt::Answered(OwnerStatus::Unreachable)
            }
        }
    }

    // Connects and names the process expected at the other end. `None` means another process
    // answered.
    fn connect(&self, contact: &ContactRecord) -> io::Result<Option<LineClient>> {
        let mut client = LineClient::connect(&contact.address(), self.timeout)?;
        let reply = client.request(&contact.process.to_string())?;
        match reply.as_str() {
            REPLY_OK => Ok(Some(client)),
            REPLY_DEAD => Ok(None),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected handshake reply {:?}", other),
            )),
        }
    }
}

fn ask(client: &mut LineClient, request: &str) -> io::Result<i32> {
    let reply = client.request(request)?;
    reply.parse::<i32>().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected status reply {:?}", reply),
        )
    })
}
