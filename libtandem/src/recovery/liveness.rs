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

//! The liveness service through which other processes ask about this process's actions.
//!
//! A client first sends the process id it believes it is talking to. The service replies `OK`
//! when that is its own id and `DEAD` otherwise, closing the connection, so a restarted process
//! never answers for its predecessor. Each following line `<type> <uid>` is answered with the
//! status code of that action, `-1` when the action is unknown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::action::ActionStatus;
use crate::context::CoordinatorContext;
use crate::error::RecoveryError;
use crate::process::ProcessId;
use crate::time::TimeSource;
use crate::uid::Uid;

use super::contact::ContactRecord;
use super::service::{spawn_service, LineHandler, LineReply, ServiceHandle};

pub(crate) const REPLY_OK: &str = "OK";
pub(crate) const REPLY_DEAD: &str = "DEAD";
pub(crate) const UNKNOWN_STATUS: i32 = -1;

// An action whose lock is held this long is mid-protocol, and so alive.
const BUSY_WAIT: Duration = Duration::from_millis(100);

struct LivenessHandler {
    context: Arc<CoordinatorContext>,
}

impl LivenessHandler {
    fn status_code(&self, uid: &Uid) -> i32 {
        let action = match self.context.actions().get(uid) {
            Some(action) => action,
            None => return UNKNOWN_STATUS,
        };
        let status = match action.try_lock_for(BUSY_WAIT) {
            Some(guard) => guard.status(),
            None => {
                debug!("Action {} is busy; reporting it as running", uid);
                ActionStatus::Running
            }
        };
        status.code()
    }
}

impl LineHandler for LivenessHandler {
    // whether the client has named this process
    type Session = bool;

    fn handle(&self, verified: &mut bool, line: &str) -> LineReply {
        if !*verified {
            return match line.parse::<ProcessId>() {
                Ok(process) if process == self.context.process() => {
                    *verified = true;
                    LineReply::Reply(REPLY_OK.into())
                }
                _ => {
                    debug!("Liveness client asked for process {:?}", line);
                    LineReply::Close(REPLY_DEAD.into())
                }
            };
        }

        let uid = line
            .split_once(' ')
            .and_then(|(_, uid)| uid.trim().parse::<Uid>().ok());
        let code = match uid {
            Some(uid) => self.status_code(&uid),
            None => {
                warn!("Malformed liveness request {:?}", line);
                UNKNOWN_STATUS
            }
        };
        LineReply::Reply(code.to_string())
    }
}

/// The running liveness service and the contact record advertising it.
pub struct LivenessServer {
    context: Arc<CoordinatorContext>,
    contact: ContactRecord,
    service: ServiceHandle,
}

impl LivenessServer {
    /// Starts listening on `address` and writes this process's contact record.
    pub fn start(
        context: Arc<CoordinatorContext>,
        address: &str,
        clock: &dyn TimeSource,
    ) -> Result<Self, RecoveryError> {
        let handler = Arc::new(LivenessHandler {
            context: Arc::clone(&context),
        });
        let service = spawn_service("liveness", address, handler)?;
        let contact = ContactRecord::new(
            context.process(),
            service.local_addr(),
            clock.epoch_seconds(),
        );
        contact.write(context.store().as_ref())?;
        info!(
            "Process {} answers liveness checks on {}",
            context.process(),
            contact.address()
        );

        Ok(LivenessServer {
            context,
            contact,
            service,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.service.local_addr()
    }

    pub fn contact(&self) -> &ContactRecord {
        &self.contact
    }

    /// Stops answering and withdraws the contact record.
    pub fn shutdown(&mut self) {
        self.service.shutdown();
        match ContactRecord::remove(self.context.store().as_ref(), self.contact.process) {
            Ok(_) => (),
            Err(err) => error!("Unable to remove contact record: {}", err),
        }
    }
}

impl Drop for LivenessServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
