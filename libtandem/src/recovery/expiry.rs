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

use std::sync::Arc;
use std::time::Duration;

use crate::context::CoordinatorContext;
use crate::time::TimeSource;

use super::contact::ContactRecord;

/// Periodic removal of store entries which no longer serve any purpose.
pub trait ExpiryScanner: Send {
    fn name(&self) -> &str;

    fn scan(&mut self);
}

/// Removes the contact records of processes which were found dead long ago.
///
/// A record is removed once its process has been dead for longer than the retention window. The
/// records of processes nobody has found dead are kept however old they are, and so is the local
/// process's own record.
pub struct ContactExpiryScanner {
    context: Arc<CoordinatorContext>,
    clock: Arc<dyn TimeSource>,
    retention: Duration,
}

impl ContactExpiryScanner {
    pub fn new(
        context: Arc<CoordinatorContext>,
        clock: Arc<dyn TimeSource>,
        retention: Duration,
    ) -> Self {
        ContactExpiryScanner {
            context,
            clock,
            retention,
        }
    }
}

impl ExpiryScanner for ContactExpiryScanner {
    fn name(&self) -> &str {
        "contact"
    }

    fn scan(&mut self) {
        let store = self.context.store().as_ref();
        let contacts = match ContactRecord::all(store) {
            Ok(contacts) => contacts,
            Err(err) => {
                error!("Unable to list contact records: {}", err);
                return;
            }
        };

        let cutoff = self
            .clock
            .epoch_seconds()
            .saturating_sub(self.retention.as_secs());
        for contact in contacts {
            let dead_since = match contact.dead_since {
                Some(dead_since) => dead_since,
                None => continue,
            };
            if contact.process == self.context.process() || dead_since >= cutoff {
                continue;
            }
            match ContactRecord::remove(store, contact.process) {
                Ok(_) => info!(
                    "Removed expired contact record of process {}",
                    contact.process
                ),
                Err(err) => error!(
                    "Unable to remove contact record of {}: {}",
                    contact.process, err
                ),
            }
        }
    }
}
