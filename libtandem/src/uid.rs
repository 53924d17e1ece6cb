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

//! Globally unique identifiers for actions, records and stored objects.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::InvalidArgumentError;
use crate::process::ProcessId;

static SEQUENCE: AtomicU32 = AtomicU32::new(1);

/// An immutable, globally unique identifier.
///
/// A `Uid` is made of the [`ProcessId`] of the creating process, the creation time in seconds and
/// a per-process sequence number. The all-zero value is the null Uid; it never names anything and
/// terminates Uid enumerations read from a store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Uid {
    process: u64,
    timestamp: u32,
    sequence: u32,
}

impl Uid {
    /// Creates a new Uid owned by the current process.
    pub fn new() -> Self {
        Uid::with_process(ProcessId::current())
    }

    /// Creates a new Uid owned by the given process.
    pub fn with_process(process: ProcessId) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();

        Uid {
            process: process.as_u64(),
            timestamp,
            sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The Uid under which a process's contact record is stored.
    pub fn for_process(process: ProcessId) -> Self {
        Uid {
            process: process.as_u64(),
            timestamp: 0,
            sequence: 0,
        }
    }

    pub const fn null() -> Self {
        Uid {
            process: 0,
            timestamp: 0,
            sequence: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        *self == Uid::null()
    }

    /// The process which created this Uid.
    pub fn process(&self) -> ProcessId {
        ProcessId::from_raw(self.process)
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub(crate) fn from_parts(process: u64, timestamp: u32, sequence: u32) -> Self {
        Uid {
            process,
            timestamp,
            sequence,
        }
    }

    pub(crate) fn raw_process(&self) -> u64 {
        self.process
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}:{:x}:{:x}", self.process, self.timestamp, self.sequence)
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self)
    }
}

impl FromStr for Uid {
    type Err = InvalidArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |msg: String| InvalidArgumentError::new("uid", msg);

        let mut parts = s.trim().split(':');
        let mut next = |name: &str| {
            parts
                .next()
                .ok_or_else(|| invalid(format!("missing {} in {:?}", name, s)))
        };
        let process = next("process")?;
        let timestamp = next("timestamp")?;
        let sequence = next("sequence")?;

        if parts.next().is_some() {
            return Err(invalid(format!("too many components in {:?}", s)));
        }

        Ok(Uid {
            process: u64::from_str_radix(process, 16).map_err(|e| invalid(e.to_string()))?,
            timestamp: u32::from_str_radix(timestamp, 16).map_err(|e| invalid(e.to_string()))?,
            sequence: u32::from_str_radix(sequence, 16).map_err(|e| invalid(e.to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn uids_are_unique() {
        let uids: HashSet<Uid> = (0..1000).map(|_| Uid::new()).collect();
        assert_eq!(uids.len(), 1000);
        assert!(!uids.contains(&Uid::null()));
    }

    #[test]
    fn uid_records_its_process() {
        let process = ProcessId::from_raw(42);
        let uid = Uid::with_process(process);
        assert_eq!(uid.process(), process);
        assert_eq!(Uid::for_process(process).process(), process);
        assert_ne!(Uid::for_process(process), uid);
    }

    #[test]
    fn uid_parses_its_display_form() {
        let uid = Uid::new();
        assert_eq!(uid.to_string().parse::<Uid>().unwrap(), uid);
        assert_eq!("0:0:0".parse::<Uid>().unwrap(), Uid::null());
        assert!("1:2".parse::<Uid>().is_err());
        assert!("1:2:3:4".parse::<Uid>().is_err());
        assert!("x:2:3".parse::<Uid>().is_err());
    }
}
