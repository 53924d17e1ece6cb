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

//! Identity of the running process.

use std::fmt;
use std::process;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::InvalidArgumentError;

/// A discriminator which identifies one run of one process.
///
/// Every [`Uid`](crate::Uid) embeds the `ProcessId` of the process which created it, and a
/// process's liveness service answers only to its own `ProcessId`. A restarted process receives a
/// new `ProcessId`, so its predecessor is recognisably gone even if it reuses the same address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Returns the id of the current process, computed once from the OS pid and start time.
    pub fn current() -> Self {
        static CURRENT: OnceLock<ProcessId> = OnceLock::new();

        *CURRENT.get_or_init(|| {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default();
            ProcessId::from_raw((u64::from(process::id()) << 32) ^ nanos)
        })
    }

    /// Creates a `ProcessId` from its raw value. Zero is reserved and is mapped to one.
    pub const fn from_raw(raw: u64) -> Self {
        if raw == 0 {
            ProcessId(1)
        } else {
            ProcessId(raw)
        }
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = InvalidArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim(), 16)
            .map(ProcessId::from_raw)
            .map_err(|e| InvalidArgumentError::new("process_id", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_id_is_stable() {
        assert_eq!(ProcessId::current(), ProcessId::current());
    }

    #[test]
    fn process_id_parses_its_display_form() {
        let id = ProcessId::from_raw(0xdead_beef);
        assert_eq!(id.to_string(), "deadbeef");
        assert_eq!("deadbeef".parse::<ProcessId>().unwrap(), id);
        assert!("not-hex".parse::<ProcessId>().is_err());
    }

    #[test]
    fn zero_is_never_a_process_id() {
        assert_eq!(ProcessId::from_raw(0).as_u64(), 1);
    }
}
