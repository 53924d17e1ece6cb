// Copyright 2021-2022 Cargill Incorporated
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

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// A source of wall-clock time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> SystemTime;

    /// Whole seconds since the Unix epoch, zero for a clock set before it.
    fn epoch_seconds(&self) -> u64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }
}

#[derive(Default, Clone)]
pub struct SystemTimeFactory {}

impl SystemTimeFactory {
    pub fn new() -> Self {
        SystemTimeFactory {}
    }
}

impl TimeSource for SystemTimeFactory {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock which only moves when advanced.
pub struct ManualTime {
    now: Mutex<SystemTime>,
}

impl ManualTime {
    pub fn new(start: SystemTime) -> Self {
        ManualTime {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> SystemTime {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_time_moves_only_when_advanced() {
        let clock = ManualTime::new(UNIX_EPOCH + Duration::from_secs(100));
        assert_eq!(clock.epoch_seconds(), 100);
        assert_eq!(clock.epoch_seconds(), 100);

        clock.advance(Duration::from_secs(20));
        assert_eq!(clock.epoch_seconds(), 120);
    }

    #[test]
    fn clock_before_epoch_reads_zero() {
        let clock = ManualTime::new(UNIX_EPOCH - Duration::from_secs(5));
        assert_eq!(clock.epoch_seconds(), 0);
    }

    #[test]
    fn system_time_is_after_epoch() {
        assert!(SystemTimeFactory::new().epoch_seconds() > 0);
    }
}
