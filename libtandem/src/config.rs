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

//! Configuration of the coordinator and the recovery manager.

#[cfg(feature = "recovery")]
use std::time::Duration;

#[cfg(feature = "recovery")]
use crate::error::InvalidStateError;

/// Options controlling how actions complete.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    one_phase_commit: bool,
    maintain_heuristics: bool,
}

impl CoordinatorConfig {
    /// Commit a top-level action holding a single record without a separate prepare.
    pub fn one_phase_commit(&self) -> bool {
        self.one_phase_commit
    }

    /// Keep heuristic records until they are explicitly forgotten.
    pub fn maintain_heuristics(&self) -> bool {
        self.maintain_heuristics
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfigBuilder::new().build()
    }
}

#[derive(Default)]
pub struct CoordinatorConfigBuilder {
    one_phase_commit: Option<bool>,
    maintain_heuristics: Option<bool>,
}

impl CoordinatorConfigBuilder {
    pub fn new() -> Self {
        CoordinatorConfigBuilder::default()
    }

    pub fn with_one_phase_commit(mut self, enabled: bool) -> Self {
        self.one_phase_commit = Some(enabled);
        self
    }

    pub fn with_maintain_heuristics(mut self, enabled: bool) -> Self {
        self.maintain_heuristics = Some(enabled);
        self
    }

    pub fn build(self) -> CoordinatorConfig {
        CoordinatorConfig {
            one_phase_commit: self.one_phase_commit.unwrap_or(true),
            maintain_heuristics: self.maintain_heuristics.unwrap_or(true),
        }
    }
}

#[cfg(feature = "recovery")]
const DEFAULT_PERIOD_SECONDS: u64 = 120;
#[cfg(feature = "recovery")]
const DEFAULT_BACKOFF_SECONDS: u64 = 10;
#[cfg(feature = "recovery")]
const DEFAULT_SOCKET_TIMEOUT_SECONDS: u64 = 1;
#[cfg(feature = "recovery")]
const DEFAULT_CONNECTION_ATTEMPTS: u32 = 3;
#[cfg(feature = "recovery")]
const DEFAULT_CONTACT_RETENTION_SECONDS: u64 = 12 * 60 * 60;
#[cfg(feature = "recovery")]
const DEFAULT_EXPIRY_INTERVAL_SECONDS: u64 = 12 * 60 * 60;
#[cfg(feature = "recovery")]
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:0";

/// Options controlling the recovery manager and its network services.
#[cfg(feature = "recovery")]
#[derive(Clone, Debug)]
pub struct RecoveryConfig {
    period: Duration,
    backoff: Duration,
    socket_timeout: Duration,
    connection_attempts: u32,
    contact_retention: Duration,
    expiry_interval: Duration,
    worker_address: String,
    liveness_address: String,
}

#[cfg(feature = "recovery")]
impl RecoveryConfig {
    /// Time between periodic scans.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time between the first and second pass of a scan.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Connect, read and write timeout for liveness checks.
    pub fn socket_timeout(&self) -> Duration {
        self.socket_timeout
    }

    /// Failed liveness checks after which a process is considered dead.
    pub fn connection_attempts(&self) -> u32 {
        self.connection_attempts
    }

    /// Age after which another process's contact record is removed.
    pub fn contact_retention(&self) -> Duration {
        self.contact_retention
    }

    /// Time between runs of the expiry scanners.
    pub fn expiry_interval(&self) -> Duration {
        self.expiry_interval
    }

    pub fn worker_address(&self) -> &str {
        &self.worker_address
    }

    pub fn liveness_address(&self) -> &str {
        &self.liveness_address
    }
}

#[cfg(feature = "recovery")]
impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            period: Duration::from_secs(DEFAULT_PERIOD_SECONDS),
            backoff: Duration::from_secs(DEFAULT_BACKOFF_SECONDS),
            socket_timeout: Duration::from_secs(DEFAULT_SOCKET_TIMEOUT_SECONDS),
            connection_attempts: DEFAULT_CONNECTION_ATTEMPTS,
            contact_retention: Duration::from_secs(DEFAULT_CONTACT_RETENTION_SECONDS),
            expiry_interval: Duration::from_secs(DEFAULT_EXPIRY_INTERVAL_SECONDS),
            worker_address: DEFAULT_BIND_ADDRESS.to_string(),
            liveness_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

#[cfg(feature = "recovery")]
#[derive(Default)]
pub struct RecoveryConfigBuilder {
    period: Option<Duration>,
    backoff: Option<Duration>,
    socket_timeout: Option<Duration>,
    connection_attempts: Option<u32>,
    contact_retention: Option<Duration>,
    expiry_interval: Option<Duration>,
    worker_address: Option<String>,
    liveness_address: Option<String>,
}

#[cfg(feature = "recovery")]
impl RecoveryConfigBuilder {
    pub fn new() -> Self {
        RecoveryConfigBuilder::default()
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = Some(timeout);
        self
    }

    pub fn with_connection_attempts(mut self, attempts: u32) -> Self {
        self.connection_attempts = Some(attempts);
        self
    }

    pub fn with_contact_retention(mut self, retention: Duration) -> Self {
        self.contact_retention = Some(retention);
        self
    }

    pub fn with_expiry_interval(mut self, interval: Duration) -> Self {
        self.expiry_interval = Some(interval);
        self
    }

    pub fn with_worker_address(mut self, address: &str) -> Self {
        self.worker_address = Some(address.to_string());
        self
    }

    pub fn with_liveness_address(mut self, address: &str) -> Self {
        self.liveness_address = Some(address.to_string());
        self
    }

    pub fn build(self) -> Result<RecoveryConfig, InvalidStateError> {
        let defaults = RecoveryConfig::default();

        let period = self.period.unwrap_or(defaults.period);
        if period.is_zero() {
            return Err(InvalidStateError::with_message(
                "recovery period must be greater than zero".into(),
            ));
        }

        let socket_timeout = self.socket_timeout.unwrap_or(defaults.socket_timeout);
        if socket_timeout.is_zero() {
            return Err(InvalidStateError::with_message(
                "socket timeout must be greater than zero".into(),
            ));
        }

        let connection_attempts = self
            .connection_attempts
            .unwrap_or(defaults.connection_attempts);
        if connection_attempts == 0 {
            return Err(InvalidStateError::with_message(
                "at least one connection attempt is required".into(),
            ));
        }

        let expiry_interval = self.expiry_interval.unwrap_or(defaults.expiry_interval);
        if expiry_interval.is_zero() {
            return Err(InvalidStateError::with_message(
                "expiry interval must be greater than zero".into(),
            ));
        }

        Ok(RecoveryConfig {
            period,
            backoff: self.backoff.unwrap_or(defaults.backoff),
            socket_timeout,
            connection_attempts,
            contact_retention: self.contact_retention.unwrap_or(defaults.contact_retention),
            expiry_interval,
            worker_address: self.worker_address.unwrap_or(defaults.worker_address),
            liveness_address: self.liveness_address.unwrap_or(defaults.liveness_address),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_defaults() {
        let config = CoordinatorConfig::default();
        assert!(config.one_phase_commit());
        assert!(config.maintain_heuristics());

        let config = CoordinatorConfigBuilder::new()
            .with_one_phase_commit(false)
            .build();
        assert!(!config.one_phase_commit());
    }

    #[cfg(feature = "recovery")]
    #[test]
    fn recovery_defaults() {
        let config = RecoveryConfigBuilder::new().build().unwrap();
        assert_eq!(config.period(), Duration::from_secs(120));
        assert_eq!(config.backoff(), Duration::from_secs(10));
        assert_eq!(config.socket_timeout(), Duration::from_secs(1));
        assert_eq!(config.connection_attempts(), 3);
        assert_eq!(config.contact_retention(), Duration::from_secs(43_200));
        assert_eq!(config.expiry_interval(), Duration::from_secs(43_200));
    }

    #[cfg(feature = "recovery")]
    #[test]
    fn recovery_rejects_invalid_values() {
        assert!(RecoveryConfigBuilder::new()
            .with_period(Duration::ZERO)
            .build()
            .is_err());
        assert!(RecoveryConfigBuilder::new()
            .with_connection_attempts(0)
            .build()
            .is_err());
        assert!(RecoveryConfigBuilder::new()
            .with_backoff(Duration::ZERO)
            .build()
            .is_ok());
    }
}
