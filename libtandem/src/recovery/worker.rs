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

//! The recovery worker protocol.
//!
//! Each request is one line and gets one line back:
//!
//! | request        | reply                                              |
//! |----------------|----------------------------------------------------|
//! | `PING`         | `PONG`                                             |
//! | `SCAN`         | `DONE` once a full scan cycle has completed        |
//! | `VERBOSE_SCAN` | as `SCAN`, logging each pass at info level         |
//! | `ASYNC_SCAN`   | `DONE` as soon as the scan is requested            |
//! | anything else  | `ERROR`                                            |
//!
//! A synchronous scan requested while scanning is suspended is answered with `ERROR`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::RecoveryError;

use super::periodic::ScanControl;
use super::service::{LineClient, LineHandler, LineReply};

const PING: &str = "PING";
const PONG: &str = "PONG";
const SCAN: &str = "SCAN";
const VERBOSE_SCAN: &str = "VERBOSE_SCAN";
const ASYNC_SCAN: &str = "ASYNC_SCAN";
const DONE: &str = "DONE";
const ERROR: &str = "ERROR";

pub(crate) struct WorkerHandler {
    control: Arc<ScanControl>,
}

impl WorkerHandler {
    pub fn new(control: Arc<ScanControl>) -> Self {
        WorkerHandler { control }
    }

    fn scan(&self, verbose: bool) -> &'static str {
        let ticket = self.control.trigger(verbose);
        if self.control.wait_for(ticket) {
            DONE
        } else {
            ERROR
        }
    }
}

impl LineHandler for WorkerHandler {
    type Session = ();

    fn handle(&self, _: &mut (), line: &str) -> LineReply {
        debug!("Recovery worker request {:?}", line);
        let reply = match line.trim() {
            PING => PONG,
            SCAN => self.scan(false),
            VERBOSE_SCAN => self.scan(true),
            ASYNC_SCAN => {
                self.control.trigger(false);
                DONE
            }
            _ => ERROR,
        };
        LineReply::Reply(reply.to_string())
    }
}

/// A client of the recovery worker protocol.
pub struct RecoveryDriver {
    client: LineClient,
    timeout: Duration,
}

impl RecoveryDriver {
    /// Connects to the worker listening on `address`. `timeout` bounds connecting and every
    /// request except synchronous scans, which wait as long as the scan takes.
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, RecoveryError> {
        Ok(RecoveryDriver {
            client: LineClient::connect(address, timeout)?,
            timeout,
        })
    }

    pub fn ping(&mut self) -> Result<(), RecoveryError> {
        self.expect(PING, PONG)
    }

    /// Runs a scan cycle and returns once it has completed.
    pub fn synchronous_scan(&mut self) -> Result<(), RecoveryError> {
        self.blocking(SCAN)
    }

    /// As [`synchronous_scan`](Self::synchronous_scan), with every pass logged by the worker.
    pub fn verbose_scan(&mut self) -> Result<(), RecoveryError> {
        self.blocking(VERBOSE_SCAN)
    }

    /// Requests a scan cycle without waiting for it.
    pub fn asynchronous_scan(&mut self) -> Result<(), RecoveryError> {
        self.expect(ASYNC_SCAN, DONE)
    }

    fn blocking(&mut self, request: &str) -> Result<(), RecoveryError> {
        self.client.set_read_timeout(None)?;
        let result = self.expect(request, DONE);
        self.client.set_read_timeout(Some(self.timeout))?;
        result
    }

    fn expect(&mut self, request: &str, expected: &str) -> Result<(), RecoveryError> {
        let reply = self.client.request(request)?;
        if reply == expected {
            Ok(())
        } else {
            Err(RecoveryError::Protocol(format!(
                "{} answered with {:?}",
                request, reply
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;

    use crate::recovery::periodic::PeriodicScanner;
    use crate::recovery::service::spawn_service;
    use crate::recovery::RecoveryModule;
    use crate::testing::CallLog;

    struct Probe(CallLog);

    impl RecoveryModule for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn first_pass(&mut self) {
            self.0.push("probe", "first");
        }

        fn second_pass(&mut self) {
            self.0.push("probe", "second");
        }
    }

    #[test]
    fn worker_answers_each_request() -> Result<(), Box<dyn std::error::Error>> {
        let log = CallLog::default();
        let scanner = PeriodicScanner::start(
            vec![Box::new(Probe(log.clone()))],
            Duration::from_secs(3600),
            Duration::from_millis(10),
        )?;
        let handler = Arc::new(WorkerHandler::new(Arc::clone(scanner.control())));
        let service = spawn_service("worker", "127.0.0.1:0", handler)?;
        let address = service.local_addr().to_string();

        let mut driver = RecoveryDriver::connect(&address, Duration::from_secs(5))?;
        driver.ping()?;
        driver.synchronous_scan()?;
        assert_eq!(log.count("probe:second"), 1);
        driver.verbose_scan()?;
        assert_eq!(log.count("probe:second"), 2);
        driver.asynchronous_scan()?;

        let mut stream = TcpStream::connect(&address)?;
        stream.write_all(b"HELLO\n")?;
        let mut reply = String::new();
        BufReader::new(stream).read_line(&mut reply)?;
        assert_eq!(reply.trim_end(), "ERROR");

        scanner.control().suspend();
        assert!(matches!(
            driver.synchronous_scan(),
            Err(RecoveryError::Protocol(_))
        ));
        Ok(())
    }
}
