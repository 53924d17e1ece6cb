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
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::RecoveryError;

use super::module::RecoveryModule;

#[derive(Default)]
struct ScanState {
    // cycles begun and finished, counted from one
    started: u64,
    completed: u64,
    pending: bool,
    verbose: bool,
    scanning: bool,
    suspended: bool,
    shutdown: bool,
}

/// The handshake between the scanner thread and everyone asking it to scan.
///
/// A requester takes a ticket naming the first cycle which will begin after its request, then
/// waits for that cycle to complete. The lock is never held while a cycle runs.
#[derive(Default)]
pub struct ScanControl {
    state: Mutex<ScanState>,
    changed: Condvar,
}

impl ScanControl {
    /// Requests a cycle, returning the ticket to wait on.
    pub fn trigger(&self, verbose: bool) -> u64 {
        let mut state = self.state.lock();
        state.pending = true;
        state.verbose |= verbose;
        self.changed.notify_all();
        state.started + 1
    }

    /// Blocks until the cycle named by `ticket` completes. Returns false if scanning is suspended
    /// or shut down first.
    pub fn wait_for(&self, ticket: u64) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.completed >= ticket {
                return true;
            }
            if state.shutdown || (state.suspended && !state.scanning) {
                return false;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Stops periodic and requested scans, waiting for a cycle in progress to finish.
    pub fn suspend(&self) {
        let mut state = self.state.lock();
        state.suspended = true;
        self.changed.notify_all();
        while state.scanning {
            self.changed.wait(&mut state);
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.suspended = false;
        self.changed.notify_all();
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    /// The number of cycles completed so far.
    pub fn completed(&self) -> u64 {
        self.state.lock().completed
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.changed.notify_all();
    }

    // Waits for the next cycle to be due. Returns whether it should be verbose, or None on
    // shutdown.
    fn next_cycle(&self, period: Duration) -> Option<bool> {
        let deadline = Instant::now() + period;
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if !state.suspended && (state.pending || Instant::now() >= deadline) {
                break;
            }
            if state.suspended {
                self.changed.wait(&mut state);
            } else {
                self.changed.wait_until(&mut state, deadline);
            }
        }

        state.started += 1;
        state.pending = false;
        state.scanning = true;
        Some(std::mem::take(&mut state.verbose))
    }

    fn finish_cycle(&self) {
        let mut state = self.state.lock();
        state.completed = state.started;
        state.scanning = false;
        self.changed.notify_all();
    }

    // Sleeps for `backoff` unless shut down first. Returns false on shutdown.
    fn pause(&self, backoff: Duration) -> bool {
        let deadline = Instant::now() + backoff;
        let mut state = self.state.lock();
        while !state.shutdown && Instant::now() < deadline {
            self.changed.wait_until(&mut state, deadline);
        }
        !state.shutdown
    }
}

/// Runs the recovery modules on a thread of their own, every `period` and whenever asked.
pub struct PeriodicScanner {
    control: Arc<ScanControl>,
    join: Option<JoinHandle<()>>,
}

impl PeriodicScanner {
    pub fn start(
        modules: Vec<Box<dyn RecoveryModule>>,
        period: Duration,
        backoff: Duration,
    ) -> Result<Self, RecoveryError> {
        let control = Arc::new(ScanControl::default());
        let thread_control = Arc::clone(&control);
        let join = thread::Builder::new()
            .name("tandem-recovery".into())
            .spawn(move || run_scanner(modules, &thread_control, period, backoff))?;

        Ok(PeriodicScanner {
            control,
            join: Some(join),
        })
    }

    pub fn control(&self) -> &Arc<ScanControl> {
        &self.control
    }

    /// Runs a cycle and waits for it. Returns false if scanning is suspended or shut down.
    pub fn scan(&self, verbose: bool) -> bool {
        let ticket = self.control.trigger(verbose);
        self.control.wait_for(ticket)
    }

    pub fn shutdown(&mut self) {
        self.control.shutdown();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("Recovery scanner thread panicked");
            }
        }
    }
}

impl Drop for PeriodicScanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_scanner(
    mut modules: Vec<Box<dyn RecoveryModule>>,
    control: &ScanControl,
    period: Duration,
    backoff: Duration,
) {
    while let Some(verbose) = control.next_cycle(period) {
        run_cycle(&mut modules, control, backoff, verbose);
        control.finish_cycle();
    }
    debug!("Recovery scanner stopped");
}

fn run_cycle(
    modules: &mut [Box<dyn RecoveryModule>],
    control: &ScanControl,
    backoff: Duration,
    verbose: bool,
) {
    for module in modules.iter_mut() {
        if verbose {
            info!("First pass of {} recovery", module.name());
        } else {
            debug!("First pass of {} recovery", module.name());
        }
        module.first_pass();
    }

    if !control.pause(backoff) {
        return;
    }

    for module in modules.iter_mut() {
        if verbose {
            info!("Second pass of {} recovery", module.name());
        } else {
            debug!("Second pass of {} recovery", module.name());
        }
        module.second_pass();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::CallLog;

    struct Probe {
        log: CallLog,
    }

    impl RecoveryModule for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn first_pass(&mut self) {
            self.log.push("probe", "first");
        }

        fn second_pass(&mut self) {
            self.log.push("probe", "second");
        }
    }

    fn scanner(log: &CallLog) -> Result<PeriodicScanner, RecoveryError> {
        PeriodicScanner::start(
            vec![Box::new(Probe { log: log.clone() })],
            Duration::from_secs(3600),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn requested_scan_runs_both_passes_before_returning() -> Result<(), RecoveryError> {
        let log = CallLog::default();
        let mut scanner = scanner(&log)?;

        assert!(scanner.scan(false));
        assert_eq!(log.calls(), vec!["probe:first", "probe:second"]);
        assert!(scanner.scan(true));
        assert_eq!(log.count("probe:second"), 2);
        assert_eq!(scanner.control().completed(), 2);

        scanner.shutdown();
        Ok(())
    }

    #[test]
    fn suspended_scanner_refuses_scans_until_resumed() -> Result<(), RecoveryError> {
        let log = CallLog::default();
        let scanner = scanner(&log)?;

        scanner.control().suspend();
        assert!(scanner.control().is_suspended());
        assert!(!scanner.scan(false));
        assert!(log.calls().is_empty());

        scanner.control().resume();
        assert!(scanner.scan(false));
        assert!(log.count("probe:second") >= 1);
        Ok(())
    }

    #[test]
    fn period_drives_scans_without_requests() -> Result<(), RecoveryError> {
        let log = CallLog::default();
        let scanner = PeriodicScanner::start(
            vec![Box::new(Probe { log: log.clone() })],
            Duration::from_millis(20),
            Duration::from_millis(0),
        )?;

        let deadline = Instant::now() + Duration::from_secs(10);
        while scanner.control().completed() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(scanner.control().completed() >= 2);
        Ok(())
    }
}
