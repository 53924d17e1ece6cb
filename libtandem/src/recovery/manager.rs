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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::RecoveryConfig;
use crate::context::CoordinatorContext;
use crate::error::RecoveryError;
use crate::time::{SystemTimeFactory, TimeSource};

use super::action_module::ActionRecoveryModule;
use super::connection::ConnectionManager;
use super::expiry::{ContactExpiryScanner, ExpiryScanner};
use super::liveness::LivenessServer;
use super::module::RecoveryModule;
use super::periodic::PeriodicScanner;
use super::service::{spawn_service, ServiceHandle};
use super::state_module::ObjectStateRecoveryModule;
use super::status::StatusChecker;
use super::worker::WorkerHandler;

const EXPIRY_POLL: Duration = Duration::from_millis(100);

/// The recovery services of one process.
///
/// Starting a manager advertises the process's liveness service, starts the periodic scanner
/// with the action and object state modules, starts the expiry scanners and opens the recovery
/// worker listener. Dropping it stops everything.
pub struct RecoveryManager {
    liveness: LivenessServer,
    scanner: PeriodicScanner,
    worker: ServiceHandle,
    expiry_shutdown: Arc<AtomicBool>,
    expiry: Option<JoinHandle<()>>,
}

impl RecoveryManager {
    pub fn start(
        context: Arc<CoordinatorContext>,
        config: RecoveryConfig,
    ) -> Result<Self, RecoveryError> {
        RecoveryManager::start_with_clock(context, config, Arc::new(SystemTimeFactory::new()))
    }

    pub fn start_with_clock(
        context: Arc<CoordinatorContext>,
        config: RecoveryConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, RecoveryError> {
        let liveness = LivenessServer::start(
            Arc::clone(&context),
            config.liveness_address(),
            clock.as_ref(),
        )?;

        let checker = Arc::new(StatusChecker::new(
            Arc::clone(&context),
            ConnectionManager::new(
                Arc::clone(context.store()),
                config.socket_timeout(),
                config.connection_attempts(),
            )
            .with_clock(Arc::clone(&clock)),
        ));
        // intentions logs are replayed before object states
        let modules: Vec<Box<dyn RecoveryModule>> = vec![
            Box::new(ActionRecoveryModule::new(
                Arc::clone(&context),
                Arc::clone(&checker),
            )),
            Box::new(ObjectStateRecoveryModule::new(
                Arc::clone(&context),
                Arc::clone(&checker),
            )),
        ];
        let scanner = PeriodicScanner::start(modules, config.period(), config.backoff())?;

        let scanners: Vec<Box<dyn ExpiryScanner>> = vec![Box::new(ContactExpiryScanner::new(
            Arc::clone(&context),
            clock,
            config.contact_retention(),
        ))];
        let expiry_shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&expiry_shutdown);
        let interval = config.expiry_interval();
        let expiry = thread::Builder::new()
            .name("tandem-expiry".into())
            .spawn(move || run_expiry(scanners, interval, &flag))?;

        let worker = spawn_service(
            "recovery worker",
            config.worker_address(),
            Arc::new(WorkerHandler::new(Arc::clone(scanner.control()))),
        )?;

        info!(
            "Recovery manager of process {} started; worker on {}",
            context.process(),
            worker.local_addr()
        );
        Ok(RecoveryManager {
            liveness,
            scanner,
            worker,
            expiry_shutdown,
            expiry: Some(expiry),
        })
    }

    pub fn worker_addr(&self) -> SocketAddr {
        self.worker.local_addr()
    }

    pub fn liveness_addr(&self) -> SocketAddr {
        self.liveness.local_addr()
    }

    /// Runs a full scan cycle and waits for it. Returns false if scanning is suspended.
    pub fn scan(&self) -> bool {
        self.scanner.scan(false)
    }

    /// Stops scanning, waiting for a cycle in progress to finish.
    pub fn suspend(&self) {
        self.scanner.control().suspend();
    }

    pub fn resume(&self) {
        self.scanner.control().resume();
    }

    pub fn shutdown(&mut self) {
        self.worker.shutdown();
        self.scanner.shutdown();
        self.expiry_shutdown.store(true, Ordering::Relaxed);
        if let Some(expiry) = self.expiry.take() {
            if expiry.join().is_err() {
                error!("Expiry scanner thread panicked");
            }
        }
        self.liveness.shutdown();
    }
}

impl Drop for RecoveryManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_expiry(mut scanners: Vec<Box<dyn ExpiryScanner>>, interval: Duration, shutdown: &AtomicBool) {
    loop {
        for scanner in scanners.iter_mut() {
            debug!("Running {} expiry scan", scanner.name());
            scanner.scan();
        }

        let next = Instant::now() + interval;
        while Instant::now() < next {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(EXPIRY_POLL.min(next.saturating_duration_since(Instant::now())));
        }
    }
}
