//! # Polling Supervisor
//!
//! Runs the read/decode/translate/publish loop on a background task.
//!
//! ```text
//! Idle --start()--> Running --stop()--> Draining --worker exits--> Stopped
//!                      |                                              ^
//!                      +------------- fatal error / panic ------------+
//! ```
//!
//! The stop request is cooperative: it is observed at the top of the next
//! loop iteration, so a read in progress finishes (at most one read timeout)
//! before the worker exits. `stop()` waits on the worker's join handle.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DeviceConfiguration;
use crate::ecometer::decoder::{decode_frame, verify_crc};
use crate::ecometer::measurement::translate;
use crate::error::{EcometerError, Result};
use crate::serial::port_trait::SerialOpener;
use crate::serial::FrameReader;
use crate::telemetry::sink::{MeasurementSink, UnitUpdate};

/// Granularity of the interruptible reconnect pause
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle state of the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Created, not started
    Idle,
    /// Worker loop active
    Running,
    /// Stop requested, worker finishing its current iteration
    Draining,
    /// Worker has exited
    Stopped,
}

/// What one loop iteration produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A live frame was translated and published
    Published,
    /// A valid frame without the LIVE command was skipped
    Ignored,
}

type SharedState = Arc<Mutex<SupervisorState>>;

fn read_state(state: &SharedState) -> SupervisorState {
    match state.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn write_state(state: &SharedState, next: SupervisorState) {
    match state.lock() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}

/// Owns the background polling task
pub struct PollingSupervisor<O, S> {
    config: Arc<DeviceConfiguration>,
    parts: Option<(O, S)>,
    state: SharedState,
    worker: Option<JoinHandle<()>>,
}

impl<O, S> std::fmt::Debug for PollingSupervisor<O, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingSupervisor")
            .field("port", &self.config.port)
            .field("state", &read_state(&self.state))
            .finish_non_exhaustive()
    }
}

impl<O, S> PollingSupervisor<O, S>
where
    O: SerialOpener + 'static,
    S: MeasurementSink + 'static,
{
    /// Create an idle supervisor
    ///
    /// # Arguments
    ///
    /// * `config` - Read-only device settings
    /// * `opener` - Serial port factory, used once per iteration
    /// * `sink` - Receiver of the five unit updates per live frame
    pub fn new(config: Arc<DeviceConfiguration>, opener: O, sink: S) -> Self {
        Self {
            config,
            parts: Some((opener, sink)),
            state: Arc::new(Mutex::new(SupervisorState::Idle)),
            worker: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SupervisorState {
        read_state(&self.state)
    }

    /// Spawn the polling task
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` unless the supervisor is idle.
    pub fn start(&mut self) -> Result<()> {
        let (opener, sink) = match (self.state(), self.parts.take()) {
            (SupervisorState::Idle, Some(parts)) => parts,
            (_, parts) => {
                self.parts = parts;
                return Err(EcometerError::AlreadyStarted);
            }
        };

        write_state(&self.state, SupervisorState::Running);
        debug!("Starting device task");

        let worker = PollWorker {
            config: Arc::clone(&self.config),
            reader: FrameReader::new(self.config.read_timeout),
            opener,
            sink,
            state: Arc::clone(&self.state),
        };
        let state = Arc::clone(&self.state);

        self.worker = Some(tokio::spawn(async move {
            match tokio::spawn(worker.run()).await {
                Ok(Ok(())) => info!("Stopping device monitoring"),
                Ok(Err(e)) => error!("Device monitoring stopped: {}", e),
                Err(e) if e.is_panic() => error!("Device monitoring panicked: {}", e),
                Err(e) => error!("Device monitoring aborted: {}", e),
            }
            write_state(&state, SupervisorState::Stopped);
        }));

        Ok(())
    }

    /// Request termination and wait until the worker has exited
    ///
    /// Returns immediately if the supervisor never started.
    pub async fn stop(&mut self) {
        {
            let mut state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *state == SupervisorState::Running {
                *state = SupervisorState::Draining;
            }
        }
        debug!("Stop requested");

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("Supervisor task failed: {}", e);
            }
        }

        if self.state() != SupervisorState::Idle {
            write_state(&self.state, SupervisorState::Stopped);
        }
        debug!("Stopped");
    }
}

/// State moved into the background task
struct PollWorker<O, S> {
    config: Arc<DeviceConfiguration>,
    reader: FrameReader,
    opener: O,
    sink: S,
    state: SharedState,
}

impl<O: SerialOpener, S: MeasurementSink> PollWorker<O, S> {
    fn is_running(&self) -> bool {
        read_state(&self.state) == SupervisorState::Running
    }

    /// Loop until stop is requested or a non-recoverable error occurs
    async fn run(mut self) -> Result<()> {
        info!("Entering device monitoring");

        while self.is_running() {
            debug!("Reading");
            match self.poll_once().await {
                Ok(PollOutcome::Published) => {}
                Ok(PollOutcome::Ignored) => {}
                Err(EcometerError::Timeout) => debug!("No frame within read timeout"),
                Err(e @ EcometerError::Serial(_)) => {
                    warn!("{}", e);
                    pause_unless_stopped(&self.state, self.config.reconnect_interval).await;
                }
                Err(e) if e.is_recoverable() => warn!("Discarding frame: {}", e),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// One open/read/decode/translate/publish cycle
    async fn poll_once(&mut self) -> Result<PollOutcome> {
        let frame = self
            .reader
            .open_and_read_one_frame(&self.opener, &self.config.port)
            .await?;

        if self.config.verify_crc {
            verify_crc(&frame)?;
        }

        let datagram = decode_frame(&frame)?;
        debug!("Parsed message");

        if !datagram.command.is_live() {
            debug!("Ignoring datagram with command 0x{:02X}", datagram.command.bits());
            return Ok(PollOutcome::Ignored);
        }

        info!("Received live data");
        let measurement = translate(&datagram, self.config.level_reference_cm(), Utc::now())?;

        for update in UnitUpdate::from_measurement(&measurement) {
            self.sink.publish(update)?;
        }

        Ok(PollOutcome::Published)
    }
}

/// Sleep for `duration`, returning early once stop is requested
async fn pause_unless_stopped(state: &SharedState, duration: Duration) {
    let deadline = tokio::time::Instant::now() + duration;

    while read_state(state) == SupervisorState::Running {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep((deadline - now).min(STOP_CHECK_INTERVAL)).await;
    }
}
