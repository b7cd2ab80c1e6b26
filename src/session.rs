//! Session driver: runs a setpoint schedule against the controller.
//!
//! For each timestep the driver sends the setpoint frame, waits for the
//! 28-byte measurement reply, records it and sleeps the pacing interval. Any
//! transport failure, short read or undecodable reply triggers a reconnect
//! and a resend of the *same* timestep, so delivery is at-least-once. A
//! recorded timestep is never sent again.
//!
//! ```text
//!   t = written()
//!   loop:
//!     send(row[t]) --err--> reconnect --+
//!        |                              |
//!     recv(28)     --err--> reconnect --+--> retry row[t]
//!        |
//!     buffer[t] = decode(reply); t += 1; sleep(pacing)
//! ```
//!
//! # Back-to-back schedules
//!
//! `run` is connect → drive → close. To send several schedules over one open
//! connection (e.g. PID gains, then a speed profile), call `connect`, then
//! `load_schedule` + `drive` per schedule, then `close`.

use crate::buffer::{MeasurementBuffer, MeasurementReader};
use crate::config::LinkConfig;
use crate::connection::{ConnectionManager, LinkState};
use crate::error::{LinkError, LinkResult, TransportError};
use crate::protocol::{decode_measurement, MeasurementRecord, Setpoint, MEASUREMENT_FRAME_LEN};
use crate::recovery::{CancelHandle, CancelSignal, Recoverable, RetryPolicy};
use crate::schedule::SetpointSchedule;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

/// Pacing and recovery knobs for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Sleep after each recorded timestep.
    pub pacing: Duration,
    /// Recovery policy for per-timestep exchanges.
    pub retry: RetryPolicy,
    /// Recovery policy for the end-of-session frame.
    pub close_retry: RetryPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(10),
            retry: RetryPolicy::unbounded(),
            close_retry: RetryPolicy::unbounded(),
        }
    }
}

impl From<&LinkConfig> for SessionOptions {
    fn from(config: &LinkConfig) -> Self {
        Self {
            pacing: config.session.pacing,
            retry: config.retry.clone(),
            close_retry: config.close_retry.clone(),
        }
    }
}

/// Drives one schedule at a time over a managed connection.
pub struct SessionDriver {
    connection: ConnectionManager,
    schedule: SetpointSchedule,
    buffer: MeasurementBuffer,
    options: SessionOptions,
    cancel: CancelHandle,
}

impl SessionDriver {
    /// Driver over `connection` with a zeroed buffer sized to `schedule`.
    pub fn new(
        connection: ConnectionManager,
        schedule: SetpointSchedule,
        options: SessionOptions,
    ) -> Self {
        let buffer = MeasurementBuffer::new(schedule.len());
        Self {
            connection,
            schedule,
            buffer,
            options,
            cancel: CancelHandle::new(),
        }
    }

    /// TCP session for the configured device.
    pub fn from_config(config: &LinkConfig, schedule: SetpointSchedule) -> Self {
        Self::new(
            ConnectionManager::from_config(config),
            schedule,
            SessionOptions::from(config),
        )
    }

    /// Replace the schedule and start a fresh measurement buffer.
    ///
    /// Readers obtained before this call keep the previous buffer.
    pub fn load_schedule(&mut self, schedule: SetpointSchedule) -> MeasurementReader {
        info!(kind = %schedule.kind(), len = schedule.len(), "Loading schedule");
        self.buffer = MeasurementBuffer::new(schedule.len());
        self.schedule = schedule;
        self.buffer.reader()
    }

    /// Currently loaded schedule.
    pub fn schedule(&self) -> &SetpointSchedule {
        &self.schedule
    }

    /// Read handle for the current schedule's measurements.
    pub fn reader(&self) -> MeasurementReader {
        self.buffer.reader()
    }

    /// The managed connection.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Pacing and recovery options.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Handle that stops the session at its next retry point, backoff or
    /// pacing sleep.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Open the connection. A refused connect is returned, not retried.
    pub async fn connect(&mut self) -> LinkResult<()> {
        let signal = self.cancel.signal();
        signal.guard(self.connection.connect()).await??;
        Ok(())
    }

    /// Send every remaining timestep of the loaded schedule.
    ///
    /// Returns the number of recorded rows, which equals the schedule length
    /// on success.
    #[instrument(skip(self), fields(kind = %self.schedule.kind(), len = self.schedule.len()), err)]
    pub async fn drive(&mut self) -> LinkResult<usize> {
        if self.connection.state() == LinkState::Closed {
            return Err(TransportError::Closed.into());
        }

        let signal = self.cancel.signal();
        for timestep in self.buffer.written()..self.schedule.len() {
            let Some(setpoint) = self.schedule.row(timestep).copied() else {
                break;
            };

            let record = self.step(timestep, &setpoint, &signal).await?;
            self.buffer.record(timestep, record)?;
            info!(timestep, ?record, "Recorded measurement");

            signal.sleep(self.options.pacing).await?;
        }

        Ok(self.buffer.written())
    }

    /// Send the end-of-session frame and close the transport.
    pub async fn close(&mut self) -> LinkResult<()> {
        let signal = self.cancel.signal();
        self.connection.close(&self.options.close_retry, &signal).await
    }

    /// Connect, drive the whole schedule, close.
    ///
    /// The transport is closed even if driving fails; the driving error takes
    /// precedence over a close error.
    pub async fn run(&mut self) -> LinkResult<usize> {
        self.connect().await?;
        let driven = self.drive().await;
        let closed = self.close().await;
        let recorded = driven?;
        closed?;
        Ok(recorded)
    }

    /// Run the whole session on a dedicated task.
    pub fn spawn(self) -> SessionHandle {
        self.spawn_task(false)
    }

    /// Drive the loaded schedule on a dedicated task, leaving the
    /// connection open afterwards.
    pub fn spawn_drive(self) -> SessionHandle {
        self.spawn_task(true)
    }

    fn spawn_task(mut self, drive_only: bool) -> SessionHandle {
        let reader = self.reader();
        let cancel = self.cancel_handle();
        let task = tokio::spawn(async move {
            let result = if drive_only {
                self.drive().await
            } else {
                self.run().await
            };
            SessionOutcome {
                driver: self,
                result,
            }
        });
        SessionHandle {
            reader,
            cancel,
            task,
        }
    }

    /// Exchange one timestep, recovering until it succeeds or the policy or
    /// cancellation stops it.
    async fn step(
        &mut self,
        timestep: usize,
        setpoint: &Setpoint,
        signal: &CancelSignal,
    ) -> LinkResult<MeasurementRecord> {
        let mut failures = 0u32;
        let mut reconnect_pending = false;

        loop {
            signal.check()?;

            let error = if reconnect_pending {
                match signal.guard(self.connection.recover()).await? {
                    Ok(()) => {
                        reconnect_pending = false;
                        continue;
                    }
                    Err(e) if e.is_recoverable() => e,
                    Err(e) => return Err(e),
                }
            } else {
                match signal.guard(self.exchange(timestep, setpoint)).await? {
                    Ok(record) => return Ok(record),
                    Err(e) if e.is_recoverable() => e,
                    Err(e) => return Err(e),
                }
            };

            failures += 1;
            warn!(timestep, attempt = failures, error = %error, "Exchange failed, reconnecting");
            if !self.options.retry.allows_retry(failures) {
                return Err(LinkError::RetriesExhausted {
                    operation: "exchange",
                    attempts: failures,
                });
            }
            signal.sleep(self.options.retry.backoff).await?;
            reconnect_pending = true;
        }
    }

    async fn exchange(
        &mut self,
        timestep: usize,
        setpoint: &Setpoint,
    ) -> LinkResult<MeasurementRecord> {
        let frame = setpoint.encode();
        info!(timestep, kind = %setpoint.kind(), payload = ?setpoint.payload(), "Sending setpoint");
        self.connection.send_frame(&frame).await?;

        let reply = self.connection.recv_frame(MEASUREMENT_FRAME_LEN).await?;
        let record = decode_measurement(&reply)?;
        debug!(timestep, ?record, "Received measurement");
        Ok(record)
    }
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("connection", &self.connection)
            .field("kind", &self.schedule.kind())
            .field("buffer", &self.buffer)
            .field("options", &self.options)
            .finish()
    }
}

/// Run `driver` to completion on its own task.
pub fn spawn_session(driver: SessionDriver) -> SessionHandle {
    driver.spawn()
}

/// Result of a spawned session, handing the driver back to the caller.
#[derive(Debug)]
pub struct SessionOutcome {
    /// The driver, for reuse or inspection.
    pub driver: SessionDriver,
    /// Recorded row count, or why the session stopped.
    pub result: LinkResult<usize>,
}

/// Handle to a session running on its own task.
#[derive(Debug)]
pub struct SessionHandle {
    reader: MeasurementReader,
    cancel: CancelHandle,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    /// Measurements of the running schedule.
    pub fn reader(&self) -> MeasurementReader {
        self.reader.clone()
    }

    /// Ask the session to stop at its next retry point or sleep.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task to end.
    pub async fn join(self) -> Result<SessionOutcome, JoinError> {
        self.task.await
    }
}
