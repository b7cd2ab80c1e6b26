//! # Robot Link
//!
//! Client-side protocol engine for a remote two-wheeled motor controller.
//! A session streams a time-indexed schedule of setpoints to the controller
//! over TCP, one frame per timestep, and records the 28-byte measurement the
//! controller sends back for each of them.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: Command kinds, typed setpoints, measurement records and
//!   the little-endian wire codec.
//! - **`schedule`**: Validated, single-kind setpoint schedules.
//! - **`buffer`**: Pre-sized measurement buffer with a single writer and
//!   any number of concurrent readers.
//! - **`connection`**: The transport owner: connect, reconnect, framed send and
//!   receive, graceful close.
//! - **`session`**: Drives a schedule through the connection with
//!   reconnect-and-resend recovery.
//! - **`recovery`**: Retry policies and cancellation.
//! - **`config`**: Layered configuration (defaults, TOML, environment).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`export`**: CSV export of recorded measurements (`storage_csv`).
//! - **`error`**: The error hierarchy.
//!
//! ## Example
//!
//! ```no_run
//! use robot_link::{LinkConfig, SessionDriver, SetpointSchedule};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LinkConfig::load()?;
//! let schedule = SetpointSchedule::motor_control(&[200.0, 0.0], &[-200.0, 0.0])?;
//!
//! let mut driver = SessionDriver::from_config(&config, schedule);
//! let measurements = driver.reader();
//! driver.run().await?;
//!
//! for record in measurements.snapshot() {
//!     println!("{record:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
#[cfg(feature = "storage_csv")]
pub mod export;
pub mod logging;
pub mod protocol;
pub mod recovery;
pub mod schedule;
pub mod session;

pub use buffer::{MeasurementBuffer, MeasurementReader};
pub use config::LinkConfig;
pub use connection::{ConnectionManager, Connector, LinkState, TcpConnector, Timeouts};
pub use error::{
    DecodeError, LinkError, LinkResult, ProtocolError, TransportError, ValidationError,
};
pub use protocol::{CommandKind, MeasurementField, MeasurementRecord, PidGains, Setpoint};
pub use recovery::{CancelHandle, CancelSignal, RetryPolicy};
pub use schedule::SetpointSchedule;
pub use session::{spawn_session, SessionDriver, SessionHandle, SessionOptions, SessionOutcome};
