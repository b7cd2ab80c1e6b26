//! Wire protocol spoken with the motor controller.
//!
//! - [`command`]: command kinds and typed setpoints
//! - [`measurement`]: the seven-field reply record
//! - [`codec`]: byte-level encode/decode for both directions

pub mod codec;
pub mod command;
pub mod measurement;

pub use codec::{
    decode_measurement, encode_command, encode_connection_end, encode_measurement,
    MEASUREMENT_FRAME_LEN,
};
pub use command::{CommandKind, PidGains, Setpoint};
pub use measurement::{MeasurementField, MeasurementRecord, MEASUREMENT_FIELDS};
