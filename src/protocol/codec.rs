//! Binary framing for command and measurement frames.
//!
//! # Wire Format
//!
//! Outbound (client to controller):
//!
//! ```text
//! +--------+----------------------------+
//! | tag:u8 | arity(tag) x f32           |
//! +--------+----------------------------+
//! ```
//!
//! Inbound (controller to client), always 28 bytes:
//!
//! ```text
//! +----------+------------+-------------+---------+----------+--------------+---------------+
//! | duration | speed_left | speed_right | ir_left | ir_right | control_left | control_right |
//! +----------+------------+-------------+---------+----------+--------------+---------------+
//! ```
//!
//! Frames carry no length field; the receiver derives it from the tag.
//!
//! # Byte Order
//!
//! All floats are IEEE-754 single precision, **little-endian**. The controller
//! firmware writes its native layout, which is little-endian on every board the
//! link targets, so fixing LE here keeps interop while making the order
//! independent of the client host.

use super::command::CommandKind;
use super::measurement::{MeasurementRecord, MEASUREMENT_FIELDS};
use crate::error::{DecodeError, ValidationError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of one encoded float.
pub const FLOAT_SIZE: usize = 4;

/// Size of one reply frame.
pub const MEASUREMENT_FRAME_LEN: usize = MEASUREMENT_FIELDS * FLOAT_SIZE;

/// Encode a command frame from a kind and a raw payload.
///
/// Fails if the payload length does not match the kind's arity, since the
/// receiver could not otherwise find the frame boundary.
pub fn encode_command(kind: CommandKind, payload: &[f32]) -> Result<Bytes, ValidationError> {
    if payload.len() != kind.arity() {
        return Err(ValidationError::ArityMismatch {
            kind,
            row: 0,
            expected: kind.arity(),
            actual: payload.len(),
        });
    }

    Ok(write_frame(kind, payload))
}

/// Tag byte followed by the payload floats, little-endian. The caller
/// guarantees `payload.len() == kind.arity()`.
pub(crate) fn write_frame(kind: CommandKind, payload: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len() * FLOAT_SIZE);
    buf.put_u8(kind.tag());
    for &value in payload {
        buf.put_f32_le(value);
    }
    buf.freeze()
}

/// The end-of-session frame: a bare `ConnectionEnd` tag.
pub fn encode_connection_end() -> Bytes {
    Bytes::from_static(&[CommandKind::ConnectionEnd as u8])
}

/// Decode one reply frame.
pub fn decode_measurement(frame: &[u8]) -> Result<MeasurementRecord, DecodeError> {
    if frame.len() != MEASUREMENT_FRAME_LEN {
        return Err(DecodeError::LengthMismatch {
            expected: MEASUREMENT_FRAME_LEN,
            actual: frame.len(),
        });
    }

    let mut cursor = frame;
    let mut values = [0.0f32; MEASUREMENT_FIELDS];
    for value in values.iter_mut() {
        *value = cursor.get_f32_le();
    }
    Ok(MeasurementRecord::from_array(values))
}

/// Encode a record as the controller would send it.
///
/// The client never sends replies; this is the inverse framing used by
/// device simulators and test fixtures.
pub fn encode_measurement(record: &MeasurementRecord) -> Bytes {
    let mut buf = BytesMut::with_capacity(MEASUREMENT_FRAME_LEN);
    for value in record.to_array() {
        buf.put_f32_le(value);
    }
    buf.freeze()
}
