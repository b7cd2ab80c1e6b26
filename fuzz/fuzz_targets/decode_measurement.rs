//! Fuzz target for measurement frame decoding.
//!
//! Any input must either decode (exactly 28 bytes) or be rejected with a
//! length error, and a decoded record must re-encode to the same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use robot_link::protocol::{decode_measurement, encode_measurement, MEASUREMENT_FRAME_LEN};
use robot_link::DecodeError;

fuzz_target!(|data: &[u8]| {
    match decode_measurement(data) {
        Ok(record) => {
            assert_eq!(data.len(), MEASUREMENT_FRAME_LEN);
            let reencoded = encode_measurement(&record);
            // Bit-exact, NaN payloads included.
            assert_eq!(reencoded.as_ref(), data);
        }
        Err(DecodeError::LengthMismatch { expected, actual }) => {
            assert_eq!(expected, MEASUREMENT_FRAME_LEN);
            assert_eq!(actual, data.len());
            assert_ne!(actual, MEASUREMENT_FRAME_LEN);
        }
    }
});
