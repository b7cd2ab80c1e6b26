//! Fuzz target for setpoint frame encoding.
//!
//! Tests:
//! - Arbitrary tags and payload lengths
//! - Frame length is always 1 + 4 * arity when accepted

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use robot_link::protocol::encode_command;
use robot_link::CommandKind;

#[derive(Debug, Arbitrary)]
struct CommandInput {
    tag: u8,
    payload: Vec<f32>,
}

fuzz_target!(|input: CommandInput| {
    let Some(kind) = CommandKind::from_tag(input.tag) else {
        return;
    };

    match encode_command(kind, &input.payload) {
        Ok(frame) => {
            assert_eq!(input.payload.len(), kind.arity());
            assert_eq!(frame.len(), 1 + 4 * kind.arity());
            assert_eq!(frame[0], input.tag);
        }
        Err(_) => assert_ne!(input.payload.len(), kind.arity()),
    }
});
