//! Command kinds and setpoint payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of command tags understood by the controller.
///
/// The tag fixes the payload arity for the whole frame; frames carry no
/// length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandKind {
    /// No control input, measurement-only recording.
    None = 0,
    /// End-of-session signal. Never part of a schedule.
    ConnectionEnd = 1,
    /// Raw left/right actuator command.
    MotorControl = 2,
    /// PID gains `(kp, ki, kd, tau)` for the left wheel loop.
    PidLeft = 3,
    /// PID gains `(kp, ki, kd, tau)` for the right wheel loop.
    PidRight = 4,
    /// Left/right target speed.
    SpeedControl = 5,
}

impl CommandKind {
    /// Every kind, in tag order.
    pub const ALL: [CommandKind; 6] = [
        CommandKind::None,
        CommandKind::ConnectionEnd,
        CommandKind::MotorControl,
        CommandKind::PidLeft,
        CommandKind::PidRight,
        CommandKind::SpeedControl,
    ];

    /// Kind for a wire tag, `None` for unknown tags.
    pub fn from_tag(value: u8) -> Option<Self> {
        match value {
            0 => Some(CommandKind::None),
            1 => Some(CommandKind::ConnectionEnd),
            2 => Some(CommandKind::MotorControl),
            3 => Some(CommandKind::PidLeft),
            4 => Some(CommandKind::PidRight),
            5 => Some(CommandKind::SpeedControl),
            _ => None,
        }
    }

    /// Wire tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Number of `f32` values that follow the tag on the wire.
    pub fn arity(self) -> usize {
        match self {
            CommandKind::None | CommandKind::ConnectionEnd => 0,
            CommandKind::MotorControl | CommandKind::SpeedControl => 2,
            CommandKind::PidLeft | CommandKind::PidRight => 4,
        }
    }

    /// Whether a schedule may be built from this kind.
    pub fn is_schedulable(self) -> bool {
        self != CommandKind::ConnectionEnd
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommandKind::None => "None",
            CommandKind::ConnectionEnd => "ConnectionEnd",
            CommandKind::MotorControl => "MotorControl",
            CommandKind::PidLeft => "PidLeft",
            CommandKind::PidRight => "PidRight",
            CommandKind::SpeedControl => "SpeedControl",
        };
        write!(f, "{}", label)
    }
}

/// Gains for one wheel's PID speed loop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain.
    pub kp: f32,
    /// Integral gain.
    pub ki: f32,
    /// Derivative gain.
    pub kd: f32,
    /// Derivative filter time constant.
    pub tau: f32,
}

impl PidGains {
    /// Gains in wire order.
    pub fn new(kp: f32, ki: f32, kd: f32, tau: f32) -> Self {
        Self { kp, ki, kd, tau }
    }

    fn to_array(self) -> [f32; 4] {
        [self.kp, self.ki, self.kd, self.tau]
    }
}

/// One timestep's control input, tagged with its command kind.
///
/// The variant fixes the payload arity, so a `Setpoint` always encodes to a
/// well-formed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Setpoint {
    /// No control input; the controller only reports measurements.
    Measure,
    /// Raw actuator command per wheel.
    MotorControl {
        /// Left motor command.
        left: f32,
        /// Right motor command.
        right: f32,
    },
    /// Gains for the left wheel loop.
    PidLeft(PidGains),
    /// Gains for the right wheel loop.
    PidRight(PidGains),
    /// Target speed per wheel.
    SpeedControl {
        /// Left wheel target speed.
        left: f32,
        /// Right wheel target speed.
        right: f32,
    },
}

impl Setpoint {
    /// Build a setpoint from a kind and a raw payload row.
    ///
    /// Returns `None` if the row length does not match the kind's arity or
    /// the kind is `ConnectionEnd`.
    pub fn from_row(kind: CommandKind, row: &[f32]) -> Option<Self> {
        if row.len() != kind.arity() {
            return None;
        }
        match kind {
            CommandKind::None => Some(Setpoint::Measure),
            CommandKind::ConnectionEnd => None,
            CommandKind::MotorControl => Some(Setpoint::MotorControl {
                left: row[0],
                right: row[1],
            }),
            CommandKind::SpeedControl => Some(Setpoint::SpeedControl {
                left: row[0],
                right: row[1],
            }),
            CommandKind::PidLeft => Some(Setpoint::PidLeft(PidGains::new(
                row[0], row[1], row[2], row[3],
            ))),
            CommandKind::PidRight => Some(Setpoint::PidRight(PidGains::new(
                row[0], row[1], row[2], row[3],
            ))),
        }
    }

    /// Command kind this setpoint encodes as.
    pub fn kind(&self) -> CommandKind {
        match self {
            Setpoint::Measure => CommandKind::None,
            Setpoint::MotorControl { .. } => CommandKind::MotorControl,
            Setpoint::PidLeft(_) => CommandKind::PidLeft,
            Setpoint::PidRight(_) => CommandKind::PidRight,
            Setpoint::SpeedControl { .. } => CommandKind::SpeedControl,
        }
    }

    /// Payload values in wire order.
    pub fn payload(&self) -> Vec<f32> {
        match *self {
            Setpoint::Measure => Vec::new(),
            Setpoint::MotorControl { left, right } | Setpoint::SpeedControl { left, right } => {
                vec![left, right]
            }
            Setpoint::PidLeft(gains) | Setpoint::PidRight(gains) => gains.to_array().to_vec(),
        }
    }

    /// Encode this setpoint as an outbound command frame.
    pub fn encode(&self) -> Bytes {
        super::codec::write_frame(self.kind(), &self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_from_tag() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(CommandKind::from_tag(6), None);
        assert_eq!(CommandKind::from_tag(0xFF), None);
    }

    #[test]
    fn arity_table() {
        assert_eq!(CommandKind::None.arity(), 0);
        assert_eq!(CommandKind::ConnectionEnd.arity(), 0);
        assert_eq!(CommandKind::MotorControl.arity(), 2);
        assert_eq!(CommandKind::PidLeft.arity(), 4);
        assert_eq!(CommandKind::PidRight.arity(), 4);
        assert_eq!(CommandKind::SpeedControl.arity(), 2);
    }

    #[test]
    fn only_connection_end_is_unschedulable() {
        let unschedulable: Vec<_> = CommandKind::ALL
            .into_iter()
            .filter(|k| !k.is_schedulable())
            .collect();
        assert_eq!(unschedulable, vec![CommandKind::ConnectionEnd]);
    }

    #[test]
    fn from_row_rejects_wrong_arity() {
        assert!(Setpoint::from_row(CommandKind::MotorControl, &[1.0]).is_none());
        assert!(Setpoint::from_row(CommandKind::PidLeft, &[1.0, 2.0]).is_none());
        assert!(Setpoint::from_row(CommandKind::None, &[1.0]).is_none());
        assert!(Setpoint::from_row(CommandKind::ConnectionEnd, &[]).is_none());
    }

    #[test]
    fn from_row_preserves_payload_order() {
        let sp = Setpoint::from_row(CommandKind::PidRight, &[0.5, 1.0, 0.0, 0.02]).unwrap();
        assert_eq!(sp.kind(), CommandKind::PidRight);
        assert_eq!(sp.payload(), vec![0.5, 1.0, 0.0, 0.02]);

        let sp = Setpoint::from_row(CommandKind::SpeedControl, &[200.0, -200.0]).unwrap();
        assert_eq!(
            sp,
            Setpoint::SpeedControl {
                left: 200.0,
                right: -200.0
            }
        );
    }

    #[test]
    fn measure_encodes_to_a_single_tag_byte() {
        assert_eq!(Setpoint::Measure.encode().as_ref(), &[0u8]);
    }
}
