//! Measurement records returned by the controller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of `f32` fields in one measurement.
pub const MEASUREMENT_FIELDS: usize = 7;

/// Named field of a [`MeasurementRecord`], in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementField {
    /// Controller loop duration for the timestep.
    Duration,
    /// Measured left wheel speed.
    SpeedLeft,
    /// Measured right wheel speed.
    SpeedRight,
    /// Left infrared sensor reading.
    IrLeft,
    /// Right infrared sensor reading.
    IrRight,
    /// Control output applied to the left motor.
    ControlLeft,
    /// Control output applied to the right motor.
    ControlRight,
}

impl MeasurementField {
    /// Every field, in wire order.
    pub const ALL: [MeasurementField; MEASUREMENT_FIELDS] = [
        MeasurementField::Duration,
        MeasurementField::SpeedLeft,
        MeasurementField::SpeedRight,
        MeasurementField::IrLeft,
        MeasurementField::IrRight,
        MeasurementField::ControlLeft,
        MeasurementField::ControlRight,
    ];

    /// Position of the field in the reply frame.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Column name used in exports.
    pub fn name(self) -> &'static str {
        match self {
            MeasurementField::Duration => "duration",
            MeasurementField::SpeedLeft => "speed_left",
            MeasurementField::SpeedRight => "speed_right",
            MeasurementField::IrLeft => "ir_left",
            MeasurementField::IrRight => "ir_right",
            MeasurementField::ControlLeft => "control_left",
            MeasurementField::ControlRight => "control_right",
        }
    }
}

impl fmt::Display for MeasurementField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Telemetry reported by the controller for one timestep.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Elapsed controller time for the step (s).
    pub duration: f32,
    /// Left wheel speed (mm/s).
    pub speed_left: f32,
    /// Right wheel speed (mm/s).
    pub speed_right: f32,
    /// Left infrared sensor reading.
    pub ir_left: f32,
    /// Right infrared sensor reading.
    pub ir_right: f32,
    /// Control effort applied to the left motor.
    pub control_left: f32,
    /// Control effort applied to the right motor.
    pub control_right: f32,
}

impl MeasurementRecord {
    /// Record from values in wire order.
    pub fn from_array(values: [f32; MEASUREMENT_FIELDS]) -> Self {
        let [duration, speed_left, speed_right, ir_left, ir_right, control_left, control_right] =
            values;
        Self {
            duration,
            speed_left,
            speed_right,
            ir_left,
            ir_right,
            control_left,
            control_right,
        }
    }

    /// Values in wire order.
    pub fn to_array(&self) -> [f32; MEASUREMENT_FIELDS] {
        [
            self.duration,
            self.speed_left,
            self.speed_right,
            self.ir_left,
            self.ir_right,
            self.control_left,
            self.control_right,
        ]
    }

    /// Value of one field.
    pub fn get(&self, field: MeasurementField) -> f32 {
        self.to_array()[field.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_indices_follow_wire_order() {
        for (i, field) in MeasurementField::ALL.iter().enumerate() {
            assert_eq!(field.index(), i);
        }
        assert_eq!(MeasurementField::Duration.name(), "duration");
        assert_eq!(MeasurementField::ControlRight.name(), "control_right");
    }

    #[test]
    fn get_reads_the_named_field() {
        let rec = MeasurementRecord::from_array([0.1, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(rec.get(MeasurementField::Duration), 0.1);
        assert_eq!(rec.speed_right, 3.0);
        assert_eq!(rec.get(MeasurementField::IrRight), 5.0);
        assert_eq!(rec.get(MeasurementField::ControlRight), 7.0);
    }
}
