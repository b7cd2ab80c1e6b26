//! Setpoint schedules.
//!
//! A schedule is the ordered list of setpoints sent during one session, one
//! per timestep, all of the same [`CommandKind`]. Schedules are validated when
//! built and immutable afterwards; switching command kinds means building a new
//! schedule.

use crate::error::ValidationError;
use crate::protocol::{CommandKind, PidGains, Setpoint};

/// Timestep-indexed sequence of setpoints sharing one command kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SetpointSchedule {
    kind: CommandKind,
    rows: Vec<Setpoint>,
}

impl SetpointSchedule {
    /// Build a schedule from a `length x arity` table of raw values.
    ///
    /// # Errors
    /// - `EmptySchedule` if `rows` is empty
    /// - `NotSchedulable` for `ConnectionEnd`
    /// - `ArityMismatch` if any row's length differs from `kind.arity()`
    pub fn new<R: AsRef<[f32]>>(kind: CommandKind, rows: &[R]) -> Result<Self, ValidationError> {
        if !kind.is_schedulable() {
            return Err(ValidationError::NotSchedulable(kind));
        }
        if rows.is_empty() {
            return Err(ValidationError::EmptySchedule);
        }

        let rows = rows
            .iter()
            .enumerate()
            .map(|(row, values)| {
                let values = values.as_ref();
                Setpoint::from_row(kind, values).ok_or(ValidationError::ArityMismatch {
                    kind,
                    row,
                    expected: kind.arity(),
                    actual: values.len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { kind, rows })
    }

    /// Build a schedule from typed setpoints, which must all share one kind.
    pub fn from_setpoints(rows: Vec<Setpoint>) -> Result<Self, ValidationError> {
        let kind = rows
            .first()
            .map(Setpoint::kind)
            .ok_or(ValidationError::EmptySchedule)?;

        if let Some((row, other)) = rows.iter().enumerate().find(|(_, sp)| sp.kind() != kind) {
            return Err(ValidationError::MixedKinds {
                row,
                expected: kind,
                actual: other.kind(),
            });
        }

        Ok(Self { kind, rows })
    }

    /// Record `num_measurements` timesteps without sending any control input.
    pub fn measurement_only(num_measurements: usize) -> Result<Self, ValidationError> {
        if num_measurements == 0 {
            return Err(ValidationError::EmptySchedule);
        }
        Ok(Self {
            kind: CommandKind::None,
            rows: vec![Setpoint::Measure; num_measurements],
        })
    }

    /// Raw actuator trajectory from matching left/right sample vectors.
    pub fn motor_control(left: &[f32], right: &[f32]) -> Result<Self, ValidationError> {
        Self::paired(left, right, |left, right| Setpoint::MotorControl { left, right })
    }

    /// Target speed profile from matching left/right sample vectors.
    pub fn speed_control(left: &[f32], right: &[f32]) -> Result<Self, ValidationError> {
        Self::paired(left, right, |left, right| Setpoint::SpeedControl { left, right })
    }

    /// Single-step schedule configuring the left PID loop.
    pub fn pid_left(gains: PidGains) -> Self {
        Self {
            kind: CommandKind::PidLeft,
            rows: vec![Setpoint::PidLeft(gains)],
        }
    }

    /// Single-step schedule configuring the right PID loop.
    pub fn pid_right(gains: PidGains) -> Self {
        Self {
            kind: CommandKind::PidRight,
            rows: vec![Setpoint::PidRight(gains)],
        }
    }

    fn paired(
        left: &[f32],
        right: &[f32],
        make: impl Fn(f32, f32) -> Setpoint,
    ) -> Result<Self, ValidationError> {
        if left.len() != right.len() {
            return Err(ValidationError::LengthMismatch {
                left: left.len(),
                right: right.len(),
            });
        }
        let rows = left
            .iter()
            .zip(right)
            .map(|(&l, &r)| make(l, r))
            .collect();
        Self::from_setpoints(rows)
    }

    /// Kind shared by every row.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Number of timesteps.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Payload values per timestep.
    pub fn arity(&self) -> usize {
        self.kind.arity()
    }

    /// Setpoint for `timestep`.
    pub fn row(&self, timestep: usize) -> Option<&Setpoint> {
        self.rows.get(timestep)
    }

    /// Setpoints in timestep order.
    pub fn iter(&self) -> impl Iterator<Item = &Setpoint> {
        self.rows.iter()
    }
}
