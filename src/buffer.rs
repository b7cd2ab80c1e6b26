//! Measurement buffer shared between the session worker and observers.
//!
//! The buffer is pre-sized to the schedule length and zero-initialised. The
//! session worker owns the only [`MeasurementBuffer`] and writes rows strictly
//! in timestep order; any number of [`MeasurementReader`]s may poll it from
//! other tasks or threads.
//!
//! # Memory Ordering
//!
//! ```text
//! writer:  rows[t] = record        (under write lock)
//!          written.store(t + 1, Release)
//! reader:  n = written.load(Acquire)
//!          rows[0..n]              (under read lock)
//! ```
//!
//! A reader that observes `written == n` therefore sees fully formed records
//! for every row below `n`. Observers that prefer to await progress instead of
//! polling can [`subscribe`](MeasurementReader::subscribe) to a `watch`
//! channel carrying the same count.

use crate::error::ValidationError;
use crate::protocol::{MeasurementField, MeasurementRecord};
use parking_lot::RwLock;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

struct Shared {
    rows: RwLock<Vec<MeasurementRecord>>,
    written: AtomicUsize,
    progress: watch::Sender<usize>,
}

impl Shared {
    fn len(&self) -> usize {
        self.rows.read().len()
    }

    fn written(&self) -> usize {
        self.written.load(Ordering::Acquire)
    }
}

/// Write side of the measurement buffer. Exactly one exists per session.
pub struct MeasurementBuffer {
    shared: Arc<Shared>,
}

impl MeasurementBuffer {
    /// Create a zeroed buffer with `len` rows.
    pub fn new(len: usize) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                rows: RwLock::new(vec![MeasurementRecord::default(); len]),
                written: AtomicUsize::new(0),
                progress,
            }),
        }
    }

    /// Store the record for `timestep` and publish the new count.
    ///
    /// Rows are accepted exactly once and only in increasing order, so
    /// `timestep` must equal the current written count.
    pub fn record(
        &mut self,
        timestep: usize,
        record: MeasurementRecord,
    ) -> Result<usize, ValidationError> {
        let written = self.shared.written.load(Ordering::Relaxed);
        {
            let mut rows = self.shared.rows.write();
            if timestep >= rows.len() {
                return Err(ValidationError::BufferFull {
                    capacity: rows.len(),
                });
            }
            if timestep != written {
                return Err(ValidationError::OutOfOrderWrite {
                    expected: written,
                    actual: timestep,
                });
            }
            rows[timestep] = record;
        }

        let count = timestep + 1;
        self.shared.written.store(count, Ordering::Release);
        self.shared.progress.send_replace(count);
        Ok(count)
    }

    /// A read handle onto this buffer.
    pub fn reader(&self) -> MeasurementReader {
        MeasurementReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of rows, fixed at construction.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// True for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows recorded so far.
    pub fn written(&self) -> usize {
        self.shared.written()
    }
}

impl fmt::Debug for MeasurementBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementBuffer")
            .field("len", &self.len())
            .field("written", &self.written())
            .finish()
    }
}

/// Read-only view of a measurement buffer, safe to use from any thread.
///
/// Only the written prefix is ever exposed; rows that have not been recorded
/// yet are invisible even though the underlying storage is zero-filled.
#[derive(Clone)]
pub struct MeasurementReader {
    shared: Arc<Shared>,
}

impl MeasurementReader {
    /// Total rows (the schedule length).
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// True for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows recorded so far.
    pub fn written(&self) -> usize {
        self.shared.written()
    }

    /// True once every timestep has a record.
    pub fn is_complete(&self) -> bool {
        self.written() == self.len()
    }

    /// The record for `timestep`, if it has been written.
    pub fn row(&self, timestep: usize) -> Option<MeasurementRecord> {
        if timestep >= self.written() {
            return None;
        }
        self.shared.rows.read().get(timestep).copied()
    }

    /// Records in `range`, clamped to the written prefix.
    pub fn rows(&self, range: Range<usize>) -> Vec<MeasurementRecord> {
        let end = range.end.min(self.written());
        let start = range.start.min(end);
        self.shared.rows.read()[start..end].to_vec()
    }

    /// Every record written so far.
    pub fn snapshot(&self) -> Vec<MeasurementRecord> {
        self.rows(0..usize::MAX)
    }

    /// One field across `range`, clamped to the written prefix.
    pub fn series(&self, field: MeasurementField, range: Range<usize>) -> Vec<f32> {
        self.rows(range).iter().map(|rec| rec.get(field)).collect()
    }

    /// Receiver notified with the written count after every recorded row.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.shared.progress.subscribe()
    }
}

impl fmt::Debug for MeasurementReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementReader")
            .field("len", &self.len())
            .field("written", &self.written())
            .finish()
    }
}
