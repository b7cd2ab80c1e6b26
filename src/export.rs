//! CSV export of recorded measurements.
//!
//! Writes the written prefix of a [`MeasurementReader`] as one row per
//! timestep, preceded by a header of field names:
//!
//! ```text
//! duration,speed_left,speed_right,ir_left,ir_right,control_left,control_right
//! 10,1.5,-1.5,0.25,0.75,200,-200
//! ```

use crate::buffer::MeasurementReader;
use crate::error::LinkResult;
use crate::protocol::MeasurementField;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Write the recorded rows of `reader` to `out`. Returns the row count.
pub fn write_csv<W: Write>(reader: &MeasurementReader, out: W) -> LinkResult<usize> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(MeasurementField::ALL.iter().map(|field| field.name()))
        .map_err(io::Error::from)?;

    let rows = reader.snapshot();
    for record in &rows {
        writer
            .write_record(record.to_array().iter().map(|value| value.to_string()))
            .map_err(io::Error::from)?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Create (or truncate) `path` and export `reader` into it.
pub fn write_csv_file(reader: &MeasurementReader, path: impl AsRef<Path>) -> LinkResult<usize> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let rows = write_csv(reader, file)?;
    info!(path = %path.display(), rows, "Exported measurements to CSV");
    Ok(rows)
}
