//! Target weights written as CSV rows: `timestamp,asset,weight`.

use crate::domain::error::PortconError;
use crate::domain::market::Timestamp;
use crate::domain::optimizer::TargetWeights;
use crate::ports::weights_port::TargetWeightPort;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

pub struct CsvWeightsWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

/// Writer over a file or a discarding sink, chosen at run time.
pub type SessionWeightsWriter = CsvWeightsWriter<Box<dyn Write>>;

impl CsvWeightsWriter<Box<dyn Write>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, PortconError> {
        let file = File::create(path.as_ref())?;
        Self::new(Box::new(file))
    }

    /// Counts rows but keeps nothing.
    pub fn discard() -> Result<Self, PortconError> {
        Self::new(Box::new(io::sink()))
    }
}

impl<W: Write> CsvWeightsWriter<W> {
    pub fn new(inner: W) -> Result<Self, PortconError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer
            .write_record(["timestamp", "asset", "weight"])
            .map_err(csv_error)?;
        Ok(Self { writer, rows: 0 })
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, PortconError> {
        self.writer.into_inner().map_err(|e| PortconError::Data {
            reason: format!("failed to flush weights: {e}"),
        })
    }
}

fn csv_error(e: csv::Error) -> PortconError {
    PortconError::Data {
        reason: format!("failed to write weights: {e}"),
    }
}

impl<W: Write> TargetWeightPort for CsvWeightsWriter<W> {
    fn submit(&mut self, dt: Timestamp, weights: &TargetWeights) -> Result<(), PortconError> {
        let stamp = dt.to_rfc3339();
        for (asset, weight) in weights {
            let weight = weight.to_string();
            self.writer
                .write_record([stamp.as_str(), asset.as_str(), weight.as_str()])
                .map_err(csv_error)?;
            self.rows += 1;
        }
        self.writer.flush()?;
        Ok(())
    }
}
