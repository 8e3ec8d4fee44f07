use crate::error::{TelemetryError, TelemetryResult};
use crate::logs::{Level, LogRecord, LogSink};
use std::sync::{Arc, Mutex};

/// A log sink keeping every record in memory, for tests.
///
/// Clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLogSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl InMemoryLogSink {
    /// Every record written so far, oldest first.
    pub fn records(&self) -> Result<Vec<LogRecord>, TelemetryError> {
        Ok(self.records.lock()?.clone())
    }

    /// The records written at `level`.
    pub fn records_at(&self, level: Level) -> Result<Vec<LogRecord>, TelemetryError> {
        Ok(self
            .records
            .lock()?
            .iter()
            .filter(|record| record.level == level)
            .cloned()
            .collect())
    }

    /// Forgets every stored record.
    pub fn reset(&self) {
        let _ = self.records.lock().map(|mut records| records.clear());
    }
}

impl LogSink for InMemoryLogSink {
    fn write(&self, record: &LogRecord) -> TelemetryResult {
        self.records.lock()?.push(record.clone());
        Ok(())
    }
}
