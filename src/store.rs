//! In-memory history of measurements for the current run.

use crate::models::Measurement;

/// Append-only, chronologically ordered list of measurements.
#[derive(Debug, Default)]
pub struct ResultStore {
    results: Vec<Measurement>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a measurement to the end of the history and returns it.
    pub fn append(&mut self, measurement: Measurement) -> &Measurement {
        self.results.push(measurement);
        &self.results[self.results.len() - 1]
    }

    /// Read-only view of every measurement, oldest first.
    pub fn snapshot(&self) -> &[Measurement] {
        &self.results
    }

    pub fn count(&self) -> usize {
        self.results.len()
    }

    pub fn last(&self) -> Option<&Measurement> {
        self.results.last()
    }

    /// The most recent `n` measurements, oldest first.
    pub fn last_n(&self, n: usize) -> &[Measurement] {
        let start = self.results.len().saturating_sub(n);
        &self.results[start..]
    }
}
