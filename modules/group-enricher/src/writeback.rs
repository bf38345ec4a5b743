use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use sheets_client::a1;
use tracing::{debug, error, info};

use crate::traits::SheetSink;
use crate::types::{GroupRecord, RecordField};

/// Outcome of writing one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Records whose row was written.
    pub written: usize,
    /// Records whose range write failed.
    pub failed: usize,
    /// Records with no row number.
    pub skipped: usize,
    /// Ranges sent to the sheet, in order.
    pub ranges: Vec<String>,
}

/// Writes records back to the rows they were read from, one cell per field
/// starting at `start_column`.
pub struct SheetWriter {
    sink: Arc<dyn SheetSink>,
    sheet: String,
    start_column: String,
    fields: Vec<RecordField>,
}

impl SheetWriter {
    pub fn new(
        sink: Arc<dyn SheetSink>,
        sheet: impl Into<String>,
        start_column: impl Into<String>,
        fields: &[RecordField],
    ) -> Self {
        Self {
            sink,
            sheet: sheet.into(),
            start_column: start_column.into(),
            fields: fields.to_vec(),
        }
    }

    /// Range covering rows `first_row..=last_row` across every field column.
    pub fn range_for(&self, first_row: u32, last_row: u32) -> Result<String> {
        let width = self.fields.len() as u32;
        Ok(a1::block_range(&self.start_column, width, first_row, last_row)?)
    }

    pub fn rows(&self, records: &[GroupRecord]) -> Vec<Vec<Value>> {
        records.iter().map(|record| self.row(record)).collect()
    }

    fn row(&self, record: &GroupRecord) -> Vec<Value> {
        self.fields.iter().map(|field| field.cell(record)).collect()
    }

    /// Write a flush. Records are grouped into runs of consecutive rows and
    /// each run is one range write; a failed write is logged and the
    /// remaining runs still go out.
    pub async fn write(&self, records: &[GroupRecord]) -> WriteReport {
        let mut report = WriteReport::default();

        let mut placed: Vec<&GroupRecord> = Vec::with_capacity(records.len());
        for record in records {
            if record.column_index().is_some() {
                placed.push(record);
            } else {
                report.skipped += 1;
            }
        }
        placed.sort_by_key(|r| r.column_index());

        for run in contiguous_runs(&placed) {
            let (Some(first_row), Some(last_row)) = (
                run.first().and_then(|r| r.column_index()),
                run.last().and_then(|r| r.column_index()),
            ) else {
                continue;
            };

            let range = match self.range_for(first_row, last_row) {
                Ok(range) => range,
                Err(e) => {
                    error!(first_row, last_row, error = %e, "Cannot build write range");
                    report.failed += run.len();
                    continue;
                }
            };

            let rows: Vec<Vec<Value>> = run.iter().map(|record| self.row(record)).collect();

            match self.sink.write_range(&self.sheet, &range, rows).await {
                Ok(()) => {
                    debug!(range = %range, records = run.len(), "Range written");
                    report.written += run.len();
                }
                Err(e) => {
                    error!(range = %range, records = run.len(), error = %e, "Failed to write range");
                    report.failed += run.len();
                }
            }
            report.ranges.push(range);
        }

        if report.written > 0 {
            info!(
                written = report.written,
                failed = report.failed,
                ranges = report.ranges.len(),
                "Groups uploaded"
            );
        }
        report
    }
}

/// Split row-sorted records into runs of consecutive row numbers.
fn contiguous_runs<'a>(records: &[&'a GroupRecord]) -> Vec<Vec<&'a GroupRecord>> {
    let mut runs: Vec<Vec<&GroupRecord>> = Vec::new();
    for &record in records {
        let extends = runs
            .last()
            .and_then(|run| run.last())
            .and_then(|prev| prev.column_index())
            .zip(record.column_index())
            .is_some_and(|(prev, row)| row == prev + 1);

        match runs.last_mut() {
            Some(run) if extends => run.push(record),
            _ => runs.push(vec![record]),
        }
    }
    runs
}
