//! The run loop: read links, resolve them page by page, enrich slices
//! concurrently and write results back in windows.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::enrichment::{EnrichedSlice, Enricher};
use crate::ids::extract_id;
use crate::task_group::TaskGroup;
use crate::traits::{GroupResolver, SheetSource};
use crate::types::GroupRecord;
use crate::writeback::SheetWriter;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub sheet: String,
    /// 1-based column holding the group links.
    pub url_column: u32,
    /// Row number of the column's first cell.
    pub first_row: u32,
    pub offset: usize,
    /// Rows to take after `offset`; `None` or zero takes the rest.
    pub limit: Option<usize>,
    pub max_groups_per_request: usize,
    pub gpt_groups_limit: usize,
    pub max_groups_to_send: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sheet: "Sheet1".to_string(),
            url_column: 1,
            first_row: 1,
            offset: 0,
            limit: None,
            max_groups_per_request: 500,
            gpt_groups_limit: 10,
            max_groups_to_send: 100,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub ids_queued: usize,
    pub pages_resolved: usize,
    pub slices_submitted: usize,
    pub slices_degraded: usize,
    pub flushes: usize,
    pub records_written: usize,
    pub write_failures: usize,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows read: {}, skipped: {}, queued: {}, pages: {}, slices: {} ({} degraded), flushes: {}, written: {}, write failures: {}",
            self.rows_read,
            self.rows_skipped,
            self.ids_queued,
            self.pages_resolved,
            self.slices_submitted,
            self.slices_degraded,
            self.flushes,
            self.records_written,
            self.write_failures,
        )
    }
}

pub struct Pipeline {
    settings: PipelineSettings,
    source: Arc<dyn SheetSource>,
    resolver: Arc<dyn GroupResolver>,
    enricher: Arc<Enricher>,
    writer: SheetWriter,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        source: Arc<dyn SheetSource>,
        resolver: Arc<dyn GroupResolver>,
        enricher: Arc<Enricher>,
        writer: SheetWriter,
    ) -> Self {
        Self {
            settings,
            source,
            resolver,
            enricher,
            writer,
        }
    }

    /// Read the link column and build the worklist. Rows are numbered from
    /// `first_row`, the offset/limit window is taken over all rows, and
    /// blank rows inside the window are dropped without renumbering.
    pub async fn acquire_ids(&self, stats: &mut PipelineStats) -> Result<VecDeque<GroupRecord>> {
        let cells = self
            .source
            .read_column(&self.settings.sheet, self.settings.url_column)
            .await
            .with_context(|| {
                format!(
                    "Cannot read column {} of sheet {:?}",
                    self.settings.url_column, self.settings.sheet
                )
            })?;
        stats.rows_read = cells.len();

        let window = cells
            .iter()
            .enumerate()
            .skip(self.settings.offset)
            .take(self.settings.limit.filter(|&limit| limit > 0).unwrap_or(usize::MAX));

        let mut worklist = VecDeque::new();
        for (i, cell) in window {
            let row = self.settings.first_row + i as u32;
            let id = extract_id(cell);
            if id.is_empty() {
                debug!(row, "Blank link cell, skipping");
                stats.rows_skipped += 1;
                continue;
            }
            worklist.push_back(GroupRecord::new(row, id));
        }
        stats.ids_queued = worklist.len();
        Ok(worklist)
    }

    pub async fn run(&self) -> Result<PipelineStats> {
        let mut stats = PipelineStats::default();
        let mut worklist = self.acquire_ids(&mut stats).await?;

        info!(
            rows = stats.rows_read,
            queued = stats.ids_queued,
            skipped = stats.rows_skipped,
            mode = %self.enricher.mode(),
            "Group links loaded"
        );
        if worklist.is_empty() {
            warn!("No group links to process");
            return Ok(stats);
        }

        let page_size = self.settings.max_groups_per_request.max(1);
        let slice_size = self.settings.gpt_groups_limit.max(1);

        let mut resolved: VecDeque<GroupRecord> = VecDeque::new();
        let mut tasks: TaskGroup<EnrichedSlice> = TaskGroup::new(self.settings.max_groups_to_send);

        while !worklist.is_empty() || !resolved.is_empty() {
            if resolved.is_empty() {
                let take = page_size.min(worklist.len());
                let page: Vec<GroupRecord> = worklist.drain(..take).collect();
                let first_row = page.first().and_then(GroupRecord::column_index).unwrap_or_default();

                let page = self
                    .resolver
                    .resolve(page)
                    .await
                    .with_context(|| format!("Cannot resolve groups starting at row {first_row}"))?;

                stats.pages_resolved += 1;
                info!(
                    page = stats.pages_resolved,
                    groups = page.len(),
                    remaining = worklist.len(),
                    "Groups resolved"
                );
                resolved.extend(page);
                continue;
            }

            let take = slice_size.min(resolved.len());
            let slice: Vec<GroupRecord> = resolved.drain(..take).collect();
            let enricher = Arc::clone(&self.enricher);
            tasks.submit(
                slice.len(),
                EnrichedSlice::degraded(slice.clone()),
                async move { enricher.enrich(slice).await },
            );
            stats.slices_submitted += 1;

            if tasks.is_saturated() || resolved.is_empty() {
                self.flush(&mut tasks, &mut stats).await;
            }
        }

        info!(%stats, "Run finished");
        Ok(stats)
    }

    async fn flush(&self, tasks: &mut TaskGroup<EnrichedSlice>, stats: &mut PipelineStats) {
        let slices = tasks.len();
        let weight = tasks.weight();
        let outputs = tasks.flush().await;

        let mut records = Vec::new();
        for output in outputs {
            if !output.enriched {
                stats.slices_degraded += 1;
            }
            records.extend(output.records);
        }

        debug!(
            slices,
            weight,
            unresolved = records.iter().filter(|r| !r.is_resolved()).count(),
            enriched = records.iter().filter(|r| r.has_generated_attributes()).count(),
            "Flushing"
        );
        let report = self.writer.write(&records).await;

        stats.flushes += 1;
        stats.records_written += report.written;
        stats.write_failures += report.failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockResolver, MockSheet, ScriptedCompletion};
    use crate::types::EnrichmentMode;

    fn pipeline(sheet: Arc<MockSheet>, settings: PipelineSettings) -> Pipeline {
        let enricher = Enricher::new(Arc::new(ScriptedCompletion::new()), EnrichmentMode::Tags);
        let writer = SheetWriter::new(sheet.clone(), "Sheet1", "B", EnrichmentMode::Tags.upload_fields());
        Pipeline::new(
            settings,
            sheet,
            Arc::new(MockResolver::new()),
            Arc::new(enricher),
            writer,
        )
    }

    #[tokio::test]
    async fn window_is_taken_before_blanks_are_dropped() {
        let sheet = Arc::new(MockSheet::with_column(&[
            "https://vk.com/a",
            "https://vk.com/b",
            "",
            "https://vk.com/club4",
            "https://vk.com/e",
        ]));
        let settings = PipelineSettings {
            first_row: 2,
            offset: 1,
            limit: Some(3),
            ..Default::default()
        };
        let mut stats = PipelineStats::default();

        let worklist = pipeline(sheet, settings).acquire_ids(&mut stats).await.unwrap();

        let rows: Vec<_> = worklist.iter().map(|r| (r.column_index(), r.id().to_string())).collect();
        assert_eq!(rows, vec![(Some(3), "b".to_string()), (Some(5), "4".to_string())]);
        assert_eq!(stats.rows_read, 5);
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.ids_queued, 2);
    }

    #[tokio::test]
    async fn zero_limit_takes_every_row() {
        let sheet = Arc::new(MockSheet::with_links(4));
        let settings = PipelineSettings {
            offset: 1,
            limit: Some(0),
            ..Default::default()
        };
        let mut stats = PipelineStats::default();

        let worklist = pipeline(sheet, settings).acquire_ids(&mut stats).await.unwrap();

        assert_eq!(worklist.len(), 3);
        assert_eq!(stats.ids_queued, 3);
    }

    #[tokio::test]
    async fn empty_sheet_finishes_without_writes() {
        let sheet = Arc::new(MockSheet::with_column(&[]));
        let stats = pipeline(sheet.clone(), PipelineSettings::default()).run().await.unwrap();

        assert_eq!(stats.ids_queued, 0);
        assert!(sheet.writes().is_empty());
    }

    #[test]
    fn stats_display_lists_counters() {
        let stats = PipelineStats {
            records_written: 12,
            write_failures: 1,
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("written: 12"));
        assert!(text.contains("write failures: 1"));
    }
}
