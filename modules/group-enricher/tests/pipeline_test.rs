//! End-to-end pipeline runs against in-memory mocks: link column in,
//! resolved and enriched rows out.
//!
//! Run with: cargo test -p group-enricher --test pipeline_test

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use group_enricher::testing::{MockResolver, MockSheet, MockSocialApi, ScriptedCompletion};
use group_enricher::{
    EnrichmentMode, Enricher, Pipeline, PipelineSettings, ResolverSettings, SheetWriter,
    VkGroupResolver,
};
use vk_client::{VkGroup, VkPost};

struct Harness {
    sheet: Arc<MockSheet>,
    resolver: Arc<MockResolver>,
    completion: Arc<ScriptedCompletion>,
    mode: EnrichmentMode,
    max_attempts: usize,
}

impl Harness {
    fn new(sheet: MockSheet) -> Self {
        Self {
            sheet: Arc::new(sheet),
            resolver: Arc::new(MockResolver::new()),
            completion: Arc::new(ScriptedCompletion::new()),
            mode: EnrichmentMode::Tags,
            max_attempts: 3,
        }
    }

    fn resolver(mut self, resolver: MockResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    fn completion(mut self, completion: ScriptedCompletion) -> Self {
        self.completion = Arc::new(completion);
        self
    }

    fn mode(mut self, mode: EnrichmentMode) -> Self {
        self.mode = mode;
        self
    }

    fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn pipeline(&self, settings: PipelineSettings) -> Pipeline {
        let enricher = Enricher::new(self.completion.clone(), self.mode)
            .with_max_attempts(self.max_attempts);
        let writer = SheetWriter::new(self.sheet.clone(), "Sheet1", "B", self.mode.upload_fields());
        Pipeline::new(
            settings,
            self.sheet.clone(),
            self.resolver.clone(),
            Arc::new(enricher),
            writer,
        )
    }

    fn ranges(&self) -> Vec<String> {
        self.sheet.writes().into_iter().map(|w| w.range).collect()
    }

    fn written_rows(&self) -> Vec<Vec<Value>> {
        self.sheet.writes().into_iter().flat_map(|w| w.rows).collect()
    }
}

fn settings(page: usize, slice: usize, threshold: usize) -> PipelineSettings {
    PipelineSettings {
        max_groups_per_request: page,
        gpt_groups_limit: slice,
        max_groups_to_send: threshold,
        ..Default::default()
    }
}

fn ids(rows: &[Vec<Value>]) -> Vec<String> {
    rows.iter().map(|row| row[0].as_str().unwrap_or_default().to_string()).collect()
}

// ---------------------------------------------------------------------------
// Windowed flushing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn flushes_when_pending_weight_reaches_threshold() {
    let h = Harness::new(MockSheet::with_links(15));

    let stats = assert_ok!(h.pipeline(settings(500, 5, 10)).run().await);

    assert_eq!(h.ranges(), vec!["B1:G10", "B11:G15"]);
    assert_eq!(stats.flushes, 2);
    assert_eq!(stats.slices_submitted, 3);
    assert_eq!(stats.records_written, 15);
}

#[tokio::test]
async fn every_page_end_flushes() {
    let h = Harness::new(MockSheet::with_links(23));

    let stats = assert_ok!(h.pipeline(settings(7, 3, 100)).run().await);

    assert_eq!(h.resolver.page_sizes(), vec![7, 7, 7, 2]);
    assert_eq!(h.ranges(), vec!["B1:G7", "B8:G14", "B15:G21", "B22:G23"]);
    assert_eq!(stats.pages_resolved, 4);
}

#[tokio::test]
async fn every_queued_id_is_written_once_in_row_order() {
    let h = Harness::new(MockSheet::with_links(37));

    let stats = assert_ok!(h.pipeline(settings(8, 3, 7)).run().await);

    let expected: Vec<String> = (1..=37).map(|n| n.to_string()).collect();
    assert_eq!(ids(&h.written_rows()), expected);
    assert_eq!(stats.ids_queued, 37);
    assert_eq!(stats.records_written, 37);

    // Each write covers exactly as many rows as its range spans.
    for write in h.sheet.writes() {
        let (start, end) = write.range.split_once(':').unwrap();
        let first: usize = start.trim_start_matches('B').parse().unwrap();
        let last: usize = end.trim_start_matches('G').parse().unwrap();
        assert_eq!(write.rows.len(), last - first + 1, "range {}", write.range);
    }
}

#[tokio::test]
async fn written_rows_carry_profile_and_tags() {
    let h = Harness::new(MockSheet::with_column(&["https://vk.com/club1", "https://vk.com/durov"]));

    assert_ok!(h.pipeline(settings(500, 10, 100)).run().await);

    assert_eq!(
        h.written_rows(),
        vec![
            vec![json!("1"), json!("Group 1"), json!("About 1"), json!(""), json!("open"), json!("tag-1")],
            vec![
                json!("durov"),
                json!("Group durov"),
                json!("About durov"),
                json!(""),
                json!("open"),
                json!("tag-durov")
            ],
        ]
    );
}

#[tokio::test]
async fn scores_mode_writes_numeric_columns() {
    let h = Harness::new(MockSheet::with_links(2))
        .mode(EnrichmentMode::Scores)
        .completion(ScriptedCompletion::new().scoring());

    assert_ok!(h.pipeline(settings(500, 10, 100)).run().await);

    assert_eq!(h.ranges(), vec!["B1:I2"]);
    let rows = h.written_rows();
    assert_eq!(rows[0][5..], [json!(7), json!(5), json!(3)]);
}

#[tokio::test]
async fn vk_profiles_and_post_text_reach_the_sheet() {
    let api = MockSocialApi::new()
        .with_group(VkGroup {
            id: 1,
            name: "Hikers".to_string(),
            screen_name: Some("hikers".to_string()),
            description: Some("Weekend trips".to_string()),
            status: Some("Join us".to_string()),
            fixed_post: Some(10),
            deactivated: None,
        })
        .with_group(VkGroup {
            id: 2,
            name: "Cooks".to_string(),
            screen_name: Some("club2".to_string()),
            description: None,
            status: None,
            fixed_post: None,
            deactivated: None,
        })
        .with_post(VkPost { id: 10, owner_id: -1, text: "Pinned route".to_string(), date: None })
        .with_wall(2, vec![VkPost { id: 3, owner_id: -2, text: "Soup recipe".to_string(), date: None }]);
    let resolver = VkGroupResolver::new(Arc::new(api), ResolverSettings::default());

    let sheet = Arc::new(MockSheet::with_column(&["https://vk.com/hikers", "https://vk.com/club2"]));
    let enricher = Enricher::new(Arc::new(ScriptedCompletion::new()), EnrichmentMode::Tags);
    let writer = SheetWriter::new(sheet.clone(), "Sheet1", "B", EnrichmentMode::Tags.upload_fields());
    let pipeline = Pipeline::new(
        settings(500, 10, 100),
        sheet.clone(),
        Arc::new(resolver),
        Arc::new(enricher),
        writer,
    );

    assert_ok!(pipeline.run().await);

    let rows: Vec<Vec<Value>> = sheet.writes().into_iter().flat_map(|w| w.rows).collect();
    assert_eq!(
        rows,
        vec![
            vec![
                json!("hikers"),
                json!("Hikers"),
                json!("Weekend trips"),
                json!("Pinned route"),
                json!("Join us"),
                json!("tag-hikers")
            ],
            vec![json!("2"), json!("Cooks"), json!(""), json!("Soup recipe"), json!(""), json!("tag-2")],
        ]
    );
}

// ---------------------------------------------------------------------------
// Input window
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offset_and_limit_keep_original_row_numbers() {
    let h = Harness::new(MockSheet::with_links(10));
    let settings = PipelineSettings {
        first_row: 3,
        offset: 2,
        limit: Some(4),
        ..settings(500, 10, 100)
    };

    let stats = assert_ok!(h.pipeline(settings).run().await);

    assert_eq!(h.ranges(), vec!["B5:G8"]);
    assert_eq!(ids(&h.written_rows()), vec!["3", "4", "5", "6"]);
    assert_eq!(stats.rows_read, 10);
}

#[tokio::test]
async fn blank_rows_are_skipped_without_shifting_later_rows() {
    let h = Harness::new(MockSheet::with_column(&[
        "https://vk.com/club1",
        "  ",
        "https://vk.com/club3",
        "https://vk.com/club4",
    ]));

    let stats = assert_ok!(h.pipeline(settings(500, 10, 100)).run().await);

    assert_eq!(h.ranges(), vec!["B1:G1", "B3:G4"]);
    assert_eq!(stats.rows_skipped, 1);
    assert_eq!(stats.records_written, 3);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreadable_link_column_is_fatal() {
    let h = Harness::new(MockSheet::with_links(3).failing_reads());

    let err = assert_err!(h.pipeline(settings(500, 10, 100)).run().await);

    assert!(err.to_string().contains("Cannot read column 1"));
    assert_eq!(h.sheet.write_attempts(), 0);
}

#[tokio::test]
async fn resolution_failure_stops_the_run_after_earlier_pages_are_written() {
    let h = Harness::new(MockSheet::with_links(10)).resolver(MockResolver::new().failing_on_page(2));

    let err = assert_err!(h.pipeline(settings(5, 5, 100)).run().await);

    assert!(err.to_string().contains("Cannot resolve groups starting at row 6"));
    assert_eq!(h.ranges(), vec!["B1:G5"]);
}

#[tokio::test]
async fn write_failure_does_not_stop_the_run() {
    let h = Harness::new(MockSheet::with_links(15).failing_writes(1));

    let stats = assert_ok!(h.pipeline(settings(500, 5, 10)).run().await);

    assert_eq!(h.sheet.write_attempts(), 2);
    assert_eq!(h.ranges(), vec!["B11:G15"]);
    assert_eq!(stats.write_failures, 10);
    assert_eq!(stats.records_written, 5);
}

#[tokio::test]
async fn exhausted_enrichment_still_writes_unenriched_rows() {
    let h = Harness::new(MockSheet::with_links(6))
        .completion(ScriptedCompletion::new().always_fail("invalid api key"))
        .max_attempts(2);

    let stats = assert_ok!(h.pipeline(settings(500, 3, 100)).run().await);

    assert_eq!(stats.slices_degraded, 2);
    assert_eq!(h.completion.calls(), 4);
    let rows = h.written_rows();
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|row| row[1].as_str().is_some_and(|n| n.starts_with("Group"))));
    assert!(rows.iter().all(|row| row[5] == json!("")));
}

#[tokio::test]
async fn unresolved_groups_flow_through_to_the_sheet() {
    let h = Harness::new(MockSheet::with_links(3)).resolver(MockResolver::new().unknown("2"));

    let stats = assert_ok!(h.pipeline(settings(500, 10, 100)).run().await);

    let rows = h.written_rows();
    assert_eq!(stats.records_written, 3);
    assert_eq!(rows[1][0], json!("2"));
    assert_eq!(rows[1][1], json!(""));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn slices_in_one_window_run_concurrently() {
    let h = Harness::new(MockSheet::with_links(30))
        .completion(ScriptedCompletion::new().with_latency(Duration::from_millis(200)));

    let started = tokio::time::Instant::now();
    let stats = assert_ok!(h.pipeline(settings(500, 5, 15)).run().await);

    assert_eq!(h.completion.max_in_flight(), 3);
    assert_eq!(h.ranges(), vec!["B1:G15", "B16:G30"]);
    assert_eq!(stats.slices_submitted, 6);
    // Two windows of concurrent calls, not six sequential ones.
    assert!(started.elapsed() < Duration::from_millis(600));
}
