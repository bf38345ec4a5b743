// Test mocks for the enrichment pipeline.
//
// One mock per trait boundary:
// - MockSheet (SheetSource + SheetSink): fixed link column, recorded writes
// - MockSocialApi (SocialApi): HashMap-based groups, posts and walls
// - MockResolver (GroupResolver): fills profiles without any API
// - ScriptedCompletion (CompletionClient): scripted replies, then per-group tags

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ai_client::{Message, MessageRole};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use vk_client::{VkGroup, VkPost};

use crate::traits::{CompletionClient, GroupResolver, SheetSink, SheetSource, SocialApi};
use crate::types::GroupRecord;

// ---------------------------------------------------------------------------
// MockSheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub sheet: String,
    pub range: String,
    pub rows: Vec<Vec<Value>>,
}

/// A single link column plus a log of successful range writes.
pub struct MockSheet {
    column: Vec<String>,
    fail_reads: bool,
    write_failures: Mutex<usize>,
    write_attempts: AtomicUsize,
    writes: Mutex<Vec<RecordedWrite>>,
}

impl MockSheet {
    pub fn new() -> Self {
        Self::with_column(&[])
    }

    pub fn with_column(cells: &[&str]) -> Self {
        Self {
            column: cells.iter().map(|c| c.to_string()).collect(),
            fail_reads: false,
            write_failures: Mutex::new(0),
            write_attempts: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// `count` links of the form `https://vk.com/club{n}` for n = 1..=count.
    pub fn with_links(count: usize) -> Self {
        let cells: Vec<String> = (1..=count).map(|n| format!("https://vk.com/club{n}")).collect();
        let refs: Vec<&str> = cells.iter().map(String::as_str).collect();
        Self::with_column(&refs)
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Fail the next `times` writes. Failed writes are not recorded.
    pub fn failing_writes(self, times: usize) -> Self {
        *self.write_failures.lock().unwrap() = times;
        self
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockSheet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SheetSource for MockSheet {
    async fn read_column(&self, _sheet: &str, _column: u32) -> Result<Vec<String>> {
        if self.fail_reads {
            bail!("MockSheet: read failed");
        }
        Ok(self.column.clone())
    }
}

#[async_trait]
impl SheetSink for MockSheet {
    async fn write_range(&self, sheet: &str, range: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.write_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                bail!("MockSheet: write to {range} failed");
            }
        }
        self.writes.lock().unwrap().push(RecordedWrite {
            sheet: sheet.to_string(),
            range: range.to_string(),
            rows,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSocialApi
// ---------------------------------------------------------------------------

/// In-memory VK. Groups match by numeric id or screen name; posts by
/// `{owner_id}_{post_id}`; walls by group id.
pub struct MockSocialApi {
    groups: Vec<VkGroup>,
    posts: HashMap<String, VkPost>,
    walls: HashMap<i64, Vec<VkPost>>,
    wall_failures: Mutex<HashMap<i64, usize>>,
    wall_calls: Mutex<HashMap<i64, usize>>,
    group_batches: Mutex<Vec<usize>>,
    post_batches: Mutex<Vec<usize>>,
    fail_groups: bool,
    fail_posts: bool,
    reverse_groups: bool,
}

impl MockSocialApi {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            posts: HashMap::new(),
            walls: HashMap::new(),
            wall_failures: Mutex::new(HashMap::new()),
            wall_calls: Mutex::new(HashMap::new()),
            group_batches: Mutex::new(Vec::new()),
            post_batches: Mutex::new(Vec::new()),
            fail_groups: false,
            fail_posts: false,
            reverse_groups: false,
        }
    }

    pub fn with_group(mut self, group: VkGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_post(mut self, post: VkPost) -> Self {
        self.posts.insert(format!("{}_{}", post.owner_id, post.id), post);
        self
    }

    pub fn with_wall(mut self, group_id: i64, posts: Vec<VkPost>) -> Self {
        self.walls.insert(group_id, posts);
        self
    }

    /// Fail the next `times` wall fetches for `group_id`.
    pub fn failing_wall(self, group_id: i64, times: usize) -> Self {
        self.wall_failures.lock().unwrap().insert(group_id, times);
        self
    }

    pub fn failing_groups(mut self) -> Self {
        self.fail_groups = true;
        self
    }

    pub fn failing_posts(mut self) -> Self {
        self.fail_posts = true;
        self
    }

    /// Return profiles in reverse request order.
    pub fn reversed_group_order(mut self) -> Self {
        self.reverse_groups = true;
        self
    }

    pub fn wall_calls(&self, group_id: i64) -> usize {
        self.wall_calls.lock().unwrap().get(&group_id).copied().unwrap_or(0)
    }

    pub fn group_batch_sizes(&self) -> Vec<usize> {
        self.group_batches.lock().unwrap().clone()
    }

    pub fn post_batch_sizes(&self) -> Vec<usize> {
        self.post_batches.lock().unwrap().clone()
    }
}

impl Default for MockSocialApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocialApi for MockSocialApi {
    async fn groups_by_ids(&self, ids: &[String], _fields: &[&str]) -> Result<Vec<VkGroup>> {
        self.group_batches.lock().unwrap().push(ids.len());
        if self.fail_groups {
            bail!("MockSocialApi: User authorization failed: invalid access_token (code 5)");
        }

        let mut found: Vec<VkGroup> = ids
            .iter()
            .filter_map(|id| {
                self.groups.iter().find(|g| {
                    g.id.to_string() == *id
                        || g.screen_name.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(id))
                })
            })
            .cloned()
            .collect();
        if self.reverse_groups {
            found.reverse();
        }
        Ok(found)
    }

    async fn posts_by_ids(&self, keys: &[String]) -> Result<Vec<VkPost>> {
        self.post_batches.lock().unwrap().push(keys.len());
        if self.fail_posts {
            bail!("MockSocialApi: wall.getById failed");
        }
        Ok(keys.iter().filter_map(|k| self.posts.get(k)).cloned().collect())
    }

    async fn latest_posts(&self, owner_id: i64, count: u32) -> Result<Vec<VkPost>> {
        let group_id = -owner_id;
        *self.wall_calls.lock().unwrap().entry(group_id).or_insert(0) += 1;
        {
            let mut failures = self.wall_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&group_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    bail!("MockSocialApi: wall.get failed for {owner_id}");
                }
            }
        }
        Ok(self
            .walls
            .get(&group_id)
            .map(|posts| posts.iter().take(count as usize).cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockResolver
// ---------------------------------------------------------------------------

/// Names every record `Group {id}` without touching any API. Ids listed via
/// `unknown()` stay unresolved.
pub struct MockResolver {
    page_sizes: Mutex<Vec<usize>>,
    fail_on_page: Option<usize>,
    unknown: Vec<String>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            page_sizes: Mutex::new(Vec::new()),
            fail_on_page: None,
            unknown: Vec::new(),
        }
    }

    /// Fail the `page`-th call (1-based).
    pub fn failing_on_page(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn unknown(mut self, id: &str) -> Self {
        self.unknown.push(id.to_string());
        self
    }

    pub fn page_sizes(&self) -> Vec<usize> {
        self.page_sizes.lock().unwrap().clone()
    }
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupResolver for MockResolver {
    async fn resolve(&self, mut records: Vec<GroupRecord>) -> Result<Vec<GroupRecord>> {
        let page = {
            let mut sizes = self.page_sizes.lock().unwrap();
            sizes.push(records.len());
            sizes.len()
        };
        if self.fail_on_page == Some(page) {
            bail!("MockResolver: page {page} failed");
        }

        for record in &mut records {
            if self.unknown.iter().any(|id| id == record.id()) {
                continue;
            }
            record.name = format!("Group {}", record.id());
            record.description = format!("About {}", record.id());
            record.status = "open".to_string();
        }
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// ScriptedCompletion
// ---------------------------------------------------------------------------

enum Step {
    Reply(String),
    Fail(String),
}

/// Plays scripted steps in order. With the script exhausted it answers every
/// `(id X)` in the user prompt with the tag `tag-X` (or fixed scores after
/// `scoring()`), in prompt order.
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Step>>,
    always_fail: Option<String>,
    scoring: bool,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            always_fail: None,
            scoring: false,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn then_reply(self, reply: &str) -> Self {
        self.script.lock().unwrap().push_back(Step::Reply(reply.to_string()));
        self
    }

    pub fn then_fail(self, error: &str) -> Self {
        self.script.lock().unwrap().push_back(Step::Fail(error.to_string()));
        self
    }

    pub fn always_fail(mut self, error: &str) -> Self {
        self.always_fail = Some(error.to_string());
        self
    }

    /// Answer with `[7, 5, 3]` per group instead of tags.
    pub fn scoring(mut self) -> Self {
        self.scoring = true;
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn default_reply(&self, messages: &[Message]) -> String {
        let prompt = messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let entries: Vec<Value> = prompt_ids(&prompt)
            .into_iter()
            .map(|id| {
                if self.scoring {
                    serde_json::json!([7, 5, 3])
                } else {
                    serde_json::json!([format!("tag-{id}")])
                }
            })
            .collect();
        Value::Array(entries).to_string()
    }
}

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

fn prompt_ids(prompt: &str) -> Vec<String> {
    prompt
        .split("(id ")
        .skip(1)
        .filter_map(|rest| rest.split_once(')').map(|(id, _)| id.to_string()))
        .collect()
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = &self.always_fail {
            return Err(anyhow!("ScriptedCompletion: {error}"));
        }
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail(error)) => Err(anyhow!("ScriptedCompletion: {error}")),
            None => Ok(self.default_reply(messages)),
        }
    }
}
