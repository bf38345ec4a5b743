// Trait seams for the pipeline's collaborators.
//
// SheetSource / SheetSink: the spreadsheet the links come from and the
//   enriched rows go back to.
// SocialApi: the three VK API calls group resolution needs.
// GroupResolver: fills profile fields on a page of records.
// CompletionClient: the LLM.
//
// Production implementations wrap sheets_client, vk_client and ai_client;
// testing.rs has in-memory mocks for each.

use ai_client::{Message, OpenAi};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sheets_client::SheetsClient;
use vk_client::{VkClient, VkGroup, VkPost};

use crate::types::GroupRecord;

// ---------------------------------------------------------------------------
// Spreadsheet
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Raw cell values of one 1-based column, top to bottom.
    async fn read_column(&self, sheet: &str, column: u32) -> Result<Vec<String>>;
}

#[async_trait]
pub trait SheetSink: Send + Sync {
    /// Overwrite an A1 range (e.g. `B3:G10`) with rows of cell values.
    async fn write_range(&self, sheet: &str, range: &str, rows: Vec<Vec<Value>>) -> Result<()>;
}

#[async_trait]
impl SheetSource for SheetsClient {
    async fn read_column(&self, sheet: &str, column: u32) -> Result<Vec<String>> {
        Ok(self.col_values(sheet, column).await?)
    }
}

#[async_trait]
impl SheetSink for SheetsClient {
    async fn write_range(&self, sheet: &str, range: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        self.update(sheet, range, rows).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VK
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SocialApi: Send + Sync {
    /// Community profiles for numeric ids or screen names.
    async fn groups_by_ids(&self, ids: &[String], fields: &[&str]) -> Result<Vec<VkGroup>>;

    /// Posts by `{owner_id}_{post_id}` keys.
    async fn posts_by_ids(&self, keys: &[String]) -> Result<Vec<VkPost>>;

    /// Most recent posts the owner published on its own wall.
    async fn latest_posts(&self, owner_id: i64, count: u32) -> Result<Vec<VkPost>>;
}

#[async_trait]
impl SocialApi for VkClient {
    async fn groups_by_ids(&self, ids: &[String], fields: &[&str]) -> Result<Vec<VkGroup>> {
        Ok(self.groups_get_by_id(ids, fields).await?)
    }

    async fn posts_by_ids(&self, keys: &[String]) -> Result<Vec<VkPost>> {
        Ok(self.wall_get_by_id(keys).await?)
    }

    async fn latest_posts(&self, owner_id: i64, count: u32) -> Result<Vec<VkPost>> {
        Ok(self.wall_get(owner_id, count).await?.items)
    }
}

#[async_trait]
pub trait GroupResolver: Send + Sync {
    /// Fill profile fields on `records`. Every input record comes back, in
    /// input order; records the API knows nothing about are left unresolved.
    /// An error means the whole page could not be resolved.
    async fn resolve(&self, records: Vec<GroupRecord>) -> Result<Vec<GroupRecord>>;
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

#[async_trait]
impl CompletionClient for OpenAi {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.chat(messages).await
    }
}
