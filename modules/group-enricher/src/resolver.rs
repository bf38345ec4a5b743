use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ai_client::truncate_chars;
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use vk_client::{VkError, VkGroup, GROUP_PROFILE_FIELDS};

use crate::error::EnrichError;
use crate::ids::split_into_chunks;
use crate::retry::retry;
use crate::traits::{GroupResolver, SocialApi};
use crate::types::GroupRecord;

/// Post text kept per group, in characters.
pub const POST_TEXT_LIMIT: usize = 500;

/// Text VK serves in place of a pinned post that no longer exists.
pub const DELETED_POST_SENTINEL: &str = "Post deleted";

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub max_groups_per_request: usize,
    pub max_posts_per_request: usize,
    pub get_post_attempts: usize,
    pub post_retry_delay: Duration,
    pub resolve_fixed_posts: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_groups_per_request: 500,
            max_posts_per_request: 100,
            get_post_attempts: 3,
            post_retry_delay: Duration::from_millis(500),
            resolve_fixed_posts: true,
        }
    }
}

/// Resolves records against the VK API, turning each group's pinned post
/// into text (or its latest wall post when there is no usable pinned post).
pub struct VkGroupResolver {
    api: Arc<dyn SocialApi>,
    settings: ResolverSettings,
}

impl VkGroupResolver {
    pub fn new(api: Arc<dyn SocialApi>, settings: ResolverSettings) -> Self {
        Self { api, settings }
    }

    /// Profiles for `ids`, fetched in pages of `max_groups_per_request`.
    /// Any failed page fails the whole call.
    pub async fn fetch_groups(&self, ids: &[String]) -> Result<Vec<VkGroup>> {
        let mut groups = Vec::with_capacity(ids.len());
        for page in split_into_chunks(ids, self.settings.max_groups_per_request) {
            let fetched = self
                .api
                .groups_by_ids(&page, GROUP_PROFILE_FIELDS)
                .await
                .map_err(|e| {
                    let hint = if e.downcast_ref::<VkError>().is_some_and(VkError::is_auth) {
                        " (check VK_TOKEN)"
                    } else {
                        ""
                    };
                    EnrichError::Resolution(format!("groups.getById: {e:#}{hint}"))
                })?;
            groups.extend(fetched);
        }
        Ok(groups)
    }

    /// Usable post text per group id: the pinned post where it resolves,
    /// otherwise the latest wall post. Groups with neither are absent.
    pub async fn post_texts(&self, groups: &[VkGroup]) -> HashMap<i64, String> {
        let mut texts = self.fixed_post_texts(groups).await;

        for group in groups {
            if texts.contains_key(&group.id) {
                continue;
            }
            if let Some(state) = &group.deactivated {
                debug!(group_id = group.id, state = %state, "Skipping wall of deactivated group");
                continue;
            }
            match self.latest_post_text(group).await {
                Ok(Some(text)) => {
                    texts.insert(group.id, text);
                }
                Ok(None) => debug!(group_id = group.id, "Group has no usable wall posts"),
                Err(e) => {
                    warn!(group_id = group.id, error = %e, "Failed to get post data from VK API")
                }
            }
        }

        texts
    }

    async fn fixed_post_texts(&self, groups: &[VkGroup]) -> HashMap<i64, String> {
        let keys: Vec<String> = groups.iter().filter_map(VkGroup::fixed_post_key).collect();
        let mut texts = HashMap::new();

        for chunk in split_into_chunks(&keys, self.settings.max_posts_per_request) {
            match self.api.posts_by_ids(&chunk).await {
                Ok(posts) => {
                    for post in posts {
                        if let Some(text) = usable_post_text(&post.text) {
                            texts.entry(-post.owner_id).or_insert(text);
                        }
                    }
                }
                Err(e) => warn!(
                    posts = chunk.len(),
                    error = %e,
                    "Failed to fetch fixed posts, falling back to latest wall posts"
                ),
            }
        }

        debug!(declared = keys.len(), resolved = texts.len(), "Fixed posts resolved");
        texts
    }

    async fn latest_post_text(&self, group: &VkGroup) -> Result<Option<String>> {
        let owner_id = group.wall_owner_id();
        let posts = retry(
            "wall.get",
            self.settings.get_post_attempts,
            self.settings.post_retry_delay,
            |_| self.api.latest_posts(owner_id, 1),
        )
        .await?;

        Ok(posts
            .into_iter()
            .next()
            .and_then(|post| usable_post_text(&post.text)))
    }
}

/// Post text truncated to [`POST_TEXT_LIMIT`], or `None` for empty or
/// deleted posts.
pub fn usable_post_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == DELETED_POST_SENTINEL {
        return None;
    }
    Some(truncate_chars(text, POST_TEXT_LIMIT).to_string())
}

/// Copy profile fields from the VK representation onto the record.
fn apply_profile(record: &mut GroupRecord, group: &VkGroup, post_text: Option<&String>) {
    record.name = group.name.clone();
    record.description = group.description.clone().unwrap_or_default();
    record.status = group.status.clone().unwrap_or_default();
    record.fixed_post = post_text.cloned().unwrap_or_default();
}

/// Index profiles by every id a spreadsheet link may carry: the numeric id
/// and the lowercase screen name.
fn index_groups(groups: &[VkGroup]) -> HashMap<String, &VkGroup> {
    let mut index = HashMap::with_capacity(groups.len() * 2);
    for group in groups {
        index.entry(group.id.to_string()).or_insert(group);
        if let Some(screen_name) = &group.screen_name {
            index.entry(screen_name.to_lowercase()).or_insert(group);
        }
    }
    index
}

#[async_trait]
impl GroupResolver for VkGroupResolver {
    async fn resolve(&self, mut records: Vec<GroupRecord>) -> Result<Vec<GroupRecord>> {
        let ids: Vec<String> = records.iter().map(|r| r.id().to_string()).collect();
        let groups = self.fetch_groups(&ids).await?;

        let post_texts = if self.settings.resolve_fixed_posts {
            self.post_texts(&groups).await
        } else {
            HashMap::new()
        };

        let index = index_groups(&groups);
        let mut matched = 0;
        for record in &mut records {
            let key = record.id().to_lowercase();
            if let Some(group) = index.get(&key) {
                apply_profile(record, group, post_texts.get(&group.id));
                matched += 1;
            }
        }

        if matched < records.len() {
            warn!(
                requested = records.len(),
                matched,
                "VK returned no profile for some groups; they are sent without profile data"
            );
        }
        info!(groups = matched, posts = post_texts.len(), "Resolved page of groups");

        Ok(records)
    }
}
