pub mod error;
pub mod types;

pub use error::{Result, VkError};
pub use types::{VkGroup, VkPost, WallPage, GROUP_PROFILE_FIELDS};

use serde::de::DeserializeOwned;
use types::{ApiEnvelope, GroupsResponse, PostsResponse};

const BASE_URL: &str = "https://api.vk.com/method";

/// API version the wire types in [`types`] are written against.
pub const DEFAULT_API_VERSION: &str = "5.131";

pub struct VkClient {
    client: reqwest::Client,
    token: String,
    api_version: String,
    base_url: String,
}

impl VkClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            api_version: DEFAULT_API_VERSION.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Call a VK API method. Parameters are sent form-encoded so long id
    /// lists don't hit URL length limits.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);

        let mut form: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        form.push(("access_token", self.token.as_str()));
        form.push(("v", self.api_version.as_str()));

        let resp = self.client.post(&url).form(&form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VkError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        unwrap_envelope(method, &body)
    }

    /// Fetch community profiles by numeric id or screen name.
    pub async fn groups_get_by_id(&self, group_ids: &[String], fields: &[&str]) -> Result<Vec<VkGroup>> {
        tracing::debug!(count = group_ids.len(), "groups.getById");

        let response: GroupsResponse = self
            .call(
                "groups.getById",
                &[("group_ids", group_ids.join(",")), ("fields", fields.join(","))],
            )
            .await?;

        Ok(response.into_groups())
    }

    /// Fetch wall posts by composite `{owner_id}_{post_id}` keys.
    pub async fn wall_get_by_id(&self, post_keys: &[String]) -> Result<Vec<VkPost>> {
        tracing::debug!(count = post_keys.len(), "wall.getById");

        let response: PostsResponse = self
            .call("wall.getById", &[("posts", post_keys.join(","))])
            .await?;

        Ok(response.into_posts())
    }

    /// Fetch the most recent posts the owner published on its own wall.
    pub async fn wall_get(&self, owner_id: i64, count: u32) -> Result<WallPage> {
        tracing::debug!(owner_id, count, "wall.get");

        self.call(
            "wall.get",
            &[
                ("owner_id", owner_id.to_string()),
                ("filter", "owner".to_string()),
                ("count", count.to_string()),
            ],
        )
        .await
    }
}

fn unwrap_envelope<T: DeserializeOwned>(method: &str, body: &str) -> Result<T> {
    let envelope: ApiEnvelope<T> = serde_json::from_str(body)?;

    if let Some(error) = envelope.error {
        return Err(VkError::Api {
            code: error.error_code,
            message: error.error_msg,
        });
    }

    envelope
        .response
        .ok_or_else(|| VkError::EmptyResponse(method.to_string()))
}
