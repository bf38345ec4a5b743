use serde::{Deserialize, Serialize};

/// Group fields requested from `groups.getById` when building group profiles.
pub const GROUP_PROFILE_FIELDS: &[&str] = &["description", "status", "fixed_post"];

/// Envelope every VK API method responds with: either `response` or `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub response: Option<T>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

/// A community as returned by `groups.getById`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VkGroup {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub screen_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Id of the pinned wall post, if the group has one.
    #[serde(default)]
    pub fixed_post: Option<i64>,
    /// "deleted" or "banned" for deactivated communities.
    #[serde(default)]
    pub deactivated: Option<String>,
}

impl VkGroup {
    /// Owner id of this group's wall (communities use negative owner ids).
    pub fn wall_owner_id(&self) -> i64 {
        -self.id
    }

    /// Composite `-{group_id}_{post_id}` key for `wall.getById`, if a fixed post is declared.
    pub fn fixed_post_key(&self) -> Option<String> {
        self.fixed_post
            .filter(|post_id| *post_id > 0)
            .map(|post_id| format!("{}_{}", self.wall_owner_id(), post_id))
    }
}

/// `groups.getById` returns a bare list in older API versions and an object
/// with a `groups` list in newer ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum GroupsResponse {
    List(Vec<VkGroup>),
    Wrapped { groups: Vec<VkGroup> },
}

impl GroupsResponse {
    pub(crate) fn into_groups(self) -> Vec<VkGroup> {
        match self {
            GroupsResponse::List(groups) => groups,
            GroupsResponse::Wrapped { groups } => groups,
        }
    }
}

/// A wall post as returned by `wall.getById` and `wall.get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VkPost {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub date: Option<i64>,
}

/// `wall.getById` returns a bare list in older API versions and an object
/// with an `items` list in newer ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum PostsResponse {
    List(Vec<VkPost>),
    Wrapped { items: Vec<VkPost> },
}

impl PostsResponse {
    pub(crate) fn into_posts(self) -> Vec<VkPost> {
        match self {
            PostsResponse::List(posts) => posts,
            PostsResponse::Wrapped { items } => items,
        }
    }
}

/// A page of wall posts from `wall.get`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WallPage {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub items: Vec<VkPost>,
}
