use thiserror::Error;

pub type Result<T> = std::result::Result<T, VkError>;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error (status {status}): {message}")]
    Http { status: u16, message: String },

    #[error("VK API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("VK API returned neither response nor error for {0}")]
    EmptyResponse(String),
}

impl VkError {
    /// Authorization failures (bad or expired token) can never succeed on retry.
    pub fn is_auth(&self) -> bool {
        matches!(self, VkError::Api { code: 5 | 27 | 28, .. })
    }
}

impl From<reqwest::Error> for VkError {
    fn from(err: reqwest::Error) -> Self {
        VkError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for VkError {
    fn from(err: serde_json::Error) -> Self {
        VkError::Parse(err.to_string())
    }
}
