use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Group resolution failed: {0}")]
    Resolution(String),

    #[error("Unusable completion: {0}")]
    Parse(String),
}
