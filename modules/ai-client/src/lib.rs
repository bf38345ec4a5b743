pub mod error;
pub mod message;
pub mod openai;
pub mod util;

pub use error::AiError;
pub use message::{Message, MessageRole};
pub use openai::OpenAi;
pub use util::{strip_code_blocks, truncate_chars};
