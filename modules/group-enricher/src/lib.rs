pub mod config;
pub mod enrichment;
pub mod error;
pub mod ids;
pub mod pipeline;
pub mod prompt;
pub mod resolver;
pub mod retry;
pub mod task_group;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod types;
pub mod writeback;

pub use config::{BatchLimits, Config};
pub use enrichment::{EnrichedSlice, Enricher};
pub use error::EnrichError;
pub use pipeline::{Pipeline, PipelineSettings, PipelineStats};
pub use prompt::PromptTemplate;
pub use resolver::{ResolverSettings, VkGroupResolver};
pub use task_group::TaskGroup;
pub use types::{EnrichmentMode, GroupRecord, RecordField};
pub use writeback::{SheetWriter, WriteReport};
