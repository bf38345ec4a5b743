use std::sync::Arc;

use ai_client::OpenAi;
use anyhow::{Context, Result};
use clap::Parser;
use sheets_client::SheetsClient;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vk_client::VkClient;

use group_enricher::{
    Config, EnrichmentMode, Enricher, Pipeline, SheetWriter, VkGroupResolver,
};

#[derive(Parser)]
#[command(
    name = "group-enricher",
    about = "Enrich VK group links in a Google Sheet with LLM-generated tags or scores"
)]
struct Cli {
    /// Skip this many rows of the link column (overrides PARSE_OFFSET)
    #[arg(long)]
    offset: Option<usize>,

    /// Process at most this many rows (overrides PARSE_LIMIT)
    #[arg(long)]
    limit: Option<usize>,

    /// `tags` or `scores` (overrides ENRICHMENT_MODE)
    #[arg(long)]
    mode: Option<EnrichmentMode>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    json_logs: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("group_enricher=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Group enricher starting...");

    let config = Config::from_env()?.with_overrides(cli.offset, cli.limit, cli.mode);
    config.log_redacted();

    // Spreadsheet
    let sheets = Arc::new(
        SheetsClient::connect(&config.google_auth_file, &config.table_name)
            .await
            .with_context(|| format!("Cannot open spreadsheet {:?}", config.table_name))?,
    );

    // VK
    let vk = VkClient::new(config.vk_token.clone()).with_api_version(config.vk_api_version.clone());
    let resolver = VkGroupResolver::new(Arc::new(vk), config.resolver_settings());

    // LLM
    let mut ai = OpenAi::new(config.openai_api_key.clone(), config.gpt_model.clone());
    if let Some(base_url) = &config.openai_base_url {
        ai = ai.with_base_url(base_url.clone());
    }
    info!(model = ai.model(), mode = %config.mode, "LLM client ready");
    let enricher = Enricher::new(Arc::new(ai), config.mode)
        .with_system_prompt(config.system_prompt())
        .with_max_attempts(config.limits.max_gpt_attempts);

    let writer = SheetWriter::new(
        sheets.clone(),
        config.parse_sheet.clone(),
        config.data_start_column.clone(),
        config.mode.upload_fields(),
    );

    let pipeline = Pipeline::new(
        config.pipeline_settings(),
        sheets,
        Arc::new(resolver),
        Arc::new(enricher),
        writer,
    );

    let stats = pipeline.run().await?;
    info!(%stats, "Done");
    Ok(())
}
