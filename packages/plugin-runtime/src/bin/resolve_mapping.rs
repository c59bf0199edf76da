//! Resolves one process mapping against the configuration authority and
//! prints it as JSON.

use anyhow::Result;
use clap::Parser;
use process_plugin_runtime::telemetry::{init_tracing, LogFormat};
use process_plugin_runtime::{MappingResolutionService, ResolutionConfig};

#[derive(Debug, Parser)]
#[command(name = "resolve-mapping", version)]
#[command(about = "Resolve which process plugin serves a business operation")]
struct Cli {
    /// Business operation, e.g. `transfer`.
    operation_id: String,
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long)]
    product: Option<String>,
    #[arg(long)]
    channel: Option<String>,
    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
    #[command(flatten)]
    resolution: ResolutionConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    })?;
    cli.resolution.validate()?;

    let service = MappingResolutionService::from_config(&cli.resolution)?;
    let mapping = service
        .resolve_mapping(
            cli.tenant.as_deref(),
            &cli.operation_id,
            cli.product.as_deref(),
            cli.channel.as_deref(),
        )
        .await;

    println!("{}", serde_json::to_string_pretty(&mapping)?);
    Ok(())
}
