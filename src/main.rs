use anyhow::Result;
use clap::Parser;
use report_forge::cli::Args;
use report_forge::generator::workflow::launch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let print_sse = args.sse;
    let topic = args.resolve_topic()?;
    let config = args.into_config()?;

    // 日志输出到 stderr，stdout 留给 SSE 帧
    let default_level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("report_forge={}", default_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    launch(&config, &topic, print_sse).await
}
