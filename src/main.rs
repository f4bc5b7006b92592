use anyhow::Result;
use s3xfer::cli::{self, args::Cli};
use s3xfer::config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // One transfer at a time: the engine's two tasks and the progress bar
    // interleave fine on a single thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref(), cli.profile.as_deref())?;
    cli::run(cli.command, &config).await
}
