use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use kafka_tail::config::{Cli, Config};
use kafka_tail::error::AppError;
use kafka_tail::kafka::KafkaLog;
use kafka_tail::lifecycle::{self, blocking_until_interrupted, shutdown_signal};
use kafka_tail::output::Stdout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

fn setup_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    // Records go to stdout, so diagnostics stay on stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(cli)?;

    // Trap signals before connecting so an interrupt during the metadata ping exits cleanly.
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let connect = {
        let config = config.clone();
        move || KafkaLog::connect(&config)
    };
    let Some(log) = blocking_until_interrupted(&shutdown, connect).await?.transpose()? else {
        info!("interrupted while connecting");
        info!("Consumed: 0");
        return Ok(());
    };

    let report = lifecycle::run(
        &log,
        &config,
        Arc::new(Stdout),
        shutdown.cancelled_owned(),
    )
    .await?;
    debug!(?report, "run finished");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    // Exit without waiting on an abandoned connection attempt.
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");

            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut index = 0;
                while let Some(err) = source {
                    eprintln!("    {index}: {err}");
                    source = err.source();
                    index += 1;
                }
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}
