mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jsonify_core::{
    load_config, BackendCapabilities, ConverterRegistry, RunConfig, RunSummary, Scheduler,
};

use cli::Cli;

/// Exit status after a shutdown signal, as shells report SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.list_formats {
        print_formats();
        return ExitCode::SUCCESS;
    }

    match run(&cli).await {
        Ok(summary) => {
            if !cli.silent {
                print_summary(&summary);
            }
            if summary.cancelled {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: &Cli) -> Result<RunSummary> {
    let (input, output_dir) = match (&cli.input, &cli.output_dir) {
        (Some(input), Some(output_dir)) => (input.clone(), output_dir.clone()),
        _ => anyhow::bail!("--input and --output-dir are required"),
    };

    let mut config = load_config(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config from {:?}", path),
        None => "Failed to load config".to_string(),
    })?;
    cli.apply(&mut config);

    let run_config = RunConfig::from_config(&config, &input, &output_dir)
        .context("Configuration validation failed")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, finishing files in progress");
        let _ = shutdown_tx.send(true);
    });

    Scheduler::new(run_config)
        .with_shutdown(shutdown_rx)
        .run()
        .await
        .with_context(|| format!("Cannot convert {:?} into {:?}", input, output_dir))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_formats() {
    println!("{:<10} {:<10} STATUS", "TYPE", "CONVERTER");
    for format in ConverterRegistry::with_defaults().formats() {
        let status = match &format.reason {
            None => "available".to_string(),
            Some(reason) => format!("unavailable ({reason})"),
        };
        println!(
            "{:<10} {:<10} {}",
            format.type_tag.as_str(),
            format.converter,
            status
        );
    }
    if let Some(note) = missing_backends_note(&BackendCapabilities::detect()) {
        println!();
        println!("{note}");
    }
}

fn missing_backends_note(caps: &BackendCapabilities) -> Option<String> {
    let missing = caps.missing();
    if missing.is_empty() {
        None
    } else {
        Some(format!("Built without: {}", missing.join(", ")))
    }
}

fn print_summary(summary: &RunSummary) {
    let counts = &summary.counts;
    println!();
    println!("Converted: {}", counts.converted);
    println!("Failed:    {}", counts.failed);
    println!("Skipped:   {}", counts.skipped);
    println!(
        "Total:     {} in {:.1}s",
        counts.total,
        summary.elapsed.as_secs_f64()
    );
    if let Some(path) = &summary.master_path {
        println!("Combined report: {}", path.display());
    }
    if summary.cancelled {
        println!("Interrupted: files not started were recorded as cancelled");
    }
}
