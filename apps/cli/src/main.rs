//! Ferry CLI: resumable chunked uploads from the terminal.
//!
//! While an upload runs, type `p` + Enter to pause, `r` to resume and `c`
//! to cancel. Ctrl-C cancels.

mod config;
mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ferry_http_backend::HttpBackend;
use ferry_upload::{SourceFile, Uploader};

use config::{FerryConfig, Overrides};

#[derive(Parser, Debug)]
#[command(name = "ferry", version, about = "Resumable chunked file uploads")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file.
    Upload {
        /// File to upload.
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Re-run a failed upload this many times before giving up.
        #[arg(long, default_value = "0", value_name = "NUM")]
        auto_retry: u32,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show the effective configuration.
    Config {
        /// Write the effective configuration back to the config file.
        #[arg(long)]
        save: bool,

        #[command(flatten)]
        overrides: Overrides,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ferry=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };
    // Exit here; a pending stdin read would otherwise block runtime shutdown.
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Upload {
            file,
            auto_retry,
            overrides,
        } => {
            let cfg = effective_config(&overrides)?;
            upload(&file, cfg, auto_retry).await
        }
        Command::Config { save, overrides } => {
            let cfg = effective_config(&overrides)?;
            println!("{}", serde_json::to_string_pretty(&cfg.redacted())?);
            if save {
                let path = cfg.save()?;
                println!("saved to {}", path.display());
            }
            Ok(())
        }
    }
}

fn effective_config(overrides: &Overrides) -> anyhow::Result<FerryConfig> {
    let mut cfg = FerryConfig::load()?;
    cfg.apply(overrides);
    Ok(cfg)
}

async fn upload(path: &std::path::Path, cfg: FerryConfig, auto_retry: u32) -> anyhow::Result<()> {
    if cfg.http.endpoint.is_empty() {
        anyhow::bail!("no endpoint configured; pass --endpoint or set it in the config file");
    }

    let backend = HttpBackend::new(&cfg.http).context("failed to build HTTP client")?;
    let source = SourceFile::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;

    tracing::info!(
        file = %source.name(),
        size = %ferry_transfer::format_size(source.size()),
        endpoint = %backend.base_url(),
        "starting upload"
    );

    let mut uploader = Uploader::new(Arc::new(backend), cfg.upload);
    let events = uploader.take_events();
    let uploader = Arc::new(uploader);

    let printer = events.map(|rx| tokio::spawn(console::print_events(rx)));
    let controls = console::spawn_controls();

    let result = console::run_interactive(&uploader, source, controls, auto_retry).await;

    // Dropping the uploader closes the event channel and ends the printer.
    drop(uploader);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    result
}
