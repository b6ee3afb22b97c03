//! CLI for harchiver.

mod commands;
mod transport;

use anyhow::Result;
use clap::{Parser, Subcommand};
use harchiver_core::config;
use std::path::PathBuf;

use commands::{run_inspect, run_record, RecordArgs};

/// Top-level CLI for harchiver.
#[derive(Debug, Parser)]
#[command(name = "harchiver")]
#[command(about = "harchiver: record HTTP exchanges into HAR 1.2 archives", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch URLs and archive every exchange, redirect hops included.
    Record {
        /// HTTP/HTTPS URLs to fetch (concurrently).
        #[arg(required = true)]
        urls: Vec<String>,

        /// Archive file to create (truncated if it exists).
        #[arg(long, short, default_value = "session.har", value_name = "FILE")]
        out: PathBuf,

        /// Extra request header, e.g. 'Accept: application/json'. Repeatable.
        #[arg(long = "header", short = 'H', value_name = "NAME: VALUE")]
        headers: Vec<String>,

        /// Redirect hops followed per URL (overrides config).
        #[arg(long, value_name = "N")]
        max_redirects: Option<u32>,

        /// Do not archive responses whose content type is an image.
        #[arg(long)]
        skip_images: bool,
    },

    /// Print a one-line summary per entry of an existing archive.
    Inspect {
        /// Path to the HAR file.
        path: PathBuf,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Record {
                urls,
                out,
                headers,
                max_redirects,
                skip_images,
            } => {
                let args = RecordArgs {
                    urls,
                    out,
                    headers,
                    max_redirects,
                    skip_images,
                };
                run_record(&cfg, args).await?;
            }
            CliCommand::Inspect { path } => run_inspect(&path)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
