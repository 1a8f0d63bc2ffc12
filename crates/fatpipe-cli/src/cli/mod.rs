//! CLI for the fatpipe downloader.

mod progress;

use anyhow::{Context, Result};
use clap::Parser;
use fatpipe_core::config::{self, FatpipeConfig};
use fatpipe_core::fetcher::RangeFetcher;
use fatpipe_core::sink::StreamSink;
use fatpipe_core::transport::CurlTransport;
use fatpipe_core::Downloader;
use std::path::PathBuf;
use std::sync::Arc;

/// Download one large resource over many parallel range requests and write
/// it, in order, to stdout or a file.
#[derive(Debug, Parser)]
#[command(name = "fatpipe")]
#[command(about = "fat pipe: parallel range downloader", long_about = None)]
pub struct Cli {
    /// URL of the request.
    #[arg(long)]
    pub url: String,

    /// Transport options as a JSON object, merged over the config file's [transport] table.
    #[arg(long, value_name = "JSON")]
    pub config: Option<String>,

    /// Max concurrency.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Size of the request chunks in bytes (5000000 = adapt to the resource).
    #[arg(long, value_name = "BYTES")]
    pub chunk: Option<u64>,

    /// Hide progress output.
    #[arg(long)]
    pub silent: bool,

    /// User agent.
    #[arg(long, value_name = "UA")]
    pub agent: Option<String>,

    /// Write to this file instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Overrides config values with the flags given on the command line.
    pub fn apply(&self, cfg: &mut FatpipeConfig) -> Result<()> {
        if let Some(json) = &self.config {
            cfg.merge_transport_json(json)?;
        }
        if let Some(n) = self.concurrency {
            cfg.concurrency = n;
        }
        if let Some(chunk) = self.chunk {
            cfg.chunk_size = chunk;
        }
        if let Some(agent) = &self.agent {
            cfg.user_agent = agent.clone();
        }
        cfg.silent |= self.silent;
        cfg.validate()
    }
}

pub async fn run_from_args() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_or_init()?;
    cli.apply(&mut cfg)?;
    tracing::debug!("effective config: {:?}", cfg);

    let fetcher = RangeFetcher::new(
        Arc::new(CurlTransport::new(cfg.transport.clone())),
        cli.url.as_str(),
        cfg.transport.headers.clone(),
        cfg.user_agent.as_str(),
        cfg.retry.policy(),
    );
    let downloader = Downloader::new(fetcher, cfg.download_options());

    let sink = match &cli.output {
        Some(path) => StreamSink::create(path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?,
        None => StreamSink::stdout(),
    };

    let renderer = (!cfg.silent).then(|| progress::spawn(downloader.progress()));
    let result = downloader.run(sink).await;
    if let Some(renderer) = renderer {
        renderer.stop().await;
    }

    let report = result?;
    if !cfg.silent {
        progress::print_summary(&report);
    }
    Ok(())
}
