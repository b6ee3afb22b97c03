//! `harchiver record <url>...`: fetch URLs and archive the exchanges.

use anyhow::{Context, Result};
use harchiver_core::config::{HarchiverConfig, RecordConfig};
use harchiver_core::filter;
use harchiver_core::{Archiver, EventBus, ExchangeId, Header};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::transport::{self, CurlOptions};

#[derive(Debug, Clone)]
pub struct RecordArgs {
    pub urls: Vec<String>,
    pub out: PathBuf,
    pub headers: Vec<String>,
    pub max_redirects: Option<u32>,
    pub skip_images: bool,
}

pub async fn run_record(cfg: &HarchiverConfig, args: RecordArgs) -> Result<()> {
    let opts = curl_options(cfg.record.clone().unwrap_or_default(), &args)?;
    let bus = EventBus::new();
    let archiver = Archiver::create_with_config(&args.out, &bus, cfg)
        .with_context(|| format!("cannot create archive {}", args.out.display()))?;
    if args.skip_images {
        let skip = filter::skip_images();
        archiver.set_task_filter(move |ex, ctx| skip(ex, ctx));
    }
    archiver.set_error_handler(|e| eprintln!("  warning: {e:#}"));
    archiver.start()?;

    let next_id = Arc::new(AtomicU64::new(1));
    let mut tasks = Vec::with_capacity(args.urls.len());
    for url in args.urls {
        let bus = bus.clone();
        let opts = opts.clone();
        let id = ExchangeId(next_id.fetch_add(1, Ordering::Relaxed));
        tasks.push(tokio::task::spawn_blocking(move || {
            let result = transport::fetch(&bus, id, &url, &opts);
            (url, result)
        }));
    }

    let mut failures = 0usize;
    for task in tasks {
        let (url, result) = task.await.context("transfer task panicked")?;
        match result {
            Ok(status) => println!("{status} {url}"),
            Err(e) => {
                failures += 1;
                eprintln!("failed {url}: {e:#}");
            }
        }
    }

    archiver.stop();
    archiver.flush();
    let stats = archiver.stats();
    let path = archiver.file_path().to_path_buf();
    archiver.close();

    println!(
        "Wrote {} entries to {} ({} filtered, {} skipped, {} write failures)",
        stats.written_entries,
        path.display(),
        stats.filtered,
        stats.build_failures,
        stats.write_failures
    );
    tracing::info!(?stats, failures, "record finished");
    if stats.write_failures > 0 {
        anyhow::bail!("{} entries could not be written", stats.write_failures);
    }
    Ok(())
}

fn curl_options(record: RecordConfig, args: &RecordArgs) -> Result<CurlOptions> {
    let mut headers = args
        .headers
        .iter()
        .map(|h| transport::parse_header_arg(h))
        .collect::<Result<Vec<Header>>>()?;
    if let Some(agent) = record.user_agent {
        if !headers
            .iter()
            .any(|h| h.name.eq_ignore_ascii_case("user-agent"))
        {
            headers.push(Header::new("User-Agent", agent));
        }
    }
    Ok(CurlOptions {
        connect_timeout: Duration::from_secs(record.connect_timeout_secs),
        timeout: Duration::from_secs(record.timeout_secs),
        max_redirects: args.max_redirects.unwrap_or(record.max_redirects),
        headers,
    })
}
