//! `harchiver inspect <path>`: one line per archived entry.

use anyhow::Result;
use harchiver_core::har::{self, Entry};
use std::path::Path;

pub fn run_inspect(path: &Path) -> Result<()> {
    let archive = har::read_archive(path)?;
    let log = &archive.log;
    println!(
        "{} (HAR {}, created by {} {})",
        path.display(),
        log.version,
        log.creator.name,
        log.creator.version
    );
    for entry in &log.entries {
        println!("{}", summary_line(entry));
    }
    println!("{} entries", log.entries.len());
    Ok(())
}

fn summary_line(entry: &Entry) -> String {
    let mut line = format!(
        "{} {:>3} {:>8.1}ms {:>9} {}",
        entry.started_date_time.format("%H:%M:%S%.3f"),
        entry.response.status,
        entry.time,
        entry.response.content.size,
        entry.request.method,
    );
    line.push(' ');
    line.push_str(&entry.request.url);
    if !entry.response.redirect_url.is_empty() {
        line.push_str(" -> ");
        line.push_str(&entry.response.redirect_url);
    }
    if let Some(err) = &entry.response.error {
        line.push_str(" [");
        line.push_str(err);
        line.push(']');
    }
    line
}
