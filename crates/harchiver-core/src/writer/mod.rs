//! Single-writer queue for the archive file.
//!
//! All file mutation happens on one dedicated thread that drains a FIFO
//! channel, so writes never interleave. Callers enqueue and return
//! immediately. Dropping the handle closes the channel and joins the thread
//! after every queued job has been written.

mod append;
mod rewrite;

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::{HarchiverConfig, WriteMode};
use crate::error::{ConstructionError, WriteError};
use crate::har::Entry;

pub(crate) use append::AppendSink;
pub(crate) use rewrite::RewriteSink;

/// Suffix of the temp file used by the rewrite discipline.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Path for the temp file: appends `.tmp` to the archive path (e.g. `a.har` → `a.har.tmp`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SinkOptions {
    pub pretty: bool,
    pub sync_writes: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            sync_writes: true,
        }
    }
}

/// A write discipline for the archive file.
pub(crate) trait ArchiveSink: Send {
    /// Adds `entries` (kept contiguous) to the archive on disk. Returns how
    /// many entries this write persisted for the first time, which exceeds
    /// `entries.len()` when it also carried a backlog from a failed write.
    fn append(&mut self, entries: Vec<Entry>) -> Result<usize, WriteError>;

    fn path(&self) -> &Path;
}

/// Creates the archive file for the configured discipline.
pub(crate) fn open_sink(
    path: &Path,
    config: &HarchiverConfig,
) -> Result<Box<dyn ArchiveSink>, ConstructionError> {
    let opts = SinkOptions {
        pretty: config.pretty,
        sync_writes: config.sync_writes,
    };
    Ok(match config.write_mode {
        WriteMode::Rewrite => Box::new(RewriteSink::create(path, opts)?),
        WriteMode::Append => Box::new(AppendSink::create(path, opts)?),
    })
}

/// Receives the outcome of each write on the writer thread.
pub(crate) trait WriteReporter: Send + Sync {
    fn written(&self, entries: usize);

    /// `fatal` is true for unrecoverable errors; the writer drops all later jobs.
    fn failed(&self, entries: usize, error: WriteError, fatal: bool);
}

enum Job {
    Entries(Vec<Entry>),
    Flush(mpsc::Sender<()>),
}

pub(crate) struct WriterHandle {
    tx: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl WriterHandle {
    pub(crate) fn spawn(
        sink: Box<dyn ArchiveSink>,
        reporter: Arc<dyn WriteReporter>,
    ) -> Result<Self, ConstructionError> {
        let (tx, rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("harchiver-writer".to_string())
            .spawn(move || run_writer(sink, rx, reporter))
            .map_err(ConstructionError::SpawnWriter)?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queues entries to be written together. Returns false if the writer is gone.
    pub(crate) fn submit(&self, entries: Vec<Entry>) -> bool {
        match &self.tx {
            Some(tx) => tx.send(Job::Entries(entries)).is_ok(),
            None => false,
        }
    }

    /// Queues a barrier; the returned receiver fires once every job queued
    /// before it has been processed.
    pub(crate) fn request_flush(&self) -> Option<mpsc::Receiver<()>> {
        let tx = self.tx.as_ref()?;
        let (ack_tx, ack_rx) = mpsc::channel();
        tx.send(Job::Flush(ack_tx)).ok()?;
        Some(ack_rx)
    }

    /// Blocks until every job queued before this call has been processed.
    #[cfg(test)]
    pub(crate) fn flush(&self) {
        if let Some(ack) = self.request_flush() {
            let _ = ack.recv();
        }
    }

    /// Closes the queue and waits for the writer to drain it.
    pub(crate) fn close(&mut self) {
        drop(self.tx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("archive writer thread panicked");
            }
        }
    }
}

impl Drop for WriterHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_writer(
    mut sink: Box<dyn ArchiveSink>,
    rx: mpsc::Receiver<Job>,
    reporter: Arc<dyn WriteReporter>,
) {
    let mut halted = false;
    while let Ok(job) = rx.recv() {
        match job {
            Job::Entries(entries) => {
                let n = entries.len();
                if halted {
                    tracing::debug!(entries = n, "archiver halted, dropping queued entries");
                    continue;
                }
                match sink.append(entries) {
                    Ok(persisted) => {
                        tracing::debug!(entries = persisted, path = %sink.path().display(), "archived");
                        reporter.written(persisted);
                    }
                    Err(e) => {
                        let fatal = e.is_unrecoverable();
                        tracing::warn!(entries = n, fatal, error = ?e, "archive write failed");
                        halted = fatal;
                        reporter.failed(n, e, fatal);
                    }
                }
            }
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::exchange::{Exchange, ExchangeId, ExchangeTiming, Request, Response};
    use crate::har::build_entry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub(crate) fn sample_entry(url: &str) -> Entry {
        let ex = Exchange::new(
            ExchangeId(0),
            Request::get(url),
            Response::new(200),
            ExchangeTiming::new(chrono::Utc::now(), Duration::from_millis(1)),
        );
        build_entry(&ex, None, 1024).unwrap()
    }

    #[derive(Default)]
    struct Counts {
        written: AtomicUsize,
        failed: AtomicUsize,
    }

    impl WriteReporter for Counts {
        fn written(&self, entries: usize) {
            self.written.fetch_add(entries, Ordering::SeqCst);
        }

        fn failed(&self, entries: usize, _error: WriteError, _fatal: bool) {
            self.failed.fetch_add(entries, Ordering::SeqCst);
        }
    }

    #[test]
    fn temp_path_appends_suffix() {
        let p = temp_path(Path::new("/tmp/session.har"));
        assert_eq!(p.to_string_lossy(), "/tmp/session.har.tmp");
    }

    #[test]
    fn close_drains_queued_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.har");
        let sink = open_sink(&path, &HarchiverConfig::default()).unwrap();
        let counts = Arc::new(Counts::default());
        let mut writer = WriterHandle::spawn(sink, counts.clone()).unwrap();
        for i in 0..20 {
            assert!(writer.submit(vec![sample_entry(&format!("http://example.com/{i}"))]));
        }
        writer.close();
        assert_eq!(counts.written.load(Ordering::SeqCst), 20);
        assert!(!writer.submit(vec![sample_entry("http://example.com/late")]));
        let har = crate::har::read_archive(&path).unwrap();
        assert_eq!(har.log.entries.len(), 20);
        assert_eq!(har.log.entries[19].request.url, "http://example.com/19");
    }

    #[test]
    fn fatal_error_drops_later_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("gone");
        std::fs::create_dir(&sub).unwrap();
        let sink = open_sink(&sub.join("q.har"), &HarchiverConfig::default()).unwrap();
        let counts = Arc::new(Counts::default());
        let writer = WriterHandle::spawn(sink, counts.clone()).unwrap();
        std::fs::remove_dir_all(&sub).unwrap();
        writer.submit(vec![sample_entry("http://example.com/1")]);
        writer.flush();
        std::fs::create_dir(&sub).unwrap();
        writer.submit(vec![sample_entry("http://example.com/2")]);
        writer.flush();
        assert_eq!(counts.failed.load(Ordering::SeqCst), 1);
        assert_eq!(counts.written.load(Ordering::SeqCst), 0);
    }
}
