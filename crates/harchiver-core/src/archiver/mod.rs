//! The archiver: listens for completed exchanges and writes them to a HAR file.
//!
//! While archiving, the archiver is subscribed to the networking layer's
//! `EventBus`. Each completion is checked against the installed filters on
//! the notifying thread, turned into HAR entries (redirect hops first), and
//! queued for the single writer thread. Stopping only stops accepting new
//! exchanges; queued writes always finish, and dropping the archiver waits
//! for them.

mod control;
mod recorder;
mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::config::HarchiverConfig;
use crate::error::{ArchiveError, ConstructionError};
use crate::events::{EventBus, LifecycleObserver};
use crate::exchange::{Exchange, ExchangeId, Request, ResponseContext, Response};
use crate::writer::{self, WriterHandle};

pub use control::ErrorHandler;
pub use stats::ArchiverStats;

use control::Control;
use recorder::Recorder;

/// Records HTTP exchanges into a HAR 1.2 file.
pub struct Archiver {
    path: PathBuf,
    recorder: Arc<Recorder>,
}

impl Archiver {
    /// Creates (or truncates) the archive at `path` with default settings.
    pub fn create(path: impl AsRef<Path>, events: &EventBus) -> Result<Self, ConstructionError> {
        Self::create_with_config(path, events, &HarchiverConfig::default())
    }

    /// Creates (or truncates) the archive at `path`. The file holds a valid,
    /// empty HAR document when this returns. Archiving starts stopped.
    pub fn create_with_config(
        path: impl AsRef<Path>,
        events: &EventBus,
        config: &HarchiverConfig,
    ) -> Result<Self, ConstructionError> {
        let path = resolve_path(path.as_ref())?;
        let sink = writer::open_sink(&path, config)?;
        let control = Arc::new(Control::new(events.clone()));
        let writer = WriterHandle::spawn(sink, control.clone())?;
        tracing::info!(path = %path.display(), mode = ?config.write_mode, "archive created");
        Ok(Self {
            path,
            recorder: Arc::new(Recorder::new(control, writer, config.max_body_bytes)),
        })
    }

    /// Absolute path of the archive file.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn is_archiving(&self) -> bool {
        self.recorder.control.is_archiving()
    }

    /// Subscribes to lifecycle events and starts accepting exchanges. Calling it
    /// while already archiving does nothing. Fails once an unrecoverable write
    /// error has halted the archiver.
    pub fn start(&self) -> Result<(), ArchiveError> {
        let control = &self.recorder.control;
        let mut state = control.state.lock();
        if state.halted {
            return Err(ArchiveError::Halted);
        }
        if state.archiving {
            return Ok(());
        }
        let observer: Arc<dyn LifecycleObserver> = self.recorder.clone();
        state.subscription = Some(control.events.subscribe(observer));
        state.archiving = true;
        tracing::info!(path = %self.path.display(), "archiving started");
        Ok(())
    }

    /// Unsubscribes and stops accepting exchanges. Completions already past
    /// the activation check and queued writes still complete. Pending redirect
    /// hops of unfinished exchanges are discarded.
    pub fn stop(&self) {
        if self.recorder.control.deactivate() {
            tracing::info!(path = %self.path.display(), "archiving stopped");
        }
    }

    /// Only exchanges for which `filter` returns true are archived.
    pub fn set_operation_filter<F>(&self, filter: F)
    where
        F: Fn(&Exchange) -> bool + Send + Sync + 'static,
    {
        self.recorder.filters.write().operation = Some(Arc::new(filter));
    }

    /// Like `set_operation_filter`, but the predicate also sees the negotiated
    /// response format and decoded value (e.g. to skip images).
    pub fn set_task_filter<F>(&self, filter: F)
    where
        F: Fn(&Exchange, Option<&ResponseContext>) -> bool + Send + Sync + 'static,
    {
        self.recorder.filters.write().task = Some(Arc::new(filter));
    }

    pub fn clear_filters(&self) {
        *self.recorder.filters.write() = Default::default();
    }

    /// Installs a callback for skipped entries and write failures.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&ArchiveError) + Send + Sync + 'static,
    {
        self.recorder.control.set_error_handler(Some(Arc::new(handler)));
    }

    /// Redirect hook: call from the transport's redirect callback. A `None`
    /// response means no redirect happened and nothing is recorded. The same
    /// hop reported twice is recorded once.
    pub fn record_redirect(
        &self,
        exchange_id: ExchangeId,
        current: &Request,
        new: &Request,
        redirect_response: Option<&Response>,
    ) {
        self.recorder
            .redirect(exchange_id, current, new, redirect_response, Utc::now());
    }

    /// Handles a completed exchange directly, as if delivered by the bus.
    pub fn record_completion(&self, exchange: &Exchange) {
        self.recorder.complete(exchange);
    }

    /// Blocks until every entry queued so far is written (or failed).
    pub fn flush(&self) {
        self.recorder.flush();
    }

    pub fn stats(&self) -> ArchiverStats {
        self.recorder.control.stats.snapshot()
    }

    /// Stops archiving, waits for in-flight completions and then for all
    /// queued writes to finish.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Archiver {
    fn drop(&mut self) {
        self.stop();
        self.recorder.close_writer();
        tracing::debug!(path = %self.path.display(), "archive closed");
    }
}

impl std::fmt::Debug for Archiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archiver")
            .field("path", &self.path)
            .field("archiving", &self.is_archiving())
            .finish()
    }
}

/// Absolute archive path; rejects directories and missing parent directories.
fn resolve_path(path: &Path) -> Result<PathBuf, ConstructionError> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(ConstructionError::CurrentDir)?
            .join(path)
    };
    if abs.is_dir() {
        return Err(ConstructionError::IsDirectory(abs));
    }
    match abs.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(ConstructionError::MissingParent(abs))
        }
        _ => Ok(abs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeTiming;
    use std::time::Duration;

    fn exchange(id: u64, url: &str) -> Exchange {
        Exchange::new(
            ExchangeId(id),
            Request::get(url),
            Response::new(200),
            ExchangeTiming::new(Utc::now(), Duration::from_millis(3)),
        )
    }

    #[test]
    fn resolve_path_rejects_directory_and_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_path(dir.path()),
            Err(ConstructionError::IsDirectory(_))
        ));
        assert!(matches!(
            resolve_path(&dir.path().join("nope").join("a.har")),
            Err(ConstructionError::MissingParent(_))
        ));
        let ok = resolve_path(&dir.path().join("a.har")).unwrap();
        assert!(ok.is_absolute());
    }

    #[test]
    fn relative_path_is_made_absolute() {
        let p = resolve_path(Path::new("relative.har")).unwrap();
        assert!(p.is_absolute());
        assert!(p.ends_with("relative.har"));
    }

    #[test]
    fn starts_stopped_and_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let archiver = Archiver::create(dir.path().join("a.har"), &bus).unwrap();
        assert!(!archiver.is_archiving());
        assert!(archiver.file_path().exists());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let archiver = Archiver::create(dir.path().join("a.har"), &bus).unwrap();
        archiver.start().unwrap();
        archiver.start().unwrap();
        assert!(archiver.is_archiving());
        assert_eq!(bus.subscriber_count(), 1);
        archiver.stop();
        archiver.stop();
        assert!(!archiver.is_archiving());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn build_failure_is_reported_and_others_continue() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let archiver = Archiver::create(dir.path().join("a.har"), &bus).unwrap();
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = errors.clone();
        archiver.set_error_handler(move |e| sink.lock().push(e.to_string()));
        archiver.start().unwrap();

        bus.publish_completed(&exchange(1, "::not a url::"));
        bus.publish_completed(&exchange(2, "http://example.com/ok"));
        archiver.flush();

        let stats = archiver.stats();
        assert_eq!(stats.observed, 2);
        assert_eq!(stats.build_failures, 1);
        assert_eq!(stats.written_entries, 1);
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].contains("#1"));
    }

    #[test]
    fn drop_unsubscribes_from_bus() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        {
            let archiver = Archiver::create(dir.path().join("a.har"), &bus).unwrap();
            archiver.start().unwrap();
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
