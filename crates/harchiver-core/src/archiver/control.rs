//! Activation state shared by the archiver, its bus subscription and the writer thread.
//!
//! Pending redirect hops live here too: every handler checks the activation
//! flag while holding the tracker lock, and deactivation clears the tracker
//! only after the flag is down. A completion that saw the flag up has
//! therefore already taken its hops when they are cleared.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::{ArchiveError, WriteError};
use crate::events::{EventBus, SubscriptionId};
use crate::exchange::{ExchangeId, Request, Response};
use crate::har::Hop;
use crate::redirect::RedirectTracker;
use crate::writer::WriteReporter;

use super::stats::StatCounters;

/// Best-effort diagnostic callback for skipped entries and write failures.
pub type ErrorHandler = Arc<dyn Fn(&ArchiveError) + Send + Sync>;

#[derive(Debug, Default)]
pub(crate) struct Activation {
    pub archiving: bool,
    pub halted: bool,
    pub subscription: Option<SubscriptionId>,
}

pub(crate) struct Control {
    pub state: Mutex<Activation>,
    pub stats: StatCounters,
    pub events: EventBus,
    redirects: Mutex<RedirectTracker>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl Control {
    pub(crate) fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(Activation::default()),
            stats: StatCounters::default(),
            events,
            redirects: Mutex::new(RedirectTracker::default()),
            error_handler: RwLock::new(None),
        }
    }

    pub(crate) fn is_archiving(&self) -> bool {
        self.state.lock().archiving
    }

    pub(crate) fn set_error_handler(&self, handler: Option<ErrorHandler>) {
        *self.error_handler.write() = handler;
    }

    /// Hands an error to the diagnostic callback, if one is installed.
    pub(crate) fn report(&self, error: &ArchiveError) {
        let handler = self.error_handler.read().clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }

    /// Records a hop if archiving. `None` when not archiving, otherwise
    /// whether the hop was new for this exchange.
    pub(crate) fn record_hop(
        &self,
        id: ExchangeId,
        current: &Request,
        new: &Request,
        response: &Response,
        observed_at: DateTime<Utc>,
    ) -> Option<bool> {
        let mut redirects = self.redirects.lock();
        if !self.is_archiving() {
            return None;
        }
        Some(redirects.record(id, current, new, response, observed_at))
    }

    /// Removes the exchange's pending hops. `None` (hops discarded) when not archiving.
    pub(crate) fn take_hops(&self, id: ExchangeId) -> Option<Vec<Hop>> {
        let mut redirects = self.redirects.lock();
        let hops = redirects.take(id);
        self.is_archiving().then_some(hops)
    }

    /// Clears the flag, drops the bus subscription and discards pending hops
    /// of unfinished exchanges. Returns true if archiving was on.
    pub(crate) fn deactivate(&self) -> bool {
        let was_archiving = {
            let mut state = self.state.lock();
            let was_archiving = state.archiving;
            state.archiving = false;
            if let Some(id) = state.subscription.take() {
                self.events.unsubscribe(id);
            }
            was_archiving
        };
        let mut redirects = self.redirects.lock();
        let pending = redirects.pending_exchanges();
        redirects.clear();
        if pending > 0 {
            tracing::debug!(pending, "discarded redirect hops of unfinished exchanges");
        }
        was_archiving
    }
}

impl WriteReporter for Control {
    fn written(&self, entries: usize) {
        self.stats.written(entries);
    }

    fn failed(&self, _entries: usize, error: WriteError, fatal: bool) {
        self.stats.write_failed();
        if fatal {
            self.state.lock().halted = true;
            self.deactivate();
            tracing::error!("unrecoverable archive write error, archiving stopped");
        }
        self.report(&ArchiveError::Write(error));
    }
}
