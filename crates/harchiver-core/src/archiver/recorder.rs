//! Lifecycle handlers: activation check, filtering, entry construction, enqueue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::{ArchiveError, EntryBuildError};
use crate::events::LifecycleObserver;
use crate::exchange::{Exchange, ExchangeId, RedirectNotice, Request, Response};
use crate::filter::FilterSet;
use crate::har::{build_entry, Entry, Hop};
use crate::redirect::build_chain;
use crate::writer::WriterHandle;

use super::control::Control;

pub(crate) struct Recorder {
    pub control: Arc<Control>,
    pub filters: RwLock<FilterSet>,
    /// Held shared by every completion from its activation check to its
    /// submit; `close_writer` takes it exclusively to wait them out.
    in_flight: RwLock<()>,
    writer: Mutex<WriterHandle>,
    max_body_bytes: usize,
}

impl Recorder {
    pub(crate) fn new(control: Arc<Control>, writer: WriterHandle, max_body_bytes: usize) -> Self {
        Self {
            control,
            filters: RwLock::new(FilterSet::default()),
            in_flight: RwLock::new(()),
            writer: Mutex::new(writer),
            max_body_bytes,
        }
    }

    pub(crate) fn redirect(
        &self,
        id: ExchangeId,
        current: &Request,
        new: &Request,
        response: Option<&Response>,
        observed_at: DateTime<Utc>,
    ) {
        let Some(response) = response else { return };
        match self.control.record_hop(id, current, new, response, observed_at) {
            Some(true) => {
                tracing::debug!(exchange = %id, from = %current.url, to = %new.url, "redirect recorded")
            }
            Some(false) => {
                tracing::debug!(exchange = %id, from = %current.url, to = %new.url, "duplicate redirect dropped")
            }
            None => {}
        }
    }

    /// A completion that passes the activation check is always processed to
    /// the end, even if `stop()` or `close()` runs meanwhile.
    pub(crate) fn complete(&self, exchange: &Exchange) {
        // Recursive: a filter may itself publish on the bus.
        let _in_flight = self.in_flight.read_recursive();
        let Some(hops) = self.control.take_hops(exchange.id) else {
            return;
        };
        self.control.stats.observed();

        // Clone out so user predicates run without the lock held.
        let filters = self.filters.read().clone();
        if !filters.accepts(exchange) {
            self.control.stats.filtered();
            tracing::debug!(exchange = %exchange.id, url = %exchange.request.url, "excluded by filter");
            return;
        }

        match self.build(exchange, &hops) {
            Ok(entries) => {
                let n = entries.len();
                if self.writer.lock().submit(entries) {
                    self.control.stats.queued(n);
                } else {
                    tracing::warn!(exchange = %exchange.id, "archive writer closed, entry dropped");
                }
            }
            Err(source) => {
                self.control.stats.build_failed();
                let error = ArchiveError::EntryBuild {
                    exchange: exchange.id,
                    source,
                };
                tracing::warn!(error = ?error, "skipping exchange");
                self.control.report(&error);
            }
        }
    }

    /// Hop entries followed by the final entry, in chronological order.
    fn build(&self, exchange: &Exchange, hops: &[Hop]) -> Result<Vec<Entry>, EntryBuildError> {
        let (mut entries, last_hop) =
            build_chain(hops, exchange.timing.started_at, self.max_body_bytes)?;
        entries.push(build_entry(exchange, last_hop, self.max_body_bytes)?);
        Ok(entries)
    }

    /// Waits without holding the writer lock so handlers can keep enqueuing.
    pub(crate) fn flush(&self) {
        let ack = self.writer.lock().request_flush();
        if let Some(ack) = ack {
            let _ = ack.recv();
        }
    }

    /// Waits for completions already past the activation check, then drains
    /// and joins the writer.
    pub(crate) fn close_writer(&self) {
        let _drained = self.in_flight.write();
        self.writer.lock().close();
    }
}

impl LifecycleObserver for Recorder {
    fn exchange_completed(&self, exchange: &Exchange) {
        self.complete(exchange);
    }

    fn exchange_redirected(&self, notice: &RedirectNotice) {
        self.redirect(
            notice.exchange_id,
            &notice.current,
            &notice.new,
            notice.response.as_ref(),
            notice.observed_at,
        );
    }
}
