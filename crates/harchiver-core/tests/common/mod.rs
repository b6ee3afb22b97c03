//! Shared helpers: a fake transport that publishes lifecycle events the way a
//! real networking layer would.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use harchiver_core::{
    EventBus, Exchange, ExchangeId, ExchangeTiming, RedirectNotice, Request, Response,
};

/// Publishes completions and redirects on an `EventBus`, assigning exchange ids.
pub struct FakeTransport {
    pub bus: EventBus,
    next_id: AtomicU64,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ExchangeId {
        ExchangeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Completes a GET with the given status and body.
    pub fn get(&self, url: &str, status: u16, body: &[u8]) -> ExchangeId {
        let id = self.next_id();
        self.bus.publish_completed(&exchange(id, url, status, body));
        id
    }

    pub fn redirect(&self, id: ExchangeId, from: &str, to: &str, status: u16) {
        self.bus.publish_redirected(&RedirectNotice {
            exchange_id: id,
            current: Request::get(from),
            new: Request::get(to),
            response: Some(Response::new(status).with_header("Location", to)),
            observed_at: Utc::now(),
        });
    }
}

pub fn exchange(id: ExchangeId, url: &str, status: u16, body: &[u8]) -> Exchange {
    Exchange::new(
        id,
        Request::get(url).with_header("Accept", "*/*"),
        Response::new(status)
            .with_header("Content-Type", "text/plain")
            .with_body(body),
        ExchangeTiming::new(Utc::now(), Duration::from_millis(5)),
    )
}
