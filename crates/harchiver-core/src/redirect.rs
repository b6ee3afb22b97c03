//! Redirect hops recorded per in-flight exchange until it completes.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::EntryBuildError;
use crate::exchange::{ExchangeId, Request, Response};
use crate::har::{build_hop_entry, Entry, Hop};

/// Identity of a hop within one exchange: method and URL of both requests.
type HopKey = (String, String, String, String);

fn hop_key(current: &Request, new: &Request) -> HopKey {
    (
        current.method.clone(),
        current.url.clone(),
        new.method.clone(),
        new.url.clone(),
    )
}

#[derive(Debug, Default)]
struct Chain {
    hops: Vec<Hop>,
    seen: HashSet<HopKey>,
}

/// Pending hops keyed by exchange id. Hops are kept raw; entries are only
/// built once the exchange completes and passes the filters.
#[derive(Debug, Default)]
pub(crate) struct RedirectTracker {
    chains: HashMap<ExchangeId, Chain>,
}

impl RedirectTracker {
    /// Returns false when the same hop was already recorded for this exchange.
    pub(crate) fn record(
        &mut self,
        id: ExchangeId,
        current: &Request,
        new: &Request,
        response: &Response,
        observed_at: DateTime<Utc>,
    ) -> bool {
        let chain = self.chains.entry(id).or_default();
        if !chain.seen.insert(hop_key(current, new)) {
            return false;
        }
        chain.hops.push(Hop {
            current: current.clone(),
            new: new.clone(),
            response: response.clone(),
            observed_at,
        });
        true
    }

    /// Removes and returns the hops of `id` in chronological order.
    pub(crate) fn take(&mut self, id: ExchangeId) -> Vec<Hop> {
        let mut hops = self
            .chains
            .remove(&id)
            .map(|c| c.hops)
            .unwrap_or_default();
        hops.sort_by_key(|h| h.observed_at);
        hops
    }

    pub(crate) fn clear(&mut self) {
        self.chains.clear();
    }

    pub(crate) fn pending_exchanges(&self) -> usize {
        self.chains.len()
    }
}

/// Entries for a chain of hops starting at `started_at`, plus the time the
/// last hop ended (where the final entry should begin).
pub(crate) fn build_chain(
    hops: &[Hop],
    started_at: DateTime<Utc>,
    max_body_bytes: usize,
) -> Result<(Vec<Entry>, Option<DateTime<Utc>>), EntryBuildError> {
    let mut entries = Vec::with_capacity(hops.len());
    let mut boundary = started_at;
    for hop in hops {
        entries.push(build_hop_entry(hop, boundary, max_body_bytes)?);
        boundary = boundary.max(hop.observed_at);
    }
    let last = (!hops.is_empty()).then_some(boundary);
    Ok((entries, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hop(tracker: &mut RedirectTracker, id: u64, from: &str, to: &str, at: DateTime<Utc>) -> bool {
        tracker.record(
            ExchangeId(id),
            &Request::get(from),
            &Request::get(to),
            &Response::new(302).with_header("Location", to),
            at,
        )
    }

    #[test]
    fn duplicate_hops_are_dropped() {
        let mut t = RedirectTracker::default();
        let now = Utc::now();
        assert!(hop(&mut t, 1, "http://a/old", "http://a/new", now));
        assert!(!hop(&mut t, 1, "http://a/old", "http://a/new", now));
        // Same hop for a different exchange is independent.
        assert!(hop(&mut t, 2, "http://a/old", "http://a/new", now));
        assert_eq!(t.take(ExchangeId(1)).len(), 1);
        assert!(t.take(ExchangeId(1)).is_empty());
        assert_eq!(t.pending_exchanges(), 1);
    }

    #[test]
    fn hops_come_back_in_chronological_order() {
        let mut t = RedirectTracker::default();
        let now = Utc::now();
        hop(&mut t, 1, "http://a/2", "http://a/3", now + Duration::milliseconds(20));
        hop(&mut t, 1, "http://a/1", "http://a/2", now + Duration::milliseconds(10));
        let hops = t.take(ExchangeId(1));
        assert_eq!(hops[0].current.url, "http://a/1");
        assert_eq!(hops[1].current.url, "http://a/2");
    }

    #[test]
    fn chain_entries_are_contiguous() {
        let mut t = RedirectTracker::default();
        let start = Utc::now();
        hop(&mut t, 1, "http://a/1", "http://a/2", start + Duration::milliseconds(10));
        hop(&mut t, 1, "http://a/2", "http://a/3", start + Duration::milliseconds(25));
        let hops = t.take(ExchangeId(1));
        let (entries, last) = build_chain(&hops, start, 1024).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].started_date_time, start);
        assert_eq!(entries[1].started_date_time, start + Duration::milliseconds(10));
        assert!((entries[1].time - 15.0).abs() < 1e-6);
        assert_eq!(last, Some(start + Duration::milliseconds(25)));
    }

    #[test]
    fn empty_chain_has_no_boundary() {
        let (entries, last) = build_chain(&[], Utc::now(), 1024).unwrap();
        assert!(entries.is_empty());
        assert!(last.is_none());
    }
}
