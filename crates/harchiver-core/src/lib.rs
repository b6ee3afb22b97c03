//! Record completed HTTP exchanges into an HTTP Archive (HAR 1.2) file.
//!
//! The networking layer publishes completions and redirect hops on an
//! [`EventBus`]; an [`Archiver`] subscribed to it filters them, builds HAR
//! entries and writes them to disk from a single writer thread.

pub mod config;
pub mod logging;

pub mod archiver;
pub mod error;
pub mod events;
pub mod exchange;
pub mod filter;
pub mod har;
mod redirect;
pub mod writer;

pub use archiver::{Archiver, ArchiverStats};
pub use error::{ArchiveError, ConstructionError, EntryBuildError, WriteError};
pub use events::{EventBus, LifecycleObserver, SubscriptionId};
pub use exchange::{
    Exchange, ExchangeId, ExchangeTiming, Header, RedirectNotice, Request, Response,
    ResponseContext, ResponseFormat,
};
