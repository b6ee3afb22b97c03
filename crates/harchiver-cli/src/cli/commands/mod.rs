//! CLI command handlers, one file per command.

mod inspect;
mod record;

pub use inspect::run_inspect;
pub use record::{run_record, RecordArgs};
