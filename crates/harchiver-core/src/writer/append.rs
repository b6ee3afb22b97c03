//! Structural append: the envelope is written once, then each entry is
//! spliced in before the closing `]}}`.
//!
//! Cheaper than a full rewrite, but a crash in the middle of a write can leave
//! the file incomplete. A write that fails with an error is rolled back to the
//! previous length.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{ConstructionError, WriteError};
use crate::har::{Entry, Har};

use super::{ArchiveSink, SinkOptions};

/// Closes the `entries` array, the `log` object and the document.
const TRAILER: &str = "]}}";

pub(crate) struct AppendSink {
    path: PathBuf,
    file: File,
    /// Current file length; the trailer occupies the last `TRAILER.len()` bytes.
    len: u64,
    entries: usize,
    sync_writes: bool,
}

impl AppendSink {
    pub(crate) fn create(path: &Path, opts: SinkOptions) -> Result<Self, ConstructionError> {
        let doc = serde_json::to_string(&Har::new())?;
        if !doc.ends_with(TRAILER) {
            return Err(ConstructionError::Serialize(
                <serde_json::Error as serde::ser::Error>::custom(
                    "archive envelope does not end with the entries array",
                ),
            ));
        }
        let create_err = |source: std::io::Error| ConstructionError::Create {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(create_err)?;
        file.write_all(doc.as_bytes()).map_err(create_err)?;
        file.flush().map_err(create_err)?;
        Ok(AppendSink {
            path: path.to_path_buf(),
            file,
            len: doc.len() as u64,
            entries: 0,
            sync_writes: opts.sync_writes,
        })
    }

    fn splice(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        let base = self.len - TRAILER.len() as u64;
        self.file.seek(SeekFrom::Start(base))?;
        self.file.write_all(chunk)?;
        self.file.flush()?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }

    // Best effort: put the trailer back where it was before the failed write.
    fn roll_back(&mut self) {
        let base = self.len - TRAILER.len() as u64;
        let _ = self.file.set_len(base);
        if self.file.seek(SeekFrom::Start(base)).is_ok() {
            let _ = self.file.write_all(TRAILER.as_bytes());
            let _ = self.file.flush();
        }
    }
}

impl ArchiveSink for AppendSink {
    fn append(&mut self, entries: Vec<Entry>) -> Result<usize, WriteError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut chunk = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            if self.entries + i > 0 {
                chunk.push(b',');
            }
            serde_json::to_writer(&mut chunk, entry)?;
        }
        chunk.extend_from_slice(TRAILER.as_bytes());

        if let Err(e) = self.splice(&chunk) {
            self.roll_back();
            return Err(WriteError::io(&self.path, e));
        }
        self.len = self.len - TRAILER.len() as u64 + chunk.len() as u64;
        self.entries += entries.len();
        Ok(entries.len())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
