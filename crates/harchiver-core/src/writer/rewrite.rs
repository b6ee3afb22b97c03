//! Full-document rewrite: serialize every entry, write a temp file, rename it
//! over the archive. Readers only ever see complete documents.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ConstructionError, WriteError};
use crate::har::{Entry, Har};

use super::{temp_path, ArchiveSink, SinkOptions};

pub(crate) struct RewriteSink {
    path: PathBuf,
    temp_path: PathBuf,
    har: Har,
    /// Entries present in the file on disk.
    persisted: usize,
    opts: SinkOptions,
}

impl RewriteSink {
    /// Writes an empty archive at `path`, truncating any existing file.
    pub(crate) fn create(path: &Path, opts: SinkOptions) -> Result<Self, ConstructionError> {
        let sink = RewriteSink {
            path: path.to_path_buf(),
            temp_path: temp_path(path),
            har: Har::new(),
            persisted: 0,
            opts,
        };
        let bytes = sink.serialize()?;
        std::fs::write(path, bytes).map_err(|source| ConstructionError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(sink)
    }

    fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        if self.opts.pretty {
            serde_json::to_vec_pretty(&self.har)
        } else {
            serde_json::to_vec(&self.har)
        }
    }

    fn replace(&self, bytes: &[u8]) -> Result<(), WriteError> {
        let write_temp = || -> std::io::Result<()> {
            let mut f = File::create(&self.temp_path)?;
            f.write_all(bytes)?;
            if self.opts.sync_writes {
                f.sync_all()?;
            }
            Ok(())
        };
        if let Err(e) = write_temp() {
            let _ = std::fs::remove_file(&self.temp_path);
            return Err(WriteError::io(&self.temp_path, e));
        }
        std::fs::rename(&self.temp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&self.temp_path);
            WriteError::io(&self.path, e)
        })
    }
}

impl ArchiveSink for RewriteSink {
    // Entries stay in memory even if the write fails, so the next successful
    // write still contains them.
    fn append(&mut self, entries: Vec<Entry>) -> Result<usize, WriteError> {
        self.har.log.entries.extend(entries);
        let bytes = self.serialize()?;
        self.replace(&bytes)?;
        let total = self.har.log.entries.len();
        let fresh = total - self.persisted;
        self.persisted = total;
        Ok(fresh)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
