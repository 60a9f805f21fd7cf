// src/index/writer.rs

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::codec::{FrameIndexEntry, RECORD_SIZE};

/// Append-only writer for one segment's index file.
///
/// Every record is synced before `write` returns. The raw stream bytes the
/// record points at must already be on disk at that point.
pub struct IndexWriter {
    path: PathBuf,
    file: File,
    records: u64,
}

impl IndexWriter {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open index {}", path.display()))?;

        // bei Wiederaufnahme: vorhandene vollständige Records mitzählen,
        // einen angerissenen Record am Ende abschneiden
        let len = file.metadata()?.len();
        let existing = len / RECORD_SIZE as u64;
        let whole = existing * RECORD_SIZE as u64;
        if whole != len {
            log::warn!(
                "[index] {}: dropping {} byte partial record",
                path.display(),
                len - whole
            );
            file.set_len(whole)
                .with_context(|| format!("truncate {}", path.display()))?;
        }

        log::info!("[index] writing {} ({} existing records)", path.display(), existing);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            records: existing,
        })
    }

    pub fn write(&mut self, entry: &FrameIndexEntry) -> anyhow::Result<()> {
        let mut buf = Vec::with_capacity(RECORD_SIZE);
        entry.encode_into(&mut buf)?;

        self.file
            .write_all(&buf)
            .with_context(|| format!("append to {}", self.path.display()))?;
        self.file.flush()?;
        self.file
            .sync_data()
            .with_context(|| format!("sync {}", self.path.display()))?;

        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        log::debug!(
            "[index] closed {} after {} records",
            self.path.display(),
            self.records
        );
    }
}
