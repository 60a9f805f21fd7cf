// src/core/snapshot.rs

use std::fs;
use std::path::{Path, PathBuf};

/// Point-in-time copy of a file that another worker may still be appending to.
///
/// The copy lives next to the original and is removed on drop, so every exit
/// path of the reader discards it.
#[derive(Debug)]
pub struct FileSnapshot {
    path: PathBuf,
    len: u64,
}

impl FileSnapshot {
    pub fn take(source: &Path) -> std::io::Result<Self> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "segment".to_string());

        let path = source.with_file_name(format!(
            ".{}.{}-{:08x}.snap",
            name,
            std::process::id(),
            rand::random::<u32>()
        ));

        let len = match fs::copy(source, &path) {
            Ok(len) => len,
            Err(e) => {
                // halbe Kopie nicht liegen lassen
                let _ = fs::remove_file(&path);
                return Err(e);
            }
        };

        log::debug!("[snapshot] {} → {} ({} bytes)", source.display(), path.display(), len);
        Ok(Self { path, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for FileSnapshot {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("[snapshot] failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_frozen_and_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("cam.idx");
        fs::write(&src, b"abcdef").unwrap();

        let snap = FileSnapshot::take(&src).unwrap();
        let snap_path = snap.path().to_path_buf();

        // Writer hängt weiter an, der Snapshot bleibt stehen
        fs::write(&src, b"abcdefghij").unwrap();
        assert_eq!(snap.len(), 6);
        assert_eq!(fs::read(&snap_path).unwrap(), b"abcdef");

        drop(snap);
        assert!(!snap_path.exists());
        assert!(src.exists());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSnapshot::take(&dir.path().join("nope.idx")).is_err());
    }
}
