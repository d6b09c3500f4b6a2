//! Local copies of uploaded recordings
//!
//! When `keep_recordings` is on, encoded WAVs are also written to:
//! ~/.local/share/speakup-capture/recordings/

use std::fs;
use std::path::{Path, PathBuf};

use crate::upload::AudioBlob;

/// Number of recordings kept on disk.
pub const MAX_RECORDINGS: usize = 5;

/// Returns: ~/.local/share/speakup-capture/recordings/
pub fn recordings_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("speakup-capture")
        .join("recordings")
}

/// Write `blob` into `dir` under its upload file name.
pub fn save_recording(dir: &Path, blob: &AudioBlob) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(blob.file_name());
    fs::write(&path, &blob.bytes)?;
    log::debug!("Saved recording copy: {:?}", path);
    Ok(path)
}

/// Delete the oldest WAVs in `dir`, keeping the newest `keep`.
pub fn cleanup_old_recordings(dir: &Path, keep: usize) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "wav")
                .unwrap_or(false)
        })
        .collect();

    if entries.len() <= keep {
        return Ok(0);
    }

    // Oldest first; the millis in the file name break mtime ties
    entries.sort_by_key(|e| {
        let modified = e.metadata().and_then(|m| m.modified()).ok();
        (modified, e.file_name())
    });

    let to_delete = entries.len() - keep;
    let mut deleted = 0;

    for entry in entries.into_iter().take(to_delete) {
        if fs::remove_file(entry.path()).is_ok() {
            log::debug!("Cleaned up old recording: {:?}", entry.path());
            deleted += 1;
        }
    }

    Ok(deleted)
}
