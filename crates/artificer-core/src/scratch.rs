//! Tracked temporary files.
//!
//! Every path handed out is remembered until [`ScratchSpace::cleanup`] runs.
//! The pipeline never deletes scratch files itself; the front end calls
//! `cleanup` on exit.

use crate::error::ArtificerResult;
use chrono::Local;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Scratch directory plus the set of files created in it
#[derive(Debug)]
pub struct ScratchSpace {
    dir: PathBuf,
    tracked: Mutex<Vec<PathBuf>>,
}

impl ScratchSpace {
    /// Scratch space rooted at `dir`; the directory is created lazily
    #[must_use]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            tracked: Mutex::new(Vec::new()),
        }
    }

    /// Scratch directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn allocate(&self, prefix: &str) -> ArtificerResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{prefix}_{}.wav", Uuid::new_v4()));
        self.track(path.clone());
        Ok(path)
    }

    /// Fresh path for raw synthesizer output
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be created
    pub fn synthesis_path(&self) -> ArtificerResult<PathBuf> {
        self.allocate("tts")
    }

    /// Fresh path for a processed preview
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be created
    pub fn preview_path(&self) -> ArtificerResult<PathBuf> {
        self.allocate("preview")
    }

    /// Fresh path for audio routed into the virtual cable
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be created
    pub fn send_path(&self) -> ArtificerResult<PathBuf> {
        self.allocate("send")
    }

    /// Remember an externally created path for cleanup
    pub fn track(&self, path: PathBuf) {
        debug!("Tracking scratch file {}", path.display());
        self.tracked.lock().push(path);
    }

    /// Paths currently tracked
    #[must_use]
    pub fn tracked(&self) -> Vec<PathBuf> {
        self.tracked.lock().clone()
    }

    /// Delete every tracked file, ignoring individual failures
    ///
    /// Returns the number of files removed.
    pub fn cleanup(&self) -> usize {
        let paths = std::mem::take(&mut *self.tracked.lock());
        let mut removed = 0;
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {e}", path.display()),
            }
        }
        debug!("Removed {removed} scratch file(s)");
        removed
    }
}

/// Default export file name, `artificer_<YYYYmmdd_HHMMSS>.wav`
#[must_use]
pub fn default_export_name() -> String {
    format!("artificer_{}.wav", Local::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_are_unique_and_tracked() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp_dir.path().join("temp"));

        let a = scratch.synthesis_path().unwrap();
        let b = scratch.preview_path().unwrap();
        let c = scratch.send_path().unwrap();
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("tts_"));
        assert!(b.file_name().unwrap().to_string_lossy().starts_with("preview_"));
        assert!(c.file_name().unwrap().to_string_lossy().starts_with("send_"));
        assert!(scratch.dir().is_dir());
        assert_eq!(scratch.tracked(), vec![a, b, c]);
    }

    #[test]
    fn test_cleanup_removes_files_and_ignores_missing() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::new(temp_dir.path());

        let written = scratch.synthesis_path().unwrap();
        std::fs::write(&written, b"RIFF").unwrap();
        let never_written = scratch.preview_path().unwrap();

        assert_eq!(scratch.cleanup(), 1);
        assert!(!written.exists());
        assert!(!never_written.exists());
        assert!(scratch.tracked().is_empty());
    }

    #[test]
    fn test_default_export_name() {
        let name = default_export_name();
        assert!(name.starts_with("artificer_"));
        assert!(name.ends_with(".wav"));
        // artificer_ + 8 digits + _ + 6 digits + .wav
        assert_eq!(name.len(), "artificer_".len() + 15 + ".wav".len());
    }
}
