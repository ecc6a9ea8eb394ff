//! On-disk frame archive with per-camera retention.
//!
//! Frames land in `<root>/<camera name>/<timestamp>.jpg`. Timestamps are
//! fixed-width ISO 8601 with microseconds, so sorting file names
//! lexicographically sorts them chronologically, and "oldest frame" is
//! always the first name in sorted order.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};

/// Extension given to archived frames.
pub const FRAME_EXT: &str = "jpg";

/// Build the file name for a frame captured at the given instant.
pub fn frame_file_name(captured_at: DateTime<Utc>) -> String {
    format!(
        "{}.{}",
        captured_at.format("%Y-%m-%dT%H:%M:%S%.6f"),
        FRAME_EXT
    )
}

/// Frame storage rooted at the configured output directory.
pub struct FrameArchive {
    root: PathBuf,
    max_frames: usize,
}

impl FrameArchive {
    pub fn new(root: PathBuf, max_frames: usize) -> Self {
        Self { root, max_frames }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Directory a camera's frames live in.
    pub fn camera_dir(&self, camera: &str) -> PathBuf {
        self.root.join(camera)
    }

    /// Create the archive root if it does not exist yet.
    pub fn ensure_root(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Create a camera's directory if it does not exist yet.
    pub fn ensure_camera_dir(&self, camera: &str) -> io::Result<PathBuf> {
        let dir = self.camera_dir(camera);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write one frame to the camera's directory, whole buffer at once.
    /// Returns the path of the new file.
    pub fn persist(
        &self,
        camera: &str,
        captured_at: DateTime<Utc>,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let dir = self.ensure_camera_dir(camera)?;
        let path = dir.join(frame_file_name(captured_at));
        std::fs::write(&path, bytes)?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// List a camera's archived frames in name order, oldest first.
    /// Non-frame files and subdirectories are skipped; a missing camera
    /// directory is an empty list.
    pub fn frames(&self, camera: &str) -> io::Result<Vec<PathBuf>> {
        let dir = self.camera_dir(camera);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FRAME_EXT) {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    frames.push(path);
                }
            }
        }
        frames.sort();
        Ok(frames)
    }

    /// Evict the oldest frame if the camera holds more than `max_frames`.
    ///
    /// Deletes at most one file per call; a backlog drains one frame per
    /// capture round. A deletion failure is logged and swallowed so the
    /// capture loop keeps running. Returns the evicted path, if any.
    pub fn enforce_limit(&self, camera: &str) -> io::Result<Option<PathBuf>> {
        let frames = self.frames(camera)?;
        if frames.len() <= self.max_frames {
            return Ok(None);
        }

        match frames.into_iter().next() {
            Some(oldest) => match std::fs::remove_file(&oldest) {
                Ok(()) => {
                    log::info!("Evicted oldest frame {}", oldest.display());
                    Ok(Some(oldest))
                }
                Err(e) => {
                    log::warn!("Failed to delete {}: {}", oldest.display(), e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}
