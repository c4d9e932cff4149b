//! Per-item scratch space: a private copy of the input video and the audio
//! derived from it.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::PipelineError;

const AUDIO_FILE_NAME: &str = "audio.wav";

/// Temporary directory owned by exactly one pipeline item.
///
/// The directory and everything in it are removed when the area is dropped.
/// Share it through an `Arc` so that a blocking task still reading the video
/// keeps it alive.
#[derive(Debug)]
pub struct StagingArea {
    dir: Option<TempDir>,
    root: PathBuf,
    video_path: PathBuf,
    audio_path: PathBuf,
}

impl StagingArea {
    /// Copy `source` into a fresh temporary directory under `parent`
    /// (or the system temp dir).
    pub async fn stage(source: &Path, parent: Option<&Path>) -> Result<Self, PipelineError> {
        let staging_err = |source_err: std::io::Error| PipelineError::Staging {
            path: source.to_path_buf(),
            source: source_err,
        };

        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("intervue-");
            b
        };
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(staging_err)?;

        let file_name = match source.extension() {
            Some(ext) => format!("video.{}", ext.to_string_lossy()),
            None => "video".to_string(),
        };
        let root = dir.path().to_path_buf();
        let video_path = root.join(file_name);
        let audio_path = root.join(AUDIO_FILE_NAME);

        // Build the area first so a failed copy still cleans up the directory.
        let area = Self {
            dir: Some(dir),
            root,
            video_path,
            audio_path,
        };
        tokio::fs::copy(source, &area.video_path)
            .await
            .map_err(staging_err)?;

        debug!(source = %source.display(), staged = %area.video_path.display(), "video staged");
        Ok(area)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn audio_path(&self) -> &Path {
        &self.audio_path
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(path = %path.display(), "staging area removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staging area"),
        }
    }
}
