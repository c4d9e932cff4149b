//! Batch input discovery and the filename conventions that map a video to
//! its question id.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    error::PipelineError,
    types::{SkipReason, SkippedFile},
};

pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "webm", "mkv", "avi", "mov"];
pub const QUESTION_MARKER: &str = "question_";

/// A video accepted for batch processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub question_id: u32,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub entries: Vec<BatchEntry>,
    pub skipped: Vec<SkippedFile>,
}

pub fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// `question_<digits>.<ext>` anywhere in the name, case-insensitive on the
/// marker; only digits may sit between the marker and the extension.
pub fn question_id_from_batch_name(file_name: &str) -> Result<u32, SkipReason> {
    let lower = file_name.to_ascii_lowercase();
    let stem = match lower.rfind('.') {
        Some(dot) => &lower[..dot],
        None => lower.as_str(),
    };
    let marker = stem.find(QUESTION_MARKER).ok_or(SkipReason::NoQuestionMarker)?;
    let digits = &stem[marker + QUESTION_MARKER.len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SkipReason::InvalidQuestionId);
    }
    digits.parse().map_err(|_| SkipReason::InvalidQuestionId)
}

/// The integer after the last `_` of the file stem, e.g. `video_12.mp4`.
pub fn question_id_from_single_name(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let (_, tail) = stem.rsplit_once('_')?;
    tail.parse().ok()
}

/// List the batch directory, sorted by file name.
pub fn discover(dir: &Path) -> Result<Discovery, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::DirectoryNotFound(dir.to_path_buf()));
    }
    let unreadable = |source| PipelineError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        paths.push(entry.map_err(unreadable)?.path());
    }
    paths.sort();

    let mut discovery = Discovery::default();
    for path in paths {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let verdict = if !path.is_file() {
            Err(SkipReason::NotAFile)
        } else if !has_video_extension(&path) {
            Err(SkipReason::UnsupportedExtension)
        } else {
            question_id_from_batch_name(&file_name)
        };

        match verdict {
            Ok(question_id) => discovery.entries.push(BatchEntry {
                path,
                file_name,
                question_id,
            }),
            Err(reason) => {
                debug!(file = %file_name, ?reason, "skipping batch input");
                discovery.skipped.push(SkippedFile {
                    file: file_name,
                    reason,
                });
            }
        }
    }
    Ok(discovery)
}
