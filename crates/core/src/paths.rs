use std::path::{Path, PathBuf};

use tokio::{fs, process::Command};

use crate::error::TranscriptionError;

pub const APP_DIR_NAME: &str = "intervue";
pub const CONFIG_FILE_NAME: &str = "intervue.ini";
pub const DEFAULT_MODEL_NAME: &str = "ggml-base.en.bin";

pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

pub fn get_model_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("models")
}

pub fn default_model_path() -> PathBuf {
    get_model_dir(&get_root_cache_dir()).join(DEFAULT_MODEL_NAME)
}

/// Config files tried in order when none is given explicitly.
pub fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        locations.push(config_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    locations
}

fn model_download_url(model_name: &str) -> String {
    format!(
        "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/{}",
        model_name
    )
}

/// Make sure a whisper model exists at `model_path`, downloading the ggml
/// build named by its file name when missing.
pub async fn ensure_model(model_path: &Path) -> Result<PathBuf, TranscriptionError> {
    if model_path.exists() {
        return Ok(model_path.to_path_buf());
    }

    let model_name = model_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
    let download_url = model_download_url(&model_name);

    if let Some(model_dir) = model_path.parent() {
        fs::create_dir_all(model_dir).await?;
    }

    let output = Command::new("curl")
        .arg("-fL")
        .arg(&download_url)
        .arg("-o")
        .arg(model_path)
        .output()
        .await?;

    if !output.status.success() {
        // Do not leave a truncated model behind.
        let _ = fs::remove_file(model_path).await;
        return Err(TranscriptionError::ModelDownloadFailed {
            url: download_url,
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(model_path.to_path_buf())
}
