//! Run configuration.
//!
//! Precedence: explicit override > `INTERVUE_*` environment variable > INI
//! file > built-in default.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use configparser::ini::Ini;
use tracing::debug;

use crate::{
    audio::{DEFAULT_OVERLAP_SECONDS, DEFAULT_WINDOW_SECONDS},
    error::ConfigError,
    gaze::{GazePolicy, LateralMapping},
    paths,
    provider::Provider,
    transcribe::{DEFAULT_INITIAL_PROMPT, DEFAULT_LANGUAGE},
    video::LandmarkServiceConfig,
};

pub const ENV_PREFIX: &str = "INTERVUE_";
pub const DEFAULT_ITEM_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

const MAIN_SECTION: &str = "intervue";
const GAZE_SECTION: &str = "gaze";
const LLM_SECTION: &str = "llm";

/// Values given directly by the caller (usually CLI flags).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub questions: Option<PathBuf>,
    pub rubric: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub landmark_url: Option<String>,
    pub provider: Option<Provider>,
    pub llm_model: Option<String>,
    pub llm_url: Option<String>,
    pub item_timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub questions_path: PathBuf,
    pub rubric_path: Option<PathBuf>,
    pub model_path: PathBuf,
    pub language: String,
    pub initial_prompt: String,
    pub landmarks: LandmarkServiceConfig,
    pub provider: Provider,
    pub llm_model: Option<String>,
    pub llm_url: Option<String>,
    pub item_timeout: Duration,
    pub max_concurrency: usize,
    pub chunk_window_seconds: f64,
    pub chunk_overlap_seconds: f64,
    pub policy: GazePolicy,
}

/// Layered key lookup over the environment and an optional INI file.
struct Sources {
    env: HashMap<String, String>,
    ini: Option<Ini>,
}

impl Sources {
    fn env_name(section: &str, key: &str) -> String {
        if section == MAIN_SECTION {
            format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase())
        } else {
            format!(
                "{}{}_{}",
                ENV_PREFIX,
                section.to_ascii_uppercase(),
                key.to_ascii_uppercase()
            )
        }
    }

    fn raw(&self, section: &str, key: &str) -> Option<String> {
        self.env
            .get(&Self::env_name(section, key))
            .cloned()
            .or_else(|| self.ini.as_ref().and_then(|ini| ini.get(section, key)))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, section: &str, key: &str) -> Option<String> {
        self.raw(section, key)
    }

    fn parsed<T: FromStr>(&self, section: &str, key: &str) -> Result<Option<T>, ConfigError> {
        match self.raw(section, key) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: format!("{}.{}", section, key),
                    value,
                }),
        }
    }
}

fn load_ini(path: &Path) -> Result<Ini, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let mut ini = Ini::new();
    ini.load(path).map_err(|reason| ConfigError::FileUnreadable {
        path: path.to_path_buf(),
        reason,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(ini)
}

impl Settings {
    /// Resolve settings from the process environment and a config file.
    ///
    /// An explicit `config_file` must exist; the default locations are
    /// optional.
    pub fn load(config_file: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let ini = match config_file {
            Some(path) => Some(load_ini(path)?),
            None => paths::default_config_locations()
                .into_iter()
                .find(|p| p.is_file())
                .map(|p| load_ini(&p))
                .transpose()?,
        };
        let env = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        Self::resolve(env, ini, overrides)
    }

    fn resolve(
        env: HashMap<String, String>,
        ini: Option<Ini>,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        let src = Sources { env, ini };
        let main = MAIN_SECTION;

        let questions_path = overrides
            .questions
            .or_else(|| src.string(main, "questions").map(PathBuf::from))
            .ok_or(ConfigError::Missing("questions"))?;

        let rubric_path = overrides
            .rubric
            .or_else(|| src.string(main, "rubric").map(PathBuf::from));

        let model_path = overrides
            .model
            .or_else(|| src.string(main, "model").map(PathBuf::from))
            .unwrap_or_else(paths::default_model_path);

        let landmark_defaults = LandmarkServiceConfig::default();
        let landmarks = LandmarkServiceConfig {
            base_url: overrides
                .landmark_url
                .or_else(|| src.string(main, "landmark_url"))
                .unwrap_or(landmark_defaults.base_url),
            timeout: src
                .parsed::<u64>(main, "landmark_timeout_secs")?
                .map(Duration::from_secs)
                .unwrap_or(landmark_defaults.timeout),
            jpeg_quality: src
                .parsed::<u8>(main, "landmark_jpeg_quality")?
                .unwrap_or(landmark_defaults.jpeg_quality),
        };

        let provider = match overrides.provider {
            Some(provider) => provider,
            None => match src.string(LLM_SECTION, "provider") {
                Some(name) => name.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "llm.provider".to_string(),
                    value: name,
                })?,
                None => Provider::default(),
            },
        };

        let item_timeout_secs = match overrides.item_timeout_secs {
            Some(v) => v,
            None => src
                .parsed(main, "item_timeout_secs")?
                .unwrap_or(DEFAULT_ITEM_TIMEOUT_SECS),
        };
        let max_concurrency = match overrides.max_concurrency {
            Some(v) => v,
            None => src
                .parsed(main, "max_concurrency")?
                .unwrap_or(DEFAULT_MAX_CONCURRENCY),
        };
        if item_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "intervue.item_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "intervue.max_concurrency".to_string(),
                value: "0".to_string(),
            });
        }

        let chunk_window_seconds = src
            .parsed(main, "chunk_window_secs")?
            .unwrap_or(DEFAULT_WINDOW_SECONDS);
        let chunk_overlap_seconds = src
            .parsed(main, "chunk_overlap_secs")?
            .unwrap_or(DEFAULT_OVERLAP_SECONDS);
        if !(chunk_window_seconds > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "intervue.chunk_window_secs".to_string(),
                value: chunk_window_seconds.to_string(),
            });
        }

        let defaults = GazePolicy::default();
        let policy = GazePolicy {
            lower_ratio: src
                .parsed(GAZE_SECTION, "lower_ratio")?
                .unwrap_or(defaults.lower_ratio),
            upper_ratio: src
                .parsed(GAZE_SECTION, "upper_ratio")?
                .unwrap_or(defaults.upper_ratio),
            mapping: src
                .parsed::<LateralMapping>(GAZE_SECTION, "mapping")?
                .unwrap_or(defaults.mapping),
            eyes: defaults.eyes,
            event_threshold_seconds: src
                .parsed(GAZE_SECTION, "event_threshold_secs")?
                .unwrap_or(defaults.event_threshold_seconds),
            high_focus_percent: src
                .parsed(GAZE_SECTION, "high_focus_percent")?
                .unwrap_or(defaults.high_focus_percent),
            low_focus_percent: src
                .parsed(GAZE_SECTION, "low_focus_percent")?
                .unwrap_or(defaults.low_focus_percent),
        };
        policy.validate()?;

        Ok(Self {
            questions_path,
            rubric_path,
            model_path,
            language: src
                .string(main, "language")
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            initial_prompt: src
                .string(main, "initial_prompt")
                .unwrap_or_else(|| DEFAULT_INITIAL_PROMPT.to_string()),
            landmarks,
            provider,
            llm_model: overrides.llm_model.or_else(|| src.string(LLM_SECTION, "model")),
            llm_url: overrides.llm_url.or_else(|| src.string(LLM_SECTION, "url")),
            item_timeout: Duration::from_secs(item_timeout_secs),
            max_concurrency,
            chunk_window_seconds,
            chunk_overlap_seconds,
            policy,
        })
    }
}
