use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Missing API key for {provider_name}: {env_var} environment variable is not set")]
    MissingApiKey {
        provider_name: String,
        env_var: &'static str,
    },

    #[error("Unknown provider: {0} (expected ollama, openai or grok)")]
    Unknown(String),
}

/// Which API dialect the scoring model speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiDialect {
    /// `POST /api/generate`, reply text in `response`.
    OllamaGenerate,
    /// OpenAI-style chat completions, reply text in `choices[0].message.content`.
    ChatCompletions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    Ollama,
    Openai,
    Grok,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: Option<&'static str>,
    pub dialect: ApiDialect,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Ollama => ProviderConfig {
                api_url: "http://localhost:11434/api/generate",
                model: "llama3.2",
                env_var: None,
                dialect: ApiDialect::OllamaGenerate,
            },
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-4o-mini",
                env_var: Some("OPENAI_API_KEY"),
                dialect: ApiDialect::ChatCompletions,
            },
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: Some("XAI_API_KEY"),
                dialect: ApiDialect::ChatCompletions,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Ollama => "Ollama",
            Provider::Openai => "OpenAI",
            Provider::Grok => "Grok",
        }
    }

    /// Validate that the API key is set for this provider. Local providers
    /// need none and yield `None`.
    pub fn validate_api_key(&self) -> Result<Option<String>, ProviderError> {
        let Some(env_var) = self.config().env_var else {
            return Ok(None);
        };
        std::env::var(env_var)
            .map(Some)
            .map_err(|_| ProviderError::MissingApiKey {
                provider_name: self.name().to_string(),
                env_var,
            })
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::Openai),
            "grok" | "xai" => Ok(Provider::Grok),
            other => Err(ProviderError::Unknown(other.to_string())),
        }
    }
}
