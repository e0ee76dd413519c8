//! Providers file loading

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use yprompt_ai_adapters::{AiServiceConfig, CapabilityCacheConfig};
use yprompt_core_types::ProviderConfig;

/// Contents of `providers.toml`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProvidersFile {
    #[serde(default, skip_serializing_if = "ServiceSection::is_empty")]
    pub service: ServiceSection,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Optional overrides of the service defaults.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSection {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub reasoning_timeout_secs: Option<u64>,
    pub cache_ttl_hours: Option<i64>,
}

impl ServiceSection {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn service_config(&self) -> AiServiceConfig {
        let mut config = AiServiceConfig::default();
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(secs) = self.timeout_secs {
            config.base_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = self.reasoning_timeout_secs {
            config.reasoning_timeout = std::time::Duration::from_secs(secs);
        }
        config
    }

    pub fn cache_config(&self) -> CapabilityCacheConfig {
        match self.cache_ttl_hours {
            Some(hours) => CapabilityCacheConfig {
                ttl: chrono::Duration::hours(hours),
            },
            None => CapabilityCacheConfig::default(),
        }
    }
}

impl ProvidersFile {
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| anyhow!("Cannot determine config directory"))?;
        Ok(dir.join("yprompt").join("providers.toml"))
    }

    /// Load from `path`, or the default location. A missing default file is empty.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path()?, false),
        };
        if !path.exists() {
            if explicit {
                return Err(anyhow!("Providers file not found: {}", path.display()));
            }
            tracing::debug!("No providers file at {}, using none", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Enabled provider `id`, with the API key replaced when `api_key` is given.
    pub fn provider(&self, id: &str, api_key: Option<&str>) -> Result<ProviderConfig> {
        let mut provider = self
            .providers
            .iter()
            .find(|provider| provider.id == id)
            .cloned()
            .ok_or_else(|| {
                let known: Vec<&str> = self.providers.iter().map(|p| p.id.as_str()).collect();
                anyhow!("Unknown provider '{}' (configured: {})", id, known.join(", "))
            })?;
        if !provider.enabled {
            return Err(anyhow!("Provider '{}' is disabled", id));
        }
        if let Some(key) = api_key {
            provider.api_key = key.to_string();
        }
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yprompt_core_types::ApiFamily;

    const SAMPLE: &str = r#"
[service]
temperature = 0.2
cache_ttl_hours = 1

[[providers]]
id = "work"
name = "Work proxy"
type = "openai"
apiKey = "sk-file"
baseUrl = "https://proxy.example.com/v1"

[[providers.models]]
id = "claude-3-5-sonnet"
apiFamily = "anthropic"

[[providers]]
id = "off"
apiFamily = "gemini"
enabled = false
"#;

    #[test]
    fn parses_providers_and_model_overrides() {
        let file = ProvidersFile::parse(SAMPLE).unwrap();
        assert_eq!(file.providers.len(), 2);

        let work = &file.providers[0];
        assert_eq!(work.api_family, ApiFamily::OpenAi);
        assert_eq!(work.base_url, "https://proxy.example.com/v1");
        assert_eq!(work.effective_family("claude-3-5-sonnet"), ApiFamily::Anthropic);
        assert_eq!(work.effective_family("gpt-4o"), ApiFamily::OpenAi);
        assert_eq!(file.providers[1].api_family, ApiFamily::Google);

        assert_eq!(file.service.service_config().temperature, 0.2);
        assert_eq!(file.service.cache_config().ttl.num_hours(), 1);
    }

    #[test]
    fn api_key_override_and_disabled_providers() {
        let file = ProvidersFile::parse(SAMPLE).unwrap();
        assert_eq!(file.provider("work", None).unwrap().api_key, "sk-file");
        assert_eq!(file.provider("work", Some("sk-cli")).unwrap().api_key, "sk-cli");
        assert!(file.provider("off", None).is_err());

        let unknown = file.provider("nope", None).unwrap_err().to_string();
        assert!(unknown.contains("work"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ProvidersFile::load(Some(Path::new("/nonexistent/yprompt.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
