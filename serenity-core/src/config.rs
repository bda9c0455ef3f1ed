use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_GREETING: &str = "Hi, I can see you now. How are you feeling?";

/// Upper bound on the backoff delay between chat retries.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize, Clone)]
pub struct SerenityConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
    pub greeting: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub max_retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Worst case for one chat exchange: every attempt hits the client
    /// timeout and every retry waits the longest backoff.
    pub fn exchange_timeout(&self) -> Duration {
        let retries = u32::try_from(self.max_retries).unwrap_or(u32::MAX);
        self.request_timeout()
            .saturating_mul(retries.saturating_add(1))
            .saturating_add(MAX_RETRY_DELAY.saturating_mul(retries))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SamplerConfig {
    pub interval_ms: u64,
    pub inference_timeout_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            inference_timeout_ms: 5000,
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Empty means the default location under the data directory.
    pub onnx_model_path: String,
    pub input_size: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            onnx_model_path: String::new(),
            input_size: 64,
        }
    }
}

impl SerenityConfig {
    /// Load from a TOML file. `SERENITY_BACKEND__BASE_URL`-style variables
    /// override file values.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("SERENITY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_minimal_config_fills_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[backend]\nbase_url = \"http://127.0.0.1:8000\"").unwrap();

        let config = SerenityConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.backend.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.backend.request_timeout_ms, 15_000);
        assert_eq!(config.backend.max_retries, 0);
        assert_eq!(config.sampler.interval(), Duration::from_millis(1000));
        assert_eq!(config.service.greeting, DEFAULT_GREETING);
        assert_eq!(config.model.input_size, 64);
    }

    #[test]
    fn test_load_overrides_sampler_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[backend]\nbase_url = \"http://x\"\n[sampler]\ninterval_ms = 250\ninference_timeout_ms = 900"
        )
        .unwrap();

        let config = SerenityConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.sampler.interval_ms, 250);
        assert_eq!(config.sampler.inference_timeout(), Duration::from_millis(900));
    }

    #[test]
    fn test_missing_backend_section_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[sampler]\ninterval_ms = 250\ninference_timeout_ms = 900").unwrap();
        assert!(SerenityConfig::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_exchange_timeout_covers_retry_backoff() {
        let mut backend = BackendConfig::new("http://x");
        backend.request_timeout_ms = 1_000;
        assert_eq!(backend.exchange_timeout(), Duration::from_secs(1));

        backend.max_retries = 2;
        // Three attempts plus two maximal backoff delays.
        assert_eq!(
            backend.exchange_timeout(),
            Duration::from_secs(3) + MAX_RETRY_DELAY * 2
        );
    }

    #[test]
    fn test_zero_interval_is_floored() {
        let sampler = SamplerConfig {
            interval_ms: 0,
            inference_timeout_ms: 10,
        };
        assert_eq!(sampler.interval(), Duration::from_millis(1));
    }
}
