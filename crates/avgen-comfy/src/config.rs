//! Client configuration.

use std::time::Duration;

use crate::retry::RetryConfig;

/// Default ComfyUI endpoint.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8188";

/// ComfyUI client configuration.
#[derive(Debug, Clone)]
pub struct ComfyConfig {
    /// Service root, without trailing slash
    pub base_url: String,
    /// Timeout for JSON requests
    pub timeout: Duration,
    /// Timeout for uploads and downloads
    pub transfer_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Delay between status checks
    pub poll_interval: Duration,
    /// Give up waiting on a single remote job after this long
    pub poll_timeout: Duration,
    /// Retry policy for uploads and submissions
    pub retry: RetryConfig,
}

impl Default for ComfyConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(3600),
            retry: RetryConfig::default(),
        }
    }
}

impl ComfyConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = std::env::var("COMFYUI_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.base_url);

        let secs = |name: &str, default: Duration| -> Duration {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: secs("COMFYUI_TIMEOUT_SECS", defaults.timeout),
            transfer_timeout: secs("COMFYUI_TRANSFER_TIMEOUT_SECS", defaults.transfer_timeout),
            connect_timeout: secs("COMFYUI_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            poll_interval: secs("COMFYUI_POLL_INTERVAL_SECS", defaults.poll_interval),
            poll_timeout: secs("COMFYUI_POLL_TIMEOUT_SECS", defaults.poll_timeout),
            retry: RetryConfig::from_env(),
        }
    }

    /// Config pointing at `base_url` with otherwise default settings.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        std::env::remove_var("COMFYUI_BASE_URL");
        std::env::remove_var("COMFYUI_POLL_INTERVAL_SECS");
        std::env::remove_var("COMFYUI_POLL_TIMEOUT_SECS");
        let config = ComfyConfig::from_env();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.poll_timeout, Duration::from_secs(3600));
    }

    #[test]
    #[serial]
    fn test_config_from_env_overrides() {
        std::env::set_var("COMFYUI_BASE_URL", "http://100.64.0.7:8188/");
        std::env::set_var("COMFYUI_POLL_INTERVAL_SECS", "5");
        let config = ComfyConfig::from_env();
        assert_eq!(config.base_url, "http://100.64.0.7:8188");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        std::env::remove_var("COMFYUI_BASE_URL");
        std::env::remove_var("COMFYUI_POLL_INTERVAL_SECS");
    }
}
