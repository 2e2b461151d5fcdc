//! `[watch]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[watch]` section in stitch.toml - watch driver settings.
///
/// # Example
/// ```toml
/// [watch]
/// debounce_ms = 500   # Quiet period before a scheduled rebuild runs
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default = "defaults::watch::debounce_ms")]
    #[educe(Default = defaults::watch::debounce_ms())]
    pub debounce_ms: u64,
}

impl WatchConfig {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use std::time::Duration;

    #[test]
    fn test_watch_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();
        assert_eq!(config.watch.debounce_ms, 1000);
        assert_eq!(config.watch.debounce(), Duration::from_secs(1));
    }

    #[test]
    fn test_watch_config_override() {
        let config: SiteConfig = toml::from_str("[watch]\ndebounce_ms = 250").unwrap();
        assert_eq!(config.watch.debounce(), Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_field_rejection() {
        let result: Result<SiteConfig, _> = toml::from_str("[watch]\npoll = true");
        assert!(result.is_err());
    }
}
