/// Controller tunables, supplied by the background page at startup
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Delay between polls while waiting for a replaced tab to finish loading
    pub replace_poll_interval_ms: u32,
    /// Give up polling a replaced tab after this long
    pub replace_poll_timeout_ms: u32,
    pub fetch_timeout_ms: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            replace_poll_interval_ms: 500,
            replace_poll_timeout_ms: 10_000,
            fetch_timeout_ms: 10_000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn level(&self) -> log::Level {
        self.log_level.parse().unwrap_or(log::Level::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"fetch-timeout-ms": 2500, "log-level": "debug"}"#).unwrap();

        assert_eq!(config.fetch_timeout_ms, 2500);
        assert_eq!(config.replace_poll_interval_ms, 500);
        assert_eq!(config.level(), log::Level::Debug);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let config = Config {
            log_level: "loud".to_string(),
            ..Config::default()
        };

        assert_eq!(config.level(), log::Level::Info);
    }
}
