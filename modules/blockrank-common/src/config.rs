use std::env;
use std::time::Duration;

use tracing::info;

use crate::error::{BlockRankError, Result};

/// Per-stage time bounds. Navigation is host-dependent unless overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub scrape_single: Duration,
    pub scrape_batch: Duration,
    pub volume: Duration,
    pub navigation: Option<Duration>,
    pub inter_record_delay: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            scrape_single: Duration::from_secs(20),
            scrape_batch: Duration::from_secs(30),
            volume: Duration::from_secs(10),
            navigation: None,
            inter_record_delay: Duration::from_millis(2000),
        }
    }
}

/// Search-ads credentials. Volume lookups are skipped when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAdCredentials {
    pub api_key: String,
    pub secret_key: String,
    pub customer_id: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Remote browser pool
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub browserless_region: Option<String>,

    // Local browser
    pub local_browser_fallback: bool,
    pub chrome_bin: Option<String>,

    // Search volume
    pub searchad: Option<SearchAdCredentials>,

    pub timeouts: Timeouts,

    // Web server
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or_else(|| {
            BlockRankError::Config("DATABASE_URL environment variable is required".to_string())
        })?;

        let searchad = match (
            get("SEARCHAD_API_KEY"),
            get("SEARCHAD_SECRET_KEY"),
            get("SEARCHAD_CUSTOMER_ID"),
        ) {
            (Some(api_key), Some(secret_key), Some(customer_id)) => Some(SearchAdCredentials {
                api_key,
                secret_key,
                customer_id,
            }),
            _ => None,
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            scrape_single: secs(&get, "SCRAPE_TIMEOUT_SINGLE_SECS")?
                .unwrap_or(defaults.scrape_single),
            scrape_batch: secs(&get, "SCRAPE_TIMEOUT_BATCH_SECS")?
                .unwrap_or(defaults.scrape_batch),
            volume: secs(&get, "VOLUME_TIMEOUT_SECS")?.unwrap_or(defaults.volume),
            navigation: secs(&get, "NAVIGATION_TIMEOUT_SECS")?,
            inter_record_delay: parse::<u64>(&get, "INTER_RECORD_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.inter_record_delay),
        };

        Ok(Self {
            database_url,
            browserless_url: get("BROWSERLESS_URL"),
            browserless_token: get("BROWSERLESS_TOKEN"),
            browserless_region: get("BROWSERLESS_REGION"),
            local_browser_fallback: parse_bool(&get, "LOCAL_BROWSER_FALLBACK")?.unwrap_or(true),
            chrome_bin: get("CHROME_BIN"),
            searchad,
            timeouts,
            api_host: get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: parse(&get, "API_PORT")?.unwrap_or(3000),
        })
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            database = %redact_url(&self.database_url),
            browserless_url = self.browserless_url.as_deref().unwrap_or("-"),
            browserless_token = if self.browserless_token.is_some() { "set" } else { "unset" },
            browserless_region = self.browserless_region.as_deref().unwrap_or("-"),
            local_browser_fallback = self.local_browser_fallback,
            chrome_bin = self.chrome_bin.as_deref().unwrap_or("-"),
            searchad = if self.searchad.is_some() { "set" } else { "unset" },
            scrape_single_secs = self.timeouts.scrape_single.as_secs(),
            scrape_batch_secs = self.timeouts.scrape_batch.as_secs(),
            volume_secs = self.timeouts.volume.as_secs(),
            inter_record_delay_ms = self.timeouts.inter_record_delay.as_millis() as u64,
            "Configuration loaded"
        );
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| BlockRankError::Config(format!("{key} must be a number, got {raw:?}")))
        })
        .transpose()
}

fn secs(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    Ok(parse::<u64>(get, key)?.map(Duration::from_secs))
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    get(key)
        .map(|raw| match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(BlockRankError::Config(format!(
                "{key} must be a boolean, got {raw:?}"
            ))),
        })
        .transpose()
}

/// Strip the password from a connection URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn database_url_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, BlockRankError::Config(msg) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/blockrank")]).unwrap();
        assert_eq!(config.timeouts, Timeouts::default());
        assert!(config.local_browser_fallback);
        assert!(config.searchad.is_none());
        assert!(config.browserless_url.is_none());
        assert_eq!(config.api_port, 3000);
    }

    #[test]
    fn timeout_overrides_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/blockrank"),
            ("SCRAPE_TIMEOUT_BATCH_SECS", "45"),
            ("VOLUME_TIMEOUT_SECS", "5"),
            ("NAVIGATION_TIMEOUT_SECS", "75"),
            ("INTER_RECORD_DELAY_MS", "0"),
            ("LOCAL_BROWSER_FALLBACK", "false"),
        ])
        .unwrap();
        assert_eq!(config.timeouts.scrape_batch, Duration::from_secs(45));
        assert_eq!(config.timeouts.volume, Duration::from_secs(5));
        assert_eq!(config.timeouts.navigation, Some(Duration::from_secs(75)));
        assert_eq!(config.timeouts.inter_record_delay, Duration::ZERO);
        assert!(!config.local_browser_fallback);
    }

    #[test]
    fn garbage_numbers_are_config_errors() {
        let err = config_from(&[
            ("DATABASE_URL", "postgres://localhost/blockrank"),
            ("API_PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, BlockRankError::Config(msg) if msg.contains("API_PORT")));
    }

    #[test]
    fn partial_searchad_credentials_disable_volume() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/blockrank"),
            ("SEARCHAD_API_KEY", "k"),
            ("SEARCHAD_SECRET_KEY", "s"),
        ])
        .unwrap();
        assert!(config.searchad.is_none());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/blockrank"),
            ("BROWSERLESS_TOKEN", "   "),
        ])
        .unwrap();
        assert!(config.browserless_token.is_none());
    }

    #[test]
    fn redact_url_hides_credentials() {
        assert_eq!(
            redact_url("postgres://user:pw@db.internal:5432/app"),
            "postgres://***@db.internal:5432/app"
        );
        assert_eq!(redact_url("postgres://localhost/app"), "postgres://localhost/app");
    }
}
