use crate::confirm::{DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8080/";
const DEFAULT_KUBECTL_BIN: &str = "kubectl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Process configuration, read from `GANGWAY_*` environment variables.
#[derive(Clone)]
pub struct GatewayConfig {
    pub backend_url: Url,
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    pub cipher_key: Option<String>,
    pub kubectl_banner: String,
    pub kubectl_bin: PathBuf,
    pub init_script: Option<PathBuf>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("backend_url", &self.backend_url.as_str())
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("poll_interval", &self.poll_interval)
            .field("cipher_key", &self.cipher_key.as_ref().map(|_| "<redacted>"))
            .field("kubectl_banner", &self.kubectl_banner)
            .field("kubectl_bin", &self.kubectl_bin)
            .field("init_script", &self.init_script)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend url is valid"),
            access_token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cipher_key: None,
            kubectl_banner: String::new(),
            kubectl_bin: PathBuf::from(DEFAULT_KUBECTL_BIN),
            init_script: None,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend_url = match non_empty("GANGWAY_BACKEND_URL") {
            Some(raw) => parse_base_url(&raw)?,
            None => defaults.backend_url,
        };

        let poll_interval = match non_empty("GANGWAY_POLL_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|err| ConfigError::Invalid {
                    name: "GANGWAY_POLL_INTERVAL_SECS",
                    reason: format!("'{raw}': {err}"),
                })?;
                if secs == 0 || secs > MAX_POLL_INTERVAL.as_secs() {
                    return Err(ConfigError::Invalid {
                        name: "GANGWAY_POLL_INTERVAL_SECS",
                        reason: format!(
                            "must be between 1 and {} seconds, got {secs}",
                            MAX_POLL_INTERVAL.as_secs()
                        ),
                    });
                }
                Duration::from_secs(secs)
            }
            None => defaults.poll_interval,
        };

        Ok(Self {
            backend_url,
            access_token: non_empty("GANGWAY_ACCESS_TOKEN"),
            poll_interval,
            cipher_key: non_empty("GANGWAY_CIPHER_KEY"),
            kubectl_banner: env::var("GANGWAY_KUBECTL_BANNER").unwrap_or_default(),
            kubectl_bin: non_empty("GANGWAY_KUBECTL_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.kubectl_bin),
            init_script: non_empty("GANGWAY_KUBECTL_INIT_SCRIPT").map(PathBuf::from),
        })
    }
}

/// Parses the backend base url, appending a trailing slash so relative
/// endpoint paths join below it instead of replacing its last segment.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|err| ConfigError::Invalid {
        name: "GANGWAY_BACKEND_URL",
        reason: format!("'{raw}': {err}"),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            name: "GANGWAY_BACKEND_URL",
            reason: format!("'{raw}' cannot be used as a base url"),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    const VARS: &[&str] = &[
        "GANGWAY_BACKEND_URL",
        "GANGWAY_ACCESS_TOKEN",
        "GANGWAY_POLL_INTERVAL_SECS",
        "GANGWAY_CIPHER_KEY",
        "GANGWAY_KUBECTL_BANNER",
        "GANGWAY_KUBECTL_BIN",
        "GANGWAY_KUBECTL_INIT_SCRIPT",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn defaults_when_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.backend_url.as_str(), DEFAULT_BACKEND_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(config.access_token.is_none());
        assert!(config.cipher_key.is_none());
        assert_eq!(config.kubectl_bin, PathBuf::from("kubectl"));
    }

    #[test]
    fn reads_overrides_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var("GANGWAY_BACKEND_URL", "https://jms.example/core");
            env::set_var("GANGWAY_ACCESS_TOKEN", "service-token");
            env::set_var("GANGWAY_POLL_INTERVAL_SECS", "3");
            env::set_var("GANGWAY_CIPHER_KEY", "secret");
            env::set_var("GANGWAY_KUBECTL_INIT_SCRIPT", "/opt/gangway/init-kubectl.sh");
        }

        let config = GatewayConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.backend_url.as_str(), "https://jms.example/core/");
        assert_eq!(config.access_token.as_deref(), Some("service-token"));
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.cipher_key.as_deref(), Some("secret"));
        assert_eq!(
            config.init_script,
            Some(PathBuf::from("/opt/gangway/init-kubectl.sh"))
        );
        assert!(!format!("{config:?}").contains("service-token"));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var("GANGWAY_POLL_INTERVAL_SECS", "0");
        }

        let result = GatewayConfig::from_env();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "GANGWAY_POLL_INTERVAL_SECS",
                ..
            })
        ));
    }

    #[test]
    fn rejects_poll_interval_above_one_day() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var("GANGWAY_POLL_INTERVAL_SECS", "86401");
        }

        let result = GatewayConfig::from_env();
        unsafe {
            env::set_var("GANGWAY_POLL_INTERVAL_SECS", "86400");
        }
        let at_limit = GatewayConfig::from_env();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "GANGWAY_POLL_INTERVAL_SECS",
                ..
            })
        ));
        assert_eq!(at_limit.unwrap().poll_interval, MAX_POLL_INTERVAL);
    }

    #[test]
    fn rejects_unparseable_backend_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var("GANGWAY_BACKEND_URL", "not a url");
        }

        let result = GatewayConfig::from_env();
        clear_env();

        assert!(result.is_err());
    }
}
