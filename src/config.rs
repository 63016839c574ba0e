/// Application-level constants
pub const APP_NAME: &str = "rfp-assistant";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on sentence deltas forwarded per response edit.
pub const MAX_MEMORY_DELTAS: usize = 50;

/// Backend used when `RFP_BACKEND_URL` is not set.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const BACKEND_URL_ENV: &str = "RFP_BACKEND_URL";
pub const BACKEND_TIMEOUT_ENV: &str = "RFP_BACKEND_TIMEOUT_SECS";

/// Filter used when `RUST_LOG` is unset or invalid.
pub fn default_log_filter() -> String {
    "info,rfp_assistant_lib=debug".to_string()
}

/// Where the RFP backend lives and how long to wait for it.
///
/// Generation calls routinely take minutes, so the request timeout is long
/// while the connect timeout stays short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Missing or invalid values fall back to the
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let base_url = lookup(BACKEND_URL_ENV)
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.base_url);

        let timeout_secs = match lookup(BACKEND_TIMEOUT_ENV) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    tracing::warn!(
                        var = BACKEND_TIMEOUT_ENV,
                        value = %raw,
                        "Invalid backend timeout, using default"
                    );
                    defaults.timeout_secs
                }
            },
            None => defaults.timeout_secs,
        };

        Self {
            base_url,
            timeout_secs,
            connect_timeout_secs: defaults.connect_timeout_secs,
        }
    }
}
