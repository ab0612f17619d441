use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::{
    ENV_ACCESS_TOKEN, ENV_IDENTIFYING_LABEL, ENV_LISTEN, ENV_LOCATION, ENV_LOG_FORMAT,
    ENV_LOG_LEVEL, ENV_MAX_CONCURRENT_LOOKUPS, ENV_MAX_REVISIONS, ENV_PROJECT, ENV_STATIC_PAGE,
    ENV_TIMEZONE,
};

pub const DEFAULT_MAX_REVISIONS: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Environment overrides that failed to parse, as `(variable, value)`.
    /// Kept so they can be logged once the subscriber is installed.
    #[serde(skip)]
    pub rejected_overrides: Vec<(&'static str, String)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub identifying_label: String,
    #[serde(default = "default_max_revisions")]
    pub max_revisions: usize,
    /// IANA zone name used to display revision creation times
    pub timezone: Option<String>,
    /// Unset means one lookup task per tagged revision with no limit
    pub max_concurrent_lookups: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_run_endpoint")]
    pub run_endpoint: String,
    #[serde(default = "default_compute_endpoint")]
    pub compute_endpoint: String,
    #[serde(default = "default_metadata_endpoint")]
    pub metadata_endpoint: String,
    /// Static bearer token; the metadata server is used when unset
    pub access_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_static_page")]
    pub static_page: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_revisions() -> usize {
    DEFAULT_MAX_REVISIONS
}

fn default_run_endpoint() -> String {
    "https://run.googleapis.com".to_string()
}

fn default_compute_endpoint() -> String {
    "https://compute.googleapis.com".to_string()
}

fn default_metadata_endpoint() -> String {
    "http://metadata.google.internal".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_static_page() -> PathBuf {
    PathBuf::from("static/index.html")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            location: String::new(),
            identifying_label: String::new(),
            max_revisions: default_max_revisions(),
            timezone: None,
            max_concurrent_lookups: None,
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            run_endpoint: default_run_endpoint(),
            compute_endpoint: default_compute_endpoint(),
            metadata_endpoint: default_metadata_endpoint(),
            access_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            static_page: default_static_page(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl CloudConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_PROJECT) {
            self.viewer.project = v;
        }
        if let Some(v) = get(ENV_LOCATION) {
            self.viewer.location = v;
        }
        if let Some(v) = get(ENV_IDENTIFYING_LABEL) {
            self.viewer.identifying_label = v;
        }
        if let Some(v) = get(ENV_MAX_REVISIONS) {
            self.viewer.max_revisions = match v.trim().parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    self.rejected_overrides.push((ENV_MAX_REVISIONS, v));
                    DEFAULT_MAX_REVISIONS
                }
            };
        }
        if let Some(v) = get(ENV_TIMEZONE) {
            self.viewer.timezone = Some(v);
        }
        if let Some(v) = get(ENV_MAX_CONCURRENT_LOOKUPS) {
            match v.trim().parse::<usize>() {
                Ok(n) => self.viewer.max_concurrent_lookups = Some(n),
                Err(_) => self.rejected_overrides.push((ENV_MAX_CONCURRENT_LOOKUPS, v)),
            }
        }
        if let Some(v) = get(ENV_ACCESS_TOKEN) {
            self.cloud.access_token = Some(v);
        }
        if let Some(v) = get(ENV_LISTEN) {
            self.api.listen = v;
        }
        if let Some(v) = get(ENV_STATIC_PAGE) {
            self.api.static_page = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_LOG_LEVEL) {
            self.logging.level = v;
        }
        if let Some(v) = get(ENV_LOG_FORMAT) {
            self.logging.format = v;
        }

        // A zero cap would select nothing; treat it like an invalid value.
        if self.viewer.max_revisions == 0 {
            self.viewer.max_revisions = DEFAULT_MAX_REVISIONS;
        }
        if self.viewer.max_concurrent_lookups == Some(0) {
            self.viewer.max_concurrent_lookups = None;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.viewer.project.trim().is_empty() {
            bail!("No project configured (set viewer.project or {})", ENV_PROJECT);
        }
        if self.viewer.location.trim().is_empty() {
            bail!("No location configured (set viewer.location or {})", ENV_LOCATION);
        }
        Ok(())
    }
}
