use crate::constants::{
    DEFAULT_BIND, DEFAULT_CACHE_DIRECTORY, DEFAULT_CACHE_REFRESH_SECS, DEFAULT_CONFIG_PATH,
    DEFAULT_HOST, EXAMPLE_SOURCE, REMOTE_SOURCE, STATIC_SOURCE,
};
use crate::error::{Result, TimegateError};
use crate::registry::HandlerBinding;
use crate::types::ResourceType;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    /// Default (catch-all) handler
    pub handler: Option<HandlerConfig>,
    /// Prefix-bound handlers by name
    pub handlers: BTreeMap<String, HandlerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// External base URL used in self links
    pub host: String,
    pub bind: String,
    /// Seconds to wait for a source before giving up
    pub api_time_out: Option<f64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            bind: DEFAULT_BIND.to_string(),
            api_time_out: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    Filesystem,
    Null,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// Seconds a cached timemap stays valid
    pub refresh_time: u64,
    /// Largest serialized entry in bytes, 0 for no limit
    pub max_size: usize,
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            refresh_time: DEFAULT_CACHE_REFRESH_SECS,
            max_size: 0,
            directory: PathBuf::from(DEFAULT_CACHE_DIRECTORY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandlerConfig {
    /// One of `example`, `static`, `remote`
    pub source: String,
    #[serde(default)]
    pub base_uri: Option<String>,
    #[serde(default)]
    pub is_vcs: bool,
    #[serde(default)]
    pub use_timemap: bool,
    /// Upstream link-format timemap URL prefix (remote)
    #[serde(default)]
    pub timemap_endpoint: Option<String>,
    /// Upstream timegate URL prefix (remote)
    #[serde(default)]
    pub timegate_endpoint: Option<String>,
    /// JSON file of timemaps (static)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl HandlerConfig {
    pub fn example(base_uri: impl Into<String>) -> Self {
        Self {
            source: EXAMPLE_SOURCE.to_string(),
            base_uri: Some(base_uri.into()),
            is_vcs: true,
            use_timemap: true,
            timemap_endpoint: None,
            timegate_endpoint: None,
            path: None,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        ResourceType::from_is_vcs(self.is_vcs)
    }

    fn validate(&self, label: &str) -> Result<()> {
        match self.source.as_str() {
            EXAMPLE_SOURCE => Ok(()),
            STATIC_SOURCE if self.path.is_none() => Err(TimegateError::Configuration(format!(
                "handler '{}': static source needs a path",
                label
            ))),
            STATIC_SOURCE => Ok(()),
            REMOTE_SOURCE
                if self.timemap_endpoint.is_none() && self.timegate_endpoint.is_none() =>
            {
                Err(TimegateError::Configuration(format!(
                    "handler '{}': remote source needs a timemap_endpoint or a timegate_endpoint",
                    label
                )))
            }
            REMOTE_SOURCE => Ok(()),
            other => Err(TimegateError::Configuration(format!(
                "handler '{}': unknown source '{}'",
                label, other
            ))),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to the built-in example setup when the
    /// file does not exist. Environment overrides are applied afterwards.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => {
                info!("Loading configuration from {}", path.display());
                Self::from_toml(&content)?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "Config file {} not found, using the built-in example handler",
                    path.display()
                );
                Self::example()
            }
            Err(e) => {
                return Err(TimegateError::Configuration(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                )))
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config path from `TIMEGATE_CONFIG`, or the default.
    pub fn default_path() -> PathBuf {
        std::env::var("TIMEGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// The demo setup: one example handler for `http://www.example.com/`.
    pub fn example() -> Self {
        Self {
            handler: Some(HandlerConfig::example("http://www.example.com/")),
            ..Self::default()
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("TIMEGATE_HOST") {
            self.server.host = host;
        }
        if let Ok(bind) = std::env::var("TIMEGATE_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn validate(&mut self) -> Result<()> {
        // Self links are built as "{host}/timegate/..."
        let trimmed = self.server.host.trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            return Err(TimegateError::Configuration(
                "server.host must not be empty".to_string(),
            ));
        }
        self.server.host = trimmed;

        if let Some(timeout) = self.server.api_time_out {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(TimegateError::Configuration(format!(
                    "server.api_time_out must be a positive number of seconds, got {}",
                    timeout
                )));
            }
            Duration::try_from_secs_f64(timeout).map_err(|e| {
                TimegateError::Configuration(format!(
                    "server.api_time_out of {} seconds is out of range: {}",
                    timeout, e
                ))
            })?;
        }

        if self.handler.is_none() && self.handlers.is_empty() {
            return Err(TimegateError::Configuration(
                "no handler configured".to_string(),
            ));
        }
        if let Some(handler) = &self.handler {
            handler.validate("default")?;
        }
        for (name, handler) in &self.handlers {
            if handler.base_uri.as_deref().map_or(true, str::is_empty) {
                return Err(TimegateError::Configuration(format!(
                    "handler '{}' needs a base_uri",
                    name
                )));
            }
            handler.validate(name)?;
        }
        Ok(())
    }

    pub fn api_timeout(&self) -> Option<Duration> {
        self.server
            .api_time_out
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn refresh_time(&self) -> Duration {
        Duration::from_secs(self.cache.refresh_time)
    }

    /// Bindings with their source configuration: the default handler first,
    /// then named handlers in name order.
    pub fn bindings(&self) -> Vec<(HandlerBinding, &HandlerConfig)> {
        let mut bindings = Vec::with_capacity(self.handlers.len() + 1);
        if let Some(handler) = &self.handler {
            bindings.push((
                HandlerBinding::default_handler(
                    handler.base_uri.clone(),
                    handler.resource_type(),
                    handler.use_timemap,
                ),
                handler,
            ));
        }
        for (name, handler) in &self.handlers {
            bindings.push((
                HandlerBinding::named(
                    name.clone(),
                    handler.base_uri.clone().unwrap_or_default(),
                    handler.resource_type(),
                    handler.use_timemap,
                ),
                handler,
            ));
        }
        bindings
    }
}
