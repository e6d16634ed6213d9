//! Settings domain types and validation.
//!
//! Settings are read from `TOOLGATE_*` environment variables. Parsing goes
//! through [`Settings::from_lookup`] so callers (and tests) can supply any
//! key/value source.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ENV: &str = "local";
pub const DEFAULT_APP_NAME: &str = "toolgate";

const ENV_PREFIX: &str = "TOOLGATE_";

/// Which storage backend holds registry, server and token records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// Process-local bounded caches.
    #[default]
    InMemory,
    /// Redis shared across instances.
    Redis,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in-memory" | "memory" | "local" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            _ => Err(()),
        }
    }
}

/// Which engine carries client-side tool executions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowBackend {
    /// Client-side tools cannot be executed.
    #[default]
    Disabled,
    /// Engine and worker share this process (development and tests).
    InProcess,
    /// Redis lists shared with out-of-process workers.
    Redis,
}

impl FromStr for WorkflowBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            "in-process" => Ok(Self::InProcess),
            "redis" => Ok(Self::Redis),
            _ => Err(()),
        }
    }
}

/// Runtime settings for the tool subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Environment segment of every cache key.
    pub env: String,

    /// Application segment of every cache key.
    pub app_name: String,

    pub store: StoreBackend,

    /// Required when `store` or `workflow` is Redis.
    pub redis_url: Option<String>,

    /// TTL window for tool records. Server records use one minute less.
    pub tool_ttl_minutes: u64,

    /// Bound of each local cache.
    pub local_cache_max_entries: u64,

    /// Bound of the live MCP client store.
    pub connection_capacity: u64,

    /// Idle time after which a live MCP client is closed.
    pub connection_idle_secs: u64,

    pub mcp_call_timeout_secs: u64,

    pub oauth_http_timeout_secs: u64,

    pub workflow: WorkflowBackend,

    /// How long a client-side execution is waited for.
    pub workflow_run_timeout_secs: u64,

    /// Load platform-hosted MCP servers at start-up.
    pub mcp_tools_enabled: bool,

    /// Path of the `{"mcpServers": {...}}` file.
    pub mcp_servers_config: Option<PathBuf>,

    /// Callback URI for OAuth flows started on the caller's behalf.
    pub oauth_redirect_uri: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: DEFAULT_ENV.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            store: StoreBackend::InMemory,
            redis_url: None,
            tool_ttl_minutes: 10,
            local_cache_max_entries: 500,
            connection_capacity: 500,
            connection_idle_secs: 3600,
            mcp_call_timeout_secs: 60,
            oauth_http_timeout_secs: 30,
            workflow: WorkflowBackend::Disabled,
            workflow_run_timeout_secs: 30,
            mcp_tools_enabled: false,
            mcp_servers_config: None,
            oauth_redirect_uri: None,
        }
    }
}

/// Settings validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("A Redis URL is required when {0} uses Redis")]
    MissingRedisUrl(&'static str),

    #[error("Key segment {0} cannot be empty or contain ':'")]
    InvalidKeySegment(&'static str),
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings from `lookup`, which is queried with full variable names
    /// such as `TOOLGATE_ENV`. Missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut settings = Self::default();

        if let Some(env) = get("ENV") {
            settings.env = env;
        }
        if let Some(app_name) = get("APP_NAME") {
            settings.app_name = app_name;
        }
        if let Some(store) = get("STORE") {
            settings.store = parse_with("STORE", &store)?;
        }
        settings.redis_url = get("REDIS_URL");
        if let Some(v) = get("TOOL_TTL_MINUTES") {
            settings.tool_ttl_minutes = parse_with("TOOL_TTL_MINUTES", &v)?;
        }
        if let Some(v) = get("LOCAL_CACHE_MAX_ENTRIES") {
            settings.local_cache_max_entries = parse_with("LOCAL_CACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = get("CONNECTION_CAPACITY") {
            settings.connection_capacity = parse_with("CONNECTION_CAPACITY", &v)?;
        }
        if let Some(v) = get("CONNECTION_IDLE_SECS") {
            settings.connection_idle_secs = parse_with("CONNECTION_IDLE_SECS", &v)?;
        }
        if let Some(v) = get("MCP_CALL_TIMEOUT_SECS") {
            settings.mcp_call_timeout_secs = parse_with("MCP_CALL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("OAUTH_HTTP_TIMEOUT_SECS") {
            settings.oauth_http_timeout_secs = parse_with("OAUTH_HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("WORKFLOW") {
            settings.workflow = parse_with("WORKFLOW", &v)?;
        }
        if let Some(v) = get("WORKFLOW_RUN_TIMEOUT_SECS") {
            settings.workflow_run_timeout_secs = parse_with("WORKFLOW_RUN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("MCP_TOOLS_ENABLED") {
            settings.mcp_tools_enabled = parse_with("MCP_TOOLS_ENABLED", &v)?;
        }
        settings.mcp_servers_config = get("MCP_SERVERS_CONFIG").map(PathBuf::from);
        settings.oauth_redirect_uri = get("OAUTH_REDIRECT_URI");

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, value) in [("TOOLGATE_ENV", &self.env), ("TOOLGATE_APP_NAME", &self.app_name)] {
            if value.is_empty() || value.contains(':') {
                return Err(SettingsError::InvalidKeySegment(name));
            }
        }

        let positive = [
            ("TOOLGATE_TOOL_TTL_MINUTES", self.tool_ttl_minutes),
            ("TOOLGATE_LOCAL_CACHE_MAX_ENTRIES", self.local_cache_max_entries),
            ("TOOLGATE_CONNECTION_CAPACITY", self.connection_capacity),
            ("TOOLGATE_CONNECTION_IDLE_SECS", self.connection_idle_secs),
            ("TOOLGATE_MCP_CALL_TIMEOUT_SECS", self.mcp_call_timeout_secs),
            ("TOOLGATE_OAUTH_HTTP_TIMEOUT_SECS", self.oauth_http_timeout_secs),
            ("TOOLGATE_WORKFLOW_RUN_TIMEOUT_SECS", self.workflow_run_timeout_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(SettingsError::Zero(*name));
        }

        if self.redis_url.is_none() {
            if self.store == StoreBackend::Redis {
                return Err(SettingsError::MissingRedisUrl("TOOLGATE_STORE"));
            }
            if self.workflow == WorkflowBackend::Redis {
                return Err(SettingsError::MissingRedisUrl("TOOLGATE_WORKFLOW"));
            }
        }
        Ok(())
    }

    pub const fn tool_ttl(&self) -> Duration {
        Duration::from_secs(self.tool_ttl_minutes * 60)
    }

    /// Server records expire a minute before their tools.
    pub const fn server_ttl(&self) -> Duration {
        let minutes = if self.tool_ttl_minutes > 1 {
            self.tool_ttl_minutes - 1
        } else {
            self.tool_ttl_minutes
        };
        Duration::from_secs(minutes * 60)
    }

    pub const fn connection_idle(&self) -> Duration {
        Duration::from_secs(self.connection_idle_secs)
    }

    pub const fn mcp_call_timeout(&self) -> Duration {
        Duration::from_secs(self.mcp_call_timeout_secs)
    }

    pub const fn oauth_http_timeout(&self) -> Duration {
        Duration::from_secs(self.oauth_http_timeout_secs)
    }

    pub const fn workflow_run_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow_run_timeout_secs)
    }
}

fn parse_with<T: FromStr>(name: &str, value: &str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidValue {
        key: format!("{ENV_PREFIX}{name}"),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.tool_ttl(), Duration::from_secs(600));
        assert_eq!(settings.server_ttl(), Duration::from_secs(540));
        assert_eq!(settings.local_cache_max_entries, 500);
        assert_eq!(settings.connection_idle(), Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("TOOLGATE_ENV", "prod"),
            ("TOOLGATE_STORE", "redis"),
            ("TOOLGATE_REDIS_URL", "redis://cache:6379"),
            ("TOOLGATE_TOOL_TTL_MINUTES", "1"),
            ("TOOLGATE_WORKFLOW", "in-process"),
            ("TOOLGATE_MCP_TOOLS_ENABLED", "true"),
        ]))
        .unwrap();
        assert_eq!(settings.env, "prod");
        assert_eq!(settings.store, StoreBackend::Redis);
        assert_eq!(settings.workflow, WorkflowBackend::InProcess);
        assert!(settings.mcp_tools_enabled);
        // a one-minute window is not shortened further
        assert_eq!(settings.server_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_number() {
        let err = Settings::from_lookup(lookup(&[("TOOLGATE_TOOL_TTL_MINUTES", "ten")])).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { ref key, .. } if key == "TOOLGATE_TOOL_TTL_MINUTES"));
    }

    #[test]
    fn test_redis_requires_url() {
        let err = Settings::from_lookup(lookup(&[("TOOLGATE_STORE", "redis")])).unwrap_err();
        assert_eq!(err, SettingsError::MissingRedisUrl("TOOLGATE_STORE"));
    }

    #[test]
    fn test_zero_rejected() {
        let settings = Settings {
            connection_capacity: 0,
            ..Settings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::Zero("TOOLGATE_CONNECTION_CAPACITY"))
        );
    }

    #[test]
    fn test_key_segment_rejects_colon() {
        let err = Settings::from_lookup(lookup(&[("TOOLGATE_APP_NAME", "a:b")])).unwrap_err();
        assert_eq!(err, SettingsError::InvalidKeySegment("TOOLGATE_APP_NAME"));
    }
}
