//! TOML-based configuration for svncompare.
//!
//! Secrets are never stored in the file itself. The SVN password is
//! referenced through `svn.password_env` and resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// SVN client settings.
    #[serde(default)]
    pub svn: SvnConfig,

    /// State filter engine settings.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Compare engine settings.
    #[serde(default)]
    pub compare: CompareConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// SVN
// ---------------------------------------------------------------------------

/// Settings for the `svn` command-line connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvnConfig {
    /// Path or name of the `svn` binary.
    #[serde(default = "default_svn_binary")]
    pub binary: String,

    /// Username passed with `--username`.
    #[serde(default)]
    pub username: Option<String>,

    /// Name of the environment variable holding the SVN password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Accept unknown server certificates (`--trust-server-cert`).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Resolved password (not serialized).
    #[serde(skip)]
    pub password: Option<String>,
}

fn default_svn_binary() -> String {
    "svn".into()
}

impl Default for SvnConfig {
    fn default() -> Self {
        Self {
            binary: default_svn_binary(),
            username: None,
            password_env: None,
            trust_server_cert: false,
            password: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// State filter engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Scan subtrees when answering recursive presence checks. When off,
    /// recursive checks assume a match without scanning.
    #[serde(default = "default_true")]
    pub precise_enablements: bool,

    /// Glob patterns classifying unversioned items as ignored.
    #[serde(default)]
    pub global_ignores: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            precise_enablements: true,
            global_ignores: Vec::new(),
        }
    }
}

impl FilterConfig {
    /// Whether `name` matches one of the global ignore patterns.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.global_ignores
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, name))
    }
}

// ---------------------------------------------------------------------------
// Compare
// ---------------------------------------------------------------------------

/// Compare engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Skip `svn:externals` definitions when collecting statuses.
    #[serde(default = "default_true")]
    pub ignore_externals: bool,

    /// Fetch the content of every changed file right after the tree build.
    #[serde(default)]
    pub fetch_contents: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            ignore_externals: true,
            fetch_contents: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive (default "warn").
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Default location of the configuration file
    /// (`<config dir>/svncompare/config.toml`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("svncompare")
            .join("config.toml")
    }

    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the password environment variable, if one is configured.
    ///
    /// A missing variable only logs a warning; anonymous access is valid for
    /// many repositories.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.svn.password_env {
            self.svn.password = resolve_optional_env(env_name, "svn.password_env");
        }
        Ok(())
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.svn.binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "svn.binary".into(),
                detail: "svn binary must not be empty".into(),
            });
        }
        if self.svn.password_env.is_some() && self.svn.username.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "svn.username".into(),
                detail: "a username is required when password_env is set".into(),
            });
        }
        if let Some(pattern) = self.filters.global_ignores.iter().find(|p| p.is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "filters.global_ignores".into(),
                detail: format!("empty ignore pattern {:?}", pattern),
            });
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".into(),
                detail: format!(
                    "unknown level '{}', expected one of {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Render this configuration as TOML (resolved secrets are skipped).
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
