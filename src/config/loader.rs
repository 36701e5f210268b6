//! Configuration Loader
//!
//! Layered configuration: built-in defaults, then an optional file, then
//! `TASKER_PROFILER_*` environment variables. Nested keys use `__`, so
//! `TASKER_PROFILER_REQUEST__SLOW_REQUEST_THRESHOLD=1.5` sets
//! `request.slow_request_threshold`.

use super::error::{ConfigResult, ConfigurationError};
use super::ProfilerConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "TASKER_PROFILER";
const DEFAULT_CONFIG_BASENAME: &str = "config/profiler";

/// Loaded, validated profiler configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: ProfilerConfig,
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load defaults, `config/profiler.*` when present, and the process environment
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::build(None, None)
    }

    /// Load a specific file (which must exist) plus the process environment
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(Some(path.as_ref()), None)
    }

    /// Load with an explicit set of environment variables instead of the
    /// process environment. Useful for tests that must not touch global state.
    pub fn load_with_env(
        path: Option<&Path>,
        vars: HashMap<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(path, Some(vars))
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(config: ProfilerConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            config_file: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// The explicit configuration file, if one was given
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    fn build(
        path: Option<&Path>,
        vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let source_description = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| DEFAULT_CONFIG_BASENAME.to_string());

        let defaults = Config::try_from(&ProfilerConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let mut builder = Config::builder().add_source(defaults);

        builder = match path {
            Some(path) => builder.add_source(File::from(path.to_path_buf()).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false)),
        };

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("n_plus_one.ignore_tables")
            .source(vars);

        let config: ProfilerConfig = builder
            .add_source(environment)
            .build()
            .and_then(|layered| layered.try_deserialize())
            .map_err(|e| ConfigurationError::load_error(source_description.clone(), e))?;

        config.validate()?;

        debug!(
            source = %source_description,
            config = %serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string()),
            "Profiler configuration resolved"
        );
        info!(
            slow_query_threshold = config.slow_query_threshold,
            slow_request_threshold = config.request.slow_request_threshold,
            slow_task_threshold = config.task.slow_task_threshold,
            "Profiler configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            config_file: path.map(Path::to_path_buf),
        }))
    }
}
