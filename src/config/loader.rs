//! Configuration File Loading
//!
//! Handles loading and saving configuration files from the standard
//! locations, in TOML or JSON.

use super::{CategoryTimeouts, Config};
use crate::error::{Error, Result};
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file loader
pub struct ConfigLoader {
    /// Search paths for configuration files
    search_paths: Vec<PathBuf>,
    /// Supported configuration file formats
    supported_formats: Vec<ConfigFormat>,
    /// Current configuration file path (if loaded)
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }

    /// Format implied by a file extension, TOML when unknown
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            supported_formats: vec![ConfigFormat::Toml, ConfigFormat::Json],
            current_path: None,
        }
    }

    /// Load from the first config file found, or defaults when there is none
    pub fn load() -> Result<Config> {
        Self::new().load_from_search_paths()
    }

    /// Search this loader's paths
    pub fn load_from_search_paths(&mut self) -> Result<Config> {
        match self.find_and_load_config()? {
            Some((path, config)) => {
                Self::validate_config(&config)?;
                info!("Configuration loaded from {}", path.display());
                self.current_path = Some(path);
                Ok(config)
            }
            None => {
                debug!("No configuration file found, using defaults");
                Ok(Config::default())
            }
        }
    }

    /// Load and validate a specific file
    pub fn load_from_path(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(Error::ConfigLoadFailed {
                path: path.to_path_buf(),
                reason: "file does not exist".to_string(),
            });
        }
        let config = Self::load_config_file(path, ConfigFormat::from_path(path))?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let format = ConfigFormat::from_path(path);
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| {
                Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                }
            })?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(config).map_err(|e| Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })?
            }
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Find and load configuration from search paths
    fn find_and_load_config(&self) -> Result<Option<(PathBuf, Config)>> {
        for path in &self.search_paths {
            for format in &self.supported_formats {
                let config_path = path.with_extension(format.extension());

                if config_path.exists() {
                    match Self::load_config_file(&config_path, *format) {
                        Ok(config) => return Ok(Some((config_path, config))),
                        Err(e) => {
                            // Keep searching
                            warn!("Failed to load config from {}: {}", config_path.display(), e);
                            continue;
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    /// Load a specific configuration file
    fn load_config_file(path: &Path, format: ConfigFormat) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        match format {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                format: format.name().to_string(),
                reason: e.to_string(),
            }),
            ConfigFormat::Json => {
                serde_json::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Get default search paths for configuration files
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("consolepilot").join("config"));
        }

        // Home directory fallback
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".consolepilot"));
        }

        // Current working directory
        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join(".consolepilot"));
        }

        paths
    }

    /// Validate configuration
    pub fn validate_config(config: &Config) -> Result<()> {
        fn invalid(field: &str, reason: &str) -> Error {
            Error::ConfigValidationFailed {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        // Console validation
        if config.console.program.trim().is_empty() {
            return Err(invalid("console.program", "Console program cannot be empty"));
        }
        let (cols, rows) = config.console.dimensions;
        if cols == 0 || rows == 0 {
            return Err(invalid("console.dimensions", "Dimensions must be greater than 0"));
        }
        for pattern in &config.console.prompt_patterns {
            if let Err(e) = Regex::new(pattern) {
                return Err(Error::ConfigValidationFailed {
                    field: "console.prompt_patterns".to_string(),
                    reason: format!("invalid pattern '{}': {}", pattern, e),
                });
            }
        }

        // Supervisor validation
        if config.supervisor.startup_timeout_secs == 0 {
            return Err(invalid(
                "supervisor.startup_timeout_secs",
                "Startup timeout must be greater than 0",
            ));
        }
        if config.supervisor.max_restarts > 100 {
            return Err(invalid("supervisor.max_restarts", "Restart limit cannot exceed 100"));
        }

        // Timeout validation
        let t = &config.timeouts;
        for (name, bounds) in [
            ("timeouts.query", &t.query),
            ("timeouts.mutating", &t.mutating),
            ("timeouts.long_running", &t.long_running),
            ("timeouts.administrative", &t.administrative),
        ] {
            Self::validate_bounds(name, bounds)?;
        }
        if t.history_window == 0 {
            return Err(invalid("timeouts.history_window", "History window must be at least 1"));
        }
        if t.grow_factor < 1.0 {
            return Err(invalid("timeouts.grow_factor", "Grow factor must be at least 1.0"));
        }
        if !(t.shrink_factor > 0.0 && t.shrink_factor <= 1.0) {
            return Err(invalid("timeouts.shrink_factor", "Shrink factor must be in (0, 1]"));
        }
        if !(t.fast_ratio > 0.0 && t.fast_ratio < t.slow_ratio && t.slow_ratio <= 1.0) {
            return Err(invalid(
                "timeouts.fast_ratio",
                "Ratios must satisfy 0 < fast_ratio < slow_ratio <= 1",
            ));
        }

        // Registry validation
        if config.registry.liveness_window_secs == 0 {
            return Err(invalid(
                "registry.liveness_window_secs",
                "Liveness window must be greater than 0",
            ));
        }
        if config.registry.reap_interval_secs == 0 {
            return Err(invalid(
                "registry.reap_interval_secs",
                "Reap interval must be greater than 0",
            ));
        }

        // Policy validation
        if config.policy.max_command_length == 0 {
            return Err(invalid(
                "policy.max_command_length",
                "Maximum command length must be greater than 0",
            ));
        }
        if config.policy.rate_limit_max_calls == 0 || config.policy.rate_limit_window_secs == 0 {
            return Err(invalid("policy.rate_limit", "Rate limit must be greater than 0"));
        }

        // Output validation
        if config.output.max_output_bytes == 0 {
            return Err(invalid(
                "output.max_output_bytes",
                "Output limit must be greater than 0",
            ));
        }
        if config.output.page_size == 0 {
            return Err(invalid("output.page_size", "Page size must be greater than 0"));
        }

        Ok(())
    }

    fn validate_bounds(field: &str, bounds: &CategoryTimeouts) -> Result<()> {
        if bounds.min_secs == 0 {
            return Err(Error::ConfigValidationFailed {
                field: format!("{}.min_secs", field),
                reason: "Minimum budget must be greater than 0".to_string(),
            });
        }
        if !(bounds.min_secs <= bounds.base_secs && bounds.base_secs <= bounds.max_secs) {
            return Err(Error::ConfigValidationFailed {
                field: field.to_string(),
                reason: "Budgets must satisfy min <= base <= max".to_string(),
            });
        }
        if bounds.max_secs > 86400 {
            return Err(Error::ConfigValidationFailed {
                field: format!("{}.max_secs", field),
                reason: "Budget cannot exceed 24 hours (86400 seconds)".to_string(),
            });
        }
        Ok(())
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Add a custom search path
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    /// Clear all search paths and add a single path
    pub fn set_search_path(&mut self, path: PathBuf) {
        self.search_paths = vec![path];
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
