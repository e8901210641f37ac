//! Stack configuration parsing, validation, and path resolution.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::models::service::ServiceSpec;
use crate::{AppError, Result};

fn default_grace_period_ms() -> u64 {
    5000
}

/// Stack configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StackConfig {
    /// Default shutdown grace period in milliseconds; services may override.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Services to supervise, in declaration order.
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceSpec>,
}

impl StackConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// Relative `working_dir` entries are resolved against the config
    /// file's directory, so the supervisor itself never depends on the
    /// process's current directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        let mut config = Self::from_toml_str(&raw)?;
        if let Some(base) = path.parent() {
            config.resolve_working_dirs(base);
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rebase relative `working_dir` entries onto `base`.
    ///
    /// Existence is deliberately not checked here; a missing directory is a
    /// spawn-time failure that names the service.
    pub fn resolve_working_dirs(&mut self, base: &Path) {
        for service in &mut self.services {
            if let Some(dir) = &service.working_dir {
                if dir.is_relative() {
                    service.working_dir = Some(base.join(dir));
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(AppError::Config(
                "at least one [[service]] entry is required".into(),
            ));
        }

        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(AppError::Config("service name must not be empty".into()));
            }
            if service.command.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "service '{}' has an empty command",
                    service.name
                )));
            }
            if service.readiness.port == 0 {
                return Err(AppError::Config(format!(
                    "service '{}' readiness port must be non-zero",
                    service.name
                )));
            }
            // A zero interval would turn the probe into a pauseless loop.
            if service.readiness.interval_ms == 0 {
                return Err(AppError::Config(format!(
                    "service '{}' readiness interval must be non-zero",
                    service.name
                )));
            }
            if service.readiness.deadline_ms == 0 {
                return Err(AppError::Config(format!(
                    "service '{}' readiness deadline must be non-zero",
                    service.name
                )));
            }
            if !service.readiness.path.starts_with('/') {
                return Err(AppError::Config(format!(
                    "service '{}' readiness path must begin with '/'",
                    service.name
                )));
            }
        }

        Ok(())
    }
}
