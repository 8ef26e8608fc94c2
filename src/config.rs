//! Configuration loading via `ortho-config`.
//!
//! Two structs cover the two halves of a run: [`RdsConfig`] for the
//! control-plane side (region, instance shape, retry and polling budgets)
//! and [`DumpConfig`] for the dump side (output directory, worklist
//! defaults, credentials). Values merge defaults, the `snapdump.toml`
//! configuration file, and `SNAPDUMP_*` environment variables, with
//! environment values acting as defaults that file values override.

use std::collections::HashMap;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::dump::{CredentialRules, DatabaseCredentials};
use crate::retry::RetryPolicy;
use crate::wait::Poller;

/// Control-plane configuration: where instances live, what shape the
/// disposable instance takes, and how patient the run is.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SNAPDUMP")]
pub struct RdsConfig {
    /// Region override. When absent the ambient provider configuration
    /// (profile, `AWS_REGION`, instance metadata) decides.
    pub region: Option<String>,
    /// Instance class for the disposable instance; the provider derives
    /// one from the snapshot when absent.
    pub instance_class: Option<String>,
    /// Subnet group for the disposable instance, when the account layout
    /// requires one.
    pub subnet_group: Option<String>,
    /// Total invocations allowed per control-plane call.
    #[ortho_config(default = 2)]
    pub max_attempts: u64,
    /// Fixed delay between retry attempts, in seconds.
    #[ortho_config(default = 10)]
    pub retry_delay_secs: u64,
    /// Availability poll tick, in seconds.
    #[ortho_config(default = 30)]
    pub poll_interval_secs: u64,
    /// Hard ceiling on the availability wait, in seconds.
    #[ortho_config(default = 7_200)]
    pub wait_timeout_secs: u64,
}

/// Dump-side configuration: where output lands and how credentials
/// resolve per database.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SNAPDUMP_DB")]
pub struct DumpConfig {
    /// Directory receiving one dump file per database.
    #[ortho_config(default = "/out".to_owned())]
    pub output_dir: String,
    /// Total invocations allowed per dump process.
    #[ortho_config(default = 2)]
    pub dump_attempts: u64,
    /// Databases to dump when none are named on the command line. When
    /// this is also empty, the restored instance's default database is
    /// dumped.
    #[ortho_config(default = Vec::new())]
    pub databases: Vec<String>,
    /// Username used when no per-database override applies.
    pub user: Option<String>,
    /// Password used when no per-database override applies.
    pub password: Option<String>,
    /// Per-database credential overrides, keyed by database name.
    #[ortho_config(default = HashMap::new(), skip_cli)]
    pub overrides: HashMap<String, DatabaseCredentials>,
}

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

fn require_nonzero(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!(
            "{} must be at least 1: set {} or {} in snapdump.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl RdsConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    /// Values still merge defaults, configuration files, and environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("snapdump")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on the timing and budget fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a budget or interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_nonzero(
            self.max_attempts,
            &FieldMetadata::new(
                "control-plane attempt budget",
                "SNAPDUMP_MAX_ATTEMPTS",
                "max_attempts",
            ),
        )?;
        require_nonzero(
            self.poll_interval_secs,
            &FieldMetadata::new(
                "poll interval",
                "SNAPDUMP_POLL_INTERVAL_SECS",
                "poll_interval_secs",
            ),
        )?;
        require_nonzero(
            self.wait_timeout_secs,
            &FieldMetadata::new(
                "availability timeout",
                "SNAPDUMP_WAIT_TIMEOUT_SECS",
                "wait_timeout_secs",
            ),
        )?;
        Ok(())
    }

    /// Builds the retry policy used for control-plane calls.
    #[must_use]
    pub fn control_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            usize::try_from(self.max_attempts).unwrap_or(usize::MAX),
            Duration::from_secs(self.retry_delay_secs),
        )
    }

    /// Builds the availability poller.
    #[must_use]
    pub const fn poller(&self) -> Poller {
        Poller::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.wait_timeout_secs),
        )
    }
}

impl DumpConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("snapdump")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the output directory is blank or the
    /// dump attempt budget is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.trim().is_empty() {
            return Err(ConfigError::MissingField(String::from(
                "missing output directory: set SNAPDUMP_DB_OUTPUT_DIR or output_dir in snapdump.toml",
            )));
        }
        require_nonzero(
            self.dump_attempts,
            &FieldMetadata::new(
                "dump attempt budget",
                "SNAPDUMP_DB_DUMP_ATTEMPTS",
                "dump_attempts",
            ),
        )?;
        Ok(())
    }

    /// Builds the retry policy used for dump invocations. The delay comes
    /// from the control-plane config: the tool has a single backoff
    /// interval, only the budgets differ.
    #[must_use]
    pub fn dump_retry(&self, rds: &RdsConfig) -> RetryPolicy {
        RetryPolicy::new(
            usize::try_from(self.dump_attempts).unwrap_or(usize::MAX),
            Duration::from_secs(rds.retry_delay_secs),
        )
    }

    /// Extracts the credential layering rules for the dump dispatcher.
    #[must_use]
    pub fn credential_rules(&self) -> CredentialRules {
        CredentialRules {
            default_user: self.user.clone(),
            default_password: self.password.clone(),
            overrides: self.overrides.clone(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field value fails semantic validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
