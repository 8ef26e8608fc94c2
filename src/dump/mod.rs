//! Engine-aware dump dispatch: credential resolution, argument building,
//! and subprocess execution with stdout streamed to the output file.

use std::collections::HashMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::control::InstanceEndpoint;
use crate::retry::Transience;

mod command;
mod types;

pub use types::{DumpInvocation, DumpRunner, ProcessDumpRunner, ProcessStatus};

/// Database engines this tool knows how to dump.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Engine {
    /// Dumped with `pg_dump` in custom format.
    Postgres,
    /// Dumped with `mysqldump` as plain SQL.
    Mysql,
}

/// Raised when the restored instance reports an engine this tool cannot
/// dump. Fatal before any dump starts; never retried.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("cannot dump databases of engine \"{engine}\"; supported engines are postgres and mysql")]
pub struct UnsupportedEngine {
    /// Engine name as reported by the control plane.
    pub engine: String,
}

impl Engine {
    /// Resolves a control-plane engine string to a supported engine.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedEngine`] for any engine this tool has no dump
    /// utility for.
    pub fn resolve(engine: &str) -> Result<Self, UnsupportedEngine> {
        match engine {
            "postgres" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            other => Err(UnsupportedEngine {
                engine: other.to_owned(),
            }),
        }
    }

    /// Returns the dump utility executed for this engine.
    #[must_use]
    pub const fn utility(self) -> &'static str {
        match self {
            Self::Postgres => "pg_dump",
            Self::Mysql => "mysqldump",
        }
    }

    /// Returns the output file extension for this engine's dump format.
    #[must_use]
    pub const fn file_extension(self) -> &'static str {
        match self {
            Self::Postgres => "dump",
            Self::Mysql => "sql",
        }
    }
}

/// Credentials configured for one specific database.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct DatabaseCredentials {
    /// Username override for this database.
    pub user: Option<String>,
    /// Password override for this database.
    pub password: Option<String>,
}

/// Layered credential lookup: per-database override, then the global
/// default, then the instance's master username.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CredentialRules {
    /// Username used when no per-database override applies.
    pub default_user: Option<String>,
    /// Password used when no per-database override applies.
    pub default_password: Option<String>,
    /// Per-database overrides keyed by database name.
    pub overrides: HashMap<String, DatabaseCredentials>,
}

impl CredentialRules {
    fn user_for(&self, database: &str) -> Option<&str> {
        self.overrides
            .get(database)
            .and_then(|creds| creds.user.as_deref())
            .or(self.default_user.as_deref())
    }

    fn password_for(&self, database: &str) -> Option<&str> {
        self.overrides
            .get(database)
            .and_then(|creds| creds.password.as_deref())
            .or(self.default_password.as_deref())
    }
}

/// One database to dump, with resolved credentials.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DumpTarget {
    /// Database name passed to the dump utility.
    pub database: String,
    /// Username to connect as.
    pub user: String,
    /// Password, when one is configured. Absent passwords rely on the
    /// engine's own fallbacks (`~/.pgpass`, socket auth, and so on).
    pub password: Option<String>,
}

/// Errors raised while dumping a single database.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DumpError {
    /// Raised when no username resolves for a database: no override, no
    /// default, and the instance reported no master username.
    #[error("no username resolves for database \"{database}\"")]
    MissingUser {
        /// Database the worklist asked for.
        database: String,
    },
    /// Raised when the output file cannot be created.
    #[error("cannot create output file {path}: {message}")]
    OutputFile {
        /// Path that could not be created.
        path: Utf8PathBuf,
        /// Operating system error message.
        message: String,
    },
    /// Raised when the dump utility cannot be started at all.
    #[error("failed to start {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error message.
        message: String,
    },
    /// Raised when the dump utility exits nonzero.
    #[error("{program} exited with status {status_text} while dumping \"{database}\": {stderr}")]
    ProcessFailed {
        /// Program that failed.
        program: String,
        /// Database being dumped.
        database: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}

impl Transience for DumpError {
    /// A nonzero exit may be a flaky connection to a just-started
    /// instance; everything else (missing binary, unwritable output
    /// directory, unresolvable credentials) will not heal on its own.
    fn is_transient(&self) -> bool {
        matches!(self, Self::ProcessFailed { .. })
    }
}

/// Runs engine-appropriate dump utilities against an instance, one
/// database at a time.
#[derive(Clone, Debug)]
pub struct Dumper<R: DumpRunner> {
    output_dir: Utf8PathBuf,
    credentials: CredentialRules,
    runner: R,
}

impl Dumper<ProcessDumpRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub const fn with_process_runner(
        output_dir: Utf8PathBuf,
        credentials: CredentialRules,
    ) -> Self {
        Self::new(output_dir, credentials, ProcessDumpRunner)
    }
}

impl<R: DumpRunner> Dumper<R> {
    /// Creates a dumper writing into `output_dir` with the provided
    /// credential rules and runner.
    #[must_use]
    pub const fn new(output_dir: Utf8PathBuf, credentials: CredentialRules, runner: R) -> Self {
        Self {
            output_dir,
            credentials,
            runner,
        }
    }

    /// Resolves credentials for `database`, falling back to the instance's
    /// master username.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError::MissingUser`] when no username resolves at any
    /// layer.
    pub fn target_for(
        &self,
        database: &str,
        master_username: Option<&str>,
    ) -> Result<DumpTarget, DumpError> {
        let user = self
            .credentials
            .user_for(database)
            .or(master_username)
            .ok_or_else(|| DumpError::MissingUser {
                database: database.to_owned(),
            })?;
        Ok(DumpTarget {
            database: database.to_owned(),
            user: user.to_owned(),
            password: self.credentials.password_for(database).map(str::to_owned),
        })
    }

    /// Returns the output path for one dump:
    /// `<output_dir>/<database>-<snapshot short name>.<ext>`.
    #[must_use]
    pub fn output_file(
        &self,
        database: &str,
        snapshot_short_name: &str,
        engine: Engine,
    ) -> Utf8PathBuf {
        self.output_dir.join(format!(
            "{database}-{snapshot_short_name}.{}",
            engine.file_extension()
        ))
    }

    /// Dumps one database, streaming the utility's stdout to the output
    /// file, and returns the file's path.
    ///
    /// Repeated targets write to the same path; the file is created with
    /// truncation, so the later dump overwrites the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError`] when the output file cannot be created, the
    /// utility cannot be started, or it exits nonzero.
    pub fn dump(
        &self,
        engine: Engine,
        endpoint: &InstanceEndpoint,
        target: &DumpTarget,
        snapshot_short_name: &str,
    ) -> Result<Utf8PathBuf, DumpError> {
        let output_file = self.output_file(&target.database, snapshot_short_name, engine);
        let invocation = DumpInvocation {
            program: engine.utility().to_owned(),
            args: command::dump_args(engine, endpoint, target),
            env: command::dump_env(engine, target),
            output_file: output_file.clone(),
        };

        let status = self.runner.run(&invocation)?;
        if status.is_success() {
            return Ok(output_file);
        }

        let status_text = status
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(DumpError::ProcessFailed {
            program: invocation.program,
            database: target.database.clone(),
            status: status.code,
            status_text,
            stderr: status.stderr,
        })
    }
}

#[cfg(test)]
mod tests;
