//! Dump process execution and the runner abstraction.

use std::ffi::OsString;
use std::fs::File;
use std::process::{Command, Stdio};

use camino::Utf8PathBuf;

use super::DumpError;

/// Everything needed to launch one dump process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DumpInvocation {
    /// Dump utility to execute (for example `pg_dump`).
    pub program: String,
    /// Argument vector passed to the utility.
    pub args: Vec<OsString>,
    /// Environment overlay applied to this one subprocess only. The parent
    /// process environment is never mutated; this is how the postgres
    /// password stays out of process listings and shared state.
    pub env: Vec<(&'static str, String)>,
    /// File receiving the utility's standard output.
    pub output_file: Utf8PathBuf,
}

/// Exit information from a finished dump process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessStatus {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard error.
    pub stderr: String,
}

impl ProcessStatus {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over dump process execution to support fakes in tests.
pub trait DumpRunner {
    /// Runs the invocation, streaming stdout to its output file.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError::OutputFile`] when the output file cannot be
    /// created and [`DumpError::Spawn`] when the process cannot start.
    fn run(&self, invocation: &DumpInvocation) -> Result<ProcessStatus, DumpError>;
}

/// Real runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessDumpRunner;

impl DumpRunner for ProcessDumpRunner {
    fn run(&self, invocation: &DumpInvocation) -> Result<ProcessStatus, DumpError> {
        let outfile = File::create(invocation.output_file.as_std_path()).map_err(|err| {
            DumpError::OutputFile {
                path: invocation.output_file.clone(),
                message: err.to_string(),
            }
        })?;

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(key, value)| (*key, value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(outfile))
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| DumpError::Spawn {
                program: invocation.program.clone(),
                message: err.to_string(),
            })?;

        Ok(ProcessStatus {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
