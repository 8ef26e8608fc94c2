//! Orchestrates the snapshot-to-dump lifecycle end to end.
//!
//! One run selects the source instance's most recent available snapshot,
//! restores it into a disposable instance under a randomized identifier,
//! waits for the instance to become available, dumps each worklist
//! database with the engine's native utility, and deletes the instance.
//! The delete call is structurally guaranteed: everything after the
//! restore submission happens in one guarded phase whose outcome is
//! combined with the unconditional teardown that follows it. A teardown
//! failure is reported either as its own error (after a successful run) or
//! as a note appended to the original failure; it never masks one.

use std::fmt::Display;
use std::future;
use std::io::Write;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::control::{ControlPlane, InstanceDescription, InstanceHandle, RestoreRequest};
use crate::dump::{DumpError, DumpRunner, DumpTarget, Dumper, Engine, UnsupportedEngine};
use crate::retry::RetryPolicy;
use crate::snapshot::{ephemeral_instance_identifier, select_latest_available};
use crate::wait::{PollError, Poller};

/// Receives one human-readable line per lifecycle stage transition.
pub trait Progress {
    /// Reports a stage transition to the operator.
    fn line(&mut self, message: &str);
}

/// Progress sink writing each line to an `io::Write` target.
#[derive(Debug)]
pub struct WriteProgress<W: Write> {
    sink: W,
}

impl<W: Write> WriteProgress<W> {
    /// Wraps a writer.
    #[must_use]
    pub const fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Returns the wrapped writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> Progress for WriteProgress<W> {
    fn line(&mut self, message: &str) {
        writeln!(self.sink, "{message}").ok();
    }
}

/// Run parameters beyond the orchestrator's collaborators.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSettings {
    /// Instance class forwarded to the restore request.
    pub instance_class: Option<String>,
    /// Subnet group forwarded to the restore request.
    pub subnet_group: Option<String>,
    /// Databases dumped when none are named on the command line; when
    /// this is also empty, the instance's default database is dumped.
    pub databases: Vec<String>,
}

/// What a successful run produced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DumpSummary {
    /// Fully qualified identifier of the dumped snapshot.
    pub snapshot: String,
    /// Dump files written, in worklist order.
    pub files: Vec<Utf8PathBuf>,
}

/// Errors surfaced while performing a run.
///
/// Variants covering stages after the restore submission carry a
/// `teardown_note` that stays empty unless the unconditional delete also
/// failed, in which case the note is appended to the rendered message so
/// both failures reach the operator.
#[derive(Debug, Error)]
pub enum RunError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the snapshot listing fails after retries.
    #[error("failed to list snapshots for \"{source_instance}\": {source}")]
    Snapshots {
        /// Source instance whose snapshots were listed.
        source_instance: String,
        /// Provider error.
        #[source]
        source: E,
    },
    /// Raised when no snapshot of the source instance is available.
    /// Nothing has been provisioned when this occurs.
    #[error("no available snapshots found for instance \"{source_instance}\"")]
    NoSnapshots {
        /// Source instance whose snapshots were listed.
        source_instance: String,
    },
    /// Raised when the restore request fails after retries. The delete
    /// call still runs: the request may have landed even though the
    /// response never arrived.
    #[error("failed to restore \"{identifier}\" from snapshot \"{snapshot}\": {source}{teardown_note}")]
    Provision {
        /// Identifier the restore asked for.
        identifier: String,
        /// Snapshot being restored.
        snapshot: String,
        /// Provider error.
        #[source]
        source: E,
        /// Appended teardown failure, when any.
        teardown_note: String,
    },
    /// Raised when the instance never becomes available or a describe
    /// call fails terminally.
    #[error("{source}{teardown_note}")]
    Poll {
        /// Poller outcome.
        #[source]
        source: PollError<E>,
        /// Appended teardown failure, when any.
        teardown_note: String,
    },
    /// Raised when an available instance reports state the run cannot
    /// proceed with (no endpoint, no dumpable database).
    #[error("instance \"{identifier}\": {message}{teardown_note}")]
    Instance {
        /// Instance being inspected.
        identifier: String,
        /// What was missing.
        message: String,
        /// Appended teardown failure, when any.
        teardown_note: String,
    },
    /// Raised when the restored instance runs an engine this tool cannot
    /// dump. No dump is attempted.
    #[error("{source}{teardown_note}")]
    Engine {
        /// The unsupported engine report.
        #[source]
        source: UnsupportedEngine,
        /// Appended teardown failure, when any.
        teardown_note: String,
    },
    /// Raised when dumping a database fails after retries. Remaining
    /// worklist entries are skipped.
    #[error("failed to dump database \"{database}\": {source}{teardown_note}")]
    Dump {
        /// Database whose dump failed.
        database: String,
        /// Dump failure.
        #[source]
        source: DumpError,
        /// Appended teardown failure, when any.
        teardown_note: String,
    },
    /// Raised when the run itself succeeded but the instance could not be
    /// deleted afterwards.
    #[error("failed to delete instance \"{identifier}\"; manual cleanup may be required: {source}")]
    Teardown {
        /// Instance that could not be deleted.
        identifier: String,
        /// Provider error.
        #[source]
        source: E,
    },
}

impl<E> RunError<E>
where
    E: std::error::Error + 'static,
{
    /// Maps the failure to the documented process exit code: 2 when no
    /// snapshot is available, 3 when the availability wait times out, 4
    /// for an unsupported engine, 1 for everything else.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NoSnapshots { .. } => 2,
            Self::Poll {
                source: PollError::Timeout { .. },
                ..
            } => 3,
            Self::Engine { .. } => 4,
            _ => 1,
        }
    }

    fn note_teardown_failure(&mut self, failure: &impl Display) {
        let note =
            format!(" (instance deletion also failed: {failure}; manual cleanup may be required)");
        match self {
            Self::Provision { teardown_note, .. }
            | Self::Poll { teardown_note, .. }
            | Self::Instance { teardown_note, .. }
            | Self::Engine { teardown_note, .. }
            | Self::Dump { teardown_note, .. } => teardown_note.push_str(&note),
            Self::Snapshots { .. } | Self::NoSnapshots { .. } | Self::Teardown { .. } => {}
        }
    }
}

/// Executes the snapshot-to-dump flow using the provided control plane
/// and dumper.
#[derive(Debug)]
pub struct DumpOrchestrator<C, R>
where
    C: ControlPlane,
    R: DumpRunner,
{
    control: C,
    dumper: Dumper<R>,
    poller: Poller,
    control_retry: RetryPolicy,
    dump_retry: RetryPolicy,
    settings: RunSettings,
}

impl<C, R> DumpOrchestrator<C, R>
where
    C: ControlPlane,
    R: DumpRunner,
{
    /// Creates a new orchestrator.
    #[must_use]
    pub const fn new(
        control: C,
        dumper: Dumper<R>,
        poller: Poller,
        control_retry: RetryPolicy,
        dump_retry: RetryPolicy,
        settings: RunSettings,
    ) -> Self {
        Self {
            control,
            dumper,
            poller,
            control_retry,
            dump_retry,
            settings,
        }
    }

    /// Runs the end-to-end flow and returns the produced dump files.
    ///
    /// Once a restore has been submitted the delete call runs exactly
    /// once before this method returns, whatever the outcome in between.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when any stage fails; see
    /// [`RunError::exit_code`] for how failures map to process exit
    /// codes.
    pub async fn execute<P: Progress>(
        &self,
        source_instance: &str,
        requested_databases: &[String],
        progress: &mut P,
    ) -> Result<DumpSummary, RunError<C::Error>> {
        let snapshots = self
            .control_retry
            .run(|| self.control.list_snapshots(source_instance))
            .await
            .map_err(|source| RunError::Snapshots {
                source_instance: source_instance.to_owned(),
                source,
            })?;
        let snapshot = select_latest_available(snapshots).ok_or_else(|| RunError::NoSnapshots {
            source_instance: source_instance.to_owned(),
        })?;
        progress.line(&format!("Found snapshot \"{}\".", snapshot.identifier));

        let short_name = snapshot.short_name().to_owned();
        let request = RestoreRequest {
            identifier: ephemeral_instance_identifier(&short_name),
            snapshot_identifier: snapshot.identifier.clone(),
            instance_class: self.settings.instance_class.clone(),
            subnet_group: self.settings.subnet_group.clone(),
            publicly_accessible: true,
        };
        let handle = InstanceHandle {
            identifier: request.identifier.clone(),
        };

        // The restore is submitted inside the guarded phase; from here on
        // the delete below runs exactly once on every path.
        let outcome = self
            .provision_and_dump(&request, &handle, &short_name, requested_databases, progress)
            .await;

        let teardown = self
            .control_retry
            .run(|| self.control.delete_instance(&handle))
            .await;

        match (outcome, teardown) {
            (Ok(summary), Ok(())) => {
                progress.line(&format!("Terminated \"{}\".", handle.identifier));
                Ok(summary)
            }
            (Ok(_), Err(source)) => Err(RunError::Teardown {
                identifier: handle.identifier.clone(),
                source,
            }),
            (Err(run_err), Ok(())) => {
                progress.line(&format!("Terminated \"{}\".", handle.identifier));
                Err(run_err)
            }
            (Err(mut run_err), Err(teardown_err)) => {
                run_err.note_teardown_failure(&teardown_err);
                Err(run_err)
            }
        }
    }

    async fn provision_and_dump<P: Progress>(
        &self,
        request: &RestoreRequest,
        handle: &InstanceHandle,
        short_name: &str,
        requested_databases: &[String],
        progress: &mut P,
    ) -> Result<DumpSummary, RunError<C::Error>> {
        self.control_retry
            .run(|| self.control.restore_from_snapshot(request))
            .await
            .map_err(|source| RunError::Provision {
                identifier: request.identifier.clone(),
                snapshot: request.snapshot_identifier.clone(),
                source,
                teardown_note: String::new(),
            })?;
        progress.line(&format!("Launched instance \"{}\".", handle.identifier));

        progress.line("Waiting for instance to become available.");
        let description = self
            .poller
            .wait_for_available(&self.control, handle)
            .await
            .map_err(|source| RunError::Poll {
                source,
                teardown_note: String::new(),
            })?;
        progress.line("Instance is available.");
        progress.line(&format!("Instance engine is \"{}\".", description.engine));

        let engine = Engine::resolve(&description.engine).map_err(|source| RunError::Engine {
            source,
            teardown_note: String::new(),
        })?;
        let endpoint = description
            .endpoint
            .clone()
            .ok_or_else(|| RunError::Instance {
                identifier: handle.identifier.clone(),
                message: String::from("available instance reported no endpoint"),
                teardown_note: String::new(),
            })?;

        let worklist = self.resolve_worklist(requested_databases, &description, handle)?;

        let mut files = Vec::new();
        for target in &worklist {
            progress.line(&format!("Dumping \"{}\".", target.database));
            let path = self
                .dump_retry
                .run(|| future::ready(self.dumper.dump(engine, &endpoint, target, short_name)))
                .await
                .map_err(|source| RunError::Dump {
                    database: target.database.clone(),
                    source,
                    teardown_note: String::new(),
                })?;
            files.push(path);
        }
        progress.line("Dump completed.");

        Ok(DumpSummary {
            snapshot: request.snapshot_identifier.clone(),
            files,
        })
    }

    /// Resolves the worklist: databases named on the command line, else
    /// the configured list, else the instance's default database.
    fn resolve_worklist(
        &self,
        requested: &[String],
        description: &InstanceDescription,
        handle: &InstanceHandle,
    ) -> Result<Vec<DumpTarget>, RunError<C::Error>> {
        let names: Vec<String> = if requested.is_empty() {
            if self.settings.databases.is_empty() {
                let default =
                    description
                        .default_database
                        .clone()
                        .ok_or_else(|| RunError::Instance {
                            identifier: handle.identifier.clone(),
                            message: String::from(
                                "no databases requested and the instance reports no default database",
                            ),
                            teardown_note: String::new(),
                        })?;
                vec![default]
            } else {
                self.settings.databases.clone()
            }
        } else {
            requested.to_vec()
        };

        names
            .iter()
            .map(|database| {
                self.dumper
                    .target_for(database, description.master_username.as_deref())
                    .map_err(|source| RunError::Dump {
                        database: database.clone(),
                        source,
                        teardown_note: String::new(),
                    })
            })
            .collect()
    }
}
