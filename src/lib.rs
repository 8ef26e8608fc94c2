//! Core library for the snapdump tool.
//!
//! The crate restores the most recent available snapshot of a managed
//! database instance into a disposable instance, runs the native dump
//! utility against each target database, and deletes the instance on every
//! exit path. A control-plane abstraction keeps the lifecycle orchestrator
//! testable without a cloud account; the RDS implementation powers the
//! binary.

pub mod config;
pub mod control;
pub mod dump;
pub mod rds;
pub mod retry;
pub mod run;
pub mod snapshot;
pub mod wait;

pub use config::{ConfigError, DumpConfig, RdsConfig};
pub use control::{
    ControlPlane, ControlPlaneError, ControlPlaneFuture, InstanceDescription, InstanceEndpoint,
    InstanceHandle, InstanceStatus, RestoreRequest,
};
pub use dump::{
    CredentialRules, DatabaseCredentials, DumpError, DumpInvocation, DumpRunner, DumpTarget,
    Dumper, Engine, ProcessDumpRunner, ProcessStatus, UnsupportedEngine,
};
pub use rds::{RdsControlPlane, RdsControlPlaneError};
pub use retry::{RetryPolicy, Transience};
pub use run::{DumpOrchestrator, DumpSummary, Progress, RunError, RunSettings, WriteProgress};
pub use snapshot::{
    MAX_INSTANCE_IDENTIFIER_LEN, Snapshot, SnapshotStatus, ephemeral_instance_identifier,
    select_latest_available,
};
pub use wait::{PollError, Poller};
