//! Control-plane abstraction for the ephemeral instance lifecycle.
//!
//! The orchestrator only ever talks to the cloud through this trait:
//! list snapshots, restore one into a new instance, describe the instance,
//! delete it. Tests script the trait; the RDS implementation powers the
//! binary.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::retry::Transience;
use crate::snapshot::{MAX_INSTANCE_IDENTIFIER_LEN, Snapshot};

/// Parameters for restoring a snapshot into a new instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RestoreRequest {
    /// Identifier for the instance to create.
    pub identifier: String,
    /// Fully qualified identifier of the snapshot to restore.
    pub snapshot_identifier: String,
    /// Instance class for the restored instance; the provider picks its
    /// default when absent.
    pub instance_class: Option<String>,
    /// Subnet group to place the instance in, when required by the account
    /// layout.
    pub subnet_group: Option<String>,
    /// Whether the instance must be reachable from outside the provider
    /// network. Dumps connect over the public endpoint, so runs set this.
    pub publicly_accessible: bool,
}

impl RestoreRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Validation`] when a required field is
    /// empty or the identifier exceeds the provider's length ceiling.
    pub fn validate(&self) -> Result<(), ControlPlaneError> {
        if self.identifier.is_empty() {
            return Err(ControlPlaneError::Validation("identifier".to_owned()));
        }
        if self.identifier.len() > MAX_INSTANCE_IDENTIFIER_LEN {
            return Err(ControlPlaneError::Validation(format!(
                "identifier longer than {MAX_INSTANCE_IDENTIFIER_LEN} characters"
            )));
        }
        if self.snapshot_identifier.is_empty() {
            return Err(ControlPlaneError::Validation(
                "snapshot_identifier".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Handle for an instance whose creation has been requested.
///
/// This is the single piece of shared mutable state in a run; the
/// orchestrator owns it exclusively from the restore request until the
/// delete call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Provider identifier of the instance.
    pub identifier: String,
}

/// Lifecycle status reported for an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceStatus {
    /// The instance is still being restored.
    Creating,
    /// The instance accepts connections.
    Available,
    /// The provider reported a failed restore.
    Failed,
    /// The instance is being or has been deleted.
    Deleted,
    /// Any other status string reported by the control plane.
    Other(String),
}

impl InstanceStatus {
    /// Parses a control-plane status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "failed" => Self::Failed,
            "deleting" | "deleted" => Self::Deleted,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns `true` when the instance accepts connections.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Network address of an available instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceEndpoint {
    /// Hostname of the instance endpoint.
    pub address: String,
    /// TCP port the engine listens on.
    pub port: u16,
}

/// Observed state of an instance, as reported by a describe call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceDescription {
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Engine name as reported by the provider (for example `postgres`).
    pub engine: String,
    /// Endpoint, present once the instance is reachable.
    pub endpoint: Option<InstanceEndpoint>,
    /// Master username carried over from the source instance.
    pub master_username: Option<String>,
    /// Default database created with the source instance, when any.
    pub default_database: Option<String>,
}

/// Errors raised by request validation ahead of any provider call.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ControlPlaneError {
    /// Raised when a request is missing or exceeds a required field.
    #[error("invalid field: {0}")]
    Validation(String),
}

/// Future returned by control-plane operations.
pub type ControlPlaneFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud control planes.
pub trait ControlPlane {
    /// Provider specific error type returned by the control plane.
    type Error: std::error::Error + Transience + Send + Sync + 'static;

    /// Lists all snapshots belonging to the named source instance.
    fn list_snapshots<'a>(
        &'a self,
        source_instance: &'a str,
    ) -> ControlPlaneFuture<'a, Vec<Snapshot>, Self::Error>;

    /// Requests a new instance restored from a snapshot. A retried request
    /// that lands after a first one already succeeded fails with a
    /// non-transient "already exists" error rather than silently
    /// succeeding.
    fn restore_from_snapshot<'a>(
        &'a self,
        request: &'a RestoreRequest,
    ) -> ControlPlaneFuture<'a, InstanceHandle, Self::Error>;

    /// Describes the instance, returning `None` when the control plane
    /// does not know it (yet).
    fn describe_instance<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ControlPlaneFuture<'a, Option<InstanceDescription>, Self::Error>;

    /// Deletes the instance, skipping any final snapshot. Deleting an
    /// instance the control plane no longer knows succeeds.
    fn delete_instance<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ControlPlaneFuture<'a, (), Self::Error>;
}
