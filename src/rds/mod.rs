//! RDS implementation of the instance lifecycle control plane.

mod error;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aws_config::{BehaviorVersion, Region};
use aws_sdk_rds::Client;
use aws_sdk_rds::primitives::DateTime;
use aws_sdk_rds::types::{DbInstance, DbSnapshot, Endpoint};

use crate::config::RdsConfig;
use crate::control::{
    ControlPlane, ControlPlaneFuture, InstanceDescription, InstanceEndpoint, InstanceHandle,
    InstanceStatus, RestoreRequest,
};
use crate::snapshot::{Snapshot, SnapshotStatus};

pub use error::RdsControlPlaneError;

const NOT_FOUND_CODE: &str = "DBInstanceNotFound";
const ALREADY_EXISTS_CODE: &str = "DBInstanceAlreadyExists";

/// Control plane backed by the RDS API.
#[derive(Clone, Debug)]
pub struct RdsControlPlane {
    client: Client,
}

impl RdsControlPlane {
    /// Wraps an existing RDS client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a control plane from the ambient provider configuration
    /// (credentials chain, profile, instance metadata), applying the
    /// configured region override when present.
    pub async fn connect(config: &RdsConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        let shared = loader.load().await;
        Self::new(Client::new(&shared))
    }
}

fn system_time_from(timestamp: &DateTime) -> Option<SystemTime> {
    let secs = u64::try_from(timestamp.secs()).ok()?;
    Some(UNIX_EPOCH + Duration::new(secs, timestamp.subsec_nanos()))
}

/// Converts an API snapshot record. Snapshots without an identifier or a
/// creation timestamp are skipped: the latter cannot take part in
/// most-recent selection and in practice are still being created.
fn snapshot_from_sdk(snapshot: &DbSnapshot) -> Option<Snapshot> {
    let identifier = snapshot.db_snapshot_identifier()?.to_owned();
    let created_at = snapshot.snapshot_create_time().and_then(system_time_from)?;
    Some(Snapshot {
        identifier,
        status: SnapshotStatus::parse(snapshot.status().unwrap_or_default()),
        created_at,
    })
}

fn endpoint_from_sdk(endpoint: &Endpoint) -> Option<InstanceEndpoint> {
    let address = endpoint.address()?.to_owned();
    let port = endpoint.port().and_then(|port| u16::try_from(port).ok())?;
    Some(InstanceEndpoint { address, port })
}

fn description_from_sdk(instance: &DbInstance) -> InstanceDescription {
    InstanceDescription {
        status: InstanceStatus::parse(instance.db_instance_status().unwrap_or_default()),
        engine: instance.engine().unwrap_or_default().to_owned(),
        endpoint: instance.endpoint().and_then(endpoint_from_sdk),
        master_username: instance.master_username().map(str::to_owned),
        default_database: instance.db_name().map(str::to_owned),
    }
}

impl ControlPlane for RdsControlPlane {
    type Error = RdsControlPlaneError;

    fn list_snapshots<'a>(
        &'a self,
        source_instance: &'a str,
    ) -> ControlPlaneFuture<'a, Vec<Snapshot>, Self::Error> {
        Box::pin(async move {
            let output = self
                .client
                .describe_db_snapshots()
                .db_instance_identifier(source_instance)
                .send()
                .await
                .map_err(|err| RdsControlPlaneError::from_sdk("DescribeDBSnapshots", err))?;

            Ok(output
                .db_snapshots()
                .iter()
                .filter_map(snapshot_from_sdk)
                .collect())
        })
    }

    fn restore_from_snapshot<'a>(
        &'a self,
        request: &'a RestoreRequest,
    ) -> ControlPlaneFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            request.validate()?;

            self.client
                .restore_db_instance_from_db_snapshot()
                .db_instance_identifier(&request.identifier)
                .db_snapshot_identifier(&request.snapshot_identifier)
                .publicly_accessible(request.publicly_accessible)
                .set_db_instance_class(request.instance_class.clone())
                .set_db_subnet_group_name(request.subnet_group.clone())
                .send()
                .await
                .map_err(|err| {
                    if RdsControlPlaneError::service_code(&err) == Some(ALREADY_EXISTS_CODE) {
                        RdsControlPlaneError::AlreadyExists {
                            identifier: request.identifier.clone(),
                        }
                    } else {
                        RdsControlPlaneError::from_sdk("RestoreDBInstanceFromDBSnapshot", err)
                    }
                })?;

            Ok(InstanceHandle {
                identifier: request.identifier.clone(),
            })
        })
    }

    fn describe_instance<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ControlPlaneFuture<'a, Option<InstanceDescription>, Self::Error> {
        Box::pin(async move {
            let result = self
                .client
                .describe_db_instances()
                .db_instance_identifier(&handle.identifier)
                .send()
                .await;

            match result {
                Ok(output) => Ok(output.db_instances().first().map(description_from_sdk)),
                // A restore that has been accepted but not yet registered
                // describes as not-found; the poller treats that like any
                // other not-yet-available tick.
                Err(err) if RdsControlPlaneError::service_code(&err) == Some(NOT_FOUND_CODE) => {
                    Ok(None)
                }
                Err(err) => Err(RdsControlPlaneError::from_sdk("DescribeDBInstances", err)),
            }
        })
    }

    fn delete_instance<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ControlPlaneFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let result = self
                .client
                .delete_db_instance()
                .db_instance_identifier(&handle.identifier)
                .skip_final_snapshot(true)
                .send()
                .await;

            match result {
                Ok(_) => Ok(()),
                // Deleting an instance the control plane no longer knows
                // is a success; this also makes retried deletes idempotent.
                Err(err) if RdsControlPlaneError::service_code(&err) == Some(NOT_FOUND_CODE) => {
                    Ok(())
                }
                Err(err) => Err(RdsControlPlaneError::from_sdk("DeleteDBInstance", err)),
            }
        })
    }
}
