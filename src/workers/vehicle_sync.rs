use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use tracing::info;

use crate::{
    jobs::{decode, JobPayload, SyncVehiclePayload},
    models::{Job, Vehicle},
    schema::vehicles,
    state::AppState,
    sync::{TriggerType, VehicleSyncer},
};

use super::{JobExecution, JobHandler};

/// Scheduled DVLA/MOT refresh for one vehicle. Provider retries happen inside
/// the syncer, so a failed outcome is final for this job.
pub struct SyncVehicleDataJob;

impl SyncVehicleDataJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SyncVehicleDataJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for SyncVehicleDataJob {
    fn job_type(&self) -> &'static str {
        SyncVehiclePayload::JOB_TYPE
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: SyncVehiclePayload = match decode(&job) {
            Ok(payload) => payload,
            Err(err) => return JobExecution::Failed { error: err.to_string() },
        };

        let syncer = match VehicleSyncer::from_state(&state) {
            Ok(syncer) => syncer,
            Err(err) => {
                return JobExecution::Failed {
                    error: err.message().to_string(),
                }
            }
        };

        let vehicle: Option<Vehicle> = match state.db() {
            Ok(mut conn) => match vehicles::table
                .find(payload.vehicle_id)
                .first(&mut conn)
                .optional()
            {
                Ok(vehicle) => vehicle,
                Err(err) => {
                    return JobExecution::Retry {
                        delay: std::time::Duration::from_secs(30),
                        error: format!("failed to load vehicle: {err}"),
                    }
                }
            },
            Err(err) => {
                return JobExecution::Retry {
                    delay: std::time::Duration::from_secs(30),
                    error: err.message().to_string(),
                }
            }
        };

        let Some(vehicle) = vehicle.filter(|v| v.status == "active") else {
            info!(vehicle_id = %payload.vehicle_id, "vehicle gone or inactive; skipping sync");
            return JobExecution::Success;
        };

        let outcome = syncer
            .sync_vehicle(&state, &vehicle, TriggerType::Automatic, None)
            .await;
        match outcome.error {
            None => JobExecution::Success,
            Some(error) => JobExecution::Failed { error },
        }
    }
}
