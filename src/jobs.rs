//! Postgres-backed queue for outbound email and scheduled vehicle syncs.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;

pub const JOB_SEND_EMAIL: &str = "send-email";
pub const JOB_SYNC_VEHICLE_DATA: &str = "sync-vehicle-data";

const FALLBACK_RETRY_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

/// A payload type bound to the queue it travels on.
pub trait JobPayload: Serialize + DeserializeOwned {
    const JOB_TYPE: &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncVehiclePayload {
    pub vehicle_id: Uuid,
}

impl JobPayload for SyncVehiclePayload {
    const JOB_TYPE: &'static str = JOB_SYNC_VEHICLE_DATA;
}

/// How a handler finished with a reserved job.
#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("expected a {expected} job, found {found}")]
    WrongType {
        expected: &'static str,
        found: String,
    },
    #[error("no database connection: {0}")]
    Pool(String),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

/// Queues `payload` on its own job type, due now or at `run_after`.
pub fn enqueue<P: JobPayload>(
    conn: &mut PgConnection,
    payload: &P,
    run_after: Option<NaiveDateTime>,
) -> JobQueueResult<Job> {
    let row = NewJob {
        id: Uuid::new_v4(),
        job_type: P::JOB_TYPE.to_string(),
        payload: serde_json::to_value(payload)?,
        status: JobStatus::Queued.as_str().to_string(),
        run_after: run_after.unwrap_or_else(|| Utc::now().naive_utc()),
    };
    let job = diesel::insert_into(jobs::table)
        .values(&row)
        .get_result(conn)?;
    Ok(job)
}

pub fn decode<P: JobPayload>(job: &Job) -> JobQueueResult<P> {
    if job.job_type != P::JOB_TYPE {
        return Err(JobQueueError::WrongType {
            expected: P::JOB_TYPE,
            found: job.job_type.clone(),
        });
    }
    Ok(serde_json::from_value(job.payload.clone())?)
}

/// Claims the oldest due job of one of `job_types`. Concurrent workers skip
/// rows another transaction already holds.
pub fn reserve_next(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
    let now = Utc::now().naive_utc();
    conn.transaction::<_, JobQueueError, _>(|conn| {
        let due: Option<Uuid> = jobs::table
            .select(jobs::id)
            .filter(jobs::status.eq(JobStatus::Queued.as_str()))
            .filter(jobs::run_after.le(now))
            .filter(jobs::job_type.eq_any(job_types))
            .order((jobs::run_after.asc(), jobs::created_at.asc()))
            .for_update()
            .skip_locked()
            .first(conn)
            .optional()?;
        let Some(id) = due else {
            return Ok(None);
        };
        let job = diesel::update(jobs::table.find(id))
            .set((
                jobs::status.eq(JobStatus::Processing.as_str()),
                jobs::attempts.eq(jobs::attempts + 1),
                jobs::updated_at.eq(now),
            ))
            .get_result(conn)?;
        Ok(Some(job))
    })
}

/// Records the result of a run: done, back in the queue after a delay, or failed for good.
pub fn settle(conn: &mut PgConnection, job_id: Uuid, execution: &JobExecution) -> JobQueueResult<()> {
    let now = Utc::now().naive_utc();
    let row = diesel::update(jobs::table.find(job_id));
    match execution {
        JobExecution::Success => row
            .set((
                jobs::status.eq(JobStatus::Succeeded.as_str()),
                jobs::last_error.eq(None::<String>),
                jobs::updated_at.eq(now),
            ))
            .execute(conn)?,
        JobExecution::Retry { delay, error } => {
            let delay = ChronoDuration::from_std(*delay)
                .unwrap_or_else(|_| ChronoDuration::seconds(FALLBACK_RETRY_SECS));
            row.set((
                jobs::status.eq(JobStatus::Queued.as_str()),
                jobs::run_after.eq(now + delay),
                jobs::last_error.eq(Some(error.as_str())),
                jobs::updated_at.eq(now),
            ))
            .execute(conn)?
        }
        JobExecution::Failed { error } => row
            .set((
                jobs::status.eq(JobStatus::Failed.as_str()),
                jobs::last_error.eq(Some(error.as_str())),
                jobs::updated_at.eq(now),
            ))
            .execute(conn)?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn job(job_type: &str, payload: serde_json::Value) -> Job {
        let now = Utc::now().naive_utc();
        Job {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Processing.as_str().into(),
            attempts: 1,
            run_after: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn decodes_matching_payload() {
        let vehicle_id = Uuid::new_v4();
        let queued = job(JOB_SYNC_VEHICLE_DATA, json!({ "vehicle_id": vehicle_id }));
        let payload: SyncVehiclePayload = decode(&queued).unwrap();
        assert_eq!(payload.vehicle_id, vehicle_id);
    }

    #[test]
    fn refuses_payload_from_another_queue() {
        let queued = job(JOB_SEND_EMAIL, json!({ "vehicle_id": Uuid::new_v4() }));
        let err = decode::<SyncVehiclePayload>(&queued).unwrap_err();
        assert!(matches!(err, JobQueueError::WrongType { found, .. } if found == JOB_SEND_EMAIL));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let queued = job(JOB_SYNC_VEHICLE_DATA, json!({ "vehicle": "AB12CDE" }));
        assert!(matches!(
            decode::<SyncVehiclePayload>(&queued),
            Err(JobQueueError::Payload(_))
        ));
    }
}
