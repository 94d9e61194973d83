use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

use crate::{
    jobs::{decode, JobPayload},
    mailer::OutboundEmail,
    models::Job,
    state::AppState,
};

use super::{JobExecution, JobHandler};

const MAX_ATTEMPTS: i32 = 5;

pub struct SendEmailJob;

impl SendEmailJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendEmailJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear backoff: one minute per attempt so far.
fn retry_delay(attempts: i32) -> Duration {
    Duration::from_secs(60 * attempts.max(1) as u64)
}

#[async_trait]
impl JobHandler for SendEmailJob {
    fn job_type(&self) -> &'static str {
        OutboundEmail::JOB_TYPE
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let email: OutboundEmail = match decode(&job) {
            Ok(email) => email,
            Err(err) => return JobExecution::Failed { error: err.to_string() },
        };
        if email.to.is_empty() {
            return JobExecution::Success;
        }

        match state.services.mailer.send(&email).await {
            Ok(()) => {
                info!(job_id = %job.id, subject = %email.subject, recipients = email.to.len(), "email sent");
                JobExecution::Success
            }
            Err(err) if job.attempts < MAX_ATTEMPTS => JobExecution::Retry {
                delay: retry_delay(job.attempts),
                error: format!("{err:#}"),
            },
            Err(err) => JobExecution::Failed {
                error: format!("giving up after {} attempts: {err:#}", job.attempts),
            },
        }
    }
}
