use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    db::PooledConn,
    jobs::{reserve_next, settle, JobQueueError},
    models::Job,
    state::AppState,
};

pub use crate::jobs::JobExecution;

pub mod email;
pub mod vehicle_sync;

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

/// Polls the queue and dispatches each due job to the handler for its type.
pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        let job_types: Vec<&str> = self.handlers.keys().copied().collect();
        info!(?job_types, "worker started");
        loop {
            match self.tick().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => error!(error = %err, "worker tick failed"),
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Runs at most one due job. Returns whether a job was picked up.
    pub async fn tick(&self) -> Result<bool, JobQueueError> {
        if self.handlers.is_empty() {
            return Ok(false);
        }
        let job_types: Vec<&str> = self.handlers.keys().copied().collect();
        let reserved = {
            let mut conn = self.connection()?;
            reserve_next(&mut conn, &job_types)?
        };
        let Some(job) = reserved else {
            return Ok(false);
        };

        let execution = match self.handlers.get(job.job_type.as_str()) {
            Some(handler) => handler.handle(self.state.clone(), job.clone()).await,
            None => JobExecution::Failed {
                error: format!("no handler registered for {}", job.job_type),
            },
        };
        report(&job, &execution);

        let mut conn = self.connection()?;
        settle(&mut conn, job.id, &execution)?;
        Ok(true)
    }

    fn connection(&self) -> Result<PooledConn, JobQueueError> {
        self.state
            .db()
            .map_err(|err| JobQueueError::Pool(err.message().to_string()))
    }
}

fn report(job: &Job, execution: &JobExecution) {
    match execution {
        JobExecution::Success => {
            info!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempts, "job completed")
        }
        JobExecution::Retry { delay, error } => warn!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            retry_in_secs = delay.as_secs(),
            %error,
            "job will retry"
        ),
        JobExecution::Failed { error } => {
            error!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempts, %error, "job failed")
        }
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![
        Arc::new(email::SendEmailJob::new()),
        Arc::new(vehicle_sync::SyncVehicleDataJob::new()),
    ]
}
