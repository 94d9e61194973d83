use std::sync::Arc;

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::{PgPool, PooledConn},
    error::{AppError, AppResult},
    mailer::Mailer,
    storage::ObjectStorage,
    vehicle_data::{MotHistoryProvider, VehicleEnquiry},
};

/// Outbound integrations. The vehicle data providers are absent when their
/// credentials are not configured.
#[derive(Clone)]
pub struct ExternalServices {
    pub vehicle_enquiry: Option<Arc<dyn VehicleEnquiry>>,
    pub mot_history: Option<Arc<dyn MotHistoryProvider>>,
    pub mailer: Arc<dyn Mailer>,
}

impl ExternalServices {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let vehicle_enquiry = config.dvla.as_ref().map(|dvla| {
            Arc::new(crate::vehicle_data::DvlaClient::new(client.clone(), dvla))
                as Arc<dyn VehicleEnquiry>
        });
        let mot_history = config.mot.clone().map(|mot| {
            Arc::new(crate::vehicle_data::MotClient::new(client.clone(), mot))
                as Arc<dyn MotHistoryProvider>
        });
        let mailer = crate::mailer::build_mailer(client, &config.email);

        Ok(Self {
            vehicle_enquiry,
            mot_history,
            mailer,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
    pub services: ExternalServices,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        jwt: JwtService,
        services: ExternalServices,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            jwt,
            services,
        }
    }

    /// Connects the pool, S3 and outbound clients described by `config`.
    pub async fn connect(config: AppConfig, pool_size: u32) -> anyhow::Result<Self> {
        let pool = crate::db::init_pool_with_size(&config.database_url, pool_size)?;
        let s3_client = crate::s3::build_client(&config).await?;
        let storage = Arc::new(crate::storage::S3Storage::new(
            s3_client,
            config.s3_bucket.clone(),
        ));
        let jwt = JwtService::from_config(&config)?;
        let services = ExternalServices::from_config(&config)?;
        Ok(Self::new(pool, config, storage, jwt, services))
    }

    pub fn db(&self) -> AppResult<PooledConn> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
