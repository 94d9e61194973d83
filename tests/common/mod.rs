use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use fleetops::auth::jwt::JwtService;
use fleetops::config::{AppConfig, EmailConfig, VehicleSyncConfig};
use fleetops::db::{self, PgPool};
use fleetops::mailer::{Mailer, OutboundEmail};
use fleetops::models::{Job, NewUser};
use fleetops::routes;
use fleetops::state::{AppState, ExternalServices};
use fleetops::storage::{ObjectStorage, StoredFile};
use fleetops::vehicle_data::{
    api_registration, DvlaVehicle, MotHistory, MotHistoryProvider, ProviderError, VehicleEnquiry,
};
use fleetops::{default_handlers, Worker};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "correct-horse";
#[allow(dead_code)]
pub const CRON_SECRET: &str = "test-cron-secret";
#[allow(dead_code)]
pub const ADMIN_EMAIL: &str = "ops@example.com";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredFile>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(&self, file: StoredFile) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.insert(file.key.clone(), file);
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<StoredFile> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

/// DVLA lookups answered from a table keyed by compact registration.
#[derive(Default)]
pub struct FakeVehicleEnquiry {
    vehicles: Mutex<HashMap<String, DvlaVehicle>>,
}

impl FakeVehicleEnquiry {
    #[allow(dead_code)]
    pub async fn insert(&self, registration: &str, tax_due: NaiveDate, mot_due: NaiveDate) {
        let vehicle = DvlaVehicle {
            registration_number: api_registration(registration),
            tax_status: Some("Taxed".into()),
            tax_due_date: Some(tax_due),
            mot_status: Some("Valid".into()),
            mot_expiry_date: Some(mot_due),
            make: Some("FORD".into()),
            colour: Some("WHITE".into()),
            year_of_manufacture: Some(2021),
            fuel_type: Some("DIESEL".into()),
        };
        self.vehicles
            .lock()
            .await
            .insert(api_registration(registration), vehicle);
    }
}

#[async_trait]
impl VehicleEnquiry for FakeVehicleEnquiry {
    async fn lookup(&self, registration: &str) -> Result<DvlaVehicle, ProviderError> {
        self.vehicles
            .lock()
            .await
            .get(&api_registration(registration))
            .cloned()
            .ok_or(ProviderError::NotFound)
    }
}

#[derive(Default)]
pub struct FakeMotHistory {
    histories: Mutex<HashMap<String, MotHistory>>,
}

impl FakeMotHistory {
    #[allow(dead_code)]
    pub async fn insert(&self, registration: &str, history: Value) -> Result<()> {
        let history: MotHistory = serde_json::from_value(history)?;
        self.histories
            .lock()
            .await
            .insert(api_registration(registration), history);
        Ok(())
    }
}

#[async_trait]
impl MotHistoryProvider for FakeMotHistory {
    async fn history(&self, registration: &str) -> Result<MotHistory, ProviderError> {
        self.histories
            .lock()
            .await
            .get(&api_registration(registration))
            .cloned()
            .ok_or(ProviderError::NotFound)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl RecordingMailer {
    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    dvla: Arc<FakeVehicleEnquiry>,
    mot: Arc<FakeMotHistory>,
    mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::build(true).await
    }

    /// An app whose DVLA integration is not configured.
    #[allow(dead_code)]
    pub async fn without_vehicle_data() -> Result<Self> {
        Self::build(false).await
    }

    async fn build(vehicle_data: bool) -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            app_base_url: "http://localhost:3000".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "eu-west-2".to_string(),
            s3_bucket: "test-bucket".to_string(),
            rams_max_upload_bytes: 64 * 1024,
            dvla: None,
            mot: None,
            vehicle_sync: VehicleSyncConfig {
                delay_between_vehicles_ms: 0,
                max_attempts: 1,
                retry_delay_ms: 0,
            },
            cron_secret: Some(CRON_SECRET.to_string()),
            email: EmailConfig {
                api_url: "http://email.invalid/send".to_string(),
                api_key: None,
                from_address: "fleet@example.com".to_string(),
                admin_emails: vec![ADMIN_EMAIL.to_string()],
            },
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let dvla = Arc::new(FakeVehicleEnquiry::default());
        let mot = Arc::new(FakeMotHistory::default());
        let mailer = Arc::new(RecordingMailer::default());
        let services = ExternalServices {
            vehicle_enquiry: vehicle_data.then(|| dvla.clone() as Arc<dyn VehicleEnquiry>),
            mot_history: vehicle_data.then(|| mot.clone() as Arc<dyn MotHistoryProvider>),
            mailer: mailer.clone(),
        };
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, storage.clone(), jwt, services);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            dvla,
            mot,
            mailer,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            reset_tables(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn dvla(&self) -> Arc<FakeVehicleEnquiry> {
        self.dvla.clone()
    }

    #[allow(dead_code)]
    pub fn mot(&self) -> Arc<FakeMotHistory> {
        self.mot.clone()
    }

    #[allow(dead_code)]
    pub fn mailer(&self) -> Arc<RecordingMailer> {
        self.mailer.clone()
    }

    pub async fn insert_user(&self, email: &str, full_name: &str, role: &str) -> Result<Uuid> {
        let email = email.to_string();
        let full_name = full_name.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                email,
                full_name,
                password_hash: hash_password(TEST_PASSWORD)?,
                role,
            };
            diesel::insert_into(fleetops::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, email: &str) -> Result<String> {
        let response = self
            .post_json(
                "/api/auth/login",
                &json!({ "email": email, "password": TEST_PASSWORD }),
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = json_body(response).await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response had no access_token"))
    }

    /// Inserts a user with `role` and returns their id and bearer token.
    #[allow(dead_code)]
    pub async fn user_with_token(&self, email: &str, role: &str) -> Result<(Uuid, String)> {
        let name = email.split('@').next().unwrap_or(email).to_string();
        let id = self.insert_user(email, &name, role).await?;
        let token = self.login_token(email).await?;
        Ok((id, token))
    }

    /// Creates an active vehicle through the API and returns its id.
    #[allow(dead_code)]
    pub async fn create_vehicle(&self, reg_number: &str, token: &str) -> Result<Uuid> {
        let response = self
            .post_json(
                "/api/vehicles",
                &json!({ "reg_number": reg_number, "category": "van" }),
                Some(token),
            )
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "vehicle creation failed with status {}",
            response.status()
        );
        let body = json_body(response).await?;
        let id = body["id"]
            .as_str()
            .ok_or_else(|| anyhow!("vehicle response had no id"))?;
        Ok(Uuid::parse_str(id)?)
    }

    #[allow(dead_code)]
    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use fleetops::schema::jobs::dsl::{created_at, job_type as job_type_col, jobs as jobs_table};
            let rows = jobs_table
                .filter(job_type_col.eq(&ty))
                .order(created_at.asc())
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    /// Runs queued jobs whose `run_after` has passed until none are left.
    #[allow(dead_code)]
    pub async fn drain_jobs(&self) -> Result<usize> {
        let worker = Worker::new(
            Arc::new(self.state.clone()),
            default_handlers(),
            Duration::from_millis(10),
        );
        let mut processed = 0;
        while worker.tick().await? {
            processed += 1;
        }
        Ok(processed)
    }

    #[allow(dead_code)]
    pub async fn sql(&self, statement: &str) -> Result<()> {
        let statement = statement.to_string();
        self.with_conn(move |conn| {
            conn.batch_execute(&statement)
                .context("failed to run test SQL")?;
            Ok(())
        })
        .await
    }

    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let request = json_request(method, path, payload, token)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    /// Runs every request on its own task so handlers overlap on the pool.
    #[allow(dead_code)]
    pub async fn send_concurrently(
        &self,
        requests: Vec<Request<Body>>,
    ) -> Result<Vec<hyper::Response<Body>>> {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| tokio::spawn(self.router.clone().oneshot(request)))
            .collect();
        let mut responses = Vec::with_capacity(handles.len());
        for handle in handles {
            responses.push(handle.await?.expect("infallible response"));
        }
        Ok(responses)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.empty_request(Method::GET, path, token).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.empty_request(Method::DELETE, path, token).await
    }

    /// POST without a body, with an arbitrary bearer value.
    #[allow(dead_code)]
    pub async fn post_empty(&self, path: &str, bearer: Option<&str>) -> Result<hyper::Response<Body>> {
        self.empty_request(Method::POST, path, bearer).await
    }

    #[allow(dead_code)]
    pub async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn empty_request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn upload_rams(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        title: &str,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend(data);
        body.extend(b"\r\n");

        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(b"Content-Disposition: form-data; name=\"title\"\r\n\r\n");
        body.extend(title.as_bytes());
        body.extend(b"\r\n");

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/rams")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub fn json_request<T: Serialize + ?Sized>(
    method: Method,
    path: &str,
    payload: &T,
    token: Option<&str>,
) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    Ok(builder.body(Body::from(serde_json::to_vec(payload)?))?)
}

pub async fn json_body(response: hyper::Response<Body>) -> Result<Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&bytes).context("response body was not JSON")
}

/// A tiny valid PNG signature as a data URL.
#[allow(dead_code)]
pub fn signature_data_url() -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(b"IHDR-test-signature");
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(db::MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        reset_tables(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

/// Empties every table except the seeded maintenance categories, whose
/// thresholds go back to their defaults.
fn reset_tables(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE error_logs, error_reports, message_recipients, messages, \
         rams_visitor_signatures, rams_assignments, rams_documents, timesheet_entries, \
         timesheets, workshop_task_comments, workshop_tasks, workshop_task_categories, \
         inspection_items, vehicle_inspections, dvla_sync_log, maintenance_history, \
         vehicle_maintenance, vehicles, jobs, refresh_tokens, users RESTART IDENTITY CASCADE;
         UPDATE maintenance_categories SET alert_threshold = 30 WHERE kind = 'date';
         UPDATE maintenance_categories SET alert_threshold = 1000 WHERE field_name = 'next_service_mileage';
         UPDATE maintenance_categories SET alert_threshold = 5000 WHERE field_name = 'cambelt_due_mileage';
         UPDATE maintenance_categories SET alert_threshold = 50 WHERE kind = 'hours';",
    )
    .context("failed to reset tables")?;
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::Argon2;

    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?
        .to_string())
}
