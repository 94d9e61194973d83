use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{api_registration, MotHistoryProvider, ProviderError};
use crate::config::MotConfig;

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotHistory {
    pub registration: String,
    #[serde(default)]
    pub mot_tests: Vec<MotTest>,
    /// Present for vehicles too new to have been tested.
    #[serde(default)]
    pub mot_test_due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotTest {
    pub completed_date: String,
    pub test_result: String,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub odometer_value: Option<String>,
    #[serde(default)]
    pub odometer_unit: Option<String>,
}

impl MotTest {
    fn passed(&self) -> bool {
        self.test_result.eq_ignore_ascii_case("PASSED")
    }

    fn odometer_miles(&self) -> Option<i32> {
        let unit = self.odometer_unit.as_deref()?;
        if !unit.eq_ignore_ascii_case("MI") {
            return None;
        }
        self.odometer_value.as_deref()?.trim().parse().ok()
    }
}

impl MotHistory {
    /// Expiry of the most recent passed test, or the first-test due date for new vehicles.
    pub fn current_expiry(&self) -> Option<NaiveDate> {
        self.mot_tests
            .iter()
            .filter(|test| test.passed())
            .filter_map(|test| test.expiry_date)
            .max()
            .or(self.mot_test_due_date)
    }

    /// Odometer reading (miles) from the most recently completed test.
    pub fn latest_odometer_miles(&self) -> Option<i32> {
        self.mot_tests
            .iter()
            .max_by(|a, b| a.completed_date.cmp(&b.completed_date))
            .and_then(MotTest::odometer_miles)
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: u64,
}

fn default_token_lifetime() -> u64 {
    3600
}

/// MOT History API client. Uses an OAuth2 client-credentials token that is
/// cached until shortly before it expires.
pub struct MotClient {
    client: Client,
    config: MotConfig,
    token: Mutex<Option<CachedToken>>,
}

impl MotClient {
    pub fn new(client: Client, config: MotConfig) -> Self {
        Self {
            client,
            config,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(cached.value.clone());
            }
        }

        debug!("requesting MOT history access token");
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Auth(err.to_string()))?;
        let value = token.access_token.clone();
        *guard = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }
}

#[async_trait]
impl MotHistoryProvider for MotClient {
    async fn history(&self, registration: &str) -> Result<MotHistory, ProviderError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/{}",
            self.config.api_url.trim_end_matches('/'),
            api_registration(registration)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("x-api-key", &self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| ProviderError::Decode(err.to_string()))
    }
}
