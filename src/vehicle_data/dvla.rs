use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{api_registration, ProviderError, VehicleEnquiry};
use crate::config::DvlaConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DvlaVehicle {
    pub registration_number: String,
    #[serde(default)]
    pub tax_status: Option<String>,
    #[serde(default)]
    pub tax_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub mot_status: Option<String>,
    #[serde(default)]
    pub mot_expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub colour: Option<String>,
    #[serde(default)]
    pub year_of_manufacture: Option<i32>,
    #[serde(default)]
    pub fuel_type: Option<String>,
}

pub struct DvlaClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl DvlaClient {
    pub fn new(client: Client, config: &DvlaConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl VehicleEnquiry for DvlaClient {
    async fn lookup(&self, registration: &str) -> Result<DvlaVehicle, ProviderError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .json(&json!({ "registrationNumber": api_registration(registration) }))
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
