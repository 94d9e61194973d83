use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::User;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
        })
    }

    pub fn generate_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::{EmailConfig, VehicleSyncConfig};

    fn config(secret: &str) -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/fleetops".into(),
            database_max_pool_size: 1,
            server_host: "127.0.0.1".into(),
            server_port: 0,
            app_base_url: "http://localhost:3000".into(),
            jwt_secret: secret.into(),
            jwt_issuer: "fleetops".into(),
            jwt_audience: "fleetops-clients".into(),
            jwt_expiry_minutes: 5,
            refresh_token_expiry_days: 1,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "eu-west-2".into(),
            s3_bucket: "bucket".into(),
            rams_max_upload_bytes: 1024,
            dvla: None,
            mot: None,
            vehicle_sync: VehicleSyncConfig::default(),
            cron_secret: None,
            email: EmailConfig {
                api_url: "http://localhost/email".into(),
                api_key: None,
                from_address: "noreply@example.com".into(),
                admin_emails: Vec::new(),
            },
        }
    }

    fn user() -> User {
        let now = Utc::now().naive_utc();
        User {
            id: Uuid::new_v4(),
            email: "driver@example.com".into(),
            full_name: "Dee Driver".into(),
            password_hash: String::new(),
            role: "employee".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn token_roundtrip_carries_identity() {
        let service = JwtService::from_config(&config("secret")).unwrap();
        let user = user();
        let token = service.generate_token(&user).unwrap();
        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "driver@example.com");
        assert_eq!(claims.role, "employee");
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issuer = JwtService::from_config(&config("one")).unwrap();
        let verifier = JwtService::from_config(&config("two")).unwrap();
        let token = issuer.generate_token(&user()).unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }
}
