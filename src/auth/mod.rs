pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{error::AppError, state::AppState};

pub const ROLE_EMPLOYEE: &str = "employee";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_ADMIN: &str = "admin";

pub fn is_valid_role(role: &str) -> bool {
    matches!(role, ROLE_EMPLOYEE | ROLE_MANAGER | ROLE_ADMIN)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: uuid::Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

impl AuthenticatedUser {
    /// Admins hold every manager permission.
    pub fn is_manager(&self) -> bool {
        self.role == ROLE_MANAGER || self.role == ROLE_ADMIN
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn require_manager(&self) -> Result<(), AppError> {
        if self.is_manager() {
            Ok(())
        } else {
            Err(AppError::forbidden("manager access required"))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("admin access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            full_name: claims.full_name,
            role: claims.role,
        })
    }
}

/// Matches `Authorization: Bearer <CRON_SECRET>`. Rejected when no secret is configured.
pub fn verify_cron_secret(state: &AppState, presented: Option<&str>) -> Result<(), AppError> {
    let expected = state
        .config
        .cron_secret
        .as_deref()
        .ok_or_else(AppError::unauthorized)?;
    match presented {
        Some(token) if secrets_match(token, expected) => Ok(()),
        _ => Err(AppError::unauthorized()),
    }
}

/// Compares fixed-length digests without short-circuiting on the first difference.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: uuid::Uuid::new_v4(),
            email: "someone@example.com".into(),
            full_name: "Some One".into(),
            role: role.into(),
        }
    }

    #[test]
    fn admin_counts_as_manager() {
        assert!(user(ROLE_ADMIN).require_manager().is_ok());
        assert!(user(ROLE_MANAGER).require_manager().is_ok());
        assert!(user(ROLE_EMPLOYEE).require_manager().is_err());
    }

    #[test]
    fn only_admin_passes_admin_check() {
        assert!(user(ROLE_ADMIN).require_admin().is_ok());
        let err = user(ROLE_MANAGER).require_admin().unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn cron_secret_comparison() {
        assert!(secrets_match("cron-secret", "cron-secret"));
        assert!(!secrets_match("cron-secreT", "cron-secret"));
        assert!(!secrets_match("cron", "cron-secret"));
        assert!(!secrets_match("", "cron-secret"));
    }

    #[test]
    fn role_validation() {
        assert!(is_valid_role("employee"));
        assert!(!is_valid_role("superuser"));
    }
}
