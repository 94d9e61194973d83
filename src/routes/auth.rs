use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::{pg::PgConnection, prelude::*};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{NewRefreshToken, RefreshToken, User},
    schema::{refresh_tokens, users},
    state::AppState,
};

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: SessionUser,
}

type SessionReply = (HeaderMap, Json<SessionResponse>);

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<SessionReply> {
    let email = payload.email.trim().to_lowercase();
    let mut conn = state.db()?;
    let user: User = users::table
        .filter(users::email.eq(&email))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        warn!(user_id = %user.id, "rejected login with wrong password");
        return Err(AppError::unauthorized());
    }

    let reply = issue_session(&state, &mut conn, user)?;
    info!(email = %email, "user signed in");
    Ok(reply)
}

/// Swaps a live refresh cookie for a new access token and a new refresh cookie.
/// The presented token is revoked, so each one works once.
pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<SessionReply> {
    let presented = jar
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(REFRESH_COOKIE_NAME))
        .ok_or_else(AppError::unauthorized)?;
    let hashed = hash_refresh_token(presented);
    let now = Utc::now().naive_utc();

    let mut conn = state.db()?;
    conn.transaction::<_, AppError, _>(|conn| {
        let token: RefreshToken = refresh_tokens::table
            .filter(refresh_tokens::token_hash.eq(&hashed))
            .filter(refresh_tokens::revoked_at.is_null())
            .filter(refresh_tokens::expires_at.gt(now))
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(AppError::unauthorized)?;
        diesel::update(refresh_tokens::table.find(token.id))
            .set((
                refresh_tokens::revoked_at.eq(Some(now)),
                refresh_tokens::updated_at.eq(now),
            ))
            .execute(conn)?;

        let user: User = users::table
            .find(token.user_id)
            .first(conn)
            .optional()?
            .ok_or_else(AppError::unauthorized)?;
        issue_session(&state, conn, user)
    })
}

/// Revokes the presented refresh token, or every live token of the user when
/// no matching cookie came with the request.
pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let presented = jar
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(REFRESH_COOKIE_NAME))
        .map(hash_refresh_token);
    let now = Utc::now().naive_utc();
    let live = || {
        refresh_tokens::table
            .filter(refresh_tokens::user_id.eq(user.user_id))
            .filter(refresh_tokens::revoked_at.is_null())
    };

    let mut conn = state.db()?;
    let mut revoked = 0;
    if let Some(hashed) = presented {
        revoked = diesel::update(live().filter(refresh_tokens::token_hash.eq(hashed)))
            .set((
                refresh_tokens::revoked_at.eq(Some(now)),
                refresh_tokens::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
    }
    if revoked == 0 {
        revoked = diesel::update(live())
            .set((
                refresh_tokens::revoked_at.eq(Some(now)),
                refresh_tokens::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
    }
    info!(user_id = %user.user_id, revoked, "user signed out");

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, refresh_cookie(&state, None)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

fn issue_session(state: &AppState, conn: &mut PgConnection, user: User) -> AppResult<SessionReply> {
    let access_token = state.jwt.generate_token(&user)?;

    let now = Utc::now();
    let refresh_value = generate_refresh_token();
    let expires_at = now + ChronoDuration::days(state.config.refresh_token_expiry_days);
    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash_refresh_token(&refresh_value),
            issued_at: now.naive_utc(),
            expires_at: expires_at.naive_utc(),
        })
        .execute(conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        refresh_cookie(state, Some((&refresh_value, expires_at)))?,
    );
    Ok((
        headers,
        Json(SessionResponse {
            access_token,
            token_type: "Bearer",
            expires_in: state.config.jwt_expiry_minutes * 60,
            user: SessionUser {
                id: user.id,
                email: user.email,
                full_name: user.full_name,
                role: user.role,
            },
        }),
    ))
}

fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `Some` sets the refresh cookie; `None` expires it.
fn refresh_cookie(
    state: &AppState,
    value: Option<(&str, DateTime<Utc>)>,
) -> AppResult<HeaderValue> {
    let mut parts = match value {
        Some((token, expires_at)) => vec![
            format!("{REFRESH_COOKIE_NAME}={token}"),
            format!(
                "Max-Age={}",
                ChronoDuration::days(state.config.refresh_token_expiry_days).num_seconds()
            ),
            format!("Expires={}", expires_at.to_rfc2822()),
        ],
        None => vec![
            format!("{REFRESH_COOKIE_NAME}="),
            "Max-Age=0".to_string(),
            "Expires=Thu, 01 Jan 1970 00:00:00 GMT".to_string(),
        ],
    };
    parts.extend(["Path=/api/auth", "HttpOnly", "SameSite=Strict"].map(str::to_string));
    if state.config.refresh_cookie_secure {
        parts.push("Secure".to_string());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={domain}"));
    }
    HeaderValue::from_str(&parts.join("; "))
        .map_err(|err| AppError::internal(format!("invalid refresh cookie: {err}")))
}

#[cfg(test)]
mod tests {
    use super::{generate_refresh_token, hash_refresh_token};

    #[test]
    fn refresh_tokens_are_random_and_hashed_stably() {
        let first = generate_refresh_token();
        let second = generate_refresh_token();
        assert_ne!(first, second);
        assert_eq!(first.len(), 64);
        assert_eq!(hash_refresh_token(&first), hash_refresh_token(&first));
        assert_ne!(hash_refresh_token(&first), first);
    }
}
