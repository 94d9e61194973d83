use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{is_valid_role, password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{NewUser, User},
    schema::users,
    state::AppState,
};

use super::to_iso;

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            created_at: to_iso(user.created_at),
        }
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<UserResponse>>> {
    user.require_manager()?;
    let mut conn = state.db()?;
    let rows: Vec<User> = users::table
        .order(users::full_name.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(UserResponse::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    user.require_admin()?;

    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::bad_request("email must be a valid address"));
    }
    let full_name = payload.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::bad_request("full_name must not be empty"));
    }
    if !is_valid_role(&payload.role) {
        return Err(AppError::bad_request(
            "role must be one of employee, manager, admin",
        ));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let mut conn = state.db()?;
    let taken: bool = diesel::select(diesel::dsl::exists(
        users::table.filter(users::email.eq(&email)),
    ))
    .get_result(&mut conn)?;
    if taken {
        return Err(AppError::bad_request("a user with this email already exists"));
    }

    let new_user = NewUser {
        id: Uuid::new_v4(),
        email,
        full_name: full_name.to_string(),
        password_hash: password::hash_password(&payload.password)?,
        role: payload.role,
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)?;

    info!(user_id = %new_user.id, role = %new_user.role, created_by = %user.user_id, "user created");
    let created: User = users::table.find(new_user.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(created.into())))
}
