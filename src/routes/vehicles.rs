use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    maintenance::ensure_record,
    models::{NewVehicle, Vehicle},
    schema::vehicles,
    state::AppState,
    utils::json::{nullable_field, NullableValue},
    vehicle_data::{is_plausible_registration, normalize_registration},
};

use super::{non_blank, to_iso};

pub const VEHICLE_STATUSES: &[&str] = &["active", "inactive", "archived"];

#[derive(Deserialize)]
pub struct VehicleListQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateVehicleRequest {
    pub reg_number: String,
    pub nickname: Option<String>,
    pub category: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub colour: Option<String>,
}

#[derive(Serialize)]
pub struct VehicleResponse {
    pub id: Uuid,
    pub reg_number: String,
    pub nickname: Option<String>,
    pub category: String,
    pub status: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub colour: Option<String>,
    pub year_of_manufacture: Option<i32>,
    pub fuel_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Vehicle> for VehicleResponse {
    fn from(vehicle: Vehicle) -> Self {
        Self {
            id: vehicle.id,
            reg_number: vehicle.reg_number,
            nickname: vehicle.nickname,
            category: vehicle.category,
            status: vehicle.status,
            make: vehicle.make,
            model: vehicle.model,
            colour: vehicle.colour,
            year_of_manufacture: vehicle.year_of_manufacture,
            fuel_type: vehicle.fuel_type,
            created_at: to_iso(vehicle.created_at),
            updated_at: to_iso(vehicle.updated_at),
        }
    }
}

fn normalize_category(raw: Option<String>) -> AppResult<String> {
    let category = non_blank(raw)
        .map(|value| value.to_lowercase())
        .unwrap_or_else(|| "van".to_string());
    if category.chars().count() > 32 {
        return Err(AppError::bad_request("category must be at most 32 characters"));
    }
    Ok(category)
}

pub async fn list_vehicles(
    State(state): State<AppState>,
    Query(query): Query<VehicleListQuery>,
) -> AppResult<Json<Vec<VehicleResponse>>> {
    let mut conn = state.db()?;
    let mut db_query = vehicles::table
        .order(vehicles::reg_number.asc())
        .into_boxed();
    match query.status.as_deref() {
        Some(status) if VEHICLE_STATUSES.contains(&status) => {
            db_query = db_query.filter(vehicles::status.eq(status.to_string()));
        }
        Some(_) => return Err(AppError::bad_request("unknown vehicle status")),
        None => {
            db_query = db_query.filter(vehicles::status.ne("archived"));
        }
    }
    let rows: Vec<Vehicle> = db_query.load(&mut conn)?;
    Ok(Json(rows.into_iter().map(VehicleResponse::from).collect()))
}

pub async fn get_vehicle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VehicleResponse>> {
    let mut conn = state.db()?;
    let vehicle: Vehicle = vehicles::table.find(id).first(&mut conn)?;
    Ok(Json(vehicle.into()))
}

pub async fn create_vehicle(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateVehicleRequest>,
) -> AppResult<(StatusCode, Json<VehicleResponse>)> {
    user.require_manager()?;

    if !is_plausible_registration(&payload.reg_number) {
        return Err(AppError::bad_request("reg_number is not a valid registration"));
    }
    let reg_number = normalize_registration(&payload.reg_number);
    let category = normalize_category(payload.category)?;

    let mut conn = state.db()?;
    let vehicle = conn.transaction::<Vehicle, AppError, _>(|conn| {
        let taken: bool = diesel::select(diesel::dsl::exists(
            vehicles::table.filter(vehicles::reg_number.eq(&reg_number)),
        ))
        .get_result(conn)?;
        if taken {
            return Err(AppError::bad_request("a vehicle with this registration already exists"));
        }

        let new_vehicle = NewVehicle {
            id: Uuid::new_v4(),
            reg_number: reg_number.clone(),
            nickname: non_blank(payload.nickname),
            category,
            status: "active".to_string(),
            make: non_blank(payload.make),
            model: non_blank(payload.model),
            colour: non_blank(payload.colour),
        };
        diesel::insert_into(vehicles::table)
            .values(&new_vehicle)
            .execute(conn)?;
        ensure_record(conn, new_vehicle.id)?;
        Ok(vehicles::table.find(new_vehicle.id).first(conn)?)
    })?;

    info!(vehicle_id = %vehicle.id, reg_number = %vehicle.reg_number, "vehicle created");
    Ok((StatusCode::CREATED, Json(vehicle.into())))
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = vehicles)]
struct VehicleChanges {
    nickname: Option<Option<String>>,
    category: Option<String>,
    status: Option<String>,
    make: Option<Option<String>>,
    model: Option<Option<String>>,
    colour: Option<Option<String>>,
    updated_at: Option<chrono::NaiveDateTime>,
}

fn text_update(body: &serde_json::Map<String, Value>, field: &str) -> AppResult<Option<Option<String>>> {
    let value: NullableValue<String> =
        nullable_field(body, field).map_err(AppError::bad_request)?;
    Ok(value
        .into_update()
        .map(|inner| inner.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())))
}

pub async fn update_vehicle(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> AppResult<Json<VehicleResponse>> {
    user.require_manager()?;
    let body = payload
        .as_object()
        .ok_or_else(|| AppError::bad_request("request body must be an object"))?;

    let mut changes = VehicleChanges {
        nickname: text_update(body, "nickname")?,
        make: text_update(body, "make")?,
        model: text_update(body, "model")?,
        colour: text_update(body, "colour")?,
        ..Default::default()
    };

    match nullable_field::<String>(body, "category").map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Null => return Err(AppError::bad_request("category cannot be null")),
        NullableValue::Value(value) => changes.category = Some(normalize_category(Some(value))?),
    }
    match nullable_field::<String>(body, "status").map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Value(value) if VEHICLE_STATUSES.contains(&value.as_str()) => {
            changes.status = Some(value)
        }
        _ => {
            return Err(AppError::bad_request(
                "status must be one of active, inactive, archived",
            ))
        }
    }
    changes.updated_at = Some(Utc::now().naive_utc());

    let mut conn = state.db()?;
    let updated = diesel::update(vehicles::table.find(id))
        .set(&changes)
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found());
    }
    let vehicle: Vehicle = vehicles::table.find(id).first(&mut conn)?;
    Ok(Json(vehicle.into()))
}
