use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::StatusCode,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{verify_cron_secret, AuthenticatedUser},
    error::{AppError, AppResult},
    jobs::{enqueue, SyncVehiclePayload},
    maintenance::{
        ensure_record, history_rows, summarize, MaintenanceChanges, MaintenanceItem,
        MaintenanceStatus, MaintenanceSummary, Thresholds,
    },
    models::{DvlaSyncLog, MaintenanceCategory, MaintenanceHistory, Vehicle, VehicleMaintenance},
    schema::{maintenance_categories, maintenance_history, vehicle_maintenance, vehicles},
    state::AppState,
    sync::{load_targets, recent_log, SyncReport, TriggerType, VehicleSyncer},
    utils::json::{nullable_field, NullableValue},
};

use super::{to_iso, to_iso_opt};

const MIN_COMMENT_CHARS: usize = 10;
const HISTORY_LIMIT: i64 = 20;
const SYNC_LOG_LIMIT: i64 = 50;

#[derive(Serialize)]
pub struct VehicleRef {
    pub id: Uuid,
    pub reg_number: String,
    pub nickname: Option<String>,
    pub category: String,
}

impl From<&Vehicle> for VehicleRef {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            id: vehicle.id,
            reg_number: vehicle.reg_number.clone(),
            nickname: vehicle.nickname.clone(),
            category: vehicle.category.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct MaintenanceRecordResponse {
    pub current_mileage: Option<i32>,
    pub last_mileage_update: Option<String>,
    pub tax_due_date: Option<NaiveDate>,
    pub mot_due_date: Option<NaiveDate>,
    pub first_aid_kit_expiry: Option<NaiveDate>,
    pub last_service_mileage: Option<i32>,
    pub next_service_mileage: Option<i32>,
    pub cambelt_due_mileage: Option<i32>,
    pub current_hours: Option<i32>,
    pub next_service_hours: Option<i32>,
    pub notes: Option<String>,
    pub last_dvla_sync: Option<String>,
    pub dvla_sync_status: Option<String>,
    pub dvla_sync_error: Option<String>,
    pub updated_at: String,
}

impl From<&VehicleMaintenance> for MaintenanceRecordResponse {
    fn from(record: &VehicleMaintenance) -> Self {
        Self {
            current_mileage: record.current_mileage,
            last_mileage_update: to_iso_opt(record.last_mileage_update),
            tax_due_date: record.tax_due_date,
            mot_due_date: record.mot_due_date,
            first_aid_kit_expiry: record.first_aid_kit_expiry,
            last_service_mileage: record.last_service_mileage,
            next_service_mileage: record.next_service_mileage,
            cambelt_due_mileage: record.cambelt_due_mileage,
            current_hours: record.current_hours,
            next_service_hours: record.next_service_hours,
            notes: record.notes.clone(),
            last_dvla_sync: to_iso_opt(record.last_dvla_sync),
            dvla_sync_status: record.dvla_sync_status.clone(),
            dvla_sync_error: record.dvla_sync_error.clone(),
            updated_at: to_iso(record.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub value_type: String,
    pub comment: String,
    pub updated_by: Option<Uuid>,
    pub created_at: String,
}

impl From<MaintenanceHistory> for HistoryResponse {
    fn from(row: MaintenanceHistory) -> Self {
        Self {
            id: row.id,
            field_name: row.field_name,
            old_value: row.old_value,
            new_value: row.new_value,
            value_type: row.value_type,
            comment: row.comment,
            updated_by: row.updated_by,
            created_at: to_iso(row.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct FleetEntry {
    pub vehicle: VehicleRef,
    pub summary: MaintenanceSummary,
}

#[derive(Serialize, Default)]
pub struct StatusCounts {
    pub overdue: usize,
    pub due_soon: usize,
}

#[derive(Serialize)]
pub struct FleetMaintenanceResponse {
    pub vehicles: Vec<FleetEntry>,
    pub counts: StatusCounts,
}

#[derive(Serialize)]
pub struct AlertResponse {
    pub vehicle: VehicleRef,
    pub item: MaintenanceItem,
}

#[derive(Serialize)]
pub struct VehicleMaintenanceResponse {
    pub vehicle: VehicleRef,
    pub summary: MaintenanceSummary,
    pub record: Option<MaintenanceRecordResponse>,
    pub history: Vec<HistoryResponse>,
}

fn load_thresholds(conn: &mut PgConnection) -> QueryResult<Thresholds> {
    let categories: Vec<MaintenanceCategory> = maintenance_categories::table.load(conn)?;
    Ok(Thresholds::from_categories(&categories))
}

fn fleet_summaries(conn: &mut PgConnection) -> AppResult<Vec<(Vehicle, MaintenanceSummary)>> {
    let thresholds = load_thresholds(conn)?;
    let fleet: Vec<Vehicle> = vehicles::table
        .filter(vehicles::status.ne("archived"))
        .order(vehicles::reg_number.asc())
        .load(conn)?;
    let ids: Vec<Uuid> = fleet.iter().map(|vehicle| vehicle.id).collect();
    let records: HashMap<Uuid, VehicleMaintenance> = vehicle_maintenance::table
        .filter(vehicle_maintenance::vehicle_id.eq_any(ids))
        .load::<VehicleMaintenance>(conn)?
        .into_iter()
        .map(|record| (record.vehicle_id, record))
        .collect();

    let today = Utc::now().date_naive();
    Ok(fleet
        .into_iter()
        .map(|vehicle| {
            let summary = summarize(records.get(&vehicle.id), &thresholds, today);
            (vehicle, summary)
        })
        .collect())
}

pub async fn list_maintenance(
    State(state): State<AppState>,
) -> AppResult<Json<FleetMaintenanceResponse>> {
    let mut conn = state.db()?;
    let summaries = fleet_summaries(&mut conn)?;

    let mut counts = StatusCounts::default();
    for item in summaries.iter().flat_map(|(_, summary)| summary.items.iter()) {
        match item.status {
            MaintenanceStatus::Overdue => counts.overdue += 1,
            MaintenanceStatus::DueSoon => counts.due_soon += 1,
            _ => {}
        }
    }

    let vehicles = summaries
        .into_iter()
        .map(|(vehicle, summary)| FleetEntry {
            vehicle: VehicleRef::from(&vehicle),
            summary,
        })
        .collect();
    Ok(Json(FleetMaintenanceResponse { vehicles, counts }))
}

pub async fn list_alerts(State(state): State<AppState>) -> AppResult<Json<Vec<AlertResponse>>> {
    let mut conn = state.db()?;
    let summaries = fleet_summaries(&mut conn)?;

    let mut alerts: Vec<AlertResponse> = summaries
        .iter()
        .flat_map(|(vehicle, summary)| {
            summary.alerts().map(move |item| AlertResponse {
                vehicle: VehicleRef::from(vehicle),
                item: item.clone(),
            })
        })
        .collect();
    // Overdue first, then whatever is closest to its limit.
    alerts.sort_by(|a, b| {
        b.item
            .status
            .cmp(&a.item.status)
            .then(a.item.remaining.cmp(&b.item.remaining))
    });
    Ok(Json(alerts))
}

fn vehicle_view(
    conn: &mut PgConnection,
    vehicle: Vehicle,
) -> AppResult<VehicleMaintenanceResponse> {
    let thresholds = load_thresholds(conn)?;
    let record: Option<VehicleMaintenance> = vehicle_maintenance::table
        .filter(vehicle_maintenance::vehicle_id.eq(vehicle.id))
        .first(conn)
        .optional()?;
    let history: Vec<MaintenanceHistory> = maintenance_history::table
        .filter(maintenance_history::vehicle_id.eq(vehicle.id))
        .order(maintenance_history::created_at.desc())
        .limit(HISTORY_LIMIT)
        .load(conn)?;

    let summary = summarize(record.as_ref(), &thresholds, Utc::now().date_naive());
    Ok(VehicleMaintenanceResponse {
        vehicle: VehicleRef::from(&vehicle),
        summary,
        record: record.as_ref().map(MaintenanceRecordResponse::from),
        history: history.into_iter().map(HistoryResponse::from).collect(),
    })
}

pub async fn get_vehicle_maintenance(
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<Json<VehicleMaintenanceResponse>> {
    let mut conn = state.db()?;
    let vehicle: Vehicle = vehicles::table.find(vehicle_id).first(&mut conn)?;
    Ok(Json(vehicle_view(&mut conn, vehicle)?))
}

fn counter_update(body: &Map<String, Value>, field: &str) -> AppResult<Option<Option<i32>>> {
    let value: NullableValue<i32> = nullable_field(body, field).map_err(AppError::bad_request)?;
    if let NullableValue::Value(reading) = value {
        if reading < 0 {
            return Err(AppError::bad_request(format!("{field} cannot be negative")));
        }
    }
    Ok(value.into_update())
}

fn date_update(body: &Map<String, Value>, field: &str) -> AppResult<Option<Option<NaiveDate>>> {
    let value: NullableValue<NaiveDate> =
        nullable_field(body, field).map_err(AppError::bad_request)?;
    Ok(value.into_update())
}

/// Reads the editable maintenance fields from a PATCH body.
/// Absent keys are left alone and explicit nulls clear the column.
fn parse_changes(body: &Map<String, Value>) -> AppResult<MaintenanceChanges> {
    let notes: NullableValue<String> =
        nullable_field(body, "notes").map_err(AppError::bad_request)?;
    Ok(MaintenanceChanges {
        current_mileage: counter_update(body, "current_mileage")?,
        tax_due_date: date_update(body, "tax_due_date")?,
        mot_due_date: date_update(body, "mot_due_date")?,
        first_aid_kit_expiry: date_update(body, "first_aid_kit_expiry")?,
        last_service_mileage: counter_update(body, "last_service_mileage")?,
        next_service_mileage: counter_update(body, "next_service_mileage")?,
        cambelt_due_mileage: counter_update(body, "cambelt_due_mileage")?,
        current_hours: counter_update(body, "current_hours")?,
        next_service_hours: counter_update(body, "next_service_hours")?,
        notes: notes
            .into_update()
            .map(|inner| inner.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())),
        ..Default::default()
    })
}

fn parse_comment(body: &Map<String, Value>) -> AppResult<String> {
    let comment = body
        .get("comment")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if comment.chars().count() < MIN_COMMENT_CHARS {
        return Err(AppError::bad_request(format!(
            "comment must be at least {MIN_COMMENT_CHARS} characters"
        )));
    }
    Ok(comment.to_string())
}

pub async fn update_vehicle_maintenance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(vehicle_id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> AppResult<Json<VehicleMaintenanceResponse>> {
    user.require_manager()?;
    let body = payload
        .as_object()
        .ok_or_else(|| AppError::bad_request("request body must be an object"))?;
    let comment = parse_comment(body)?;
    let mut changes = parse_changes(body)?;

    let mut conn = state.db()?;
    let vehicle: Vehicle = vehicles::table.find(vehicle_id).first(&mut conn)?;

    let changed_fields = conn.transaction::<_, AppError, _>(|conn| {
        let record = ensure_record(conn, vehicle_id)?;
        let field_changes = changes.retain_changed(Some(&record));
        if field_changes.is_empty() {
            return Ok(0);
        }
        changes.stamp(Utc::now().naive_utc());
        diesel::update(vehicle_maintenance::table.find(record.id))
            .set(&changes)
            .execute(conn)?;
        diesel::insert_into(maintenance_history::table)
            .values(history_rows(
                vehicle_id,
                &field_changes,
                &comment,
                Some(user.user_id),
            ))
            .execute(conn)?;
        Ok(field_changes.len())
    })?;

    info!(
        vehicle_id = %vehicle_id,
        changed_fields,
        user_id = %user.user_id,
        "maintenance record updated"
    );
    Ok(Json(vehicle_view(&mut conn, vehicle)?))
}

#[derive(Serialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub field_name: String,
    pub alert_threshold: i32,
    pub description: Option<String>,
    pub updated_at: String,
}

impl From<MaintenanceCategory> for CategoryResponse {
    fn from(category: MaintenanceCategory) -> Self {
        Self {
            id: category.id,
            name: category.name,
            kind: category.kind,
            field_name: category.field_name,
            alert_threshold: category.alert_threshold,
            description: category.description,
            updated_at: to_iso(category.updated_at),
        }
    }
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CategoryResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<MaintenanceCategory> = maintenance_categories::table
        .order(maintenance_categories::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(CategoryResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct UpdateCategoryRequest {
    pub alert_threshold: Option<i32>,
    pub description: Option<String>,
}

pub async fn update_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> AppResult<Json<CategoryResponse>> {
    user.require_manager()?;
    if let Some(threshold) = payload.alert_threshold {
        if threshold <= 0 {
            return Err(AppError::bad_request("alert_threshold must be a positive integer"));
        }
    }

    let mut conn = state.db()?;
    let existing: MaintenanceCategory = maintenance_categories::table.find(id).first(&mut conn)?;
    let threshold = payload.alert_threshold.unwrap_or(existing.alert_threshold);
    let description = match payload.description {
        Some(text) => Some(text.trim().to_string()).filter(|v| !v.is_empty()),
        None => existing.description,
    };

    diesel::update(maintenance_categories::table.find(id))
        .set((
            maintenance_categories::alert_threshold.eq(threshold),
            maintenance_categories::description.eq(description),
            maintenance_categories::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let category: MaintenanceCategory = maintenance_categories::table.find(id).first(&mut conn)?;
    info!(category = %category.name, alert_threshold = threshold, "maintenance threshold updated");
    Ok(Json(category.into()))
}

#[derive(Debug, Deserialize, Default)]
pub struct SyncRequest {
    #[serde(default)]
    pub vehicle_ids: Vec<Uuid>,
}

impl SyncRequest {
    /// An absent or blank body means every active vehicle; anything else must parse.
    fn from_body(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|err| AppError::bad_request(format!("invalid sync request: {err}")))
    }
}

pub async fn sync_dvla(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> AppResult<Json<SyncReport>> {
    user.require_manager()?;
    let request = SyncRequest::from_body(&body)?;
    let syncer = VehicleSyncer::from_state(&state)?;

    let targets = {
        let mut conn = state.db()?;
        load_targets(&mut conn, &request.vehicle_ids)?
    };
    let missing: Vec<String> = request
        .vehicle_ids
        .iter()
        .filter(|id| !targets.iter().any(|vehicle| vehicle.id == **id))
        .map(Uuid::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            format!("no active vehicle with id {}", missing.join(", ")),
        ));
    }

    let trigger = if request.vehicle_ids.len() == 1 {
        TriggerType::Manual
    } else {
        TriggerType::Bulk
    };
    let report = syncer
        .sync_vehicles(&state, targets, trigger, Some(user.user_id))
        .await;
    Ok(Json(report))
}

#[derive(Serialize)]
pub struct CronSyncResponse {
    pub queued: usize,
}

pub async fn sync_dvla_cron(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> AppResult<(StatusCode, Json<CronSyncResponse>)> {
    verify_cron_secret(
        &state,
        bearer.as_ref().map(|TypedHeader(Authorization(b))| b.token()),
    )?;
    if state.services.vehicle_enquiry.is_none() {
        return Err(AppError::unavailable("DVLA API is not configured"));
    }

    let mut conn = state.db()?;
    let targets = load_targets(&mut conn, &[])?;
    let spacing =
        ChronoDuration::milliseconds(state.config.vehicle_sync.delay_between_vehicles_ms as i64);
    let start = Utc::now().naive_utc();

    let mut queued = 0;
    for (index, vehicle) in targets.iter().enumerate() {
        let run_after = start + spacing * index as i32;
        match enqueue(
            &mut conn,
            &SyncVehiclePayload {
                vehicle_id: vehicle.id,
            },
            Some(run_after),
        ) {
            Ok(_) => queued += 1,
            Err(err) => {
                warn!(vehicle_id = %vehicle.id, error = %err, "failed to queue vehicle sync");
            }
        }
    }

    info!(queued, "scheduled vehicle data sync");
    Ok((StatusCode::ACCEPTED, Json(CronSyncResponse { queued })))
}

#[derive(Serialize)]
pub struct SyncLogResponse {
    pub id: Uuid,
    pub reg_number: String,
    pub sync_status: String,
    pub trigger_type: String,
    pub fields_updated: Vec<String>,
    pub tax_due_date_old: Option<NaiveDate>,
    pub tax_due_date_new: Option<NaiveDate>,
    pub mot_due_date_old: Option<NaiveDate>,
    pub mot_due_date_new: Option<NaiveDate>,
    pub mileage_old: Option<i32>,
    pub mileage_new: Option<i32>,
    pub error_message: Option<String>,
    pub triggered_by: Option<Uuid>,
    pub created_at: String,
}

impl From<DvlaSyncLog> for SyncLogResponse {
    fn from(row: DvlaSyncLog) -> Self {
        Self {
            id: row.id,
            reg_number: row.reg_number,
            sync_status: row.sync_status,
            trigger_type: row.trigger_type,
            fields_updated: row.fields_updated,
            tax_due_date_old: row.tax_due_date_old,
            tax_due_date_new: row.tax_due_date_new,
            mot_due_date_old: row.mot_due_date_old,
            mot_due_date_new: row.mot_due_date_new,
            mileage_old: row.mileage_old,
            mileage_new: row.mileage_new,
            error_message: row.error_message,
            triggered_by: row.triggered_by,
            created_at: to_iso(row.created_at),
        }
    }
}

pub async fn get_sync_log(
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<Json<Vec<SyncLogResponse>>> {
    let mut conn = state.db()?;
    let exists: bool = diesel::select(diesel::dsl::exists(vehicles::table.find(vehicle_id)))
        .get_result(&mut conn)?;
    if !exists {
        return Err(AppError::not_found());
    }
    let rows = recent_log(&mut conn, vehicle_id, SYNC_LOG_LIMIT)?;
    Ok(Json(rows.into_iter().map(SyncLogResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn comment_must_be_long_enough() {
        assert!(parse_comment(&object(json!({"comment": "  too short "}))).is_err());
        assert!(parse_comment(&object(json!({}))).is_err());
        assert_eq!(
            parse_comment(&object(json!({"comment": " replaced tyres "}))).unwrap(),
            "replaced tyres"
        );
    }

    #[test]
    fn parses_nullable_fields() {
        let changes = parse_changes(&object(json!({
            "current_mileage": 12000,
            "mot_due_date": null,
            "tax_due_date": "2025-06-30",
            "notes": "   "
        })))
        .unwrap();
        assert_eq!(changes.current_mileage, Some(Some(12000)));
        assert_eq!(changes.mot_due_date, Some(None));
        assert_eq!(
            changes.tax_due_date,
            Some(NaiveDate::from_ymd_opt(2025, 6, 30))
        );
        assert_eq!(changes.notes, Some(None));
        assert_eq!(changes.next_service_mileage, None);
    }

    #[test]
    fn rejects_negative_and_malformed_readings() {
        assert!(parse_changes(&object(json!({"current_hours": -5}))).is_err());
        assert!(parse_changes(&object(json!({"first_aid_kit_expiry": "soon"}))).is_err());
    }

    #[test]
    fn sync_request_body_is_strict() {
        assert!(SyncRequest::from_body(b"").unwrap().vehicle_ids.is_empty());
        assert!(SyncRequest::from_body(b"  \n").unwrap().vehicle_ids.is_empty());
        assert!(SyncRequest::from_body(b"{}").unwrap().vehicle_ids.is_empty());

        let id = Uuid::new_v4();
        let body = json!({ "vehicle_ids": [id] }).to_string();
        assert_eq!(SyncRequest::from_body(body.as_bytes()).unwrap().vehicle_ids, vec![id]);

        let malformed: [&[u8]; 3] = [
            br#"{"vehicle_ids":["not-a-uuid"]}"#,
            br#"{"vehicle_ids":"all"}"#,
            br#"{"vehicle_ids":["#,
        ];
        for bad in malformed {
            let err = SyncRequest::from_body(bad).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }
}
