use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    inspections::{build_items, defect_title, defects, validate_header, ItemInput},
    lifecycle::{advance, ensure_applied, InspectionStatus, Lifecycle, TaskStatus},
    maintenance::{ensure_record, history_rows, MaintenanceChanges},
    models::{
        InspectionItem, NewVehicleInspection, NewWorkshopTask, Vehicle, VehicleInspection,
    },
    schema::{
        inspection_items, maintenance_history, users, vehicle_inspections, vehicle_maintenance,
        vehicles, workshop_tasks,
    },
    state::AppState,
};

use super::{non_blank, to_iso, to_iso_opt};

const INSPECTION_MILEAGE_COMMENT: &str = "Mileage reported on vehicle inspection";

#[derive(Deserialize)]
pub struct InspectionListQuery {
    pub vehicle_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateInspectionRequest {
    pub vehicle_id: Uuid,
    pub inspection_date: NaiveDate,
    pub inspection_end_date: Option<NaiveDate>,
    pub current_mileage: Option<i32>,
    #[serde(default)]
    pub items: Vec<ItemInput>,
}

#[derive(Deserialize)]
pub struct ReplaceItemsRequest {
    pub current_mileage: Option<i32>,
    pub items: Vec<ItemInput>,
}

#[derive(Deserialize)]
pub struct ReviewInspectionRequest {
    pub manager_comments: Option<String>,
}

#[derive(Serialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub item_number: i32,
    pub item_description: String,
    pub day_of_week: i32,
    pub status: String,
    pub comments: Option<String>,
}

impl From<InspectionItem> for ItemResponse {
    fn from(item: InspectionItem) -> Self {
        Self {
            id: item.id,
            item_number: item.item_number,
            item_description: item.item_description,
            day_of_week: item.day_of_week,
            status: item.status,
            comments: item.comments,
        }
    }
}

#[derive(Serialize)]
pub struct InspectionResponse {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub reg_number: String,
    pub user_id: Uuid,
    pub inspector_name: String,
    pub inspection_date: NaiveDate,
    pub inspection_end_date: Option<NaiveDate>,
    pub current_mileage: Option<i32>,
    pub status: String,
    pub submitted_at: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<String>,
    pub manager_comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemResponse>>,
    pub created_at: String,
}

fn to_response(
    inspection: VehicleInspection,
    reg_number: String,
    inspector_name: String,
    items: Option<Vec<InspectionItem>>,
) -> InspectionResponse {
    InspectionResponse {
        id: inspection.id,
        vehicle_id: inspection.vehicle_id,
        reg_number,
        user_id: inspection.user_id,
        inspector_name,
        inspection_date: inspection.inspection_date,
        inspection_end_date: inspection.inspection_end_date,
        current_mileage: inspection.current_mileage,
        status: inspection.status,
        submitted_at: to_iso_opt(inspection.submitted_at),
        reviewed_by: inspection.reviewed_by,
        reviewed_at: to_iso_opt(inspection.reviewed_at),
        manager_comments: inspection.manager_comments,
        items: items.map(|items| items.into_iter().map(ItemResponse::from).collect()),
        created_at: to_iso(inspection.created_at),
    }
}

fn load_detail(conn: &mut PgConnection, id: Uuid) -> AppResult<InspectionResponse> {
    let (inspection, reg_number, inspector_name): (VehicleInspection, String, String) =
        vehicle_inspections::table
            .inner_join(vehicles::table)
            .inner_join(users::table.on(users::id.eq(vehicle_inspections::user_id)))
            .filter(vehicle_inspections::id.eq(id))
            .select((
                vehicle_inspections::all_columns,
                vehicles::reg_number,
                users::full_name,
            ))
            .first(conn)?;
    let items: Vec<InspectionItem> = InspectionItem::belonging_to(&inspection)
        .order((inspection_items::day_of_week.asc(), inspection_items::item_number.asc()))
        .load(conn)?;
    Ok(to_response(inspection, reg_number, inspector_name, Some(items)))
}

fn load_owned_draft(
    conn: &mut PgConnection,
    id: Uuid,
    user: &AuthenticatedUser,
) -> AppResult<VehicleInspection> {
    let inspection: VehicleInspection = vehicle_inspections::table.find(id).first(conn)?;
    if inspection.user_id != user.user_id {
        return Err(AppError::forbidden("not your inspection"));
    }
    if InspectionStatus::parse(&inspection.status)? != InspectionStatus::Draft {
        return Err(AppError::bad_request("inspection can only be changed while draft"));
    }
    Ok(inspection)
}

pub async fn list_inspections(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<InspectionListQuery>,
) -> AppResult<Json<Vec<InspectionResponse>>> {
    let mut conn = state.db()?;
    let mut db_query = vehicle_inspections::table
        .inner_join(vehicles::table)
        .inner_join(users::table.on(users::id.eq(vehicle_inspections::user_id)))
        .select((
            vehicle_inspections::all_columns,
            vehicles::reg_number,
            users::full_name,
        ))
        .order(vehicle_inspections::inspection_date.desc())
        .into_boxed();

    if !user.is_manager() {
        db_query = db_query.filter(vehicle_inspections::user_id.eq(user.user_id));
    }
    if let Some(vehicle_id) = query.vehicle_id {
        db_query = db_query.filter(vehicle_inspections::vehicle_id.eq(vehicle_id));
    }
    if let Some(status) = query.status.as_deref() {
        let status = InspectionStatus::parse(status)?;
        db_query = db_query.filter(vehicle_inspections::status.eq(status.as_str()));
    }

    let rows: Vec<(VehicleInspection, String, String)> = db_query.load(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|(inspection, reg, name)| to_response(inspection, reg, name, None))
            .collect(),
    ))
}

pub async fn create_inspection(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateInspectionRequest>,
) -> AppResult<(StatusCode, Json<InspectionResponse>)> {
    validate_header(
        payload.inspection_date,
        payload.inspection_end_date,
        payload.current_mileage,
    )?;
    let inspection_id = Uuid::new_v4();
    let items = build_items(inspection_id, &payload.items)?;

    let mut conn = state.db()?;
    let vehicle: Option<Vehicle> = vehicles::table
        .find(payload.vehicle_id)
        .first(&mut conn)
        .optional()?;
    if vehicle.is_none() {
        return Err(AppError::bad_request("unknown vehicle_id"));
    }

    conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(vehicle_inspections::table)
            .values(&NewVehicleInspection {
                id: inspection_id,
                vehicle_id: payload.vehicle_id,
                user_id: user.user_id,
                inspection_date: payload.inspection_date,
                inspection_end_date: payload.inspection_end_date,
                current_mileage: payload.current_mileage,
                status: InspectionStatus::Draft.as_str().to_string(),
            })
            .execute(conn)?;
        if !items.is_empty() {
            diesel::insert_into(inspection_items::table)
                .values(&items)
                .execute(conn)?;
        }
        Ok(())
    })?;

    info!(inspection_id = %inspection_id, vehicle_id = %payload.vehicle_id, "inspection created");
    Ok((StatusCode::CREATED, Json(load_detail(&mut conn, inspection_id)?)))
}

pub async fn get_inspection(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<InspectionResponse>> {
    let mut conn = state.db()?;
    let inspection: VehicleInspection = vehicle_inspections::table.find(id).first(&mut conn)?;
    if inspection.user_id != user.user_id && !user.is_manager() {
        return Err(AppError::forbidden("not your inspection"));
    }
    Ok(Json(load_detail(&mut conn, id)?))
}

pub async fn replace_items(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceItemsRequest>,
) -> AppResult<Json<InspectionResponse>> {
    let items = build_items(id, &payload.items)?;
    let mut conn = state.db()?;
    let inspection = load_owned_draft(&mut conn, id, &user)?;
    let mileage = payload.current_mileage.or(inspection.current_mileage);
    validate_header(inspection.inspection_date, inspection.inspection_end_date, mileage)?;

    conn.transaction::<_, AppError, _>(|conn| {
        diesel::delete(inspection_items::table.filter(inspection_items::inspection_id.eq(id)))
            .execute(conn)?;
        if !items.is_empty() {
            diesel::insert_into(inspection_items::table)
                .values(&items)
                .execute(conn)?;
        }
        diesel::update(vehicle_inspections::table.find(id))
            .set((
                vehicle_inspections::current_mileage.eq(mileage),
                vehicle_inspections::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    })?;

    Ok(Json(load_detail(&mut conn, id)?))
}

#[derive(Serialize)]
pub struct SubmitInspectionResponse {
    pub inspection: InspectionResponse,
    pub tasks_created: Vec<Uuid>,
}

pub async fn submit_inspection(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SubmitInspectionResponse>> {
    let mut conn = state.db()?;
    let inspection: VehicleInspection = vehicle_inspections::table.find(id).first(&mut conn)?;
    if inspection.user_id != user.user_id {
        return Err(AppError::forbidden("only the inspector can submit"));
    }
    let next = advance(&inspection.status, InspectionStatus::Submitted)?;
    let vehicle: Vehicle = vehicles::table.find(inspection.vehicle_id).first(&mut conn)?;

    let tasks_created = conn.transaction::<_, AppError, _>(|conn| {
        let now = Utc::now().naive_utc();
        let affected = diesel::update(
            vehicle_inspections::table
                .find(id)
                .filter(vehicle_inspections::status.eq_any(InspectionStatus::sources(next))),
        )
        .set((
            vehicle_inspections::status.eq(next.as_str()),
            vehicle_inspections::submitted_at.eq(Some(now)),
            vehicle_inspections::updated_at.eq(now),
        ))
        .execute(conn)?;
        // Only the request that moved the draft creates defect tasks.
        ensure_applied::<InspectionStatus>(affected)?;

        let items: Vec<InspectionItem> = InspectionItem::belonging_to(&inspection)
            .order((inspection_items::day_of_week.asc(), inspection_items::item_number.asc()))
            .load(conn)?;
        let tasks: Vec<NewWorkshopTask> = defects(&items)
            .map(|item| NewWorkshopTask {
                id: Uuid::new_v4(),
                vehicle_id: inspection.vehicle_id,
                inspection_id: Some(inspection.id),
                inspection_item_id: Some(item.id),
                category_id: None,
                subcategory_id: None,
                title: defect_title(&vehicle.reg_number, item),
                description: item.comments.clone(),
                status: TaskStatus::Pending.as_str().to_string(),
                current_mileage: inspection.current_mileage,
                created_by: inspection.user_id,
            })
            .collect();
        if !tasks.is_empty() {
            diesel::insert_into(workshop_tasks::table)
                .values(&tasks)
                .execute(conn)?;
        }

        if let Some(reported) = inspection.current_mileage {
            let record = ensure_record(conn, inspection.vehicle_id)?;
            if record.current_mileage.map_or(true, |stored| reported > stored) {
                let mut changes = MaintenanceChanges {
                    current_mileage: Some(Some(reported)),
                    ..Default::default()
                };
                let field_changes = changes.retain_changed(Some(&record));
                changes.stamp(now);
                diesel::update(vehicle_maintenance::table.find(record.id))
                    .set(&changes)
                    .execute(conn)?;
                diesel::insert_into(maintenance_history::table)
                    .values(history_rows(
                        inspection.vehicle_id,
                        &field_changes,
                        INSPECTION_MILEAGE_COMMENT,
                        Some(inspection.user_id),
                    ))
                    .execute(conn)?;
            }
        }

        Ok(tasks.into_iter().map(|task| task.id).collect::<Vec<_>>())
    })?;

    info!(
        inspection_id = %id,
        defects = tasks_created.len(),
        "inspection submitted"
    );
    Ok(Json(SubmitInspectionResponse {
        inspection: load_detail(&mut conn, id)?,
        tasks_created,
    }))
}

pub async fn review_inspection(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReviewInspectionRequest>>,
) -> AppResult<Json<InspectionResponse>> {
    user.require_manager()?;
    let comments = payload.and_then(|Json(body)| non_blank(body.manager_comments));
    let mut conn = state.db()?;
    let inspection: VehicleInspection = vehicle_inspections::table.find(id).first(&mut conn)?;
    let next = advance(&inspection.status, InspectionStatus::Reviewed)?;

    let now = Utc::now().naive_utc();
    let affected = diesel::update(
        vehicle_inspections::table
            .find(id)
            .filter(vehicle_inspections::status.eq_any(InspectionStatus::sources(next))),
    )
    .set((
        vehicle_inspections::status.eq(next.as_str()),
        vehicle_inspections::reviewed_by.eq(Some(user.user_id)),
        vehicle_inspections::reviewed_at.eq(Some(now)),
        vehicle_inspections::manager_comments.eq(comments),
        vehicle_inspections::updated_at.eq(now),
    ))
    .execute(&mut conn)?;
    ensure_applied::<InspectionStatus>(affected)?;
    Ok(Json(load_detail(&mut conn, id)?))
}

pub async fn delete_inspection(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let inspection: VehicleInspection = vehicle_inspections::table.find(id).first(&mut conn)?;
    let owner_draft = inspection.user_id == user.user_id
        && InspectionStatus::parse(&inspection.status)? == InspectionStatus::Draft;
    if !owner_draft && !user.is_manager() {
        return Err(AppError::forbidden(
            "only draft inspections can be deleted by their owner",
        ));
    }
    diesel::delete(vehicle_inspections::table.find(id)).execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}
