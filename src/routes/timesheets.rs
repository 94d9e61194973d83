use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use diesel::{
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    lifecycle::{advance, ensure_applied, Lifecycle, TimesheetStatus},
    models::{NewTimesheet, Timesheet, TimesheetEntry},
    schema::{timesheet_entries, timesheets, users},
    state::AppState,
    timesheets::{build_entries, validate_week_ending, EntryInput},
    vehicle_data::normalize_registration,
};

use super::{non_blank, to_iso, to_iso_opt};

#[derive(Deserialize)]
pub struct TimesheetListQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateTimesheetRequest {
    pub week_ending: NaiveDate,
    pub reg_number: Option<String>,
    #[serde(default)]
    pub entries: Vec<EntryInput>,
}

#[derive(Deserialize)]
pub struct ReplaceEntriesRequest {
    pub reg_number: Option<String>,
    pub entries: Vec<EntryInput>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub comments: Option<String>,
}

#[derive(Serialize)]
pub struct EntryResponse {
    pub day_of_week: i32,
    pub time_started: Option<NaiveTime>,
    pub time_finished: Option<NaiveTime>,
    pub working_in_yard: bool,
    pub did_not_work: bool,
    pub daily_total_minutes: i32,
    pub remarks: Option<String>,
}

impl From<TimesheetEntry> for EntryResponse {
    fn from(entry: TimesheetEntry) -> Self {
        Self {
            day_of_week: entry.day_of_week,
            time_started: entry.time_started,
            time_finished: entry.time_finished,
            working_in_yard: entry.working_in_yard,
            did_not_work: entry.did_not_work,
            daily_total_minutes: entry.daily_total_minutes,
            remarks: entry.remarks,
        }
    }
}

#[derive(Serialize)]
pub struct TimesheetResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub employee_name: String,
    pub week_ending: NaiveDate,
    pub reg_number: Option<String>,
    pub status: String,
    pub submitted_at: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<String>,
    pub manager_comments: Option<String>,
    pub total_minutes: i32,
    pub entries: Vec<EntryResponse>,
    pub created_at: String,
    pub updated_at: String,
}

fn to_response(
    timesheet: Timesheet,
    employee_name: String,
    entries: Vec<TimesheetEntry>,
) -> TimesheetResponse {
    TimesheetResponse {
        id: timesheet.id,
        user_id: timesheet.user_id,
        employee_name,
        week_ending: timesheet.week_ending,
        reg_number: timesheet.reg_number,
        status: timesheet.status,
        submitted_at: to_iso_opt(timesheet.submitted_at),
        reviewed_by: timesheet.reviewed_by,
        reviewed_at: to_iso_opt(timesheet.reviewed_at),
        manager_comments: timesheet.manager_comments,
        total_minutes: entries.iter().map(|e| e.daily_total_minutes).sum(),
        entries: entries.into_iter().map(EntryResponse::from).collect(),
        created_at: to_iso(timesheet.created_at),
        updated_at: to_iso(timesheet.updated_at),
    }
}

fn load_detail(conn: &mut PgConnection, id: Uuid) -> AppResult<TimesheetResponse> {
    let (timesheet, employee_name): (Timesheet, String) = timesheets::table
        .inner_join(users::table)
        .filter(timesheets::id.eq(id))
        .select((timesheets::all_columns, users::full_name))
        .first(conn)?;
    let entries: Vec<TimesheetEntry> = TimesheetEntry::belonging_to(&timesheet)
        .order(timesheet_entries::day_of_week.asc())
        .load(conn)?;
    Ok(to_response(timesheet, employee_name, entries))
}

fn load_visible(
    conn: &mut PgConnection,
    id: Uuid,
    user: &AuthenticatedUser,
) -> AppResult<Timesheet> {
    let timesheet: Timesheet = timesheets::table.find(id).first(conn)?;
    if timesheet.user_id != user.user_id && !user.is_manager() {
        return Err(AppError::forbidden("not your timesheet"));
    }
    Ok(timesheet)
}

fn normalize_reg(raw: Option<String>) -> Option<String> {
    non_blank(raw).map(|reg| normalize_registration(&reg))
}

fn map_insert_error(err: DieselError) -> AppError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::bad_request("a timesheet already exists for this week")
        }
        other => other.into(),
    }
}

pub async fn list_timesheets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<TimesheetListQuery>,
) -> AppResult<Json<Vec<TimesheetResponse>>> {
    let mut conn = state.db()?;
    let mut db_query = timesheets::table
        .inner_join(users::table)
        .select((timesheets::all_columns, users::full_name))
        .order((timesheets::week_ending.desc(), users::full_name.asc()))
        .into_boxed();

    if user.is_manager() {
        if let Some(user_id) = query.user_id {
            db_query = db_query.filter(timesheets::user_id.eq(user_id));
        }
    } else {
        db_query = db_query.filter(timesheets::user_id.eq(user.user_id));
    }
    if let Some(status) = query.status.as_deref() {
        let status = TimesheetStatus::parse(status)?;
        db_query = db_query.filter(timesheets::status.eq(status.as_str()));
    }

    let rows: Vec<(Timesheet, String)> = db_query.load(&mut conn)?;
    let sheets: Vec<Timesheet> = rows.iter().map(|(sheet, _)| sheet.clone()).collect();
    let entries: Vec<TimesheetEntry> = TimesheetEntry::belonging_to(&sheets)
        .order(timesheet_entries::day_of_week.asc())
        .load(&mut conn)?;
    let grouped = entries.grouped_by(&sheets);

    Ok(Json(
        rows.into_iter()
            .zip(grouped)
            .map(|((sheet, name), entries)| to_response(sheet, name, entries))
            .collect(),
    ))
}

pub async fn create_timesheet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTimesheetRequest>,
) -> AppResult<(StatusCode, Json<TimesheetResponse>)> {
    validate_week_ending(payload.week_ending)?;
    let timesheet_id = Uuid::new_v4();
    let entries = build_entries(timesheet_id, &payload.entries)?;

    let mut conn = state.db()?;
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(timesheets::table)
            .values(&NewTimesheet {
                id: timesheet_id,
                user_id: user.user_id,
                week_ending: payload.week_ending,
                reg_number: normalize_reg(payload.reg_number),
                status: TimesheetStatus::Draft.as_str().to_string(),
            })
            .execute(conn)
            .map_err(map_insert_error)?;
        if !entries.is_empty() {
            diesel::insert_into(timesheet_entries::table)
                .values(&entries)
                .execute(conn)?;
        }
        Ok(())
    })?;

    info!(timesheet_id = %timesheet_id, user_id = %user.user_id, week_ending = %payload.week_ending, "timesheet created");
    Ok((StatusCode::CREATED, Json(load_detail(&mut conn, timesheet_id)?)))
}

pub async fn get_timesheet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TimesheetResponse>> {
    let mut conn = state.db()?;
    load_visible(&mut conn, id, &user)?;
    Ok(Json(load_detail(&mut conn, id)?))
}

pub async fn replace_entries(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceEntriesRequest>,
) -> AppResult<Json<TimesheetResponse>> {
    let entries = build_entries(id, &payload.entries)?;
    let mut conn = state.db()?;
    let timesheet: Timesheet = timesheets::table.find(id).first(&mut conn)?;
    if timesheet.user_id != user.user_id {
        return Err(AppError::forbidden("only the owner can edit a timesheet"));
    }
    if !TimesheetStatus::parse(&timesheet.status)?.is_editable() {
        return Err(AppError::bad_request(
            "timesheet can only be edited while draft or rejected",
        ));
    }

    conn.transaction::<_, AppError, _>(|conn| {
        diesel::delete(timesheet_entries::table.filter(timesheet_entries::timesheet_id.eq(id)))
            .execute(conn)?;
        if !entries.is_empty() {
            diesel::insert_into(timesheet_entries::table)
                .values(&entries)
                .execute(conn)?;
        }
        let reg_number = match payload.reg_number {
            Some(raw) => normalize_reg(Some(raw)),
            None => timesheet.reg_number.clone(),
        };
        diesel::update(timesheets::table.find(id))
            .set((
                timesheets::reg_number.eq(reg_number),
                timesheets::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    })?;

    Ok(Json(load_detail(&mut conn, id)?))
}

pub async fn submit_timesheet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TimesheetResponse>> {
    let mut conn = state.db()?;
    let timesheet: Timesheet = timesheets::table.find(id).first(&mut conn)?;
    if timesheet.user_id != user.user_id {
        return Err(AppError::forbidden("only the owner can submit a timesheet"));
    }
    let next = advance(&timesheet.status, TimesheetStatus::Submitted)?;

    let now = Utc::now().naive_utc();
    let affected = diesel::update(
        timesheets::table
            .find(id)
            .filter(timesheets::status.eq_any(TimesheetStatus::sources(next))),
    )
    .set((
        timesheets::status.eq(next.as_str()),
        timesheets::submitted_at.eq(Some(now)),
        timesheets::reviewed_by.eq(None::<Uuid>),
        timesheets::reviewed_at.eq(None::<chrono::NaiveDateTime>),
        timesheets::updated_at.eq(now),
    ))
    .execute(&mut conn)?;
    ensure_applied::<TimesheetStatus>(affected)?;

    info!(timesheet_id = %id, "timesheet submitted");
    Ok(Json(load_detail(&mut conn, id)?))
}

fn review(
    conn: &mut PgConnection,
    id: Uuid,
    reviewer: &AuthenticatedUser,
    to: TimesheetStatus,
    comments: Option<String>,
) -> AppResult<TimesheetResponse> {
    let timesheet: Timesheet = timesheets::table.find(id).first(conn)?;
    let next = advance(&timesheet.status, to)?;
    let now = Utc::now().naive_utc();
    let affected = diesel::update(
        timesheets::table
            .find(id)
            .filter(timesheets::status.eq_any(TimesheetStatus::sources(next))),
    )
    .set((
        timesheets::status.eq(next.as_str()),
        timesheets::reviewed_by.eq(Some(reviewer.user_id)),
        timesheets::reviewed_at.eq(Some(now)),
        timesheets::manager_comments.eq(comments),
        timesheets::updated_at.eq(now),
    ))
    .execute(conn)?;
    ensure_applied::<TimesheetStatus>(affected)?;
    info!(timesheet_id = %id, status = next.as_str(), reviewer = %reviewer.user_id, "timesheet reviewed");
    load_detail(conn, id)
}

pub async fn approve_timesheet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReviewRequest>>,
) -> AppResult<Json<TimesheetResponse>> {
    user.require_manager()?;
    let comments = payload.and_then(|Json(body)| non_blank(body.comments));
    let mut conn = state.db()?;
    Ok(Json(review(&mut conn, id, &user, TimesheetStatus::Approved, comments)?))
}

pub async fn reject_timesheet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> AppResult<Json<TimesheetResponse>> {
    user.require_manager()?;
    let comments = non_blank(payload.comments)
        .ok_or_else(|| AppError::bad_request("comments are required when rejecting"))?;
    let mut conn = state.db()?;
    Ok(Json(review(
        &mut conn,
        id,
        &user,
        TimesheetStatus::Rejected,
        Some(comments),
    )?))
}

pub async fn delete_timesheet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let timesheet: Timesheet = timesheets::table.find(id).first(&mut conn)?;
    let owner_draft = timesheet.user_id == user.user_id
        && TimesheetStatus::parse(&timesheet.status)? == TimesheetStatus::Draft;
    if !owner_draft && !user.is_manager() {
        return Err(AppError::forbidden(
            "only draft timesheets can be deleted by their owner",
        ));
    }
    diesel::delete(timesheets::table.find(id)).execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}
