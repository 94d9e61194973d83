use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
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
    lifecycle::{ensure_applied, Lifecycle, TaskStatus},
    models::{
        NewWorkshopTask, NewWorkshopTaskCategory, NewWorkshopTaskComment, WorkshopTask,
        WorkshopTaskCategory, WorkshopTaskComment,
    },
    schema::{users, vehicles, workshop_task_categories, workshop_task_comments, workshop_tasks},
    state::AppState,
};

use super::{non_blank, to_iso, to_iso_opt};

const COMMENT_MIN_CHARS: usize = 10;
const COMMENT_MAX_CHARS: usize = 1000;

fn validate_comment_body(raw: &str) -> AppResult<String> {
    let body = raw.trim();
    let length = body.chars().count();
    if length < COMMENT_MIN_CHARS {
        return Err(AppError::bad_request(format!(
            "comment must be at least {COMMENT_MIN_CHARS} characters"
        )));
    }
    if length > COMMENT_MAX_CHARS {
        return Err(AppError::bad_request(format!(
            "comment must be at most {COMMENT_MAX_CHARS} characters"
        )));
    }
    Ok(body.to_string())
}

fn is_hex_colour(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|ch| ch.is_ascii_hexdigit())
}

#[derive(Serialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub color: Option<String>,
    pub sort_order: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subcategories: Vec<CategoryResponse>,
}

impl From<WorkshopTaskCategory> for CategoryResponse {
    fn from(category: WorkshopTaskCategory) -> Self {
        Self {
            id: category.id,
            name: category.name,
            parent_id: category.parent_id,
            color: category.color,
            sort_order: category.sort_order,
            subcategories: Vec::new(),
        }
    }
}

/// Nests subcategories under their parents, keeping the sort order.
fn build_tree(categories: Vec<WorkshopTaskCategory>) -> Vec<CategoryResponse> {
    let (top, children): (Vec<_>, Vec<_>) = categories
        .into_iter()
        .partition(|category| category.parent_id.is_none());
    let mut tree: Vec<CategoryResponse> = top.into_iter().map(CategoryResponse::from).collect();
    for child in children {
        if let Some(parent) = tree.iter_mut().find(|node| Some(node.id) == child.parent_id) {
            parent.subcategories.push(child.into());
        }
    }
    tree
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CategoryResponse>>> {
    let mut conn = state.db()?;
    let categories: Vec<WorkshopTaskCategory> = workshop_task_categories::table
        .order((
            workshop_task_categories::sort_order.asc(),
            workshop_task_categories::name.asc(),
        ))
        .load(&mut conn)?;
    Ok(Json(build_tree(categories)))
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub color: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

pub async fn create_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<CategoryResponse>)> {
    user.require_manager()?;
    let name = non_blank(Some(payload.name))
        .ok_or_else(|| AppError::bad_request("name is required"))?;
    let color = non_blank(payload.color);
    if let Some(color) = color.as_deref() {
        if !is_hex_colour(color) {
            return Err(AppError::bad_request("color must look like #RRGGBB"));
        }
    }

    let mut conn = state.db()?;
    if let Some(parent_id) = payload.parent_id {
        let parent: Option<WorkshopTaskCategory> = workshop_task_categories::table
            .find(parent_id)
            .first(&mut conn)
            .optional()?;
        match parent {
            None => return Err(AppError::bad_request("unknown parent_id")),
            Some(parent) if parent.parent_id.is_some() => {
                return Err(AppError::bad_request(
                    "subcategories cannot have their own subcategories",
                ))
            }
            Some(_) => {}
        }
    }

    let row = NewWorkshopTaskCategory {
        id: Uuid::new_v4(),
        name,
        parent_id: payload.parent_id,
        color,
        sort_order: payload.sort_order,
    };
    diesel::insert_into(workshop_task_categories::table)
        .values(&row)
        .execute(&mut conn)
        .map_err(|err| match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AppError::bad_request("a category with this name already exists")
            }
            other => other.into(),
        })?;

    let category: WorkshopTaskCategory =
        workshop_task_categories::table.find(row.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(category.into())))
}

#[derive(Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub vehicle_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub reg_number: String,
    pub inspection_id: Option<Uuid>,
    pub inspection_item_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub current_mileage: Option<i32>,
    pub created_by: Uuid,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn to_task_response(task: WorkshopTask, reg_number: String) -> TaskResponse {
    TaskResponse {
        id: task.id,
        vehicle_id: task.vehicle_id,
        reg_number,
        inspection_id: task.inspection_id,
        inspection_item_id: task.inspection_item_id,
        category_id: task.category_id,
        subcategory_id: task.subcategory_id,
        title: task.title,
        description: task.description,
        status: task.status,
        current_mileage: task.current_mileage,
        created_by: task.created_by,
        completed_at: to_iso_opt(task.completed_at),
        created_at: to_iso(task.created_at),
        updated_at: to_iso(task.updated_at),
    }
}

fn load_task(conn: &mut PgConnection, id: Uuid) -> AppResult<TaskResponse> {
    let (task, reg_number): (WorkshopTask, String) = workshop_tasks::table
        .inner_join(vehicles::table)
        .filter(workshop_tasks::id.eq(id))
        .select((workshop_tasks::all_columns, vehicles::reg_number))
        .first(conn)?;
    Ok(to_task_response(task, reg_number))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> AppResult<Json<Vec<TaskResponse>>> {
    let mut conn = state.db()?;
    let mut db_query = workshop_tasks::table
        .inner_join(vehicles::table)
        .select((workshop_tasks::all_columns, vehicles::reg_number))
        .order(workshop_tasks::created_at.desc())
        .into_boxed();
    if let Some(status) = query.status.as_deref() {
        let status = TaskStatus::parse(status)?;
        db_query = db_query.filter(workshop_tasks::status.eq(status.as_str()));
    }
    if let Some(vehicle_id) = query.vehicle_id {
        db_query = db_query.filter(workshop_tasks::vehicle_id.eq(vehicle_id));
    }
    let rows: Vec<(WorkshopTask, String)> = db_query.load(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|(task, reg)| to_task_response(task, reg))
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub vehicle_id: Uuid,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub current_mileage: Option<i32>,
}

/// Checks the two-tier taxonomy. A subcategory on its own implies its parent.
fn resolve_categories(
    conn: &mut PgConnection,
    category_id: Option<Uuid>,
    subcategory_id: Option<Uuid>,
) -> AppResult<(Option<Uuid>, Option<Uuid>)> {
    if let Some(category_id) = category_id {
        let category: Option<WorkshopTaskCategory> = workshop_task_categories::table
            .find(category_id)
            .first(conn)
            .optional()?;
        match category {
            Some(category) if category.parent_id.is_none() => {}
            Some(_) => return Err(AppError::bad_request("category_id must be a top-level category")),
            None => return Err(AppError::bad_request("unknown category_id")),
        }
    }
    let Some(subcategory_id) = subcategory_id else {
        return Ok((category_id, None));
    };
    let subcategory: WorkshopTaskCategory = workshop_task_categories::table
        .find(subcategory_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request("unknown subcategory_id"))?;
    let Some(parent_id) = subcategory.parent_id else {
        return Err(AppError::bad_request("subcategory_id must be a subcategory"));
    };
    match category_id {
        Some(category_id) if category_id != parent_id => Err(AppError::bad_request(
            "subcategory does not belong to the selected category",
        )),
        _ => Ok((Some(parent_id), Some(subcategory_id))),
    }
}

pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    let title = non_blank(Some(payload.title))
        .ok_or_else(|| AppError::bad_request("title is required"))?;
    if payload.current_mileage.is_some_and(|miles| miles < 0) {
        return Err(AppError::bad_request("current_mileage cannot be negative"));
    }

    let mut conn = state.db()?;
    let vehicle_exists: bool =
        diesel::select(diesel::dsl::exists(vehicles::table.find(payload.vehicle_id)))
            .get_result(&mut conn)?;
    if !vehicle_exists {
        return Err(AppError::bad_request("unknown vehicle_id"));
    }
    let (category_id, subcategory_id) =
        resolve_categories(&mut conn, payload.category_id, payload.subcategory_id)?;

    let task = NewWorkshopTask {
        id: Uuid::new_v4(),
        vehicle_id: payload.vehicle_id,
        inspection_id: None,
        inspection_item_id: None,
        category_id,
        subcategory_id,
        title,
        description: non_blank(payload.description),
        status: TaskStatus::Pending.as_str().to_string(),
        current_mileage: payload.current_mileage,
        created_by: user.user_id,
    };
    diesel::insert_into(workshop_tasks::table)
        .values(&task)
        .execute(&mut conn)?;

    info!(task_id = %task.id, vehicle_id = %task.vehicle_id, "workshop task created");
    Ok((StatusCode::CREATED, Json(load_task(&mut conn, task.id)?)))
}

#[derive(Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: String,
}

pub async fn update_task_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTaskStatusRequest>,
) -> AppResult<Json<TaskResponse>> {
    user.require_manager()?;
    let target = TaskStatus::parse(payload.status.trim())?;
    let mut conn = state.db()?;
    let task: WorkshopTask = workshop_tasks::table.find(id).first(&mut conn)?;
    let next = TaskStatus::parse(&task.status)?.transition(target)?;

    let now = Utc::now().naive_utc();
    let completed_at = (next == TaskStatus::Completed).then_some(now);
    let affected = diesel::update(
        workshop_tasks::table
            .find(id)
            .filter(workshop_tasks::status.eq(&task.status)),
    )
    .set((
        workshop_tasks::status.eq(next.as_str()),
        workshop_tasks::completed_at.eq(completed_at),
        workshop_tasks::updated_at.eq(now),
    ))
    .execute(&mut conn)?;
    ensure_applied::<TaskStatus>(affected)?;

    info!(task_id = %id, from = %task.status, to = next.as_str(), "workshop task status changed");
    Ok(Json(load_task(&mut conn, id)?))
}

#[derive(Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

fn to_comment_response(comment: WorkshopTaskComment, author_name: String) -> CommentResponse {
    CommentResponse {
        id: comment.id,
        task_id: comment.task_id,
        author_id: comment.author_id,
        author_name,
        body: comment.body,
        created_at: to_iso(comment.created_at),
        updated_at: to_iso(comment.updated_at),
    }
}

fn load_comment(conn: &mut PgConnection, id: Uuid) -> AppResult<CommentResponse> {
    let (comment, author_name): (WorkshopTaskComment, String) = workshop_task_comments::table
        .inner_join(users::table)
        .filter(workshop_task_comments::id.eq(id))
        .select((workshop_task_comments::all_columns, users::full_name))
        .first(conn)?;
    Ok(to_comment_response(comment, author_name))
}

fn load_own_comment(
    conn: &mut PgConnection,
    id: Uuid,
    user: &AuthenticatedUser,
) -> AppResult<WorkshopTaskComment> {
    let comment: WorkshopTaskComment = workshop_task_comments::table.find(id).first(conn)?;
    if comment.author_id != user.user_id {
        return Err(AppError::forbidden("only the author can change this comment"));
    }
    Ok(comment)
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<Vec<CommentResponse>>> {
    let mut conn = state.db()?;
    let _: WorkshopTask = workshop_tasks::table.find(task_id).first(&mut conn)?;
    let rows: Vec<(WorkshopTaskComment, String)> = workshop_task_comments::table
        .inner_join(users::table)
        .filter(workshop_task_comments::task_id.eq(task_id))
        .order(workshop_task_comments::created_at.asc())
        .select((workshop_task_comments::all_columns, users::full_name))
        .load(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|(comment, name)| to_comment_response(comment, name))
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> AppResult<(StatusCode, Json<CommentResponse>)> {
    let body = validate_comment_body(&payload.body)?;
    let mut conn = state.db()?;
    let _: WorkshopTask = workshop_tasks::table.find(task_id).first(&mut conn)?;

    let comment = NewWorkshopTaskComment {
        id: Uuid::new_v4(),
        task_id,
        author_id: user.user_id,
        body,
    };
    diesel::insert_into(workshop_task_comments::table)
        .values(&comment)
        .execute(&mut conn)?;
    Ok((StatusCode::CREATED, Json(load_comment(&mut conn, comment.id)?)))
}

pub async fn update_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> AppResult<Json<CommentResponse>> {
    let body = validate_comment_body(&payload.body)?;
    let mut conn = state.db()?;
    load_own_comment(&mut conn, id, &user)?;
    diesel::update(workshop_task_comments::table.find(id))
        .set((
            workshop_task_comments::body.eq(body),
            workshop_task_comments::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;
    Ok(Json(load_comment(&mut conn, id)?))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    load_own_comment(&mut conn, id, &user)?;
    diesel::delete(workshop_task_comments::table.find(id)).execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}
