use std::{collections::HashMap, time::Duration};

use axum::{
    extract::{Json, Multipart, Path, State},
    http::StatusCode,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    lifecycle::{advance, ensure_applied, AssignmentStatus, Lifecycle},
    mailer::{queue_email, OutboundEmail},
    models::{
        NewRamsAssignment, NewRamsDocument, NewRamsVisitorSignature, RamsAssignment, RamsDocument,
        RamsVisitorSignature,
    },
    rams::{
        inline_content_disposition, object_key, plan_assignments, sanitize_file_name,
        validate_signature, RamsFileType,
    },
    schema::{rams_assignments, rams_documents, rams_visitor_signatures, users},
    state::AppState,
    storage::StoredFile,
    utils::json::{nullable_field, NullableValue},
};

use super::{non_blank, to_iso, to_iso_opt};

const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<RamsDocument> for DocumentResponse {
    fn from(document: RamsDocument) -> Self {
        Self {
            id: document.id,
            title: document.title,
            description: document.description,
            file_name: document.file_name,
            file_type: document.file_type,
            file_size: document.file_size,
            uploaded_by: document.uploaded_by,
            is_active: document.is_active,
            created_at: to_iso(document.created_at),
            updated_at: to_iso(document.updated_at),
        }
    }
}

#[derive(Serialize, Default)]
pub struct AssignmentCounts {
    pub total_assigned: usize,
    pub pending: usize,
    pub read: usize,
    pub signed: usize,
}

#[derive(Serialize)]
pub struct AssignmentView {
    pub status: String,
    pub assigned_at: String,
    pub read_at: Option<String>,
    pub signed_at: Option<String>,
    pub comments: Option<String>,
}

impl From<&RamsAssignment> for AssignmentView {
    fn from(assignment: &RamsAssignment) -> Self {
        Self {
            status: assignment.status.clone(),
            assigned_at: to_iso(assignment.assigned_at),
            read_at: to_iso_opt(assignment.read_at),
            signed_at: to_iso_opt(assignment.signed_at),
            comments: assignment.comments.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct DocumentListItem {
    #[serde(flatten)]
    pub document: DocumentResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<AssignmentCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_assignment: Option<AssignmentView>,
}

#[derive(Serialize)]
pub struct DocumentDetailResponse {
    pub document: DocumentResponse,
    pub download_url: String,
    pub my_assignment: Option<AssignmentView>,
}

fn load_assignment(
    conn: &mut PgConnection,
    document_id: Uuid,
    employee_id: Uuid,
) -> QueryResult<Option<RamsAssignment>> {
    rams_assignments::table
        .filter(rams_assignments::rams_document_id.eq(document_id))
        .filter(rams_assignments::employee_id.eq(employee_id))
        .first(conn)
        .optional()
}

/// Employees only see active documents they are assigned to.
fn require_assignment(
    conn: &mut PgConnection,
    document: &RamsDocument,
    user: &AuthenticatedUser,
) -> AppResult<RamsAssignment> {
    if !document.is_active {
        return Err(AppError::not_found());
    }
    load_assignment(conn, document.id, user.user_id)?
        .ok_or_else(|| AppError::forbidden("you are not assigned to this document"))
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentListItem>>> {
    let mut conn = state.db()?;

    if user.is_manager() {
        let documents: Vec<RamsDocument> = rams_documents::table
            .filter(rams_documents::is_active.eq(true))
            .order(rams_documents::created_at.desc())
            .load(&mut conn)?;
        let ids: Vec<Uuid> = documents.iter().map(|doc| doc.id).collect();
        let statuses: Vec<(Uuid, String)> = rams_assignments::table
            .filter(rams_assignments::rams_document_id.eq_any(ids))
            .select((rams_assignments::rams_document_id, rams_assignments::status))
            .load(&mut conn)?;

        let mut counts: HashMap<Uuid, AssignmentCounts> = HashMap::new();
        for (document_id, status) in statuses {
            let entry = counts.entry(document_id).or_default();
            entry.total_assigned += 1;
            match AssignmentStatus::parse(&status) {
                Ok(AssignmentStatus::Pending) => entry.pending += 1,
                Ok(AssignmentStatus::Read) => entry.read += 1,
                Ok(AssignmentStatus::Signed) => entry.signed += 1,
                Err(err) => warn!(%document_id, error = %err, "skipping assignment status"),
            }
        }

        let items = documents
            .into_iter()
            .map(|document| DocumentListItem {
                counts: Some(counts.remove(&document.id).unwrap_or_default()),
                document: document.into(),
                my_assignment: None,
            })
            .collect();
        return Ok(Json(items));
    }

    let rows: Vec<(RamsAssignment, RamsDocument)> = rams_assignments::table
        .inner_join(rams_documents::table)
        .filter(rams_assignments::employee_id.eq(user.user_id))
        .filter(rams_documents::is_active.eq(true))
        .order(rams_assignments::assigned_at.desc())
        .load(&mut conn)?;
    let items = rows
        .into_iter()
        .map(|(assignment, document)| DocumentListItem {
            document: document.into(),
            counts: None,
            my_assignment: Some(AssignmentView::from(&assignment)),
        })
        .collect();
    Ok(Json(items))
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    user.require_manager()?;

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                original_name = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("title") => {
                title = Some(field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid title: {err}"))
                })?);
            }
            Some("description") => {
                description = Some(field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid description: {err}"))
                })?);
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if file_bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    if file_bytes.len() > state.config.rams_max_upload_bytes {
        return Err(AppError::bad_request(format!(
            "file exceeds the {} byte upload limit",
            state.config.rams_max_upload_bytes
        )));
    }
    let title = non_blank(title).ok_or_else(|| AppError::bad_request("title is required"))?;
    let original_name =
        original_name.ok_or_else(|| AppError::bad_request("filename is required"))?;
    let declared_type = content_type.or_else(|| {
        mime_guess::from_path(&original_name)
            .first_raw()
            .map(str::to_string)
    });
    let file_type = RamsFileType::detect(&original_name, declared_type.as_deref())
        .ok_or_else(|| AppError::bad_request("only PDF and DOCX files are accepted"))?;

    let document_id = Uuid::new_v4();
    let file_name = sanitize_file_name(&original_name);
    let s3_key = object_key(document_id, &file_name);
    let file_size = file_bytes.len() as i64;

    state
        .storage
        .put_object(StoredFile {
            key: s3_key.clone(),
            bytes: file_bytes,
            content_type: file_type.mime_type(),
            content_disposition: inline_content_disposition(&file_name),
        })
        .await
        .map_err(|err| {
            error!(error = ?err, key = %s3_key, "failed to store RAMS document");
            AppError::internal(format!("failed to store document: {err}"))
        })?;

    let new_document = NewRamsDocument {
        id: document_id,
        title,
        description: non_blank(description),
        file_name,
        file_type: file_type.as_str().to_string(),
        file_size,
        s3_key: s3_key.clone(),
        uploaded_by: user.user_id,
    };

    let mut conn = state.db()?;
    let inserted = diesel::insert_into(rams_documents::table)
        .values(&new_document)
        .execute(&mut conn);
    if let Err(err) = inserted {
        if let Err(cleanup) = state.storage.delete_object(&s3_key).await {
            warn!(error = %cleanup, key = %s3_key, "failed to remove orphaned upload");
        }
        return Err(err.into());
    }

    let document: RamsDocument = rams_documents::table.find(document_id).first(&mut conn)?;
    info!(
        document_id = %document.id,
        file_type = %document.file_type,
        file_size = document.file_size,
        "RAMS document uploaded"
    );
    Ok((StatusCode::CREATED, Json(document.into())))
}

pub async fn get_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DocumentDetailResponse>> {
    let (document, my_assignment) = {
        let mut conn = state.db()?;
        let document: RamsDocument = rams_documents::table.find(id).first(&mut conn)?;
        let my_assignment = if user.is_manager() {
            load_assignment(&mut conn, id, user.user_id)?
        } else {
            Some(require_assignment(&mut conn, &document, &user)?)
        };
        (document, my_assignment)
    };

    let download_url = state
        .storage
        .presign_get_object(
            &document.s3_key,
            Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS),
        )
        .await
        .map_err(|err| AppError::internal(format!("failed to presign download: {err}")))?;

    Ok(Json(DocumentDetailResponse {
        my_assignment: my_assignment.as_ref().map(AssignmentView::from),
        document: document.into(),
        download_url,
    }))
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = rams_documents)]
struct DocumentChanges {
    title: Option<String>,
    description: Option<Option<String>>,
    is_active: Option<bool>,
    updated_at: Option<chrono::NaiveDateTime>,
}

pub async fn update_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> AppResult<Json<DocumentResponse>> {
    user.require_manager()?;
    let body = payload
        .as_object()
        .ok_or_else(|| AppError::bad_request("request body must be an object"))?;

    let mut changes = DocumentChanges::default();
    match nullable_field::<String>(body, "title").map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Value(title) if !title.trim().is_empty() => {
            changes.title = Some(title.trim().to_string())
        }
        _ => return Err(AppError::bad_request("title cannot be empty")),
    }
    changes.description = nullable_field::<String>(body, "description")
        .map_err(AppError::bad_request)?
        .into_update()
        .map(|inner| inner.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()));
    match nullable_field::<bool>(body, "is_active").map_err(AppError::bad_request)? {
        NullableValue::Omitted => {}
        NullableValue::Value(active) => changes.is_active = Some(active),
        NullableValue::Null => return Err(AppError::bad_request("is_active cannot be null")),
    }
    changes.updated_at = Some(Utc::now().naive_utc());

    let mut conn = state.db()?;
    let updated = diesel::update(rams_documents::table.find(id))
        .set(&changes)
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found());
    }
    let document: RamsDocument = rams_documents::table.find(id).first(&mut conn)?;
    Ok(Json(document.into()))
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_manager()?;
    let document: RamsDocument = {
        let mut conn = state.db()?;
        let document: RamsDocument = rams_documents::table.find(id).first(&mut conn)?;
        diesel::delete(rams_documents::table.find(id)).execute(&mut conn)?;
        document
    };

    if let Err(err) = state.storage.delete_object(&document.s3_key).await {
        warn!(document_id = %id, error = %err, "failed to delete stored RAMS file");
    }
    info!(document_id = %id, "RAMS document deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub employee_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct AssignResponse {
    pub assigned: Vec<Uuid>,
    pub unassigned: Vec<Uuid>,
    pub preserved: Vec<Uuid>,
}

pub async fn assign_employees(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> AppResult<Json<AssignResponse>> {
    user.require_manager()?;
    let mut conn = state.db()?;
    let document: RamsDocument = rams_documents::table.find(id).first(&mut conn)?;
    if !document.is_active {
        return Err(AppError::bad_request("cannot assign an inactive document"));
    }

    let plan = conn.transaction::<_, AppError, _>(|conn| {
        let known: Vec<Uuid> = users::table
            .filter(users::id.eq_any(payload.employee_ids.clone()))
            .select(users::id)
            .load(conn)?;
        if let Some(unknown) = payload.employee_ids.iter().find(|id| !known.contains(id)) {
            return Err(AppError::bad_request(format!("unknown employee id {unknown}")));
        }

        let current: Vec<(Uuid, String)> = rams_assignments::table
            .filter(rams_assignments::rams_document_id.eq(id))
            .select((rams_assignments::employee_id, rams_assignments::status))
            .for_update()
            .load(conn)?;
        let current = current
            .into_iter()
            .map(|(employee_id, status)| Ok((employee_id, AssignmentStatus::parse(&status)?)))
            .collect::<Result<Vec<_>, crate::lifecycle::TransitionError>>()?;

        let plan = plan_assignments(&current, &payload.employee_ids)
            .map_err(|err| AppError::bad_request(err.to_string()))?;

        if !plan.to_remove.is_empty() {
            diesel::delete(
                rams_assignments::table
                    .filter(rams_assignments::rams_document_id.eq(id))
                    .filter(rams_assignments::employee_id.eq_any(plan.to_remove.clone())),
            )
            .execute(conn)?;
        }
        let rows: Vec<NewRamsAssignment> = plan
            .to_add
            .iter()
            .map(|employee_id| NewRamsAssignment {
                id: Uuid::new_v4(),
                rams_document_id: id,
                employee_id: *employee_id,
                status: AssignmentStatus::Pending.as_str().to_string(),
                assigned_by: Some(user.user_id),
            })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(rams_assignments::table)
                .values(&rows)
                .execute(conn)?;
        }
        Ok(plan)
    })?;

    if !plan.to_add.is_empty() {
        let recipients: Vec<String> = users::table
            .filter(users::id.eq_any(plan.to_add.clone()))
            .select(users::email)
            .load(&mut conn)?;
        let link = format!("{}/rams/{}", state.config.app_base_url.trim_end_matches('/'), id);
        for email in recipients {
            queue_email(
                &mut conn,
                OutboundEmail {
                    to: vec![email],
                    subject: format!("RAMS to review: {}", document.title),
                    text: format!(
                        "You have been assigned the RAMS document \"{}\". Please read and sign it: {}",
                        document.title, link
                    ),
                },
            );
        }
    }

    info!(
        document_id = %id,
        assigned = plan.to_add.len(),
        unassigned = plan.to_remove.len(),
        preserved = plan.preserved.len(),
        "RAMS assignments updated"
    );
    Ok(Json(AssignResponse {
        assigned: plan.to_add,
        unassigned: plan.to_remove,
        preserved: plan.preserved,
    }))
}

pub async fn unassign_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, employee_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    user.require_manager()?;
    let mut conn = state.db()?;
    let assignment = load_assignment(&mut conn, id, employee_id)?.ok_or_else(AppError::not_found)?;
    let signed_error = || AppError::bad_request("cannot unassign an employee who has already signed");
    if AssignmentStatus::parse(&assignment.status)? == AssignmentStatus::Signed {
        return Err(signed_error());
    }
    let removed = diesel::delete(
        rams_assignments::table
            .find(assignment.id)
            .filter(rams_assignments::status.ne(AssignmentStatus::Signed.as_str())),
    )
    .execute(&mut conn)?;
    if removed == 0 {
        return Err(signed_error());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AssignmentView>> {
    let mut conn = state.db()?;
    let document: RamsDocument = rams_documents::table.find(id).first(&mut conn)?;
    let assignment = require_assignment(&mut conn, &document, &user)?;

    if AssignmentStatus::parse(&assignment.status)? != AssignmentStatus::Pending {
        return Ok(Json(AssignmentView::from(&assignment)));
    }
    // A concurrent signature wins; the reload below reports it.
    diesel::update(
        rams_assignments::table
            .find(assignment.id)
            .filter(rams_assignments::status.eq(AssignmentStatus::Pending.as_str())),
    )
    .set((
        rams_assignments::status.eq(AssignmentStatus::Read.as_str()),
        rams_assignments::read_at.eq(Some(Utc::now().naive_utc())),
    ))
    .execute(&mut conn)?;
    let updated: RamsAssignment = rams_assignments::table.find(assignment.id).first(&mut conn)?;
    Ok(Json(AssignmentView::from(&updated)))
}

#[derive(Deserialize)]
pub struct SignRequest {
    pub signature_data: String,
    pub comments: Option<String>,
}

pub async fn sign_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SignRequest>,
) -> AppResult<Json<AssignmentView>> {
    validate_signature(&payload.signature_data)
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    let mut conn = state.db()?;
    let document: RamsDocument = rams_documents::table.find(id).first(&mut conn)?;
    let assignment = require_assignment(&mut conn, &document, &user)?;
    if assignment.status == AssignmentStatus::Signed.as_str() {
        return Err(AppError::bad_request("document has already been signed"));
    }
    advance(&assignment.status, AssignmentStatus::Signed)?;

    let now = Utc::now().naive_utc();
    let affected = diesel::update(
        rams_assignments::table
            .find(assignment.id)
            .filter(rams_assignments::status.eq_any(AssignmentStatus::sources(AssignmentStatus::Signed))),
    )
    .set((
        rams_assignments::status.eq(AssignmentStatus::Signed.as_str()),
        rams_assignments::signed_at.eq(Some(now)),
        rams_assignments::read_at.eq(Some(assignment.read_at.unwrap_or(now))),
        rams_assignments::signature_data.eq(Some(payload.signature_data)),
        rams_assignments::comments.eq(non_blank(payload.comments)),
    ))
    .execute(&mut conn)?;
    ensure_applied::<AssignmentStatus>(affected)?;

    info!(document_id = %id, employee_id = %user.user_id, "RAMS document signed");
    let updated: RamsAssignment = rams_assignments::table.find(assignment.id).first(&mut conn)?;
    Ok(Json(AssignmentView::from(&updated)))
}

#[derive(Deserialize)]
pub struct VisitorSignatureRequest {
    pub visitor_name: String,
    pub visitor_company: Option<String>,
    pub visitor_role: Option<String>,
    pub signature_data: String,
}

#[derive(Serialize)]
pub struct VisitorSignatureResponse {
    pub id: Uuid,
    pub visitor_name: String,
    pub visitor_company: Option<String>,
    pub visitor_role: Option<String>,
    pub signature_data: String,
    pub recorded_by: Uuid,
    pub signed_at: String,
}

impl From<RamsVisitorSignature> for VisitorSignatureResponse {
    fn from(row: RamsVisitorSignature) -> Self {
        Self {
            id: row.id,
            visitor_name: row.visitor_name,
            visitor_company: row.visitor_company,
            visitor_role: row.visitor_role,
            signature_data: row.signature_data,
            recorded_by: row.recorded_by,
            signed_at: to_iso(row.signed_at),
        }
    }
}

pub async fn add_visitor_signature(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VisitorSignatureRequest>,
) -> AppResult<(StatusCode, Json<VisitorSignatureResponse>)> {
    let visitor_name = non_blank(Some(payload.visitor_name))
        .ok_or_else(|| AppError::bad_request("visitor_name is required"))?;
    validate_signature(&payload.signature_data)
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    let mut conn = state.db()?;
    let document: RamsDocument = rams_documents::table.find(id).first(&mut conn)?;
    if !user.is_manager() {
        require_assignment(&mut conn, &document, &user)?;
    }

    let row = NewRamsVisitorSignature {
        id: Uuid::new_v4(),
        rams_document_id: id,
        visitor_name,
        visitor_company: non_blank(payload.visitor_company),
        visitor_role: non_blank(payload.visitor_role),
        signature_data: payload.signature_data,
        recorded_by: user.user_id,
    };
    diesel::insert_into(rams_visitor_signatures::table)
        .values(&row)
        .execute(&mut conn)?;
    let saved: RamsVisitorSignature = rams_visitor_signatures::table.find(row.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(saved.into())))
}

#[derive(Serialize)]
pub struct EmployeeSignature {
    pub employee_id: Uuid,
    pub employee_name: String,
    pub employee_email: String,
    #[serde(flatten)]
    pub assignment: AssignmentView,
    pub signature_data: Option<String>,
}

#[derive(Serialize)]
pub struct SignaturesResponse {
    pub document: DocumentResponse,
    pub employees: Vec<EmployeeSignature>,
    pub visitors: Vec<VisitorSignatureResponse>,
}

pub async fn list_signatures(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SignaturesResponse>> {
    user.require_manager()?;
    let mut conn = state.db()?;
    let document: RamsDocument = rams_documents::table.find(id).first(&mut conn)?;

    let assignments: Vec<(RamsAssignment, (String, String))> = rams_assignments::table
        .inner_join(users::table)
        .filter(rams_assignments::rams_document_id.eq(id))
        .order(users::full_name.asc())
        .select((
            rams_assignments::all_columns,
            (users::full_name, users::email),
        ))
        .load(&mut conn)?;
    let visitors: Vec<RamsVisitorSignature> = rams_visitor_signatures::table
        .filter(rams_visitor_signatures::rams_document_id.eq(id))
        .order(rams_visitor_signatures::signed_at.asc())
        .load(&mut conn)?;

    Ok(Json(SignaturesResponse {
        document: document.into(),
        employees: assignments
            .into_iter()
            .map(|(assignment, (employee_name, employee_email))| EmployeeSignature {
                employee_id: assignment.employee_id,
                employee_name,
                employee_email,
                assignment: AssignmentView::from(&assignment),
                signature_data: assignment.signature_data,
            })
            .collect(),
        visitors: visitors.into_iter().map(VisitorSignatureResponse::from).collect(),
    }))
}
