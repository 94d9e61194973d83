use std::collections::BTreeMap;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{verify_cron_secret, AuthenticatedUser},
    error::{AppError, AppResult},
    lifecycle::{advance, ensure_applied, Lifecycle, ReportStatus},
    mailer::{queue_email, OutboundEmail},
    models::{ErrorLog, ErrorReport, NewErrorLog, NewErrorReport},
    schema::{error_logs, error_reports},
    state::AppState,
};

use super::{non_blank, to_iso, to_iso_opt};

const SEVERITIES: &[&str] = &["info", "warning", "error", "critical"];
const LOG_PAGE_SIZE: i64 = 200;
const SUMMARY_TOP_MESSAGES: usize = 10;

#[derive(Deserialize)]
pub struct CreateReportRequest {
    pub title: String,
    pub description: String,
    pub error_code: Option<String>,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
    pub additional_context: Option<Value>,
}

#[derive(Serialize)]
pub struct ReportResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub error_code: Option<String>,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
    pub additional_context: Value,
    pub status: String,
    pub admin_notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ErrorReport> for ReportResponse {
    fn from(report: ErrorReport) -> Self {
        Self {
            id: report.id,
            title: report.title,
            description: report.description,
            error_code: report.error_code,
            page_url: report.page_url,
            user_agent: report.user_agent,
            additional_context: report.additional_context,
            status: report.status,
            admin_notes: report.admin_notes,
            created_by: report.created_by,
            resolved_at: to_iso_opt(report.resolved_at),
            created_at: to_iso(report.created_at),
            updated_at: to_iso(report.updated_at),
        }
    }
}

pub async fn create_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateReportRequest>,
) -> AppResult<(StatusCode, Json<ReportResponse>)> {
    let title = non_blank(Some(payload.title))
        .ok_or_else(|| AppError::bad_request("title is required"))?;
    if title.chars().count() > 255 {
        return Err(AppError::bad_request("title must be at most 255 characters"));
    }
    let description = non_blank(Some(payload.description))
        .ok_or_else(|| AppError::bad_request("description is required"))?;
    let additional_context = match payload.additional_context {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::Object(map)) => Value::Object(map),
        Some(_) => {
            return Err(AppError::bad_request(
                "additional_context must be a JSON object",
            ))
        }
    };

    let report = NewErrorReport {
        id: Uuid::new_v4(),
        title,
        description,
        error_code: non_blank(payload.error_code),
        page_url: non_blank(payload.page_url),
        user_agent: non_blank(payload.user_agent),
        additional_context,
        status: ReportStatus::New.as_str().to_string(),
        created_by: Some(user.user_id),
    };

    let mut conn = state.db()?;
    diesel::insert_into(error_reports::table)
        .values(&report)
        .execute(&mut conn)?;

    let notified = queue_email(
        &mut conn,
        OutboundEmail {
            to: state.config.email.admin_emails.clone(),
            subject: format!("New error report: {}", report.title),
            text: format!(
                "{} ({}) reported a problem.\n\n{}\n\nPage: {}\nError code: {}",
                user.full_name,
                user.email,
                report.description,
                report.page_url.as_deref().unwrap_or("-"),
                report.error_code.as_deref().unwrap_or("-"),
            ),
        },
    );

    info!(report_id = %report.id, notified, "error report created");
    let saved: ErrorReport = error_reports::table.find(report.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(saved.into())))
}

#[derive(Deserialize)]
pub struct ReportListQuery {
    pub status: Option<String>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ReportListQuery>,
) -> AppResult<Json<Vec<ReportResponse>>> {
    user.require_manager()?;
    let mut conn = state.db()?;
    let mut db_query = error_reports::table
        .order(error_reports::created_at.desc())
        .into_boxed();
    if let Some(status) = query.status.as_deref() {
        let status = ReportStatus::parse(status)?;
        db_query = db_query.filter(error_reports::status.eq(status.as_str()));
    }
    let rows: Vec<ErrorReport> = db_query.load(&mut conn)?;
    Ok(Json(rows.into_iter().map(ReportResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct UpdateReportRequest {
    pub status: Option<String>,
    pub admin_notes: Option<String>,
}

pub async fn update_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReportRequest>,
) -> AppResult<Json<ReportResponse>> {
    user.require_manager()?;
    let mut conn = state.db()?;
    let report: ErrorReport = error_reports::table.find(id).first(&mut conn)?;

    let current = ReportStatus::parse(&report.status)?;
    let next = match payload.status.as_deref() {
        Some(raw) => {
            let target = ReportStatus::parse(raw.trim())?;
            if target == current {
                current
            } else {
                advance(&report.status, target)?
            }
        }
        None => current,
    };
    let admin_notes = match payload.admin_notes {
        Some(notes) => non_blank(Some(notes)),
        None => report.admin_notes,
    };

    let now = Utc::now().naive_utc();
    let resolved_at = if next == ReportStatus::Resolved {
        report.resolved_at.or(Some(now))
    } else {
        None
    };
    let affected = diesel::update(
        error_reports::table
            .find(id)
            .filter(error_reports::status.eq(&report.status)),
    )
    .set((
        error_reports::status.eq(next.as_str()),
        error_reports::admin_notes.eq(admin_notes),
        error_reports::resolved_at.eq(resolved_at),
        error_reports::updated_at.eq(now),
    ))
    .execute(&mut conn)?;
    ensure_applied::<ReportStatus>(affected)?;

    info!(report_id = %id, status = next.as_str(), "error report updated");
    let saved: ErrorReport = error_reports::table.find(id).first(&mut conn)?;
    Ok(Json(saved.into()))
}

#[derive(Deserialize)]
pub struct LogErrorRequest {
    pub error_message: String,
    pub error_stack: Option<String>,
    pub error_type: Option<String>,
    pub component_name: Option<String>,
    pub page_url: Option<String>,
    pub severity: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorLogResponse {
    pub id: Uuid,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub error_type: Option<String>,
    pub component_name: Option<String>,
    pub page_url: Option<String>,
    pub severity: String,
    pub user_id: Option<Uuid>,
    pub created_at: String,
}

impl From<ErrorLog> for ErrorLogResponse {
    fn from(row: ErrorLog) -> Self {
        Self {
            id: row.id,
            error_message: row.error_message,
            error_stack: row.error_stack,
            error_type: row.error_type,
            component_name: row.component_name,
            page_url: row.page_url,
            severity: row.severity,
            user_id: row.user_id,
            created_at: to_iso(row.created_at),
        }
    }
}

fn truncate(value: String, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value
    } else {
        value.chars().take(max_chars).collect()
    }
}

pub async fn log_error(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<LogErrorRequest>,
) -> AppResult<(StatusCode, Json<ErrorLogResponse>)> {
    let error_message = non_blank(Some(payload.error_message))
        .ok_or_else(|| AppError::bad_request("error_message is required"))?;
    let severity = payload
        .severity
        .as_deref()
        .map(str::trim)
        .unwrap_or("error")
        .to_ascii_lowercase();
    if !SEVERITIES.contains(&severity.as_str()) {
        return Err(AppError::bad_request(
            "severity must be info, warning, error or critical",
        ));
    }

    let row = NewErrorLog {
        id: Uuid::new_v4(),
        error_message,
        error_stack: non_blank(payload.error_stack),
        error_type: non_blank(payload.error_type).map(|v| truncate(v, 100)),
        component_name: non_blank(payload.component_name).map(|v| truncate(v, 255)),
        page_url: non_blank(payload.page_url),
        severity,
        user_id: Some(user.user_id),
    };

    let mut conn = state.db()?;
    diesel::insert_into(error_logs::table)
        .values(&row)
        .execute(&mut conn)?;
    let saved: ErrorLog = error_logs::table.find(row.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(saved.into())))
}

#[derive(Deserialize)]
pub struct LogListQuery {
    pub since: Option<String>,
}

/// Accepts an RFC 3339 timestamp or a plain date (midnight UTC).
fn parse_since(raw: &str) -> AppResult<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc).naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| AppError::bad_request("since must be an RFC 3339 timestamp or YYYY-MM-DD"))
}

pub async fn list_log(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<LogListQuery>,
) -> AppResult<Json<Vec<ErrorLogResponse>>> {
    user.require_manager()?;
    let since = query.since.as_deref().map(parse_since).transpose()?;

    let mut conn = state.db()?;
    let mut db_query = error_logs::table
        .order(error_logs::created_at.desc())
        .limit(LOG_PAGE_SIZE)
        .into_boxed();
    if let Some(since) = since {
        db_query = db_query.filter(error_logs::created_at.ge(since));
    }
    let rows: Vec<ErrorLog> = db_query.load(&mut conn)?;
    Ok(Json(rows.into_iter().map(ErrorLogResponse::from).collect()))
}

/// Plain-text digest of recent error log entries, or `None` when there are none.
pub fn build_daily_summary(entries: &[ErrorLog], since: NaiveDateTime) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let mut by_severity: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_message: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in entries {
        *by_severity.entry(entry.severity.as_str()).or_default() += 1;
        *by_message.entry(entry.error_message.as_str()).or_default() += 1;
    }
    let mut top: Vec<(&str, usize)> = by_message.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let mut text = format!(
        "{} client errors logged since {}.\n\nBy severity:\n",
        entries.len(),
        to_iso(since)
    );
    for (severity, count) in &by_severity {
        text.push_str(&format!("  {severity}: {count}\n"));
    }
    text.push_str("\nMost frequent:\n");
    for (message, count) in top.into_iter().take(SUMMARY_TOP_MESSAGES) {
        let message: String = message.chars().take(200).collect();
        text.push_str(&format!("  {count} x {message}\n"));
    }
    Some(text)
}

#[derive(Serialize)]
pub struct DailySummaryResponse {
    pub entries: usize,
    pub queued: bool,
}

pub async fn daily_summary(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> AppResult<Json<DailySummaryResponse>> {
    verify_cron_secret(
        &state,
        bearer.as_ref().map(|TypedHeader(Authorization(b))| b.token()),
    )?;

    let since = Utc::now().naive_utc() - ChronoDuration::hours(24);
    let mut conn = state.db()?;
    let entries: Vec<ErrorLog> = error_logs::table
        .filter(error_logs::created_at.ge(since))
        .order(error_logs::created_at.desc())
        .load(&mut conn)?;

    let queued = match build_daily_summary(&entries, since) {
        Some(text) => queue_email(
            &mut conn,
            OutboundEmail {
                to: state.config.email.admin_emails.clone(),
                subject: format!("Daily error summary: {} entries", entries.len()),
                text,
            },
        ),
        None => false,
    };

    info!(entries = entries.len(), queued, "daily error summary processed");
    Ok(Json(DailySummaryResponse {
        entries: entries.len(),
        queued,
    }))
}
