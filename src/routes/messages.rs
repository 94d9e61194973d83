use std::collections::HashMap;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{AuthenticatedUser, ROLE_EMPLOYEE},
    error::{AppError, AppResult},
    lifecycle::{advance, ensure_applied, Lifecycle, RecipientStatus},
    mailer::{queue_email, OutboundEmail},
    models::{Message, MessageRecipient, NewMessage, NewMessageRecipient},
    rams::validate_signature,
    schema::{message_recipients, messages, users},
    state::AppState,
};

use super::{to_iso, to_iso_opt};

pub const TYPE_TOOLBOX_TALK: &str = "toolbox_talk";
pub const TYPE_REMINDER: &str = "reminder";
const PRIORITIES: &[&str] = &["low", "normal", "high"];

#[derive(Deserialize)]
pub struct CreateMessageRequest {
    pub message_type: String,
    pub subject: String,
    pub body: String,
    pub priority: Option<String>,
    #[serde(default)]
    pub recipient_ids: Vec<Uuid>,
    #[serde(default)]
    pub all_employees: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub message_type: String,
    pub subject: String,
    pub body: String,
    pub priority: String,
    pub created_by: Uuid,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            message_type: message.message_type,
            subject: message.subject,
            body: message.body,
            priority: message.priority,
            created_by: message.created_by,
            created_at: to_iso(message.created_at),
        }
    }
}

#[derive(Serialize, Default)]
pub struct RecipientCounts {
    pub total: usize,
    pub pending: usize,
    pub read: usize,
    pub signed: usize,
    pub dismissed: usize,
}

impl RecipientCounts {
    fn add(&mut self, status: RecipientStatus) {
        self.total += 1;
        match status {
            RecipientStatus::Pending => self.pending += 1,
            RecipientStatus::Read => self.read += 1,
            RecipientStatus::Signed => self.signed += 1,
            RecipientStatus::Dismissed => self.dismissed += 1,
        }
    }
}

#[derive(Serialize)]
pub struct SentMessageResponse {
    #[serde(flatten)]
    pub message: MessageResponse,
    pub counts: RecipientCounts,
}

#[derive(Serialize)]
pub struct InboxEntry {
    #[serde(flatten)]
    pub message: MessageResponse,
    pub status: String,
    pub read_at: Option<String>,
    pub signed_at: Option<String>,
    pub dismissed_at: Option<String>,
}

fn to_inbox_entry(message: Message, recipient: MessageRecipient) -> InboxEntry {
    InboxEntry {
        message: message.into(),
        status: recipient.status,
        read_at: to_iso_opt(recipient.read_at),
        signed_at: to_iso_opt(recipient.signed_at),
        dismissed_at: to_iso_opt(recipient.dismissed_at),
    }
}

fn validate_request(payload: &CreateMessageRequest) -> AppResult<(String, String, String)> {
    if !matches!(payload.message_type.as_str(), TYPE_TOOLBOX_TALK | TYPE_REMINDER) {
        return Err(AppError::bad_request(
            "message_type must be toolbox_talk or reminder",
        ));
    }
    let subject = payload.subject.trim();
    if subject.is_empty() || subject.chars().count() > 255 {
        return Err(AppError::bad_request("subject must be 1 to 255 characters"));
    }
    let body = payload.body.trim();
    if body.is_empty() {
        return Err(AppError::bad_request("body is required"));
    }
    let priority = payload
        .priority
        .as_deref()
        .map(str::trim)
        .unwrap_or("normal")
        .to_ascii_lowercase();
    if !PRIORITIES.contains(&priority.as_str()) {
        return Err(AppError::bad_request("priority must be low, normal or high"));
    }
    Ok((subject.to_string(), body.to_string(), priority))
}

pub async fn create_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateMessageRequest>,
) -> AppResult<(StatusCode, Json<SentMessageResponse>)> {
    user.require_manager()?;
    let (subject, body, priority) = validate_request(&payload)?;

    let mut conn = state.db()?;
    let recipients: Vec<(Uuid, String)> = if payload.all_employees {
        users::table
            .filter(users::role.eq(ROLE_EMPLOYEE))
            .select((users::id, users::email))
            .load(&mut conn)?
    } else {
        let found: Vec<(Uuid, String)> = users::table
            .filter(users::id.eq_any(payload.recipient_ids.clone()))
            .select((users::id, users::email))
            .load(&mut conn)?;
        if let Some(unknown) = payload
            .recipient_ids
            .iter()
            .find(|id| !found.iter().any(|(found_id, _)| found_id == *id))
        {
            return Err(AppError::bad_request(format!("unknown recipient id {unknown}")));
        }
        found
    };
    if recipients.is_empty() {
        return Err(AppError::bad_request("message has no recipients"));
    }

    let message_id = Uuid::new_v4();
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(messages::table)
            .values(&NewMessage {
                id: message_id,
                message_type: payload.message_type.clone(),
                subject: subject.clone(),
                body: body.clone(),
                priority,
                created_by: user.user_id,
            })
            .execute(conn)?;
        let rows: Vec<NewMessageRecipient> = recipients
            .iter()
            .map(|(user_id, _)| NewMessageRecipient {
                id: Uuid::new_v4(),
                message_id,
                user_id: *user_id,
                status: RecipientStatus::Pending.as_str().to_string(),
            })
            .collect();
        diesel::insert_into(message_recipients::table)
            .values(&rows)
            .execute(conn)?;
        Ok(())
    })?;

    let label = if payload.message_type == TYPE_TOOLBOX_TALK {
        "Toolbox talk"
    } else {
        "Reminder"
    };
    let mut queued = 0;
    for (_, email) in &recipients {
        let sent = queue_email(
            &mut conn,
            OutboundEmail {
                to: vec![email.clone()],
                subject: format!("{label}: {subject}"),
                text: format!(
                    "{body}\n\nOpen your inbox to respond: {}/messages",
                    state.config.app_base_url.trim_end_matches('/')
                ),
            },
        );
        if sent {
            queued += 1;
        }
    }

    info!(
        message_id = %message_id,
        recipients = recipients.len(),
        emails_queued = queued,
        "message created"
    );
    let message: Message = messages::table.find(message_id).first(&mut conn)?;
    let mut counts = RecipientCounts::default();
    for _ in &recipients {
        counts.add(RecipientStatus::Pending);
    }
    Ok((
        StatusCode::CREATED,
        Json(SentMessageResponse {
            message: message.into(),
            counts,
        }),
    ))
}

pub async fn list_sent(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<SentMessageResponse>>> {
    user.require_manager()?;
    let mut conn = state.db()?;
    let sent: Vec<Message> = messages::table
        .filter(messages::deleted_at.is_null())
        .order(messages::created_at.desc())
        .load(&mut conn)?;
    let ids: Vec<Uuid> = sent.iter().map(|message| message.id).collect();
    let statuses: Vec<(Uuid, String)> = message_recipients::table
        .filter(message_recipients::message_id.eq_any(ids))
        .select((message_recipients::message_id, message_recipients::status))
        .load(&mut conn)?;

    let mut counts: HashMap<Uuid, RecipientCounts> = HashMap::new();
    for (message_id, status) in statuses {
        match RecipientStatus::parse(&status) {
            Ok(status) => counts.entry(message_id).or_default().add(status),
            Err(err) => warn!(%message_id, error = %err, "skipping recipient status"),
        }
    }

    Ok(Json(
        sent.into_iter()
            .map(|message| SentMessageResponse {
                counts: counts.remove(&message.id).unwrap_or_default(),
                message: message.into(),
            })
            .collect(),
    ))
}

pub async fn inbox(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<InboxEntry>>> {
    let mut conn = state.db()?;
    let rows: Vec<(MessageRecipient, Message)> = message_recipients::table
        .inner_join(messages::table)
        .filter(message_recipients::user_id.eq(user.user_id))
        .filter(messages::deleted_at.is_null())
        .order(messages::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|(recipient, message)| to_inbox_entry(message, recipient))
            .collect(),
    ))
}

fn load_delivery(
    conn: &mut PgConnection,
    message_id: Uuid,
    user: &AuthenticatedUser,
) -> AppResult<(Message, MessageRecipient)> {
    message_recipients::table
        .inner_join(messages::table)
        .filter(message_recipients::message_id.eq(message_id))
        .filter(message_recipients::user_id.eq(user.user_id))
        .filter(messages::deleted_at.is_null())
        .first::<(MessageRecipient, Message)>(conn)
        .optional()?
        .map(|(recipient, message)| (message, recipient))
        .ok_or_else(AppError::not_found)
}

fn reload_entry(conn: &mut PgConnection, message: Message, recipient_id: Uuid) -> AppResult<InboxEntry> {
    let recipient: MessageRecipient = message_recipients::table.find(recipient_id).first(conn)?;
    Ok(to_inbox_entry(message, recipient))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<InboxEntry>> {
    let mut conn = state.db()?;
    let (message, recipient) = load_delivery(&mut conn, id, &user)?;
    if RecipientStatus::parse(&recipient.status)? == RecipientStatus::Pending {
        diesel::update(
            message_recipients::table
                .find(recipient.id)
                .filter(message_recipients::status.eq(RecipientStatus::Pending.as_str())),
        )
        .set((
            message_recipients::status.eq(RecipientStatus::Read.as_str()),
            message_recipients::read_at.eq(Some(Utc::now().naive_utc())),
        ))
        .execute(&mut conn)?;
    }
    Ok(Json(reload_entry(&mut conn, message, recipient.id)?))
}

#[derive(Deserialize)]
pub struct SignMessageRequest {
    pub signature_data: String,
}

pub async fn sign_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SignMessageRequest>,
) -> AppResult<Json<InboxEntry>> {
    let mut conn = state.db()?;
    let (message, recipient) = load_delivery(&mut conn, id, &user)?;
    if message.message_type != TYPE_TOOLBOX_TALK {
        return Err(AppError::bad_request("only toolbox talks can be signed"));
    }
    validate_signature(&payload.signature_data)
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    advance(&recipient.status, RecipientStatus::Signed)?;

    let now = Utc::now().naive_utc();
    let affected = diesel::update(
        message_recipients::table
            .find(recipient.id)
            .filter(message_recipients::status.eq_any(RecipientStatus::sources(RecipientStatus::Signed))),
    )
    .set((
        message_recipients::status.eq(RecipientStatus::Signed.as_str()),
        message_recipients::signed_at.eq(Some(now)),
        message_recipients::read_at.eq(Some(recipient.read_at.unwrap_or(now))),
        message_recipients::signature_data.eq(Some(payload.signature_data)),
    ))
    .execute(&mut conn)?;
    ensure_applied::<RecipientStatus>(affected)?;
    info!(message_id = %id, user_id = %user.user_id, "toolbox talk signed");
    Ok(Json(reload_entry(&mut conn, message, recipient.id)?))
}

pub async fn dismiss_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<InboxEntry>> {
    let mut conn = state.db()?;
    let (message, recipient) = load_delivery(&mut conn, id, &user)?;
    if message.message_type != TYPE_REMINDER {
        return Err(AppError::bad_request("only reminders can be dismissed"));
    }
    advance(&recipient.status, RecipientStatus::Dismissed)?;

    let now = Utc::now().naive_utc();
    let affected = diesel::update(
        message_recipients::table
            .find(recipient.id)
            .filter(message_recipients::status.eq_any(RecipientStatus::sources(RecipientStatus::Dismissed))),
    )
    .set((
        message_recipients::status.eq(RecipientStatus::Dismissed.as_str()),
        message_recipients::dismissed_at.eq(Some(now)),
        message_recipients::read_at.eq(Some(recipient.read_at.unwrap_or(now))),
    ))
    .execute(&mut conn)?;
    ensure_applied::<RecipientStatus>(affected)?;
    Ok(Json(reload_entry(&mut conn, message, recipient.id)?))
}

pub async fn delete_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_manager()?;
    let mut conn = state.db()?;
    let updated = diesel::update(
        messages::table
            .find(id)
            .filter(messages::deleted_at.is_null()),
    )
    .set(messages::deleted_at.eq(Some(Utc::now().naive_utc())))
    .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found());
    }
    info!(message_id = %id, "message deleted");
    Ok(StatusCode::NO_CONTENT)
}
