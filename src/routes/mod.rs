use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod errors;
pub mod health;
pub mod inspections;
pub mod maintenance;
pub mod messages;
pub mod rams;
pub mod timesheets;
pub mod users;
pub mod vehicles;
pub mod workshop;

pub fn create_router(state: AppState) -> Router<()> {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let users_routes = Router::new().route("/", get(users::list_users).post(users::create_user));

    let vehicles_routes = Router::new()
        .route("/", get(vehicles::list_vehicles).post(vehicles::create_vehicle))
        .route(
            "/:id",
            get(vehicles::get_vehicle).patch(vehicles::update_vehicle),
        );

    let maintenance_routes = Router::new()
        .route("/", get(maintenance::list_maintenance))
        .route("/alerts", get(maintenance::list_alerts))
        .route("/categories", get(maintenance::list_categories))
        .route("/categories/:id", patch(maintenance::update_category))
        .route("/sync-dvla", post(maintenance::sync_dvla))
        .route(
            "/:vehicle_id",
            get(maintenance::get_vehicle_maintenance).patch(maintenance::update_vehicle_maintenance),
        )
        .route("/:vehicle_id/sync-log", get(maintenance::get_sync_log));

    let rams_routes = Router::new()
        .route("/", get(rams::list_documents).post(rams::upload_document))
        .route(
            "/:id",
            get(rams::get_document)
                .patch(rams::update_document)
                .delete(rams::delete_document),
        )
        .route("/:id/assign", post(rams::assign_employees))
        .route("/:id/assign/:employee_id", delete(rams::unassign_employee))
        .route("/:id/read", post(rams::mark_read))
        .route("/:id/sign", post(rams::sign_document))
        .route("/:id/visitor-signatures", post(rams::add_visitor_signature))
        .route("/:id/signatures", get(rams::list_signatures));

    let timesheets_routes = Router::new()
        .route(
            "/",
            get(timesheets::list_timesheets).post(timesheets::create_timesheet),
        )
        .route(
            "/:id",
            get(timesheets::get_timesheet).delete(timesheets::delete_timesheet),
        )
        .route("/:id/entries", put(timesheets::replace_entries))
        .route("/:id/submit", post(timesheets::submit_timesheet))
        .route("/:id/approve", post(timesheets::approve_timesheet))
        .route("/:id/reject", post(timesheets::reject_timesheet));

    let inspections_routes = Router::new()
        .route(
            "/",
            get(inspections::list_inspections).post(inspections::create_inspection),
        )
        .route(
            "/:id",
            get(inspections::get_inspection).delete(inspections::delete_inspection),
        )
        .route("/:id/items", put(inspections::replace_items))
        .route("/:id/submit", post(inspections::submit_inspection))
        .route("/:id/review", post(inspections::review_inspection));

    let workshop_routes = Router::new()
        .route(
            "/categories",
            get(workshop::list_categories).post(workshop::create_category),
        )
        .route("/tasks", get(workshop::list_tasks).post(workshop::create_task))
        .route("/tasks/:id/status", patch(workshop::update_task_status))
        .route(
            "/tasks/:id/comments",
            get(workshop::list_comments).post(workshop::add_comment),
        )
        .route(
            "/comments/:id",
            patch(workshop::update_comment).delete(workshop::delete_comment),
        );

    let messages_routes = Router::new()
        .route("/", get(messages::list_sent).post(messages::create_message))
        .route("/inbox", get(messages::inbox))
        .route("/:id", delete(messages::delete_message))
        .route("/:id/read", post(messages::mark_read))
        .route("/:id/sign", post(messages::sign_message))
        .route("/:id/dismiss", post(messages::dismiss_message));

    let errors_routes = Router::new()
        .route("/report", post(errors::create_report))
        .route("/reports", get(errors::list_reports))
        .route("/reports/:id", patch(errors::update_report))
        .route("/log", get(errors::list_log).post(errors::log_error));

    // Scheduled triggers authenticate with the cron secret instead of a user token.
    let cron_routes = Router::new()
        .route(
            "/api/maintenance/sync-dvla/cron",
            post(maintenance::sync_dvla_cron),
        )
        .route("/api/errors/daily-summary", post(errors::daily_summary));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/users", users_routes)
        .nest("/api/vehicles", vehicles_routes)
        .nest("/api/maintenance", maintenance_routes)
        .nest("/api/rams", rams_routes)
        .nest("/api/timesheets", timesheets_routes)
        .nest("/api/inspections", inspections_routes)
        .nest("/api/workshop", workshop_routes)
        .nest("/api/messages", messages_routes)
        .nest("/api/errors", errors_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    let body_limit = state.config.rams_max_upload_bytes + 1024 * 1024;

    Router::new()
        .merge(cron_routes)
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

pub(crate) fn to_iso_opt(dt: Option<NaiveDateTime>) -> Option<String> {
    dt.map(to_iso)
}

/// Trims a string and treats blank input as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
