mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, TestApp};
use serde_json::{json, Value};

fn week() -> Value {
    json!({
        "week_ending": "2025-03-02",
        "reg_number": "ab12cde",
        "entries": [
            { "day_of_week": 2, "time_started": "07:30", "time_finished": "16:00" },
            { "day_of_week": 1, "time_started": "08:00", "time_finished": "17:15", "working_in_yard": true },
            { "day_of_week": 6, "did_not_work": true, "remarks": "  weekend " }
        ]
    })
}

#[tokio::test]
async fn create_computes_totals_and_rejects_bad_weeks() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (owner_id, owner) = app.user_with_token("driver@example.com", "employee").await?;

    let response = app.post_json("/api/timesheets", &week(), Some(&owner)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let sheet = json_body(response).await?;
    assert_eq!(sheet["status"], "draft");
    assert_eq!(sheet["user_id"], json!(owner_id));
    assert_eq!(sheet["employee_name"], "driver");
    assert_eq!(sheet["reg_number"], "AB12CDE");
    assert_eq!(sheet["total_minutes"], 555 + 510);
    assert_eq!(sheet["entries"][0]["day_of_week"], 1);
    assert_eq!(sheet["entries"][0]["time_started"], "08:00:00");
    assert_eq!(sheet["entries"][0]["working_in_yard"], true);
    assert_eq!(sheet["entries"][2]["daily_total_minutes"], 0);
    assert_eq!(sheet["entries"][2]["remarks"], "weekend");

    let response = app.post_json("/api/timesheets", &week(), Some(&owner)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut monday = week();
    monday["week_ending"] = json!("2025-03-03");
    let response = app.post_json("/api/timesheets", &monday, Some(&owner)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/timesheets",
            &json!({
                "week_ending": "2025-03-09",
                "entries": [{ "day_of_week": 3, "time_started": "17:00", "time_finished": "08:00" }]
            }),
            Some(&owner),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn submit_review_and_resubmit() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, owner) = app.user_with_token("driver@example.com", "employee").await?;
    let (_, colleague) = app.user_with_token("colleague@example.com", "employee").await?;
    let (manager_id, manager) = app.user_with_token("manager@example.com", "manager").await?;

    let sheet = json_body(app.post_json("/api/timesheets", &week(), Some(&owner)).await?).await?;
    let id = sheet["id"].as_str().expect("id").to_string();

    let response = app.get(&format!("/api/timesheets/{id}"), Some(&colleague)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.get(&format!("/api/timesheets/{id}"), Some(&manager)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_json(&format!("/api/timesheets/{id}/approve"), &json!({}), Some(&manager))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_empty(&format!("/api/timesheets/{id}/submit"), Some(&colleague))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_empty(&format!("/api/timesheets/{id}/submit"), Some(&owner))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let submitted = json_body(response).await?;
    assert_eq!(submitted["status"], "submitted");
    assert!(submitted["submitted_at"].is_string());

    let response = app
        .put_json(
            &format!("/api/timesheets/{id}/entries"),
            &json!({ "entries": [] }),
            Some(&owner),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(&format!("/api/timesheets/{id}/reject"), &json!({ "comments": " " }), Some(&manager))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            &format!("/api/timesheets/{id}/reject"),
            &json!({ "comments": "Tuesday finish time looks wrong" }),
            Some(&owner),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            &format!("/api/timesheets/{id}/reject"),
            &json!({ "comments": "Tuesday finish time looks wrong" }),
            Some(&manager),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let rejected = json_body(response).await?;
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["reviewed_by"], json!(manager_id));
    assert_eq!(rejected["manager_comments"], "Tuesday finish time looks wrong");

    let response = app
        .put_json(
            &format!("/api/timesheets/{id}/entries"),
            &json!({
                "entries": [{ "day_of_week": 2, "time_started": "07:30", "time_finished": "15:30" }]
            }),
            Some(&owner),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let edited = json_body(response).await?;
    assert_eq!(edited["total_minutes"], 480);
    assert_eq!(edited["reg_number"], "AB12CDE");

    let response = app
        .post_empty(&format!("/api/timesheets/{id}/submit"), Some(&owner))
        .await?;
    let resubmitted = json_body(response).await?;
    assert_eq!(resubmitted["status"], "submitted");
    assert!(resubmitted["reviewed_by"].is_null());

    let response = app
        .post_empty(&format!("/api/timesheets/{id}/approve"), Some(&manager))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["status"], "approved");

    let response = app
        .post_empty(&format!("/api/timesheets/{id}/submit"), Some(&owner))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.delete(&format!("/api/timesheets/{id}"), Some(&owner)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn listing_is_scoped_by_role() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (first_id, first) = app.user_with_token("first@example.com", "employee").await?;
    let (_, second) = app.user_with_token("second@example.com", "employee").await?;
    let (_, manager) = app.user_with_token("manager@example.com", "manager").await?;

    let draft = json_body(app.post_json("/api/timesheets", &week(), Some(&first)).await?).await?;
    app.post_json("/api/timesheets", &week(), Some(&second)).await?;
    let second_week = json!({ "week_ending": "2025-03-09", "entries": [] });
    let other = json_body(
        app.post_json("/api/timesheets", &second_week, Some(&first))
            .await?,
    )
    .await?;
    app.post_empty(
        &format!("/api/timesheets/{}/submit", other["id"].as_str().expect("id")),
        Some(&first),
    )
    .await?;

    let mine = json_body(app.get("/api/timesheets?user_id=00000000-0000-0000-0000-000000000000", Some(&first)).await?).await?;
    assert_eq!(mine.as_array().map(Vec::len), Some(2));

    let all = json_body(app.get("/api/timesheets", Some(&manager)).await?).await?;
    assert_eq!(all.as_array().map(Vec::len), Some(3));
    assert_eq!(all[0]["week_ending"], "2025-03-09");

    let filtered = json_body(
        app.get(&format!("/api/timesheets?user_id={first_id}&status=submitted"), Some(&manager))
            .await?,
    )
    .await?;
    assert_eq!(filtered.as_array().map(Vec::len), Some(1));
    assert_eq!(filtered[0]["entries"].as_array().map(Vec::len), Some(0));

    let response = app.get("/api/timesheets?status=lost", Some(&manager)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .delete(
            &format!("/api/timesheets/{}", draft["id"].as_str().expect("id")),
            Some(&first),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    app.cleanup().await?;
    Ok(())
}
