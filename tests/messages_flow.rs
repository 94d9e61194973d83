mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use common::{acquire_db_lock, json_body, json_request, signature_data_url, TestApp};
use fleetops::jobs::JOB_SEND_EMAIL;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn toolbox_talk_reaches_every_employee() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, first) = app.user_with_token("first@example.com", "employee").await?;
    let (_, second) = app.user_with_token("second@example.com", "employee").await?;
    let (_, manager) = app.user_with_token("manager@example.com", "manager").await?;

    let talk = json!({
        "message_type": "toolbox_talk",
        "subject": "  Working at height ",
        "body": "Harness checks before every lift.",
        "all_employees": true
    });
    let response = app.post_json("/api/messages", &talk, Some(&first)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.post_json("/api/messages", &talk, Some(&manager)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await?;
    assert_eq!(created["subject"], "Working at height");
    assert_eq!(created["priority"], "normal");
    assert_eq!(created["counts"]["total"], 2);
    assert_eq!(created["counts"]["pending"], 2);
    let id = created["id"].as_str().expect("id").to_string();

    assert_eq!(app.jobs_by_type(JOB_SEND_EMAIL).await?.len(), 2);
    assert_eq!(app.drain_jobs().await?, 2);
    let sent = app.mailer().sent().await;
    assert_eq!(sent.len(), 2);
    assert!(sent
        .iter()
        .all(|email| email.subject == "Toolbox talk: Working at height"));
    assert!(sent[0].text.contains("http://localhost:3000/messages"));

    let inbox = json_body(app.get("/api/messages/inbox", Some(&first)).await?).await?;
    assert_eq!(inbox.as_array().map(Vec::len), Some(1));
    assert_eq!(inbox[0]["status"], "pending");
    let manager_inbox = json_body(app.get("/api/messages/inbox", Some(&manager)).await?).await?;
    assert_eq!(manager_inbox.as_array().map(Vec::len), Some(0));

    let response = app
        .post_empty(&format!("/api/messages/{id}/read"), Some(&first))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let read = json_body(response).await?;
    assert_eq!(read["status"], "read");
    assert!(read["read_at"].is_string());

    let response = app
        .post_empty(&format!("/api/messages/{id}/dismiss"), Some(&first))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            &format!("/api/messages/{id}/sign"),
            &json!({ "signature_data": "not an image" }),
            Some(&first),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            &format!("/api/messages/{id}/sign"),
            &json!({ "signature_data": signature_data_url() }),
            Some(&first),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let signed = json_body(response).await?;
    assert_eq!(signed["status"], "signed");
    assert!(signed["signed_at"].is_string());

    let response = app
        .post_json(
            &format!("/api/messages/{id}/sign"),
            &json!({ "signature_data": signature_data_url() }),
            Some(&first),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_empty(&format!("/api/messages/{id}/read"), Some(&first))
        .await?;
    assert_eq!(json_body(response).await?["status"], "signed");

    let sent_list = json_body(app.get("/api/messages", Some(&manager)).await?).await?;
    assert_eq!(sent_list.as_array().map(Vec::len), Some(1));
    assert_eq!(sent_list[0]["counts"]["signed"], 1);
    assert_eq!(sent_list[0]["counts"]["pending"], 1);
    let response = app.get("/api/messages", Some(&second)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn reminders_are_dismissed_and_deletion_hides_them() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (first_id, first) = app.user_with_token("first@example.com", "employee").await?;
    let (_, second) = app.user_with_token("second@example.com", "employee").await?;
    let (_, manager) = app.user_with_token("manager@example.com", "manager").await?;

    let response = app
        .post_json(
            "/api/messages",
            &json!({
                "message_type": "memo",
                "subject": "Yard closed",
                "body": "Use the side gate.",
                "recipient_ids": [first_id]
            }),
            Some(&manager),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/messages",
            &json!({
                "message_type": "reminder",
                "subject": "Yard closed",
                "body": "Use the side gate.",
                "recipient_ids": [first_id, Uuid::new_v4()]
            }),
            Some(&manager),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/messages",
            &json!({
                "message_type": "reminder",
                "subject": "Yard closed",
                "body": "Use the side gate.",
                "recipient_ids": []
            }),
            Some(&manager),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/messages",
            &json!({
                "message_type": "reminder",
                "subject": "Yard closed",
                "body": "Use the side gate.",
                "priority": "HIGH",
                "recipient_ids": [first_id]
            }),
            Some(&manager),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let reminder = json_body(response).await?;
    assert_eq!(reminder["priority"], "high");
    assert_eq!(reminder["counts"]["total"], 1);
    let id = reminder["id"].as_str().expect("id").to_string();
    assert_eq!(app.jobs_by_type(JOB_SEND_EMAIL).await?.len(), 1);

    let response = app
        .post_empty(&format!("/api/messages/{id}/read"), Some(&second))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post_json(
            &format!("/api/messages/{id}/sign"),
            &json!({ "signature_data": signature_data_url() }),
            Some(&first),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_empty(&format!("/api/messages/{id}/dismiss"), Some(&first))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let dismissed = json_body(response).await?;
    assert_eq!(dismissed["status"], "dismissed");
    assert!(dismissed["dismissed_at"].is_string());
    assert!(dismissed["read_at"].is_string());

    let sent_list = json_body(app.get("/api/messages", Some(&manager)).await?).await?;
    assert_eq!(sent_list[0]["counts"]["dismissed"], 1);

    let response = app.delete(&format!("/api/messages/{id}"), Some(&first)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.delete(&format!("/api/messages/{id}"), Some(&manager)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.delete(&format!("/api/messages/{id}"), Some(&manager)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let inbox = json_body(app.get("/api/messages/inbox", Some(&first)).await?).await?;
    assert_eq!(inbox.as_array().map(Vec::len), Some(0));
    let sent_list = json_body(app.get("/api/messages", Some(&manager)).await?).await?;
    assert_eq!(sent_list.as_array().map(Vec::len), Some(0));
    let response = app
        .post_empty(&format!("/api/messages/{id}/dismiss"), Some(&first))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn toolbox_talk_signed_once_under_concurrent_requests() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, driver) = app.user_with_token("driver@example.com", "employee").await?;
    let (_, manager) = app.user_with_token("manager@example.com", "manager").await?;

    let created = json_body(
        app.post_json(
            "/api/messages",
            &json!({
                "message_type": "toolbox_talk",
                "subject": "Manual handling",
                "body": "Bend the knees.",
                "all_employees": true
            }),
            Some(&manager),
        )
        .await?,
    )
    .await?;
    let id = created["id"].as_str().expect("id").to_string();

    let sign_path = format!("/api/messages/{id}/sign");
    let mut requests = (0..3)
        .map(|_| {
            json_request(
                Method::POST,
                &sign_path,
                &json!({ "signature_data": signature_data_url() }),
                Some(&driver),
            )
        })
        .collect::<Result<Vec<_>>>()?;
    requests.push(json_request(
        Method::POST,
        &format!("/api/messages/{id}/read"),
        &json!({}),
        Some(&driver),
    )?);

    let statuses: Vec<StatusCode> = app
        .send_concurrently(requests)
        .await?
        .iter()
        .map(|response| response.status())
        .collect();
    assert_eq!(statuses[3], StatusCode::OK);
    assert_eq!(
        statuses[..3].iter().filter(|s| **s == StatusCode::OK).count(),
        1,
        "statuses: {statuses:?}"
    );

    let inbox = json_body(app.get("/api/messages/inbox", Some(&driver)).await?).await?;
    assert_eq!(inbox[0]["status"], "signed");
    let sent_list = json_body(app.get("/api/messages", Some(&manager)).await?).await?;
    assert_eq!(sent_list[0]["counts"]["signed"], 1);

    app.cleanup().await?;
    Ok(())
}
