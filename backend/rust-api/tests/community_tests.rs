use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::{create_community, create_test_app, register, sample_quiz, send};

#[tokio::test]
async fn test_join_then_leave() {
    let app = create_test_app();
    let (owner, _) = register(&app, "owner").await;
    let (member, _) = register(&app, "member").await;
    let community_id = create_community(&app, &owner, "Rustaceans").await;
    let join_uri = format!("/api/communities/{}/join", community_id);

    let (status, body) = send(&app, "POST", &join_uri, Some(&member), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "joined");

    let (_, detail) = send(
        &app,
        "GET",
        &format!("/api/communities/{}", community_id),
        Some(&member),
        None,
    )
    .await;
    assert_eq!(detail["is_joined"], true);
    assert_eq!(detail["member_role"], "MEMBER");
    assert_eq!(detail["member_count"], 2);

    let (status, body) = send(&app, "POST", &join_uri, Some(&member), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "left");
}

#[tokio::test]
async fn test_creator_cannot_toggle_membership() {
    let app = create_test_app();
    let (owner, _) = register(&app, "owner").await;
    let community_id = create_community(&app, &owner, "Mine").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/communities/{}/join", community_id),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CREATOR_MEMBERSHIP");
}

#[tokio::test]
async fn test_listing_is_caller_relative() {
    let app = create_test_app();
    let (owner, _) = register(&app, "owner").await;
    create_community(&app, &owner, "Readers").await;

    let (status, body) = send(&app, "GET", "/api/communities", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["communities"][0]["member_role"], "NON_MEMBER");
    assert_eq!(body["communities"][0]["is_joined"], false);

    let (_, body) = send(&app, "GET", "/api/communities", Some(&owner), None).await;
    assert_eq!(body["communities"][0]["member_role"], "CREATOR");
    assert_eq!(body["communities"][0]["is_joined"], true);
    assert_eq!(body["communities"][0]["creator"]["username"], "owner");
}

#[tokio::test]
async fn test_member_role_management() {
    let app = create_test_app();
    let (owner, owner_id) = register(&app, "owner").await;
    let (member, member_id) = register(&app, "member").await;
    let (_, stranger_id) = register(&app, "stranger").await;
    let community_id = create_community(&app, &owner, "Admins").await;
    send(
        &app,
        "POST",
        &format!("/api/communities/{}/join", community_id),
        Some(&member),
        None,
    )
    .await;

    let role_uri = |user: &str| format!("/api/communities/{}/members/{}/role", community_id, user);

    let (status, _) = send(
        &app,
        "POST",
        &role_uri(&member_id),
        Some(&member),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "POST",
        &role_uri(&owner_id),
        Some(&owner),
        Some(json!({ "role": "member" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);

    let (status, body) = send(
        &app,
        "POST",
        &role_uri(&member_id),
        Some(&owner),
        Some(json!({ "role": "creator" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_ROLE");

    let (status, _) = send(
        &app,
        "POST",
        &role_uri(&stranger_id),
        Some(&owner),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        &role_uri(&member_id),
        Some(&owner),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        &app,
        "GET",
        &format!("/api/communities/{}/members", community_id),
        Some(&owner),
        None,
    )
    .await;
    let members = body["members"].as_array().unwrap();
    let promoted = members
        .iter()
        .find(|m| m["user"]["id"] == member_id.as_str())
        .unwrap();
    assert_eq!(promoted["role"], "admin");
}

#[tokio::test]
async fn test_quiz_creation_gate() {
    let app = create_test_app();
    let (owner, _) = register(&app, "owner").await;
    let (member, _) = register(&app, "member").await;
    let (outsider, _) = register(&app, "outsider").await;
    let community_id = create_community(&app, &owner, "Gated").await;
    let quiz = sample_quiz(&community_id);

    let (status, _) = send(&app, "POST", "/api/quizzes", Some(&outsider), Some(quiz.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    send(
        &app,
        "POST",
        &format!("/api/communities/{}/join", community_id),
        Some(&member),
        None,
    )
    .await;
    let (status, _) = send(&app, "POST", "/api/quizzes", Some(&member), Some(quiz.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/communities/{}", community_id),
        Some(&owner),
        Some(json!({ "allow_public_quiz_submission": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, "POST", "/api/quizzes", Some(&member), Some(quiz.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, detail) = send(
        &app,
        "GET",
        &format!("/api/quizzes/{}", body["quiz_id"].as_str().unwrap()),
        Some(&outsider),
        None,
    )
    .await;
    assert_eq!(detail["creator"]["username"], "member");
    assert_eq!(detail["creator"]["role"], "MEMBER");
}

#[tokio::test]
async fn test_update_and_delete_are_creator_only() {
    let app = create_test_app();
    let (owner, _) = register(&app, "owner").await;
    let (other, _) = register(&app, "other").await;
    let community_id = create_community(&app, &owner, "Doomed").await;
    let quiz_id = common::create_quiz(&app, &owner, &community_id).await;
    let uri = format!("/api/communities/{}", community_id);

    let (status, _) = send(&app, "PUT", &uri, Some(&other), Some(json!({ "name": "Mine" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "DELETE", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "PUT", &uri, Some(&owner), Some(json!({ "name": "Renamed" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Renamed");

    let (status, _) = send(&app, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/quizzes/{}", quiz_id),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_community_detail_lists_published_quizzes() {
    let app = create_test_app();
    let (owner, _) = register(&app, "owner").await;
    let community_id = create_community(&app, &owner, "Quizzers").await;
    let quiz_id = common::create_quiz(&app, &owner, &community_id).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/communities/{}", community_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quiz_count"], 1);
    assert_eq!(body["quizzes"][0]["id"], quiz_id.as_str());
    assert_eq!(body["quizzes"][0]["questions_count"], 2);
    assert_eq!(body["quizzes"][0]["is_liked"], false);
}
