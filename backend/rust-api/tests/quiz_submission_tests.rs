use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{
    create_community, create_failing_app, create_test_app, register, sample_quiz, seed_quiz,
    send, submit, FailingWrite,
};

fn paris_and_seven() -> Value {
    json!([{ "answer_text": "Paris" }, { "answer_text": "7" }])
}

async fn attempts(app: &axum::Router, token: &str, quiz_id: &str) -> Vec<Value> {
    let (status, body) = send(
        app,
        "GET",
        &format!("/api/quizzes/{}/attempts", quiz_id),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["attempts"].as_array().unwrap().clone()
}

#[tokio::test]
async fn test_submission_is_scored_positionally() {
    let app = create_test_app();
    let (_, _, quiz_id) = seed_quiz(&app).await;
    let (student, _) = register(&app, "student").await;

    let (status, body) = submit(&app, &student, &quiz_id, 5, paris_and_seven()).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let attempt_id = body["result"].as_str().unwrap().to_string();

    let (status, result) = send(
        &app,
        "GET",
        &format!("/api/quizzes/attempts/{}/results", attempt_id),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["score"], 1);
    assert_eq!(result["percentage"], 50.0);
    assert_eq!(result["attempt_number"], 1);
    assert_eq!(result["total_questions"], 2);
    assert_eq!(result["questions"][0]["user_answer"], "Paris");
    assert_eq!(result["questions"][1]["user_answer"], "7");
}

#[tokio::test]
async fn test_repeat_submission_increments_attempt_number() {
    let app = create_test_app();
    let (_, _, quiz_id) = seed_quiz(&app).await;
    let (student, _) = register(&app, "student").await;

    submit(&app, &student, &quiz_id, 5, paris_and_seven()).await;
    let (status, body) = submit(
        &app,
        &student,
        &quiz_id,
        3,
        json!([{ "answer_text": "Paris" }, { "answer_text": "42" }]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second = body["result"].as_str().unwrap().to_string();

    let listed = attempts(&app, &student, &quiz_id).await;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["attempt_id"], second.as_str());
    assert_eq!(listed[0]["attempt_number"], 2);
    assert_eq!(listed[0]["score"], 2);
    assert_eq!(listed[0]["percentage"], 100.0);
    assert_eq!(listed[1]["attempt_number"], 1);

    let (_, detail) = send(
        &app,
        "GET",
        &format!("/api/quizzes/{}", quiz_id),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(detail["current_attempt_id"], second.as_str());
}

#[tokio::test]
async fn test_late_submission_is_rejected_without_writes() {
    let app = create_test_app();
    let (_, _, quiz_id) = seed_quiz(&app).await;
    let (student, _) = register(&app, "student").await;

    let (status, body) = submit(&app, &student, &quiz_id, 11, paris_and_seven()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "TIME_OUT");
    assert!(attempts(&app, &student, &quiz_id).await.is_empty());

    // Exactly the allotted time is still accepted
    let (status, _) = submit(&app, &student, &quiz_id, 10, paris_and_seven()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_answer_count_mismatch_is_rejected_without_writes() {
    let app = create_test_app();
    let (_, _, quiz_id) = seed_quiz(&app).await;
    let (student, _) = register(&app, "student").await;

    let (status, body) = submit(
        &app,
        &student,
        &quiz_id,
        2,
        json!([{ "answer_text": "Paris" }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "ANSWER_COUNT_MISMATCH");
    assert!(attempts(&app, &student, &quiz_id).await.is_empty());
}

#[tokio::test]
async fn test_negative_duration_and_unknown_quiz() {
    let app = create_test_app();
    let (_, _, quiz_id) = seed_quiz(&app).await;
    let (student, _) = register(&app, "student").await;

    let (status, body) = submit(&app, &student, &quiz_id, -1, paris_and_seven()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_DURATION");

    let (status, _) = submit(&app, &student, "missing", 1, paris_and_seven()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_take_hides_answers_and_options_must_match_question() {
    let app = create_test_app();
    let (_, _, quiz_id) = seed_quiz(&app).await;
    let (student, _) = register(&app, "student").await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/quizzes/{}/take", quiz_id),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let raw = body.to_string();
    assert!(!raw.contains("correct_answer"));
    assert!(!raw.contains("is_correct"));

    let quiz = &body["quiz"];
    assert_eq!(quiz["duration"], 10);
    assert_eq!(quiz["questions"][0]["question_text"], "Capital of France?");
    let paris = quiz["questions"][0]["options"][0]["option_id"].as_str().unwrap();
    let forty_two = quiz["questions"][1]["options"][0]["option_id"].as_str().unwrap();

    let (status, body) = submit(
        &app,
        &student,
        &quiz_id,
        1,
        json!([{ "option_id": forty_two }, { "option_id": paris }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_OPTION");

    // An option alone supplies the answer text
    let (status, body) = submit(
        &app,
        &student,
        &quiz_id,
        1,
        json!([{ "option_id": paris }, { "option_id": forty_two }]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, result) = send(
        &app,
        "GET",
        &format!("/api/quizzes/attempts/{}/results", body["result"].as_str().unwrap()),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(result["score"], 2);
}

#[tokio::test]
async fn test_unpublished_quiz_is_hidden_from_others() {
    let app = create_test_app();
    let (owner, _) = register(&app, "owner").await;
    let (student, _) = register(&app, "student").await;
    let community_id = common::create_community(&app, &owner, "Drafts").await;

    let mut draft = common::sample_quiz(&community_id);
    draft["is_published"] = json!(false);
    let (status, body) = send(&app, "POST", "/api/quizzes", Some(&owner), Some(draft)).await;
    assert_eq!(status, StatusCode::CREATED);
    let quiz_id = body["quiz_id"].as_str().unwrap();

    let uri = format!("/api/quizzes/{}", quiz_id);
    let (status, _) = send(&app, "GET", &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = send(&app, "GET", "/api/quizzes", Some(&student), None).await;
    assert!(listing["quizzes"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_leaderboard_ranks_first_attempts() {
    let app = create_test_app();
    let (_, _, quiz_id) = seed_quiz(&app).await;
    let (fast, _) = register(&app, "fast").await;
    let (slow, _) = register(&app, "slow").await;
    let (weak, _) = register(&app, "weak").await;

    let perfect = json!([{ "answer_text": "Paris" }, { "answer_text": "42" }]);
    submit(&app, &slow, &quiz_id, 9, perfect.clone()).await;
    submit(&app, &fast, &quiz_id, 2, perfect.clone()).await;
    submit(&app, &weak, &quiz_id, 1, json!([{ "answer_text": "Lyon" }, { "answer_text": "7" }])).await;
    // Later attempts never enter the board
    submit(&app, &weak, &quiz_id, 1, perfect).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/quizzes/{}/leaderboard", quiz_id),
        Some(&weak),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let board = body["leaderboard"].as_array().unwrap();
    let names: Vec<&str> = board
        .iter()
        .map(|e| e["user"]["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["fast", "slow", "weak"]);
    assert_eq!(board[0]["rank"], 1);
    assert_eq!(board[2]["score"], 0);

    let (_, body) = send(
        &app,
        "GET",
        &format!("/api/quizzes/{}/leaderboard?limit=1", quiz_id),
        Some(&weak),
        None,
    )
    .await;
    assert_eq!(body["leaderboard"].as_array().unwrap().len(), 1);

    let (_, listing) = send(&app, "GET", "/api/quizzes", Some(&weak), None).await;
    let item = &listing["quizzes"][0];
    assert_eq!(item["students_count"], 3);
    assert_eq!(item["questions_count"], 2);
    assert_eq!(item["is_new"], true);
    assert_eq!(item["creator"]["username"], "owner");
    assert_eq!(item["creator"]["role"], "CREATOR");
    assert!(item["created_at_text"].as_str().unwrap().starts_with("less than a minute ago - "));
}

#[tokio::test]
async fn test_question_management() {
    let app = create_test_app();
    let (owner, _, quiz_id) = seed_quiz(&app).await;
    let (student, _) = register(&app, "student").await;
    let question = json!({
        "question_text": "Largest planet?",
        "correct_answer": "Jupiter",
        "options": [{ "text": "Jupiter", "is_correct": true }, { "text": "Mars" }]
    });
    let uri = format!("/api/quizzes/{}/questions", quiz_id);

    let (status, _) = send(&app, "POST", &uri, Some(&student), Some(question.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", &uri, Some(&owner), Some(question)).await;
    assert_eq!(status, StatusCode::CREATED);
    let question_id = body["question_id"].as_str().unwrap().to_string();

    let (_, take) = send(
        &app,
        "GET",
        &format!("/api/quizzes/{}/take", quiz_id),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(take["quiz"]["questions"][2]["question_id"], question_id.as_str());

    let question_uri = format!("/api/questions/{}", question_id);
    let (status, _) = send(&app, "DELETE", &question_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "DELETE", &question_uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &question_uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_quiz_delete_permissions() {
    let app = create_test_app();
    let (owner, _, quiz_id) = seed_quiz(&app).await;
    let (student, _) = register(&app, "student").await;
    let uri = format!("/api/quizzes/{}", quiz_id);

    let (status, _) = send(&app, "DELETE", &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_answer_insert_rolls_back_attempt() {
    let (app, state) = create_failing_app(FailingWrite::Answers);

    let (_, _, quiz_id) = seed_quiz(&app).await;
    let (student, student_id) = register(&app, "student").await;

    let (status, body) = submit(&app, &student, &quiz_id, 5, paris_and_seven()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");

    let stored = state.repos.quizzes.attempts_for_user(&student_id).await.unwrap();
    assert!(stored.is_empty());
    assert!(attempts(&app, &student, &quiz_id).await.is_empty());
}

#[tokio::test]
async fn test_failed_option_insert_rolls_back_quiz_creation() {
    let (app, state) = create_failing_app(FailingWrite::Options);
    let (owner, owner_id) = register(&app, "owner").await;
    let community_id = create_community(&app, &owner, "Geography").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/quizzes",
        Some(&owner),
        Some(sample_quiz(&community_id)),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");

    let created = state
        .repos
        .quizzes
        .list_quizzes_by_creator(&owner_id)
        .await
        .unwrap();
    assert!(created.is_empty());
    assert!(state
        .repos
        .quizzes
        .list_community_quizzes(&community_id)
        .await
        .unwrap()
        .is_empty());

    let (_, listing) = send(&app, "GET", "/api/quizzes", Some(&owner), None).await;
    assert!(listing["quizzes"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_quiz_creation_validates_nested_questions() {
    let app = create_test_app();
    let (owner, _) = register(&app, "owner").await;
    let community_id = create_community(&app, &owner, "Geography").await;

    let mut blank_option = sample_quiz(&community_id);
    blank_option["questions"][0]["options"][1]["text"] = json!("");
    let (status, body) = send(&app, "POST", "/api/quizzes", Some(&owner), Some(blank_option)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let mut no_questions = sample_quiz(&community_id);
    no_questions["questions"] = json!([]);
    let (status, _) = send(&app, "POST", "/api/quizzes", Some(&owner), Some(no_questions)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listing) = send(&app, "GET", "/api/quizzes", Some(&owner), None).await;
    assert!(listing["quizzes"].as_array().unwrap().is_empty());
}
