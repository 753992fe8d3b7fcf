use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::quiz::{
        CreateQuestionRequest, CreateQuestionResponse, CreateQuizRequest, CreateQuizResponse,
        LeaderboardQuery, LikeToggleResponse, SubmitQuizRequest, SubmitQuizResponse,
    },
    services::{quiz_service::QuizService, result_service::ResultService, AppState},
};

fn service(state: &AppState) -> QuizService {
    QuizService::new(state.repos.clone())
}

/// GET /api/quizzes
pub async fn list_quizzes(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<impl IntoResponse> {
    let quizzes = service(&state).list(&claims.sub).await?;
    Ok(Json(json!({ "quizzes": quizzes })))
}

/// POST /api/quizzes
pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateQuizRequest>,
) -> AppResult<impl IntoResponse> {
    let quiz_id = service(&state).create(&claims.sub, req).await?;
    Ok((StatusCode::CREATED, Json(CreateQuizResponse { quiz_id })))
}

/// GET /api/quizzes/{id}
pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let quiz = service(&state).get(&id, &claims.sub).await?;
    Ok(Json(quiz))
}

/// DELETE /api/quizzes/{id}
pub async fn delete_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    service(&state).delete(&id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/quizzes/{id}/take - questions and options without answers
pub async fn take_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let quiz = service(&state).take(&id, &claims.sub).await?;
    Ok(Json(json!({ "quiz": quiz })))
}

/// POST /api/quizzes/{id}/submit
pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<SubmitQuizRequest>,
) -> AppResult<impl IntoResponse> {
    let result = service(&state).submit(&id, &claims.sub, req).await?;
    Ok(Json(SubmitQuizResponse { result }))
}

/// GET /api/quizzes/{id}/result - caller's latest attempt
pub async fn latest_result(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let result = ResultService::new(state.repos.clone())
        .latest_result(&id, &claims.sub)
        .await?;
    Ok(Json(result))
}

/// GET /api/quizzes/attempts/{attempt_id}/results
pub async fn attempt_result(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let result = ResultService::new(state.repos.clone())
        .result(&attempt_id)
        .await?;
    Ok(Json(result))
}

/// POST /api/quizzes/{id}/like - toggles
pub async fn toggle_like(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let status = service(&state).toggle_like(&id, &claims.sub).await?;
    Ok(Json(LikeToggleResponse { status }))
}

/// GET /api/quizzes/{id}/leaderboard?limit=
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<impl IntoResponse> {
    let leaderboard = service(&state)
        .leaderboard(&id, &claims.sub, query.limit)
        .await?;
    Ok(Json(json!({ "leaderboard": leaderboard })))
}

/// GET /api/quizzes/{id}/attempts
pub async fn my_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let attempts = service(&state).my_attempts(&id, &claims.sub).await?;
    Ok(Json(json!({ "attempts": attempts })))
}

/// POST /api/quizzes/{id}/questions
pub async fn add_question(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<CreateQuestionRequest>,
) -> AppResult<impl IntoResponse> {
    let question_id = service(&state).add_question(&id, &claims.sub, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateQuestionResponse { question_id }),
    ))
}

/// DELETE /api/questions/{id}
pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    service(&state).delete_question(&id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
