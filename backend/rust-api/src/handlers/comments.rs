use axum::{
    extract::{Path, State},
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
    models::comment::{CreateCommentRequest, CreateCommentResponse},
    services::{comment_service::CommentService, AppState},
};

/// GET /api/questions/{id}/comments
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let comments = CommentService::new(state.repos.clone())
        .list(&question_id)
        .await?;
    Ok(Json(json!({ "comments": comments })))
}

/// POST /api/questions/{id}/comments
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(question_id): Path<String>,
    AppJson(req): AppJson<CreateCommentRequest>,
) -> AppResult<impl IntoResponse> {
    let id = CommentService::new(state.repos.clone())
        .create(&question_id, &claims.sub, req)
        .await?;
    Ok((StatusCode::CREATED, Json(CreateCommentResponse { id })))
}

/// DELETE /api/comments/{id}
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(comment_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    CommentService::new(state.repos.clone())
        .delete(&comment_id, &claims.sub)
        .await?;
    Ok(Json(json!({ "message": "Comment deleted" })))
}
