use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    handlers::read_upload,
    middlewares::auth::JwtClaims,
    models::user::{UpdateProfileRequest, UploadResponse},
    services::{user_service::UserService, AppState},
};

fn service(state: &AppState) -> UserService {
    UserService::new(state.repos.clone(), state.storage.clone())
}

/// GET /api/users/me
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<impl IntoResponse> {
    let profile = service(&state).profile(&claims.sub).await?;
    Ok(Json(profile))
}

/// PUT /api/users/me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    let user = service(&state).update_profile(&claims.sub, req).await?;
    Ok(Json(user))
}

/// PUT /api/users/me/avatar
pub async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let (file_name, bytes) = read_upload(multipart).await?;
    let url = service(&state)
        .update_avatar(&claims.sub, &file_name, &bytes)
        .await?;
    Ok(Json(UploadResponse { url }))
}

/// PUT /api/users/me/banner
pub async fn update_banner(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let (file_name, bytes) = read_upload(multipart).await?;
    let url = service(&state)
        .update_banner(&claims.sub, &file_name, &bytes)
        .await?;
    Ok(Json(UploadResponse { url }))
}

/// GET /api/users/{id}/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let stats = service(&state).stats(&user_id).await?;
    Ok(Json(stats))
}
