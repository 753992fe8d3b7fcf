use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    handlers::read_upload,
    middlewares::auth::JwtClaims,
    models::{
        community::{
            CreateCommunityRequest, CreateCommunityResponse, MembershipToggleResponse,
            UpdateCommunityRequest, UpdateMemberRoleRequest,
        },
        user::UploadResponse,
    },
    services::{community_service::CommunityService, storage::store_image, AppState},
};

const COMMUNITY_BANNER_FOLDER: &str = "communities";

fn service(state: &AppState) -> CommunityService {
    CommunityService::new(state.repos.clone())
}

/// GET /api/communities (identity optional)
pub async fn list_communities(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
) -> AppResult<impl IntoResponse> {
    let caller = claims.as_ref().map(|Extension(c)| c.sub.as_str());
    let communities = service(&state).list(caller).await?;
    Ok(Json(json!({ "communities": communities })))
}

/// POST /api/communities
pub async fn create_community(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateCommunityRequest>,
) -> AppResult<impl IntoResponse> {
    let community_id = service(&state).create(&claims.sub, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateCommunityResponse { community_id }),
    ))
}

/// POST /api/communities/upload-banner
pub async fn upload_banner(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let (file_name, bytes) = read_upload(multipart).await?;
    let url = store_image(
        state.storage.as_ref(),
        COMMUNITY_BANNER_FOLDER,
        &file_name,
        &bytes,
    )
    .await?;
    Ok(Json(UploadResponse { url }))
}

/// GET /api/communities/{id} (identity optional)
pub async fn get_community(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    claims: Option<Extension<JwtClaims>>,
) -> AppResult<impl IntoResponse> {
    let caller = claims.as_ref().map(|Extension(c)| c.sub.as_str());
    let community = service(&state).get(&id, caller).await?;
    Ok(Json(community))
}

/// PUT /api/communities/{id}
pub async fn update_community(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateCommunityRequest>,
) -> AppResult<impl IntoResponse> {
    let community = service(&state).update(&id, &claims.sub, req).await?;
    Ok(Json(community))
}

/// PUT /api/communities/{id}/banner - upload and attach in one step
pub async fn replace_banner(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let (file_name, bytes) = read_upload(multipart).await?;
    let url = store_image(
        state.storage.as_ref(),
        COMMUNITY_BANNER_FOLDER,
        &file_name,
        &bytes,
    )
    .await?;
    service(&state)
        .set_banner(&id, &claims.sub, url.clone())
        .await?;
    Ok(Json(UploadResponse { url }))
}

/// DELETE /api/communities/{id}
pub async fn delete_community(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    service(&state).delete(&id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/communities/{id}/join - toggles membership
pub async fn toggle_membership(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let status = service(&state).toggle_membership(&id, &claims.sub).await?;
    Ok(Json(MembershipToggleResponse { status }))
}

/// GET /api/communities/{id}/members
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let members = service(&state).list_members(&id).await?;
    Ok(Json(json!({ "members": members })))
}

/// POST /api/communities/{id}/members/{user_id}/role
pub async fn update_member_role(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((id, user_id)): Path<(String, String)>,
    AppJson(req): AppJson<UpdateMemberRoleRequest>,
) -> AppResult<impl IntoResponse> {
    service(&state)
        .update_member_role(&id, &claims.sub, &user_id, &req.role)
        .await?;
    Ok(Json(json!({ "message": "Member role updated" })))
}
