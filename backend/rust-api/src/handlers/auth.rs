use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    extractors::AppJson,
    middlewares::auth::ACCESS_TOKEN_COOKIE,
    models::user::{LoginRequest, RegisterRequest},
    services::{
        auth_service::AuthService,
        google_oauth::{GoogleOAuthClient, OAUTH_STATE_COOKIE},
        AppState,
    },
};

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

fn access_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((ACCESS_TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(state.config.token_ttl_hours))
        .build()
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::ZERO)
        .build()
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let response = AuthService::new(&state).register(req).await?;
    let jar = jar.add(access_cookie(&state, response.access_token.clone()));
    Ok((StatusCode::CREATED, jar, Json(response)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let response = AuthService::new(&state).login(req).await?;
    let jar = jar.add(access_cookie(&state, response.access_token.clone()));
    Ok((jar, Json(response)))
}

/// POST /api/auth/logout
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.add(expired_cookie(ACCESS_TOKEN_COOKIE));
    (jar, Json(json!({ "message": "Logged out successfully" })))
}

/// GET /api/auth/google - start the authorization-code flow
pub async fn google_redirect(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let google = state
        .config
        .google
        .as_ref()
        .ok_or_else(|| AppError::not_found("Google sign-in is not configured"))?;

    let oauth_state = uuid::Uuid::new_v4().to_string();
    let url = GoogleOAuthClient::new(google, &state.http)
        .authorize_url(&oauth_state)
        .map_err(|e| AppError::internal(format!("Invalid Google authorize URL: {}", e)))?;

    let cookie = Cookie::build((OAUTH_STATE_COOKIE, oauth_state))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(OAUTH_STATE_TTL_MINUTES))
        .build();

    Ok((jar.add(cookie), Redirect::temporary(url.as_str())))
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /api/auth/google/callback
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<GoogleCallbackQuery>,
) -> AppResult<impl IntoResponse> {
    let google = state
        .config
        .google
        .as_ref()
        .ok_or_else(|| AppError::not_found("Google sign-in is not configured"))?;

    if let Some(error) = &query.error {
        tracing::warn!("Google sign-in cancelled: {}", error);
        return Err(AppError::unauthorized("Google sign-in was cancelled"));
    }

    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    match (&expected, &query.state) {
        (Some(expected), Some(received)) if expected == received => {}
        _ => {
            tracing::warn!("Google callback with mismatched state");
            return Err(AppError::unauthorized("Invalid OAuth state"));
        }
    }

    let code = query
        .code
        .as_deref()
        .ok_or_else(|| AppError::validation("Missing authorization code"))?;

    let client = GoogleOAuthClient::new(google, &state.http);
    let profile = async {
        let token = client.exchange_code(code).await?;
        client.fetch_profile(&token).await
    }
    .await
    .map_err(|e| {
        tracing::warn!("Google sign-in failed: {:#}", e);
        AppError::unauthorized("Google sign-in failed")
    })?;

    let response = AuthService::new(&state).google_login(profile).await?;
    let jar = jar
        .add(expired_cookie(OAUTH_STATE_COOKIE))
        .add(access_cookie(&state, response.access_token));
    let target = format!("{}/home", state.config.client_url.trim_end_matches('/'));
    Ok((jar, Redirect::temporary(&target)))
}
