use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// Multipart framing on top of the largest accepted image
const MAX_BODY_BYTES: usize = services::storage::MAX_IMAGE_BYTES + 512 * 1024;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

fn cors_layer(client_url: &str) -> CorsLayer {
    let origin = HeaderValue::from_str(client_url.trim_end_matches('/')).ok();
    if origin.is_none() {
        tracing::warn!("CLIENT_URL {:?} is not a valid origin; CORS disabled", client_url);
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origin))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.client_url);
    let uploads = ServeDir::new(&app_state.config.upload_dir);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .merge(auth_routes(app_state.clone()))
        .merge(community_routes(app_state.clone()))
        .merge(protected_routes(app_state.clone()))
        .nest_service("/uploads", uploads)
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let register_route = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::register_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    register_route
        .merge(login_route)
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/google", get(handlers::auth::google_redirect))
        .route(
            "/api/auth/google/callback",
            get(handlers::auth::google_callback),
        )
}

/// Community reads work anonymously; writes on the same paths need a caller
fn community_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let optional = middleware::from_fn_with_state(
        app_state.clone(),
        middlewares::auth::optional_auth_middleware,
    );
    let required =
        middleware::from_fn_with_state(app_state, middlewares::auth::auth_middleware);

    Router::new()
        .route(
            "/api/communities",
            get(handlers::communities::list_communities)
                .route_layer(optional.clone())
                .merge(
                    post(handlers::communities::create_community).route_layer(required.clone()),
                ),
        )
        .route(
            "/api/communities/{id}",
            get(handlers::communities::get_community)
                .route_layer(optional)
                .merge(
                    put(handlers::communities::update_community)
                        .delete(handlers::communities::delete_community)
                        .route_layer(required),
                ),
        )
}

fn protected_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        // Users
        .route(
            "/api/users/me",
            get(handlers::users::get_me).put(handlers::users::update_me),
        )
        .route("/api/users/me/avatar", put(handlers::users::update_avatar))
        .route("/api/users/me/banner", put(handlers::users::update_banner))
        .route("/api/users/{id}/stats", get(handlers::users::get_stats))
        // Communities
        .route(
            "/api/communities/upload-banner",
            post(handlers::communities::upload_banner),
        )
        .route(
            "/api/communities/{id}/banner",
            put(handlers::communities::replace_banner),
        )
        .route(
            "/api/communities/{id}/join",
            post(handlers::communities::toggle_membership),
        )
        .route(
            "/api/communities/{id}/members",
            get(handlers::communities::list_members),
        )
        .route(
            "/api/communities/{id}/members/{user_id}/role",
            post(handlers::communities::update_member_role),
        )
        // Quizzes
        .route(
            "/api/quizzes",
            get(handlers::quizzes::list_quizzes).post(handlers::quizzes::create_quiz),
        )
        .route(
            "/api/quizzes/attempts/{attempt_id}/results",
            get(handlers::quizzes::attempt_result),
        )
        .route(
            "/api/quizzes/{id}",
            get(handlers::quizzes::get_quiz).delete(handlers::quizzes::delete_quiz),
        )
        .route("/api/quizzes/{id}/take", get(handlers::quizzes::take_quiz))
        .route(
            "/api/quizzes/{id}/submit",
            post(handlers::quizzes::submit_quiz),
        )
        .route(
            "/api/quizzes/{id}/result",
            get(handlers::quizzes::latest_result),
        )
        .route("/api/quizzes/{id}/like", post(handlers::quizzes::toggle_like))
        .route(
            "/api/quizzes/{id}/leaderboard",
            get(handlers::quizzes::leaderboard),
        )
        .route(
            "/api/quizzes/{id}/attempts",
            get(handlers::quizzes::my_attempts),
        )
        .route(
            "/api/quizzes/{id}/questions",
            post(handlers::quizzes::add_question),
        )
        // Questions & comments
        .route(
            "/api/questions/{id}",
            delete(handlers::quizzes::delete_question),
        )
        .route(
            "/api/questions/{id}/comments",
            get(handlers::comments::list_comments).post(handlers::comments::create_comment),
        )
        .route(
            "/api/comments/{id}",
            delete(handlers::comments::delete_comment),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}
