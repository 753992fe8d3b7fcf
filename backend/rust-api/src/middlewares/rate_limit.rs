//! Per-IP limits for the credential endpoints, backed by Redis.
//! Without a Redis connection, or with `RATE_LIMIT_DISABLED=1`, requests pass through.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::AppError;
use crate::metrics::RATE_LIMIT_REJECTIONS_TOTAL;
use crate::services::AppState;

const LOGIN_RATE_LIMIT: u32 = 10; // per window
const LOGIN_RATE_WINDOW_SECONDS: u64 = 300;
const REGISTER_RATE_LIMIT: u32 = 5;
const REGISTER_RATE_WINDOW_SECONDS: u64 = 3600;

const RATE_LIMIT_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

pub(crate) fn extract_client_ip_from(
    headers: &HeaderMap,
    extensions: &axum::http::Extensions,
) -> String {
    // X-Forwarded-For, Forwarded, X-Real-IP, then the socket address
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            for part in s.split(';') {
                if let Some(val) = part.trim().strip_prefix("for=") {
                    return val.trim().trim_matches('"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

fn limit_from_env(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(default)
}

async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
    window_seconds: u64,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();
    let allowed: u32 = redis::Script::new(RATE_LIMIT_SCRIPT)
        .key(key)
        .arg(limit)
        .arg(window_seconds)
        .invoke_async(&mut conn)
        .await?;
    Ok(allowed == 1)
}

async fn enforce(
    state: &AppState,
    scope: &'static str,
    client_ip: String,
    limit: u32,
    window_seconds: u64,
) -> Result<(), AppError> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(());
    };
    if std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1" {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
        return Ok(());
    }

    let key = format!("ratelimit:{}:{}", scope, client_ip);

    let allowed = check_rate_limit(redis, &key, limit, window_seconds)
        .await
        .map_err(|e| AppError::internal(format!("Rate limit check failed: {}", e)))?;

    if !allowed {
        tracing::warn!("{} rate limit exceeded for IP: {}", scope, client_ip);
        RATE_LIMIT_REJECTIONS_TOTAL.with_label_values(&[scope]).inc();
        return Err(AppError::TooManyRequests(
            "Too many requests. Please try again later.".to_string(),
        ));
    }
    Ok(())
}

/// Login: 10 attempts per 5 minutes per IP
pub async fn login_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let limit = limit_from_env("RATE_LIMIT_LOGIN_ATTEMPTS", LOGIN_RATE_LIMIT);
    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    enforce(&state, "login", client_ip, limit, LOGIN_RATE_WINDOW_SECONDS).await?;
    Ok(next.run(request).await)
}

/// Register: 5 registrations per hour per IP
pub async fn register_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let limit = limit_from_env("RATE_LIMIT_REGISTER_ATTEMPTS", REGISTER_RATE_LIMIT);
    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    enforce(
        &state,
        "register",
        client_ip,
        limit,
        REGISTER_RATE_WINDOW_SECONDS,
    )
    .await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_client_ip_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "1.2.3.4");
    }

    #[test]
    fn test_extract_client_ip_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("forwarded", "for=5.6.7.8;proto=http".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "5.6.7.8");
    }

    #[test]
    fn test_extract_client_ip_connect_info() {
        let headers = HeaderMap::new();
        let mut exts = axum::http::Extensions::new();
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        exts.insert(ConnectInfo(addr));
        assert_eq!(extract_client_ip_from(&headers, &exts), "127.0.0.1");
    }

    #[test]
    fn test_enforce_future_is_send() {
        fn assert_send<T: Send>(_: T) {}
        let state = AppState::new(
            crate::config::Config::default(),
            crate::store::Repositories::from_backend(Arc::new(crate::store::MemoryStore::new())),
            None,
        );
        assert_send(enforce(&state, "login", "1.2.3.4".to_string(), 1, 60));
    }

    #[test]
    fn test_extract_client_ip_unknown() {
        let headers = HeaderMap::new();
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "unknown");
    }
}
