use anyhow::Context;
use bcrypt::{hash, verify};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::metrics::record_auth_event;
use crate::middlewares::auth::JwtService;
use crate::models::user::{
    AuthResponse, GoogleProfile, LoginRequest, RegisterRequest, User, UserProfile,
};
use crate::services::AppState;
use crate::store::Repositories;

const MAX_FAILED_LOGINS: u32 = 5;
const FAILED_LOGIN_WINDOW_SECONDS: u64 = 900;

pub struct AuthService {
    repos: Repositories,
    redis: Option<ConnectionManager>,
    jwt: Arc<JwtService>,
    token_ttl_hours: i64,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            repos: state.repos.clone(),
            redis: state.redis.clone(),
            jwt: state.jwt.clone(),
            token_ttl_hours: state.config.token_ttl_hours,
            bcrypt_cost: state.config.bcrypt_cost,
        }
    }

    pub fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        hash(password, self.bcrypt_cost).context("Failed to hash password")
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> anyhow::Result<bool> {
        verify(password, hash).context("Failed to verify password")
    }

    fn issue(&self, user: User) -> AppResult<AuthResponse> {
        let access_token = self
            .jwt
            .issue(&user.id, &user.email, self.token_ttl_hours)
            .map_err(|e| AppError::internal(format!("Failed to sign token: {}", e)))?;
        Ok(AuthResponse {
            access_token,
            user: UserProfile::from(user),
        })
    }

    pub async fn register(&self, req: RegisterRequest) -> AppResult<AuthResponse> {
        req.validate()?;
        let email = normalize_email(&req.email);

        if self.repos.users.find_user_by_email(&email).await?.is_some() {
            record_auth_event("register", false);
            return Err(AppError::Conflict(
                "User with this email already exists".to_string(),
            ));
        }

        let mut user = User::new(email, req.username.trim().to_string());
        user.password_hash = Some(self.hash_password(&req.password)?);
        self.repos.users.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "User registered");
        record_auth_event("register", true);
        self.issue(user)
    }

    pub async fn login(&self, req: LoginRequest) -> AppResult<AuthResponse> {
        req.validate()?;
        let email = normalize_email(&req.email);

        if self.is_locked(&email).await {
            tracing::warn!("Login blocked for {}: too many failed attempts", email);
            record_auth_event("login", false);
            return Err(AppError::TooManyRequests(
                "Too many failed login attempts. Please try again later.".to_string(),
            ));
        }

        let Some(user) = self.repos.users.find_user_by_email(&email).await? else {
            return Err(self.reject_login(&email).await);
        };

        let Some(password_hash) = user.password_hash.as_deref() else {
            record_auth_event("login", false);
            return Err(AppError::unauthorized(
                "This account uses Google sign-in",
            ));
        };

        if !self.verify_password(&req.password, password_hash)? {
            return Err(self.reject_login(&email).await);
        }

        self.clear_failed_attempts(&email).await;
        tracing::info!(user_id = %user.id, "User logged in");
        record_auth_event("login", true);
        self.issue(user)
    }

    /// Signs in a Google identity, creating or linking the local account
    pub async fn google_login(&self, profile: GoogleProfile) -> AppResult<AuthResponse> {
        let email = normalize_email(&profile.email);
        if !profile.email_verified {
            tracing::warn!("Google sign-in refused for unverified e-mail {}", email);
            record_auth_event("google", false);
            return Err(AppError::unauthorized("Google e-mail is not verified"));
        }

        let user = match self.repos.users.find_user_by_email(&email).await? {
            Some(user) if user.google_id.as_deref().is_some_and(|id| id != profile.sub) => {
                tracing::warn!(user_id = %user.id, "Google subject does not match linked account");
                record_auth_event("google", false);
                return Err(AppError::unauthorized(
                    "This e-mail is linked to a different Google account",
                ));
            }
            Some(mut user) => {
                if user.google_id.is_none() {
                    self.repos
                        .users
                        .link_google_account(&user.id, &profile.sub)
                        .await?;
                    user.google_id = Some(profile.sub.clone());
                    tracing::info!(user_id = %user.id, "Linked Google account");
                }
                user
            }
            None => {
                let username = profile
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());
                let mut user = User::new(email, username);
                user.google_id = Some(profile.sub.clone());
                user.avatar = profile.picture.clone();
                self.repos.users.insert_user(&user).await?;
                tracing::info!(user_id = %user.id, "User registered through Google");
                user
            }
        };

        record_auth_event("google", true);
        self.issue(user)
    }

    async fn reject_login(&self, email: &str) -> AppError {
        let count = self.increment_failed_attempts(email).await;
        tracing::warn!(
            "Failed login for {}: {}/{}",
            email,
            count,
            MAX_FAILED_LOGINS
        );
        record_auth_event("login", false);
        AppError::unauthorized("Invalid email or password")
    }

    /// True once an e-mail has `MAX_FAILED_LOGINS` failures inside the window
    async fn is_locked(&self, email: &str) -> bool {
        let Some(redis) = &self.redis else {
            return false;
        };
        let mut conn = redis.clone();
        let count: Result<Option<u32>, _> = redis::cmd("GET")
            .arg(failed_login_key(email))
            .query_async(&mut conn)
            .await;
        match count {
            Ok(count) => count.unwrap_or(0) >= MAX_FAILED_LOGINS,
            Err(e) => {
                tracing::warn!("Failed to query failed login attempts: {}", e);
                false
            }
        }
    }

    async fn increment_failed_attempts(&self, email: &str) -> u32 {
        let Some(redis) = &self.redis else {
            return 0;
        };
        let mut conn = redis.clone();
        let key = failed_login_key(email);
        let count: u32 = match redis::cmd("INCR").arg(&key).query_async(&mut conn).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Failed to increment failed login attempts: {}", e);
                return 0;
            }
        };
        if count == 1 {
            if let Err(e) = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(FAILED_LOGIN_WINDOW_SECONDS)
                .query_async::<()>(&mut conn)
                .await
            {
                tracing::warn!("Failed to set TTL for failed login attempts: {}", e);
            }
        }
        count
    }

    async fn clear_failed_attempts(&self, email: &str) {
        let Some(redis) = &self.redis else {
            return;
        };
        let mut conn = redis.clone();
        if let Err(e) = redis::cmd("DEL")
            .arg(failed_login_key(email))
            .query_async::<()>(&mut conn)
            .await
        {
            tracing::warn!("Failed to clear failed login attempts: {}", e);
        }
    }
}

fn failed_login_key(email: &str) -> String {
    format!("failed_login:{}", email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
