//! Google OAuth 2.0 authorization-code flow

use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::config::GoogleOAuthConfig;
use crate::models::user::GoogleProfile;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: &str = "openid email profile";

/// Cookie holding the anti-forgery `state` between redirect and callback
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleOAuthClient<'a> {
    config: &'a GoogleOAuthConfig,
    http: &'a reqwest::Client,
}

impl<'a> GoogleOAuthClient<'a> {
    pub fn new(config: &'a GoogleOAuthConfig, http: &'a reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn authorize_url(&self, state: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
                ("access_type", "online"),
                ("prompt", "select_account"),
            ],
        )
    }

    /// Trades the callback `code` for an access token
    pub async fn exchange_code(&self, code: &str) -> anyhow::Result<String> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("Google token request failed")?
            .error_for_status()
            .context("Google rejected the authorization code")?;

        let token: TokenResponse = response
            .json()
            .await
            .context("Malformed Google token response")?;
        Ok(token.access_token)
    }

    pub async fn fetch_profile(&self, access_token: &str) -> anyhow::Result<GoogleProfile> {
        self.http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Google userinfo request failed")?
            .error_for_status()
            .context("Google userinfo returned an error")?
            .json::<GoogleProfile>()
            .await
            .context("Malformed Google userinfo response")
    }
}
