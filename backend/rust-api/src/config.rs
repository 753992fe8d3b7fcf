use serde::Deserialize;
use std::env;
use std::path::PathBuf;

const DEV_JWT_SECRET: &str = "dev-secret-only-for-local-testing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self, config::ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(config::ConfigError::Message(format!(
                "Unknown store backend '{}': expected 'mongo' or 'memory'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Rate limiting and login lockout are skipped when unset
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub cookie_secure: bool,
    pub client_url: String,
    pub google: Option<GoogleOAuthConfig>,
    pub upload_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            store_backend: StoreBackend::Mongo,
            mongo_uri: "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
            mongo_database: "ecoquiz".to_string(),
            redis_uri: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_hours: 24 * 7,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            cookie_secure: false,
            client_url: "http://localhost:5173".to_string(),
            google: None,
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        // Plain env vars win over APP__ vars and config/{APP_ENV}.toml
        let lookup = |key: &str, var: &str| -> Option<String> {
            env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| settings.get_string(key).ok())
                .filter(|v| !v.trim().is_empty())
        };

        let defaults = Config::default();

        let port = match lookup("server.port", "PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| {
                config::ConfigError::Message(format!("Invalid port '{}': {}", raw, e))
            })?,
            None => defaults.port,
        };

        let store_backend = match lookup("database.backend", "STORE_BACKEND") {
            Some(raw) => StoreBackend::parse(&raw)?,
            None => defaults.store_backend,
        };

        let jwt_secret = match lookup("auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            None => {
                tracing::warn!("Using default JWT_SECRET (dev mode only!)");
                defaults.jwt_secret
            }
        };

        let token_ttl_hours = match lookup("auth.token_ttl_hours", "JWT_TTL_HOURS") {
            Some(raw) => raw.parse::<i64>().map_err(|e| {
                config::ConfigError::Message(format!("Invalid token TTL '{}': {}", raw, e))
            })?,
            None => defaults.token_ttl_hours,
        };

        let bcrypt_cost = match lookup("auth.bcrypt_cost", "BCRYPT_COST") {
            Some(raw) => raw.parse::<u32>().map_err(|e| {
                config::ConfigError::Message(format!("Invalid bcrypt cost '{}': {}", raw, e))
            })?,
            None => defaults.bcrypt_cost,
        };

        let cookie_secure = lookup("auth.cookie_secure", "COOKIE_SECURE")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(app_env == "prod");

        let google = match (
            lookup("google.client_id", "GOOGLE_CLIENT_ID"),
            lookup("google.client_secret", "GOOGLE_CLIENT_SECRET"),
            lookup("google.redirect_url", "GOOGLE_REDIRECT_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_url)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            _ => None,
        };

        Ok(Config {
            port,
            store_backend,
            mongo_uri: lookup("database.mongo_uri", "MONGO_URI").unwrap_or(defaults.mongo_uri),
            mongo_database: lookup("database.mongo_database", "MONGO_DATABASE")
                .unwrap_or(defaults.mongo_database),
            redis_uri: lookup("redis.uri", "REDIS_URI"),
            jwt_secret,
            token_ttl_hours,
            bcrypt_cost,
            cookie_secure,
            client_url: lookup("client.url", "CLIENT_URL").unwrap_or(defaults.client_url),
            google,
            upload_dir: lookup("uploads.dir", "UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "APP_ENV",
            "PORT",
            "STORE_BACKEND",
            "JWT_SECRET",
            "JWT_TTL_HOURS",
            "REDIS_URI",
            "GOOGLE_CLIENT_ID",
            "GOOGLE_CLIENT_SECRET",
            "GOOGLE_REDIRECT_URL",
        ] {
            env::remove_var(var);
        }
        env::set_var("SKIP_ROOT_ENV", "1");
    }

    #[test]
    #[serial]
    fn test_defaults_in_dev() {
        clear_env();
        let config = Config::load().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.token_ttl_hours, 168);
        assert!(config.redis_uri.is_none());
        assert!(config.google.is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("PORT", "9090");
        env::set_var("STORE_BACKEND", "memory");
        env::set_var("JWT_SECRET", "s3cret");
        let config = Config::load().unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.jwt_secret, "s3cret");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_prod_requires_jwt_secret() {
        clear_env();
        env::set_var("APP_ENV", "prod");
        assert!(Config::load().is_err());
        clear_env();
    }
}
