//! Application configuration loaded from environment variables.
//!
//! The hosted backend connection (URL + anon key) is mandatory: without it no
//! session check can be trusted, so a missing or malformed value aborts
//! startup instead of falling back to a default.

use std::env;

/// Name of the cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
/// Name of the cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted backend project (e.g. `https://xyz.supabase.co`)
    pub supabase_url: String,
    /// Public anon key sent as `apikey` on every request
    pub supabase_anon_key: String,
    /// JWT secret used to verify access tokens at the edge (optional)
    pub supabase_jwt_secret: Option<Vec<u8>>,
    /// Public URL of this site, used for email redirect links
    pub site_url: String,
    /// Server port
    pub port: u16,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            supabase_jwt_secret: Some(b"test_jwt_secret_32_bytes_minimum!".to_vec()),
            site_url: "http://localhost:3000".to_string(),
            port: 8080,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let supabase_url = env::var("SUPABASE_URL")
            .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?
            .trim()
            .trim_end_matches('/')
            .to_string();
        validate_url("SUPABASE_URL", &supabase_url)?;

        let supabase_anon_key = env::var("SUPABASE_ANON_KEY")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?;
        if supabase_anon_key.is_empty() {
            return Err(ConfigError::Missing("SUPABASE_ANON_KEY"));
        }

        let site_url = env::var("SITE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        validate_url("SITE_URL", &site_url)?;

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(String::into_bytes),
            site_url,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.site_url.starts_with("https://")
    }
}

fn validate_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(value).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process-wide, so every env-dependent case
    // runs inside this one test.
    #[test]
    fn test_config_from_env() {
        env::set_var("SUPABASE_URL", "https://project.supabase.co/");
        env::set_var("SUPABASE_ANON_KEY", " anon ");
        env::remove_var("SUPABASE_JWT_SECRET");
        env::remove_var("SITE_URL");
        env::remove_var("PORT");

        let config = Config::from_env().expect("Config should load");
        assert_eq!(config.supabase_url, "https://project.supabase.co");
        assert_eq!(config.supabase_anon_key, "anon");
        assert!(config.supabase_jwt_secret.is_none());
        assert_eq!(config.site_url, "http://localhost:3000");
        assert_eq!(config.port, 8080);
        assert!(!config.secure_cookies());

        env::set_var("SUPABASE_URL", "not a url");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "SUPABASE_URL",
                ..
            })
        ));

        env::set_var("SUPABASE_URL", "ftp://project.supabase.co");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid { .. })
        ));

        env::set_var("SUPABASE_URL", "https://project.supabase.co");
        env::set_var("SUPABASE_ANON_KEY", "   ");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("SUPABASE_ANON_KEY"))
        ));

        env::remove_var("SUPABASE_URL");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("SUPABASE_URL"))
        ));
    }
}
