// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hosted auth REST client.
//!
//! Handles:
//! - Password sign-in and token refresh
//! - Sign-up with display name in user metadata
//! - Sign-out (token revocation)
//! - Password recovery email and password update

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Identity, Session};
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Email + password credentials.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Result of a sign-up.
///
/// `session` is `None` when the project requires email confirmation before
/// the first sign-in.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub identity: Identity,
    pub session: Option<Session>,
}

/// Auth API client (stateless).
#[derive(Clone)]
pub struct AuthApi {
    http: reqwest::Client,
    auth_url: String,
    anon_key: String,
}

impl AuthApi {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            auth_url: format!("{}/auth/v1", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.auth_url, path))
            .header("apikey", &self.anon_key)
    }

    /// Sign in with email and password.
    pub async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session, AppError> {
        let response = self
            .post("/token")
            .query(&[("grant_type", "password")])
            .json(credentials)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Sign-in request failed: {}", e)))?;

        let token: TokenResponse = check_response_json(response).await?;
        Ok(token.into_session(Utc::now()))
    }

    /// Exchange a refresh token for a new session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, AppError> {
        let response = self
            .post("/token")
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Token refresh request failed: {}", e)))?;

        let token: TokenResponse = check_response_json(response).await?;
        Ok(token.into_session(Utc::now()))
    }

    /// Register a new account.
    pub async fn sign_up(
        &self,
        credentials: &Credentials,
        display_name: Option<&str>,
        email_redirect_to: &str,
    ) -> Result<SignUpOutcome, AppError> {
        let body = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
            "data": { "display_name": display_name },
        });

        let response = self
            .post("/signup")
            .query(&[("redirect_to", email_redirect_to)])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Sign-up request failed: {}", e)))?;

        let outcome = match check_response_json::<SignUpResponse>(response).await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session(Utc::now());
                SignUpOutcome {
                    identity: session.identity.clone(),
                    session: Some(session),
                }
            }
            SignUpResponse::User(user) => SignUpOutcome {
                identity: user.into_identity(),
                session: None,
            },
        };

        Ok(outcome)
    }

    /// Revoke the session behind `access_token`.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .post("/logout")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Sign-out request failed: {}", e)))?;

        check_response(response).await?;
        Ok(())
    }

    /// Resolve the user behind an access token.
    pub async fn get_user(&self, access_token: &str) -> Result<Identity, AppError> {
        let response = self
            .http
            .get(format!("{}/user", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("User lookup failed: {}", e)))?;

        let user: UserResponse = check_response_json(response).await?;
        Ok(user.into_identity())
    }

    /// Send a password recovery email linking back to `redirect_to`.
    pub async fn recover(&self, email: &str, redirect_to: &str) -> Result<(), AppError> {
        let response = self
            .post("/recover")
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Recovery request failed: {}", e)))?;

        check_response(response).await?;
        Ok(())
    }

    /// Set a new password for the user behind `access_token`.
    pub async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<Identity, AppError> {
        let response = self
            .http
            .put(format!("{}/user", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Password update failed: {}", e)))?;

        let user: UserResponse = check_response_json(response).await?;
        Ok(user.into_identity())
    }
}

/// Error body returned by the auth API. Field names vary by endpoint.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn message(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Map a non-2xx auth response to an error.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Unauthorized),
        StatusCode::BAD_REQUEST if body.error.as_deref() == Some("invalid_grant") => {
            Err(AppError::Unauthorized)
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            Err(AppError::BadRequest(body.message()))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!("Auth provider rate limit hit (429)");
            Err(AppError::Provider("rate limited".to_string()))
        }
        _ => Err(AppError::Provider(format!("HTTP {}: {}", status, text))),
    }
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    check_response(response)
        .await?
        .json()
        .await
        .map_err(|e| AppError::Provider(format!("JSON parse error: {}", e)))
}

/// Token grant response.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            identity: self.user.into_identity(),
        }
    }
}

/// User record.
#[derive(Debug, Clone, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<serde_json::Value>,
}

impl UserResponse {
    fn into_identity(self) -> Identity {
        let display_name = self
            .user_metadata
            .as_ref()
            .and_then(|m| m.get("display_name"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Identity {
            id: self.id,
            email: self.email.unwrap_or_default(),
            display_name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(UserResponse),
}
