// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth form routes: login, registration, password reset and update, logout.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::config::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::db::SupabaseDb;
use crate::error::{AppError, Result};
use crate::middleware::auth::session_token;
use crate::models::{Identity, Session};
use crate::services::authorizer::{sanitize_return_url, LOGIN_PATH};
use crate::services::{Credentials, ProfileService};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/update-password", post(update_password))
        .route("/auth/logout", post(logout))
}

/// Response telling the page where to go next.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "returnUrl")]
    return_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 6))]
    pub password: String,
}

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn removal_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    Cookie::build(name)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn with_session_cookies(jar: CookieJar, session: &Session, secure: bool) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        session.access_token.clone(),
        secure,
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        session.refresh_token.clone(),
        secure,
    ))
}

/// Make sure a profile exists. Failures are logged; auth already succeeded.
async fn ensure_profile(profiles: &ProfileService, identity: &Identity) {
    if let Err(e) = profiles.load_or_bootstrap(identity).await {
        tracing::error!(user_id = %identity.id, error = %e, "Profile bootstrap failed, continuing");
    }
}

/// Sign in and bootstrap the profile on first login.
async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    body.validate()?;

    let credentials = Credentials {
        email: body.email.trim().to_string(),
        password: body.password,
    };
    let session = state.auth.sign_in_with_password(&credentials).await?;

    tracing::info!(user_id = %session.identity.id, "Login successful");

    ensure_profile(
        &state.profiles_for(&session.access_token),
        &session.identity,
    )
    .await;

    let jar = with_session_cookies(jar, &session, state.config.secure_cookies());
    let redirect_to = sanitize_return_url(query.return_url.as_deref());

    Ok((
        jar,
        Json(AuthResponse {
            redirect_to: Some(redirect_to),
            message: "Signed in".to_string(),
        }),
    ))
}

/// Create the account, then its profile (first account becomes admin).
async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    body.validate()?;

    let display_name = body
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let credentials = Credentials {
        email: body.email.trim().to_string(),
        password: body.password.clone(),
    };
    let email_redirect_to = format!("{}/auth/callback", state.config.site_url);

    let outcome = state
        .auth
        .sign_up(&credentials, display_name, &email_redirect_to)
        .await?;

    let mut identity = outcome.identity;
    if identity.email.is_empty() {
        identity.email = credentials.email.clone();
    }
    if identity.display_name.is_none() {
        identity.display_name = display_name.map(str::to_string);
    }

    tracing::info!(
        user_id = %identity.id,
        confirmed = outcome.session.is_some(),
        "Account created"
    );

    let db: SupabaseDb = match &outcome.session {
        Some(session) => state.db.with_access_token(&session.access_token),
        None => state.db.clone(),
    };
    let profiles = ProfileService::new(Arc::new(db), state.bootstrap_locks.clone());
    ensure_profile(&profiles, &identity).await;

    Ok(Json(AuthResponse {
        redirect_to: Some(format!("{}?registered=true", LOGIN_PATH)),
        message: "Account created successfully! You will be redirected to the login page."
            .to_string(),
    }))
}

/// Send a password reset email linking to the update-password page.
async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<AuthResponse>> {
    body.validate()?;

    let redirect_to = format!("{}/auth/update-password", state.config.site_url);
    state.auth.recover(body.email.trim(), &redirect_to).await?;

    tracing::info!("Password reset email requested");

    Ok(Json(AuthResponse {
        redirect_to: None,
        message: "Check your email for a password reset link".to_string(),
    }))
}

/// Set a new password for the signed-in (or recovering) user.
async fn update_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<UpdatePasswordRequest>,
) -> Result<Json<AuthResponse>> {
    body.validate()?;

    let token = session_token(&jar, &headers).ok_or(AppError::Unauthorized)?;
    let identity = state.auth.update_password(&token, &body.password).await?;

    tracing::info!(user_id = %identity.id, "Password updated");

    Ok(Json(AuthResponse {
        redirect_to: Some(format!("{}?reset=true", LOGIN_PATH)),
        message: "Password updated successfully! You will be redirected to the login page."
            .to_string(),
    }))
}

/// Revoke the session upstream (best-effort) and clear the cookies.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> (CookieJar, Json<AuthResponse>) {
    if let Some(token) = session_token(&jar, &headers) {
        if let Err(e) = state.auth.sign_out(&token).await {
            tracing::warn!(error = %e, "Upstream sign-out failed, clearing cookies anyway");
        }
    }

    let secure = state.config.secure_cookies();
    let jar = jar
        .remove(removal_cookie(ACCESS_TOKEN_COOKIE, secure))
        .remove(removal_cookie(REFRESH_TOKEN_COOKIE, secure));

    (
        jar,
        Json(AuthResponse {
            redirect_to: Some(LOGIN_PATH.to_string()),
            message: "Signed out".to_string(),
        }),
    )
}
