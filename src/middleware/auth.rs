// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Edge pre-filter for protected pages.
//!
//! Coarse and role-blind: it only asks "is there a session?". Role checks
//! belong to the route authorizer, which runs after the identity and profile
//! have been resolved.

use crate::config::ACCESS_TOKEN_COOKIE;
use crate::error::AppError;
use crate::services::authorizer::login_redirect;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Audience the hosted auth service puts in user access tokens.
const TOKEN_AUDIENCE: &str = "authenticated";

/// Access token claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
}

/// Raw access token of the current request.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Session token from the cookie, falling back to a bearer header.
pub fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        let value = cookie.value();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Verify an access token.
///
/// With a secret the signature and audience are checked. Without one only
/// the expiry is, and the auth service remains the authority on validity.
pub fn verify_token(token: &str, secret: Option<&[u8]>) -> Result<SessionClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);

    let key = match secret {
        Some(secret) => {
            validation.set_audience(&[TOKEN_AUDIENCE]);
            DecodingKey::from_secret(secret)
        }
        None => {
            validation.insecure_disable_signature_validation();
            validation.validate_aud = false;
            DecodingKey::from_secret(&[])
        }
    };

    decode::<SessionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::InvalidToken)
}

/// Middleware that redirects requests without a valid session to the login page.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let verified = session_token(&jar, request.headers()).and_then(|token| {
        verify_token(&token, state.config.supabase_jwt_secret.as_deref())
            .ok()
            .map(|claims| (token, claims))
    });

    let Some((token, claims)) = verified else {
        tracing::debug!(path = %path, "No session, redirecting to login");
        return Redirect::temporary(&login_redirect(request.uri().path())).into_response();
    };

    tracing::debug!(user_id = %claims.sub, path = %path, "Session present");
    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(SessionToken(token));

    next.run(request).await
}
