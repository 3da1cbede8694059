// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dashboard routes (require a session via the edge pre-filter).
//!
//! The pre-filter only proves a session cookie exists. Here the identity and
//! profile are resolved and the full route authorizer decides, including
//! role checks.

use crate::error::{AppError, Result};
use crate::middleware::auth::{SessionClaims, SessionToken};
use crate::models::Role;
use crate::services::authorizer::{login_redirect, Decision};
use crate::services::AuthState;
use crate::AppState;
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Dashboard routes. The session pre-filter is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(view))
        .route("/dashboard/{*rest}", get(view))
}

/// The signed-in viewer of a dashboard page.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ViewerResponse {
    pub id: String,
    pub email: String,
    pub role: Option<Role>,
    pub display_name: Option<String>,
    pub path: String,
}

/// Resolve the viewer and apply the route authorizer.
async fn view(
    State(state): State<Arc<AppState>>,
    Extension(SessionToken(token)): Extension<SessionToken>,
    Extension(claims): Extension<SessionClaims>,
    uri: Uri,
) -> Result<Response> {
    let path = uri.path();

    let identity = match state.auth.get_user(&token).await {
        Ok(identity) => identity,
        // Token passed the pre-filter but was revoked upstream.
        Err(AppError::Unauthorized) => {
            tracing::info!(path, "Session revoked, redirecting to login");
            return Ok(Redirect::temporary(&login_redirect(path)).into_response());
        }
        // Session state unknown until the auth service answers.
        Err(e) if e.is_transient() => {
            tracing::warn!(user_id = %claims.sub, path, error = %e, "Session check unavailable");
            return Ok(pending());
        }
        Err(e) => return Err(e),
    };

    if identity.id != claims.sub {
        tracing::warn!(
            user_id = %identity.id,
            subject = %claims.sub,
            "Token subject does not match session user, redirecting to login"
        );
        return Ok(Redirect::temporary(&login_redirect(path)).into_response());
    }

    let profile = match state.profiles_for(&token).load_or_bootstrap(&identity).await {
        Ok(profile) => Some(profile),
        Err(e) => {
            tracing::error!(user_id = %identity.id, error = %e, "Error fetching user profile");
            None
        }
    };

    let auth = AuthState {
        identity: Some(identity.clone()),
        profile,
        loading: false,
    };

    match state.authorizer.decide(&auth, path) {
        Decision::Allow => {
            let profile = auth.profile;
            Ok(Json(ViewerResponse {
                id: identity.id,
                email: identity.email,
                role: profile.as_ref().map(|p| p.role),
                display_name: profile
                    .and_then(|p| p.display_name)
                    .or(identity.display_name),
                path: path.to_string(),
            })
            .into_response())
        }
        Decision::Redirect(to) => {
            tracing::debug!(path, to = %to, "Dashboard access redirected");
            Ok(Redirect::temporary(&to).into_response())
        }
        Decision::Pending => Ok(pending()),
    }
}

fn pending() -> Response {
    StatusCode::SERVICE_UNAVAILABLE.into_response()
}
