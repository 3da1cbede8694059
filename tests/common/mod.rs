// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::{Arc, Mutex};
use taskboard::config::Config;
use taskboard::error::AppError;
use taskboard::models::{Identity, Profile, Role, Session, SessionEvent};
use taskboard::routes::create_router;
use taskboard::services::{Credentials, SessionProvider, SessionSubscription};
use taskboard::AppState;
use tokio::sync::broadcast;

/// Config pointing at a mock backend.
#[allow(dead_code)]
pub fn test_config(backend_url: &str) -> Config {
    Config {
        supabase_url: backend_url.trim_end_matches('/').to_string(),
        ..Config::test_default()
    }
}

/// Create a test app whose backend calls go to `backend_url`.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(backend_url: &str) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(test_config(backend_url)).expect("Failed to build state"));
    (create_router(state.clone()), state)
}

/// Access token signed with the test secret.
#[allow(dead_code)]
pub fn access_token(user_id: &str) -> String {
    let claims = serde_json::json!({
        "sub": user_id,
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        "aud": "authenticated",
        "email": format!("{user_id}@example.com"),
    });
    let secret = Config::test_default()
        .supabase_jwt_secret
        .expect("test config has a secret");

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&secret),
    )
    .expect("Failed to create token")
}

#[allow(dead_code)]
pub fn identity(id: &str) -> Identity {
    Identity {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        display_name: None,
    }
}

#[allow(dead_code)]
pub fn session(id: &str) -> Session {
    Session {
        access_token: format!("access-{id}"),
        refresh_token: format!("refresh-{id}"),
        expires_at: Utc::now() + Duration::hours(1),
        identity: identity(id),
    }
}

#[allow(dead_code)]
pub fn profile(id: &str, role: Role) -> Profile {
    Profile {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        role,
        display_name: Some(id.to_string()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// User JSON as returned by the auth API.
#[allow(dead_code)]
pub fn user_json(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "email": format!("{id}@example.com"),
        "user_metadata": {}
    })
}

/// Token grant JSON as returned by the auth API.
#[allow(dead_code)]
pub fn token_json(id: &str, expires_in: i64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token(id),
        "refresh_token": format!("refresh-{id}"),
        "token_type": "bearer",
        "expires_in": expires_in,
        "user": user_json(id),
    })
}

/// Scriptable session provider.
#[allow(dead_code)]
pub struct FakeProvider {
    session: Mutex<Result<Option<Session>, String>>,
    sign_out_error: Mutex<Option<AppError>>,
    events: broadcast::Sender<SessionEvent>,
    pub sign_outs: Mutex<usize>,
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn new(session: Option<Session>) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            session: Mutex::new(Ok(session)),
            sign_out_error: Mutex::new(None),
            events,
            sign_outs: Mutex::new(0),
        })
    }

    /// Provider whose initial session check fails.
    pub fn unreachable() -> Arc<Self> {
        let provider = Self::new(None);
        *provider.session.lock().unwrap() = Err("connection refused".to_string());
        provider
    }

    pub fn fail_sign_out(&self, error: AppError) {
        *self.sign_out_error.lock().unwrap() = Some(error);
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn get_session(&self) -> Result<Option<Session>, AppError> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .map_err(AppError::Provider)
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription::new(self.events.subscribe())
    }

    async fn sign_in(&self, _credentials: &Credentials) -> Result<Identity, AppError> {
        Err(AppError::Unauthorized)
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        if let Some(error) = self.sign_out_error.lock().unwrap().take() {
            return Err(error);
        }
        *self.sign_outs.lock().unwrap() += 1;
        *self.session.lock().unwrap() = Ok(None);
        self.emit(SessionEvent::signed_out());
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, AppError> {
        Ok(self.session.lock().unwrap().clone().ok().flatten())
    }
}
