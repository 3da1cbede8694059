// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session provider: the source of truth for who is signed in.
//!
//! The provider owns the session. Everything downstream (the identity store,
//! route guards) observes it through [`SessionProvider::subscribe`], which
//! delivers change events at least once and possibly more than once.

use crate::error::AppError;
use crate::models::{Identity, Session, SessionEvent, SessionEventKind};
use crate::services::auth_api::{AuthApi, Credentials};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Delay before retrying a refresh that failed transiently.
const REFRESH_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(10);

/// Shortest wait between two background refreshes.
const MIN_REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// External session provider interface.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current valid session, if any.
    async fn get_session(&self) -> Result<Option<Session>, AppError>;

    /// Subscribe to session changes. Dropping the subscription unsubscribes.
    fn subscribe(&self) -> SessionSubscription;

    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AppError>;

    async fn sign_out(&self) -> Result<(), AppError>;

    /// Renew the current session. `Ok(None)` if there is nothing to renew.
    async fn refresh_session(&self) -> Result<Option<Session>, AppError>;
}

/// Stream of session events for one subscriber.
pub struct SessionSubscription {
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    pub fn new(rx: broadcast::Receiver<SessionEvent>) -> Self {
        Self { rx }
    }

    /// Next event in emission order, or `None` once the provider is gone.
    ///
    /// A subscriber that falls behind skips to the oldest retained event;
    /// the latest event is never dropped.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Session provider backed by the hosted auth API, keeping the session in memory.
pub struct SupabaseSession {
    api: AuthApi,
    current: watch::Sender<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SupabaseSession {
    pub fn new(api: AuthApi) -> Self {
        Self::with_session(api, None)
    }

    /// Start from a previously persisted session.
    pub fn with_session(api: AuthApi, session: Option<Session>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (current, _) = watch::channel(session);
        Self {
            api,
            current,
            events,
        }
    }

    /// Replace the cached session and notify subscribers.
    fn set(&self, kind: SessionEventKind, session: Option<Session>) {
        self.current.send_replace(session.clone());
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(SessionEvent { kind, session });
    }

    /// Replace the cached session only if it is still `from`.
    ///
    /// A renewal that finishes after a sign-out (or after another renewal
    /// rotated the refresh token) must not bring its session back.
    fn replace_if_current(
        &self,
        from: &Session,
        kind: SessionEventKind,
        session: Option<Session>,
    ) -> bool {
        let applied = self.current.send_if_modified(|current| {
            let still_current = current
                .as_ref()
                .is_some_and(|c| c.refresh_token == from.refresh_token);
            if still_current {
                *current = session.clone();
            }
            still_current
        });

        if applied {
            let _ = self.events.send(SessionEvent { kind, session });
        } else {
            tracing::debug!(
                user_id = %from.identity.id,
                ?kind,
                "Session changed during refresh, discarding result"
            );
        }
        applied
    }

    fn cached(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    /// Refresh `session`, clearing it if the refresh token was rejected.
    ///
    /// Returns the session that is current afterwards.
    async fn renew(&self, session: &Session) -> Result<Option<Session>, AppError> {
        match self.api.refresh(&session.refresh_token).await {
            Ok(renewed) => {
                if self.replace_if_current(
                    session,
                    SessionEventKind::TokenRefreshed,
                    Some(renewed.clone()),
                ) {
                    tracing::debug!(user_id = %renewed.identity.id, "Session refreshed");
                    return Ok(Some(renewed));
                }
                Ok(self.cached())
            }
            Err(AppError::Unauthorized) => {
                if self.replace_if_current(session, SessionEventKind::SignedOut, None) {
                    tracing::info!(user_id = %session.identity.id, "Refresh token rejected, signing out");
                }
                Ok(self.cached())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SessionProvider for SupabaseSession {
    async fn get_session(&self) -> Result<Option<Session>, AppError> {
        match self.cached() {
            Some(session) if session.is_expired(Utc::now()) => self.renew(&session).await,
            other => Ok(other),
        }
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription::new(self.events.subscribe())
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AppError> {
        let session = self.api.sign_in_with_password(credentials).await?;
        let identity = session.identity.clone();

        tracing::info!(user_id = %identity.id, "Signed in");
        self.set(SessionEventKind::SignedIn, Some(session));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        let Some(session) = self.cached() else {
            return Ok(());
        };

        match self.api.sign_out(&session.access_token).await {
            // Already revoked upstream counts as signed out.
            Ok(()) | Err(AppError::Unauthorized) => {}
            Err(e) => return Err(e),
        }

        tracing::info!(user_id = %session.identity.id, "Signed out");
        self.set(SessionEventKind::SignedOut, None);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, AppError> {
        match self.cached() {
            Some(session) => self.renew(&session).await,
            None => Ok(None),
        }
    }
}

/// How long to wait before refreshing `session`.
///
/// Normally `margin` before expiry. A token whose whole lifetime is inside
/// the margin is refreshed halfway through what is left, and never sooner
/// than [`MIN_REFRESH_INTERVAL`].
fn refresh_wait(session: &Session, margin: Duration, now: DateTime<Utc>) -> std::time::Duration {
    let wait = if session.expires_within(now, margin) {
        (session.expires_at - now) / 2
    } else {
        session.expires_at - margin - now
    };

    wait.to_std().unwrap_or_default().max(MIN_REFRESH_INTERVAL)
}

/// Keep the provider's session fresh in the background.
///
/// The session is refreshed `margin` before it expires. Transient failures
/// are retried after a short delay; the task ends when the provider is dropped.
pub fn spawn_auto_refresh(provider: Arc<SupabaseSession>, margin: Duration) -> JoinHandle<()> {
    let mut changes = provider.current.subscribe();
    let provider = Arc::downgrade(&provider);

    tokio::spawn(async move {
        loop {
            let session = changes.borrow_and_update().clone();

            let Some(session) = session else {
                if changes.changed().await.is_err() {
                    return;
                }
                continue;
            };

            let wait = refresh_wait(&session, margin, Utc::now());

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
            }

            let Some(provider) = provider.upgrade() else {
                return;
            };

            if let Err(e) = provider.refresh_session().await {
                tracing::warn!(error = %e, "Background session refresh failed, will retry");
                drop(provider);
                tokio::time::sleep(REFRESH_RETRY_DELAY).await;
            }
        }
    })
}
