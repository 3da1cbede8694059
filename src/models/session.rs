//! Sessions and session-change events.

use super::Identity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Time-bounded pairing of an identity with access credentials.
///
/// Owned by the provider; everything on this side treats it as a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub identity: Identity,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True if the session expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

/// What happened to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
    SignedIn,
    TokenRefreshed,
    SignedOut,
}

/// Notification emitted by a session provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}

impl SessionEvent {
    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            session: None,
        }
    }

    /// Identity carried by the event, `None` when the session was lost.
    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: DateTime<Utc>) -> Session {
        Session {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at,
            identity: Identity {
                id: "u1".to_string(),
                email: "u1@example.com".to_string(),
                display_name: None,
            },
        }
    }

    #[test]
    fn test_expiry_checks() {
        let now = Utc::now();
        let s = session(now + Duration::minutes(10));

        assert!(!s.is_expired(now));
        assert!(s.is_expired(now + Duration::minutes(10)));
        assert!(!s.expires_within(now, Duration::minutes(5)));
        assert!(s.expires_within(now, Duration::minutes(10)));
    }

    #[test]
    fn test_event_identity() {
        let s = session(Utc::now());
        assert_eq!(
            SessionEvent::signed_in(s.clone()).identity(),
            Some(&s.identity)
        );
        assert_eq!(SessionEvent::signed_out().identity(), None);
    }
}
