//! Signed-in principal as reported by the auth provider.

use serde::{Deserialize, Serialize};

/// Read-only view of the provider's user record.
///
/// Lifetime is bounded by the session it came from; the provider owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable unique identifier (provider user id, a UUID)
    pub id: String,
    /// Email address the principal signed in with
    pub email: String,
    /// Display name stored in user metadata at registration, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Identity {
    /// Email local-part (`alice` for `alice@example.com`).
    pub fn email_local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or_default()
    }
}
