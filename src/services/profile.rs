// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile lookup with lazy first-login bootstrap.

use crate::db::ProfileStore;
use crate::error::{AppError, Result};
use crate::models::{Identity, Profile};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared per-identity bootstrap locks.
///
/// Share one map across every `ProfileService` in the process so that two
/// callers bootstrapping the same identity never insert twice.
pub type BootstrapLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Resolves the profile for an identity, creating it on first login.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    locks: BootstrapLocks,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ProfileStore>, locks: BootstrapLocks) -> Self {
        Self { store, locks }
    }

    /// A service with its own lock map, for single-owner use.
    pub fn standalone(store: Arc<dyn ProfileStore>) -> Self {
        Self::new(store, Arc::new(DashMap::new()))
    }

    /// Fetch the identity's profile, bootstrapping it if absent.
    ///
    /// Bootstrap runs only when no row exists. The display name defaults to
    /// the identity's own, then to the email local-part.
    pub async fn load_or_bootstrap(&self, identity: &Identity) -> Result<Profile> {
        // Fast path: no lock needed when the row exists.
        if let Some(profile) = self.store.get(&identity.id).await? {
            return Ok(profile);
        }

        let lock = self
            .locks
            .entry(identity.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another task may have bootstrapped while we were waiting.
        if let Some(profile) = self.store.get(&identity.id).await? {
            return Ok(profile);
        }

        let display_name = default_display_name(identity);
        match self
            .store
            .bootstrap(&identity.id, &identity.email, Some(display_name))
            .await
        {
            Ok(profile) => {
                tracing::info!(
                    user_id = %profile.id,
                    role = %profile.role,
                    "Profile created on first login"
                );
                Ok(profile)
            }
            // Created concurrently by another process: use that row.
            Err(AppError::Conflict(_)) => {
                tracing::debug!(user_id = %identity.id, "Profile insert conflicted, re-reading");
                self.store.get(&identity.id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Profile {} after conflict", identity.id))
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Name used when neither a display name nor an email local-part exists.
const FALLBACK_DISPLAY_NAME: &str = "User";

/// Display name for a new profile: the supplied one, else the email local-part.
pub fn default_display_name(identity: &Identity) -> String {
    identity
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or_else(|| Some(identity.email_local_part()).filter(|local| !local.is_empty()))
        .unwrap_or(FALLBACK_DISPLAY_NAME)
        .to_string()
}
