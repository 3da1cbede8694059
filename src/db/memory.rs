// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process profile store.
//!
//! Used by tests and local development. Unlike the REST store, bootstrap is
//! atomic: counting and inserting happen under the same lock, so the
//! "first profile is admin" rule holds even for concurrent signups.

use super::ProfileStore;
use crate::error::{AppError, Result};
use crate::models::{NewProfile, Profile, Role};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    rows: HashMap<String, Profile>,
    inserts: usize,
    fail_next: usize,
}

impl Inner {
    fn check_outage(&mut self) -> Result<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(AppError::Database("simulated outage".to_string()));
        }
        Ok(())
    }

    fn insert_row(&mut self, profile: NewProfile) -> Result<Profile> {
        if self.rows.contains_key(&profile.id) {
            return Err(AppError::Conflict(format!(
                "profile {} already exists",
                profile.id
            )));
        }

        let now = chrono::Utc::now();
        let row = Profile {
            id: profile.id,
            email: profile.email,
            role: profile.role,
            display_name: profile.display_name,
            created_at: now,
            updated_at: now,
        };
        self.rows.insert(row.id.clone(), row.clone());
        self.inserts += 1;
        Ok(row)
    }
}

/// Profile store backed by a `HashMap`.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row directly, bypassing bootstrap.
    pub async fn seed(&self, profile: Profile) {
        let mut inner = self.inner.lock().await;
        inner.rows.insert(profile.id.clone(), profile);
    }

    /// Make the next `n` operations fail with a transient database error.
    pub async fn fail_next(&self, n: usize) {
        self.inner.lock().await.fail_next = n;
    }

    /// Number of successful inserts since creation.
    pub async fn insert_count(&self) -> usize {
        self.inner.lock().await.inserts
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, id: &str) -> Result<Option<Profile>> {
        let mut inner = self.inner.lock().await;
        inner.check_outage()?;
        Ok(inner.rows.get(id).cloned())
    }

    async fn count(&self) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        inner.check_outage()?;
        Ok(inner.rows.len() as u64)
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile> {
        let mut inner = self.inner.lock().await;
        inner.check_outage()?;
        inner.insert_row(profile)
    }

    async fn bootstrap(
        &self,
        id: &str,
        email: &str,
        display_name: Option<String>,
    ) -> Result<Profile> {
        let mut inner = self.inner.lock().await;
        inner.check_outage()?;

        let role = Role::for_new_profile(inner.rows.len() as u64);
        inner.insert_row(NewProfile {
            id: id.to_string(),
            email: email.to_string(),
            role,
            display_name,
        })
    }
}
