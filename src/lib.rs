// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Taskboard: session guard and auth flows for a task-management site.
//!
//! This crate provides the identity store and route authorizer that decide
//! what a visitor may see, a typed wrapper around the hosted auth and table
//! APIs, and the HTTP edge that serves the auth forms.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::SupabaseDb;
use services::{AuthApi, BootstrapLocks, ProfileService, RouteAuthorizer};
use std::sync::Arc;
use std::time::Duration;

/// Timeout for calls to the hosted backend.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth: AuthApi,
    pub db: SupabaseDb,
    pub bootstrap_locks: BootstrapLocks,
    pub authorizer: RouteAuthorizer,
}

impl AppState {
    /// Build the state and its HTTP client from `config`.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            auth: AuthApi::new(&config, http.clone()),
            db: SupabaseDb::new(&config, http),
            bootstrap_locks: Arc::new(dashmap::DashMap::new()),
            authorizer: RouteAuthorizer::default(),
            config,
        })
    }

    /// Profile service acting as the user behind `access_token`.
    pub fn profiles_for(&self, access_token: &str) -> ProfileService {
        ProfileService::new(
            Arc::new(self.db.with_access_token(access_token)),
            self.bootstrap_locks.clone(),
        )
    }
}
