// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route authorization: decides whether a location may be shown.
//!
//! The decision table is total over `{loading, identity, profile, required
//! role}` and never fails. While the identity store is loading the answer is
//! always [`Decision::Pending`], so nothing redirects before the initial
//! session check resolves.

use crate::models::Role;
use crate::services::identity_store::AuthState;
use std::sync::Mutex;

/// Unauthenticated entry point.
pub const LOGIN_PATH: &str = "/auth/login";
/// Default landing page for signed-in users.
pub const DEFAULT_LANDING: &str = "/dashboard";

/// Destination sink for redirects.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigator that records every destination it is given.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .map(|v| v.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn last(&self) -> Option<String> {
        self.visited().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        match self.visited.lock() {
            Ok(mut v) => v.push(path.to_string()),
            Err(poisoned) => poisoned.into_inner().push(path.to_string()),
        }
    }
}

/// Kind of area a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// Requires a signed-in identity, and optionally a role.
    Protected { required_role: Option<Role> },
    /// Only for signed-out visitors (login, registration).
    PublicOnly,
    /// Anyone.
    Public,
}

/// Authorization outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Session state not known yet; render a loading indicator.
    Pending,
    Allow,
    Redirect(String),
}

/// Maps path prefixes to areas. The longest matching prefix wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(String, Area)>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
            .with("/dashboard", Area::Protected { required_role: None })
            .with(
                "/dashboard/users",
                Area::Protected {
                    required_role: Some(Role::Admin),
                },
            )
            .with(
                "/dashboard/settings",
                Area::Protected {
                    required_role: Some(Role::Admin),
                },
            )
            .with(LOGIN_PATH, Area::PublicOnly)
            .with("/auth/register", Area::PublicOnly)
    }
}

impl RouteTable {
    /// An empty table: every path is public.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn with(mut self, prefix: impl Into<String>, area: Area) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches('/').to_string();
        self.routes.retain(|(p, _)| *p != prefix);
        self.routes.push((prefix, area));
        self
    }

    /// Area for `path` (query string ignored).
    pub fn area_for(&self, path: &str) -> Area {
        let path = strip_query(path);

        self.routes
            .iter()
            .filter(|(prefix, _)| matches_prefix(path, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, area)| *area)
            .unwrap_or(Area::Public)
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Segment-aware prefix match: `/dashboard` matches `/dashboard/x`, not `/dashboards`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Login URL that returns to `path` after signing in.
pub fn login_redirect(path: &str) -> String {
    format!("{}?returnUrl={}", LOGIN_PATH, urlencoding::encode(path))
}

/// Accept a post-login return target only if it stays on this site.
pub fn sanitize_return_url(return_url: Option<&str>) -> String {
    match return_url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') => {
            url.to_string()
        }
        _ => DEFAULT_LANDING.to_string(),
    }
}

/// Applies the decision table against a route table.
#[derive(Debug, Clone, Default)]
pub struct RouteAuthorizer {
    table: RouteTable,
}

impl RouteAuthorizer {
    pub fn new(table: RouteTable) -> Self {
        Self { table }
    }

    /// Decide for `path` using the route table.
    pub fn decide(&self, state: &AuthState, path: &str) -> Decision {
        decide(state, path, self.table.area_for(path))
    }
}

/// The decision table for a known area.
pub fn decide(state: &AuthState, path: &str, area: Area) -> Decision {
    if state.loading {
        return Decision::Pending;
    }

    let signed_in = state.identity.is_some();

    match area {
        Area::Public => Decision::Allow,
        Area::PublicOnly if signed_in => Decision::Redirect(DEFAULT_LANDING.to_string()),
        Area::PublicOnly => Decision::Allow,
        Area::Protected { .. } if !signed_in => Decision::Redirect(login_redirect(path)),
        Area::Protected {
            required_role: None,
        } => Decision::Allow,
        // A missing profile means the role is unknown, which is not a match.
        Area::Protected {
            required_role: Some(required),
        } => match state.role() {
            Some(role) if role == required => Decision::Allow,
            _ => Decision::Redirect(DEFAULT_LANDING.to_string()),
        },
    }
}

/// Result of rendering through a [`RouteGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Children(T),
    /// Loading indicator.
    Pending,
    /// Nothing rendered; a redirect was issued.
    Redirecting,
}

/// Guard wrapper around protected content.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteGuard {
    pub required_role: Option<Role>,
}

impl RouteGuard {
    pub fn new(required_role: Option<Role>) -> Self {
        Self { required_role }
    }

    pub fn decide(&self, state: &AuthState, path: &str) -> Decision {
        decide(
            state,
            path,
            Area::Protected {
                required_role: self.required_role,
            },
        )
    }

    /// Render `children` if allowed; otherwise navigate or show pending.
    ///
    /// `children` is only invoked when access is allowed.
    pub fn render<T>(
        &self,
        state: &AuthState,
        path: &str,
        navigator: &dyn Navigator,
        children: impl FnOnce() -> T,
    ) -> Guarded<T> {
        match self.decide(state, path) {
            Decision::Pending => Guarded::Pending,
            Decision::Allow => Guarded::Children(children()),
            Decision::Redirect(to) => {
                tracing::debug!(from = path, to = %to, "Guard redirect");
                navigator.navigate(&to);
                Guarded::Redirecting
            }
        }
    }
}
