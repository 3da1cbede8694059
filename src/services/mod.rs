// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - session guard and backend wrappers.

pub mod auth_api;
pub mod authorizer;
pub mod identity_store;
pub mod profile;
pub mod session;

pub use auth_api::{AuthApi, Credentials, SignUpOutcome};
pub use authorizer::{
    Area, Decision, Guarded, Navigator, RecordingNavigator, RouteAuthorizer, RouteGuard,
    RouteTable,
};
pub use identity_store::{AuthState, IdentityStore, IdentityWatcher, Listener};
pub use profile::{BootstrapLocks, ProfileService};
pub use session::{spawn_auto_refresh, SessionProvider, SessionSubscription, SupabaseSession};
