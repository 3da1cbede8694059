// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity store: the process-wide view of who is signed in.
//!
//! Holds `{identity, profile, loading}` and keeps it in step with the session
//! provider. Views read it through [`IdentityWatcher`]; only the store's own
//! methods write it.
//!
//! Every change of identity bumps an epoch. Profile fetches run as separate
//! tasks tagged with the identity and epoch they were issued for, and their
//! result is dropped if either no longer matches when the fetch completes.
//! This keeps a slow fetch for a signed-out user from resurrecting its
//! profile.

use crate::error::AppError;
use crate::models::{Identity, Profile, Role, SessionEvent};
use crate::services::authorizer::{Navigator, LOGIN_PATH};
use crate::services::profile::ProfileService;
use crate::services::session::SessionProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Snapshot of the current authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    /// True until the initial session check (and the profile fetch for any
    /// newly signed-in identity) has completed. Nothing else in the state is
    /// trustworthy while it is set.
    pub loading: bool,
}

impl AuthState {
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|p| p.role)
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
        }
    }
}

/// Published state plus the bookkeeping that orders writes.
#[derive(Debug, Default)]
struct StoreState {
    auth: AuthState,
    /// Bumped whenever the identity changes.
    epoch: u64,
    /// Bumped on every session event.
    events: u64,
    initialized: bool,
    /// An event-triggered fetch for the current identity is running.
    inflight: bool,
    /// The in-flight fetch is for an identity that just appeared.
    resolving: bool,
}

impl StoreState {
    fn holds(&self, identity_id: &str) -> bool {
        self.auth
            .identity
            .as_ref()
            .is_some_and(|current| current.id == identity_id)
    }

    fn sync_loading(&mut self) {
        self.auth.loading = !self.initialized || self.resolving;
    }

    /// Make `identity` current. Returns the epoch to fetch its profile under,
    /// or `None` if no fetch is needed.
    fn adopt(&mut self, identity: &Identity) -> (bool, Option<u64>) {
        if self.holds(&identity.id) {
            let mut modified = false;
            if self.auth.identity.as_ref() != Some(identity) {
                self.auth.identity = Some(identity.clone());
                modified = true;
            }

            // Same principal again (duplicate or refresh): only fetch if the
            // profile is missing and nobody is fetching it already.
            if self.auth.profile.is_none() && !self.inflight {
                self.inflight = true;
                return (modified, Some(self.epoch));
            }
            return (modified, None);
        }

        self.epoch += 1;
        self.auth.identity = Some(identity.clone());
        self.auth.profile = None;
        self.inflight = true;
        self.resolving = true;
        self.sync_loading();
        (true, Some(self.epoch))
    }

    /// Forget the current identity. Returns whether anything changed.
    fn clear(&mut self) -> bool {
        let had_identity = self.auth.identity.is_some();
        let was_loading = self.auth.loading;

        if had_identity {
            self.epoch += 1;
        }
        self.auth.identity = None;
        self.auth.profile = None;
        self.inflight = false;
        self.resolving = false;
        self.sync_loading();

        had_identity || was_loading != self.auth.loading
    }
}

/// Read handle on the identity store.
#[derive(Clone)]
pub struct IdentityWatcher {
    rx: watch::Receiver<StoreState>,
}

impl IdentityWatcher {
    pub fn current(&self) -> AuthState {
        self.rx.borrow().auth.clone()
    }

    /// Wait for the next change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<AuthState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().auth.clone())
    }

    /// Wait until `loading` is false and return that state.
    pub async fn loaded(&mut self) -> Option<AuthState> {
        let state = self.rx.wait_for(|s| !s.auth.loading).await.ok()?;
        Some(state.auth.clone())
    }
}

struct Inner {
    provider: Arc<dyn SessionProvider>,
    profiles: ProfileService,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<StoreState>,
    initialize_started: AtomicBool,
}

/// Process-wide identity store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct IdentityStore {
    inner: Arc<Inner>,
}

impl IdentityStore {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        profiles: ProfileService,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            inner: Arc::new(Inner {
                provider,
                profiles,
                navigator,
                state,
                initialize_started: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> IdentityWatcher {
        IdentityWatcher {
            rx: self.inner.state.subscribe(),
        }
    }

    /// Current state snapshot.
    pub fn current(&self) -> AuthState {
        self.inner.state.borrow().auth.clone()
    }

    /// Initial session check. Runs once per store; later calls do nothing.
    ///
    /// If a session exists its profile is fetched (or bootstrapped) before
    /// `loading` clears. If the provider cannot be reached the store stays
    /// loading until the provider reports a session event.
    pub async fn initialize(&self) {
        if self.inner.initialize_started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Identity store already initialized, ignoring");
            return;
        }

        let events_before = self.inner.state.borrow().events;

        let session = match self.inner.provider.get_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Initial session check failed");
                return;
            }
        };

        let mut fetch = None;
        self.inner.state.send_if_modified(|s| {
            // A session event arrived while we were asking: it is newer.
            if s.events != events_before {
                return false;
            }

            match &session {
                Some(session) => {
                    let (modified, epoch) = s.adopt(&session.identity);
                    fetch = epoch.map(|epoch| (session.identity.clone(), epoch));
                    modified
                }
                None => false,
            }
        });

        if let Some((identity, epoch)) = fetch {
            self.fetch_tagged(identity, epoch, true).await;
        }

        self.inner.state.send_modify(|s| {
            s.initialized = true;
            s.sync_loading();
        });

        tracing::debug!(
            signed_in = self.current().identity.is_some(),
            "Identity store initialized"
        );
    }

    /// Apply a session-change event.
    ///
    /// Never fails. Returns the handle of the profile fetch the event started,
    /// if any; the state is already updated when this returns.
    pub fn on_session_changed(&self, event: SessionEvent) -> Option<JoinHandle<()>> {
        let mut fetch = None;

        self.inner.state.send_if_modified(|s| {
            s.events += 1;
            let was_initialized = s.initialized;
            // The provider has answered, so the state is known.
            s.initialized = true;

            let modified = match event.identity() {
                Some(identity) => {
                    let (modified, epoch) = s.adopt(identity);
                    fetch = epoch.map(|epoch| (identity.clone(), epoch));
                    modified
                }
                None => s.clear(),
            };

            s.sync_loading();
            modified || !was_initialized
        });

        tracing::debug!(
            kind = ?event.kind,
            user_id = event.identity().map(|i| i.id.as_str()),
            fetching = fetch.is_some(),
            "Session changed"
        );

        fetch.map(|(identity, epoch)| {
            let store = self.clone();
            tokio::spawn(async move { store.fetch_tagged(identity, epoch, true).await })
        })
    }

    /// Fetch (or bootstrap) the profile for `identity` if it is current.
    pub async fn fetch_profile(&self, identity: &Identity) {
        let epoch = {
            let state = self.inner.state.borrow();
            if !state.holds(&identity.id) {
                tracing::debug!(user_id = %identity.id, "Not the current identity, skipping fetch");
                return;
            }
            state.epoch
        };

        self.fetch_tagged(identity.clone(), epoch, false).await;
    }

    /// Re-fetch the current identity's profile. No-op when signed out.
    pub async fn refresh_profile(&self) {
        let Some(identity) = self.current().identity else {
            return;
        };
        self.fetch_profile(&identity).await;
    }

    /// Sign out upstream, clear local state, and navigate to the login page.
    ///
    /// On failure nothing local changes and the error is returned.
    pub async fn sign_out(&self) -> Result<(), AppError> {
        if let Err(e) = self.inner.provider.sign_out().await {
            tracing::error!(error = %e, "Error signing out");
            return Err(e);
        }

        self.inner.state.send_if_modified(|s| {
            s.initialized = true;
            s.clear()
        });
        self.inner.navigator.navigate(LOGIN_PATH);
        Ok(())
    }

    /// Process provider events in order until the returned handle is dropped.
    pub fn listen(&self) -> Listener {
        let mut subscription = self.inner.provider.subscribe();
        let store = self.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                store.on_session_changed(event);
            }
            tracing::debug!("Session provider closed, listener exiting");
        });

        Listener { handle }
    }

    /// Run a fetch issued under `epoch` and apply it if still current.
    ///
    /// `owns_flags` marks the fetch that the in-flight bookkeeping refers to.
    async fn fetch_tagged(&self, identity: Identity, epoch: u64, owns_flags: bool) {
        let result = self.inner.profiles.load_or_bootstrap(&identity).await;

        self.inner.state.send_if_modified(|s| {
            if s.epoch != epoch || !s.holds(&identity.id) {
                tracing::debug!(
                    user_id = %identity.id,
                    epoch,
                    current_epoch = s.epoch,
                    "Discarding stale profile fetch"
                );
                return false;
            }

            match result {
                Ok(profile) => {
                    s.auth.profile = Some(profile);
                    s.inflight = false;
                    s.resolving = false;
                }
                Err(e) => {
                    tracing::error!(user_id = %identity.id, error = %e, "Error fetching user profile");
                    if owns_flags {
                        s.inflight = false;
                        s.resolving = false;
                    }
                }
            }

            s.sync_loading();
            true
        });
    }
}

/// Running event listener. Dropping it unsubscribes.
pub struct Listener {
    handle: JoinHandle<()>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
