//! Database layer (hosted Postgres via its REST interface).

pub mod memory;
pub mod supabase;

pub use memory::MemoryProfileStore;
pub use supabase::SupabaseDb;

use crate::error::Result;
use crate::models::{NewProfile, Profile, Role};
use async_trait::async_trait;

/// Table names as constants.
pub mod tables {
    pub const USERS: &str = "users";
}

/// Storage for profile rows, keyed by identity id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Look up a profile. `Ok(None)` means "not yet provisioned".
    async fn get(&self, id: &str) -> Result<Option<Profile>>;

    /// Number of profiles in the whole system.
    async fn count(&self) -> Result<u64>;

    /// Insert a new profile row, returning the stored row.
    async fn insert(&self, profile: NewProfile) -> Result<Profile>;

    /// Create the first profile for an identity.
    ///
    /// The default counts existing rows and then inserts, so two first-time
    /// signups racing each other can both observe a count of zero. Stores
    /// that can do better override this with an atomic version.
    async fn bootstrap(
        &self,
        id: &str,
        email: &str,
        display_name: Option<String>,
    ) -> Result<Profile> {
        let existing = self.count().await?;
        let role = Role::for_new_profile(existing);

        tracing::info!(id, existing, role = %role, "Bootstrapping profile");

        self.insert(NewProfile {
            id: id.to_string(),
            email: email.to_string(),
            role,
            display_name,
        })
        .await
    }
}
