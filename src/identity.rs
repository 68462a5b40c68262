//! Identity & profile lookup
//!
//! Credentials and sessions are handled by the auth provider. The core only
//! sees an authenticated principal id and resolves it to a [`Profile`] whose
//! role gates administrative mutations.

use async_trait::async_trait;

use crate::error::{AuthorizationError, CivicResult};
use crate::models::{Profile, ProfileFilter, Role, UserId};

/// Profile lookup and user management
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get_profile(&self, user_id: UserId) -> CivicResult<Option<Profile>>;

    /// Matching profiles, newest first.
    async fn list_profiles(&self, filter: &ProfileFilter) -> CivicResult<Vec<Profile>>;

    async fn upsert_profile(&self, profile: Profile) -> CivicResult<Profile>;

    async fn update_role(&self, user_id: UserId, role: Role) -> CivicResult<Profile>;

    async fn count_profiles(&self) -> CivicResult<usize>;
}

/// Resolve a principal id to its profile.
pub async fn resolve_principal(
    directory: &dyn ProfileDirectory,
    user_id: UserId,
) -> CivicResult<Profile> {
    directory
        .get_profile(user_id)
        .await?
        .ok_or_else(|| AuthorizationError::UnknownPrincipal(user_id).into())
}

/// Fail unless `actor` is an administrator.
pub fn require_admin(actor: &Profile, action: &'static str) -> Result<(), AuthorizationError> {
    if actor.role.is_admin() {
        Ok(())
    } else {
        Err(AuthorizationError::AdminRequired { action })
    }
}
