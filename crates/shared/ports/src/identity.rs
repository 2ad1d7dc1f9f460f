use async_trait::async_trait;
use std::sync::Arc;

use crate::error::AuthError;

/// Capability of an already verified caller.
///
/// Token verification lives outside this crate; everything downstream only
/// needs a stable storage key and a profile to show.
pub trait AuthenticatedUser: Send + Sync {
    /// Key the user's documents are stored under
    fn db_key(&self) -> String;

    fn display_name(&self) -> String;

    fn profile_url(&self) -> String;
}

/// Resolves a bearer token to an authenticated user
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Arc<dyn AuthenticatedUser>, AuthError>;
}

/// Plain-data identity, used by static providers and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticUser {
    pub key: String,
    pub display_name: String,
    pub profile_url: String,
}

impl StaticUser {
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        profile_url: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            profile_url: profile_url.into(),
        }
    }
}

impl AuthenticatedUser for StaticUser {
    fn db_key(&self) -> String {
        self.key.clone()
    }

    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn profile_url(&self) -> String {
        self.profile_url.clone()
    }
}
