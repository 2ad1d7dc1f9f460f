use async_trait::async_trait;
use papertrade_ports::{AuthError, AuthenticatedUser, IdentityProvider, StaticUser};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::IdentityEntry;

/// Fixed token table for local runs and tests
#[derive(Default)]
pub struct StaticIdentityProvider {
    users: HashMap<String, Arc<StaticUser>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[IdentityEntry]) -> Self {
        entries.iter().fold(Self::new(), |provider, entry| {
            provider.with_user(
                &entry.token,
                StaticUser::new(&entry.key, &entry.display_name, &entry.profile_url),
            )
        })
    }

    pub fn with_user(mut self, token: impl Into<String>, user: StaticUser) -> Self {
        self.users.insert(token.into(), Arc::new(user));
        self
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<Arc<dyn AuthenticatedUser>, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        match self.users.get(token) {
            Some(user) => Ok(user.clone()),
            None => Err(AuthError::InvalidToken),
        }
    }
}
