//! Approval lookups for the download access gate

use async_trait::async_trait;
use std::collections::HashSet;

use dvault_core::config::AccessConfig;
use dvault_core::{UserStatus, VaultResult};

/// Read-only view of forum user state.
///
/// `Ok(None)` means the user is unknown; the pipeline treats that as not
/// approved.
#[async_trait]
pub trait UserState: Send + Sync {
    async fn get(&self, user_id: i64) -> VaultResult<Option<UserStatus>>;
}

/// Fixed approval list, loaded from the `[access]` config section.
///
/// Every listed user is known and approved; everyone else is unknown.
#[derive(Debug, Clone, Default)]
pub struct StaticUserState {
    approved: HashSet<i64>,
}

impl StaticUserState {
    pub fn new(approved: impl IntoIterator<Item = i64>) -> Self {
        Self {
            approved: approved.into_iter().collect(),
        }
    }

    pub fn from_config(cfg: &AccessConfig) -> Self {
        Self::new(cfg.approved_users.iter().copied())
    }

    pub fn approve(&mut self, user_id: i64) {
        self.approved.insert(user_id);
    }

    pub fn revoke(&mut self, user_id: i64) -> bool {
        self.approved.remove(&user_id)
    }
}

#[async_trait]
impl UserState for StaticUserState {
    async fn get(&self, user_id: i64) -> VaultResult<Option<UserStatus>> {
        Ok(self
            .approved
            .contains(&user_id)
            .then_some(UserStatus { approved: true }))
    }
}
