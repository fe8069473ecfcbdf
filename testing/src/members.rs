//! In-memory member directory.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use futures::future::BoxFuture;
use ordersystem_core::{MemberError, MemberId, MemberIdentity, MemberResolver, Principal};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Member directory keyed by login email.
///
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMemberDirectory {
    members: Arc<RwLock<HashMap<String, MemberIdentity>>>,
}

impl InMemoryMemberDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member (or return the existing one) and get its principal.
    pub fn register(&self, email: &str) -> (MemberIdentity, Principal) {
        let member = self
            .members
            .write()
            .unwrap()
            .entry(email.to_string())
            .or_insert_with(|| MemberIdentity {
                id: MemberId::new(),
                email: email.to_string(),
            })
            .clone();
        (member, Principal::new(email))
    }
}

impl MemberResolver for InMemoryMemberDirectory {
    fn resolve_current_member<'a>(
        &'a self,
        principal: &'a Principal,
    ) -> BoxFuture<'a, Result<MemberIdentity, MemberError>> {
        Box::pin(async move {
            if principal.is_blank() {
                return Err(MemberError::Unauthenticated);
            }
            self.members
                .read()
                .unwrap()
                .get(principal.as_str())
                .cloned()
                .ok_or_else(|| MemberError::NotFound(principal.to_string()))
        })
    }
}
