//! Allow-list identity provider

use crate::ports::outbound::IdentityProvider;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{CallerId, SyncError, TenantId};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Callers explicitly granted access, per tenant.
#[derive(Debug, Default)]
pub struct AllowListIdentity {
    members: RwLock<HashMap<TenantId, HashSet<CallerId>>>,
}

impl AllowListIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&self, tenant_id: &TenantId, caller_id: &CallerId) {
        self.members
            .write()
            .entry(tenant_id.clone())
            .or_default()
            .insert(caller_id.clone());
    }

    /// Returns whether the caller had access.
    pub fn revoke(&self, tenant_id: &TenantId, caller_id: &CallerId) -> bool {
        self.members
            .write()
            .get_mut(tenant_id)
            .is_some_and(|callers| callers.remove(caller_id))
    }
}

#[async_trait]
impl IdentityProvider for AllowListIdentity {
    async fn authorize(&self, tenant_id: &TenantId, caller_id: &CallerId) -> Result<(), SyncError> {
        let allowed = self
            .members
            .read()
            .get(tenant_id)
            .is_some_and(|callers| callers.contains(caller_id));
        if allowed {
            return Ok(());
        }

        warn!(tenant_id = %tenant_id, caller_id = %caller_id, "Rejected unauthorized caller");
        Err(SyncError::Unauthorized {
            tenant_id: tenant_id.to_string(),
            caller_id: caller_id.to_string(),
        })
    }
}
