use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use adflux_core::SyncError;

use crate::client::ProviderCredentials;

/// Resolves per-tenant provider secrets. The real vault (encrypted tenant
/// credential storage) lives outside this system; workflows only depend on
/// this seam.
#[async_trait]
pub trait CredentialVault: Send + Sync {
    /// Decrypted secrets for the tenant, or None if the tenant never
    /// connected the provider.
    async fn get_decrypted_secrets(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<ProviderCredentials>, SyncError>;

    /// Tenants with a working provider connection, used to install the
    /// repeating polls at startup.
    async fn connected_tenants(&self) -> Result<Vec<Uuid>, SyncError>;
}

/// In-memory vault seeded from config. Covers single-tenant dev setups and
/// tests; production deployments plug in their own implementation.
#[derive(Default)]
pub struct StaticVault {
    secrets: HashMap<Uuid, ProviderCredentials>,
}

impl StaticVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: Uuid, creds: ProviderCredentials) -> Self {
        self.secrets.insert(tenant_id, creds);
        self
    }
}

#[async_trait]
impl CredentialVault for StaticVault {
    async fn get_decrypted_secrets(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<ProviderCredentials>, SyncError> {
        Ok(self.secrets.get(&tenant_id).cloned())
    }

    async fn connected_tenants(&self) -> Result<Vec<Uuid>, SyncError> {
        Ok(self.secrets.keys().copied().collect())
    }
}
