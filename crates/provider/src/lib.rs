//! Ads provider boundary: the HTTP client that talks to the external
//! advertising API and the credential vault that resolves per-tenant
//! secrets. Both are traits so the sync workflows can run against mocks.

pub mod client;
pub mod error;
pub mod vault;

pub use client::{AdsApiClient, HttpAdsClient, ProviderCredentials};
pub use error::ProviderError;
pub use vault::{CredentialVault, StaticVault};
