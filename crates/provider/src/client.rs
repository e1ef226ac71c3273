use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;

/// Per-call credentials resolved from the vault. Passed explicitly on every
/// request so no client instance ever caches another tenant's token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub access_token: String,
    pub external_account_id: String,
}

/// The external advertising API, reduced to the four calls the ingestion
/// workflows need. Responses are opaque provider-shaped JSON; only the
/// extraction code interprets them.
#[async_trait]
pub trait AdsApiClient: Send + Sync {
    /// Campaigns of the ad account.
    async fn fetch_structure(
        &self,
        creds: &ProviderCredentials,
    ) -> Result<Vec<Value>, ProviderError>;

    /// Ad sets belonging to a campaign.
    async fn fetch_ad_sets(
        &self,
        creds: &ProviderCredentials,
        campaign_external_id: &str,
    ) -> Result<Vec<Value>, ProviderError>;

    /// Ads belonging to a campaign.
    async fn fetch_ads(
        &self,
        creds: &ProviderCredentials,
        campaign_external_id: &str,
    ) -> Result<Vec<Value>, ProviderError>;

    /// Daily insight buckets for a campaign, as one opaque payload.
    async fn fetch_daily_insights(
        &self,
        creds: &ProviderCredentials,
        campaign_external_id: &str,
    ) -> Result<Value, ProviderError>;
}

/// Graph-API-style HTTP implementation.
pub struct HttpAdsClient {
    client: reqwest::Client,
    api_base: String,
    api_version: String,
}

const CAMPAIGN_FIELDS: &str = "id,name,status,effective_status,objective,daily_budget,created_time,updated_time";
const AD_SET_FIELDS: &str = "id,name,status,effective_status,campaign_id,targeting,daily_budget,created_time,updated_time";
const AD_FIELDS: &str = "id,name,status,effective_status,campaign_id,adset_id,creative,created_time,updated_time";
const INSIGHT_FIELDS: &str = "impressions,spend,reach,actions,date_start,date_stop";

impl HttpAdsClient {
    pub fn new(api_base: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            api_version: api_version.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.api_version, path)
    }

    /// GET a provider edge and unwrap the `data` array.
    async fn fetch_edge(
        &self,
        creds: &ProviderCredentials,
        path: &str,
        fields: &str,
    ) -> Result<Vec<Value>, ProviderError> {
        let payload = self.fetch_raw(creds, path, fields).await?;
        match payload.get("data").and_then(Value::as_array) {
            Some(items) => Ok(items.clone()),
            None => Err(ProviderError::Shape(format!(
                "{}: response has no data array",
                path
            ))),
        }
    }

    async fn fetch_raw(
        &self,
        creds: &ProviderCredentials,
        path: &str,
        fields: &str,
    ) -> Result<Value, ProviderError> {
        let url = self.url(path);
        debug!(%url, "provider request");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", fields),
                ("access_token", creds.access_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl AdsApiClient for HttpAdsClient {
    async fn fetch_structure(
        &self,
        creds: &ProviderCredentials,
    ) -> Result<Vec<Value>, ProviderError> {
        let path = format!("act_{}/campaigns", creds.external_account_id);
        self.fetch_edge(creds, &path, CAMPAIGN_FIELDS).await
    }

    async fn fetch_ad_sets(
        &self,
        creds: &ProviderCredentials,
        campaign_external_id: &str,
    ) -> Result<Vec<Value>, ProviderError> {
        let path = format!("{}/adsets", campaign_external_id);
        self.fetch_edge(creds, &path, AD_SET_FIELDS).await
    }

    async fn fetch_ads(
        &self,
        creds: &ProviderCredentials,
        campaign_external_id: &str,
    ) -> Result<Vec<Value>, ProviderError> {
        let path = format!("{}/ads", campaign_external_id);
        self.fetch_edge(creds, &path, AD_FIELDS).await
    }

    async fn fetch_daily_insights(
        &self,
        creds: &ProviderCredentials,
        campaign_external_id: &str,
    ) -> Result<Value, ProviderError> {
        let path = format!("{}/insights", campaign_external_id);
        self.fetch_raw(creds, &path, INSIGHT_FIELDS).await
    }
}
