// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Upstream fetcher for the Meta Graph API.
//!
//! One HTTP GET per operation, with the configured timeout, no retries. Graph
//! error bodies are classified into [`UpstreamError`] so handlers can answer
//! with the matching HTTP status.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::error::AppError;

const CAMPAIGN_FIELDS: &str = "id,name,status,objective,created_time,updated_time,start_time,stop_time,daily_budget,lifetime_budget,budget_remaining,spend_cap";
const CAMPAIGN_INSIGHT_FIELDS: &str = "impressions,clicks,spend,ctr,cpc,actions,cost_per_action_type";
const ACCOUNT_INSIGHT_FIELDS: &str = "impressions,clicks,spend,ctr,cpc,cpm,reach,frequency,actions,cost_per_action_type";
const AD_FIELDS: &str = "id,name,status,created_time,updated_time,creative,targeting,bid_amount,bid_type";
const REVIEWABLE_STATUSES: &str = r#"["ACTIVE","PAUSED","PENDING_REVIEW","DISAPPROVED","PREAPPROVED","PENDING_BILLING_INFO","CAMPAIGN_PAUSED","ARCHIVED","ADSET_PAUSED"]"#;
const CAMPAIGN_ADS_LIMIT: &str = "100";

/// Graph error codes meaning the token is missing, expired or revoked.
const AUTH_ERROR_CODES: [i64; 2] = [190, 102];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Unavailable(String),
}

/// Fixed historical window used for every insights lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsightsWindow {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl InsightsWindow {
    fn time_range(&self) -> String {
        json!({
            "since": self.since.format("%Y-%m-%d").to_string(),
            "until": self.until.format("%Y-%m-%d").to_string(),
        })
        .to_string()
    }
}

/// Which ad-archive fields a route asks for. Both variants share one normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFieldSet {
    Standard,
    Extended,
    /// Minimal set used by the connectivity probe.
    Probe,
}

impl ArchiveFieldSet {
    pub fn fields(self) -> &'static str {
        match self {
            ArchiveFieldSet::Standard => concat!(
                "id,ad_creation_time,ad_creative_bodies,ad_creative_link_captions,",
                "ad_creative_link_descriptions,ad_creative_link_titles,ad_delivery_start_time,",
                "ad_delivery_stop_time,ad_snapshot_url,currency,impressions,page_id,page_name,",
                "publisher_platforms,spend"
            ),
            ArchiveFieldSet::Extended => concat!(
                "id,ad_creation_time,ad_creative_bodies,ad_creative_link_captions,",
                "ad_creative_link_descriptions,ad_creative_link_titles,ad_delivery_start_time,",
                "ad_delivery_stop_time,ad_snapshot_url,bylines,currency,delivery_by_region,",
                "demographic_distribution,estimated_audience_size,impressions,languages,page_id,",
                "page_name,publisher_platforms,spend,ad_creative_link_urls"
            ),
            ArchiveFieldSet::Probe => "id,page_name",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveFieldSet::Standard => "standard",
            ArchiveFieldSet::Extended => "extended",
            ArchiveFieldSet::Probe => "probe",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveQuery {
    pub search_terms: String,
    pub countries: String,
    pub active_status: String,
    /// `None` means every media type; the parameter is then omitted.
    pub media_type: Option<String>,
    pub limit: u32,
    pub field_set: ArchiveFieldSet,
}

impl ArchiveQuery {
    /// Upstream parameters that identify this query, without the token.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("search_terms", self.search_terms.clone()),
            ("ad_reached_countries", self.countries.clone()),
            ("ad_active_status", self.active_status.clone()),
            ("limit", self.limit.to_string()),
            ("fields", self.field_set.fields().to_string()),
        ];
        if let Some(media_type) = &self.media_type {
            params.push(("media_type", media_type.clone()));
        }
        params
    }
}

/// A page of Graph results: the `data` array plus the opaque `paging` cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphPage {
    pub data: Vec<Value>,
    pub paging: Option<Value>,
}

impl GraphPage {
    pub fn from_body(mut body: Value) -> Self {
        let data = match body.get_mut("data").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let paging = body.get("paging").filter(|p| !p.is_null()).cloned();
        Self { data, paging }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdsUpstream: Send + Sync {
    async fn search_ads_archive(
        &self,
        token: &str,
        query: &ArchiveQuery,
    ) -> Result<GraphPage, UpstreamError>;

    async fn list_campaigns(
        &self,
        token: &str,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError>;

    /// First insights row of a campaign within the window, if any.
    async fn campaign_insights(
        &self,
        token: &str,
        campaign_id: &str,
        window: InsightsWindow,
    ) -> Result<Option<Value>, UpstreamError>;

    async fn account_insights(
        &self,
        token: &str,
        account_id: &str,
        window: InsightsWindow,
    ) -> Result<Option<Value>, UpstreamError>;

    async fn campaign_ads(&self, token: &str, campaign_id: &str)
        -> Result<Vec<Value>, UpstreamError>;

    async fn ad_account(&self, token: &str, account_id: &str) -> Result<Value, UpstreamError>;

    async fn me(&self, token: &str) -> Result<Value, UpstreamError>;
}

/// HTTP client wrapper for talking to the Graph API.
#[derive(Clone)]
pub struct GraphClient {
    base_url: String,
    version: String,
    probe_timeout: Duration,
    client: Client,
}

impl GraphClient {
    pub fn try_new(config: UpstreamConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build upstream client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            version: config.version,
            probe_timeout: config.probe_timeout,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.version,
            path.trim_start_matches('/')
        )
    }

    async fn get(
        &self,
        path: &str,
        token: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<Value, UpstreamError> {
        let mut request = self
            .client
            .get(self.url(path))
            .query(&[("access_token", token)])
            .query(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!(path, "calling graph api");

        let response = request.send().await.map_err(|e| {
            let e = e.without_url();
            if e.is_timeout() {
                UpstreamError::Unavailable("Graph API request timed out".to_string())
            } else {
                UpstreamError::Unavailable(format!("Graph API request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = classify_failure(status, &body);
            tracing::warn!(path, %status, error = %error, "graph api returned an error");
            return Err(error);
        }

        response.json::<Value>().await.map_err(|e| {
            UpstreamError::Unavailable(format!(
                "Failed to parse Graph API response: {}",
                e.without_url()
            ))
        })
    }
}

#[async_trait]
impl AdsUpstream for GraphClient {
    async fn search_ads_archive(
        &self,
        token: &str,
        query: &ArchiveQuery,
    ) -> Result<GraphPage, UpstreamError> {
        let timeout = (query.field_set == ArchiveFieldSet::Probe).then_some(self.probe_timeout);
        let body = self
            .get("ads_archive", token, &query.params(), timeout)
            .await?;
        Ok(GraphPage::from_body(body))
    }

    async fn list_campaigns(
        &self,
        token: &str,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let params = [
            ("fields", CAMPAIGN_FIELDS.to_string()),
            ("limit", limit.to_string()),
            ("effective_status", REVIEWABLE_STATUSES.to_string()),
        ];
        let body = self
            .get(&format!("{account_id}/campaigns"), token, &params, None)
            .await?;
        Ok(GraphPage::from_body(body).data)
    }

    async fn campaign_insights(
        &self,
        token: &str,
        campaign_id: &str,
        window: InsightsWindow,
    ) -> Result<Option<Value>, UpstreamError> {
        let params = [
            ("fields", CAMPAIGN_INSIGHT_FIELDS.to_string()),
            ("time_range", window.time_range()),
        ];
        let body = self
            .get(&format!("{campaign_id}/insights"), token, &params, None)
            .await?;
        Ok(GraphPage::from_body(body).data.into_iter().next())
    }

    async fn account_insights(
        &self,
        token: &str,
        account_id: &str,
        window: InsightsWindow,
    ) -> Result<Option<Value>, UpstreamError> {
        let params = [
            ("fields", ACCOUNT_INSIGHT_FIELDS.to_string()),
            ("level", "account".to_string()),
            ("time_range", window.time_range()),
        ];
        let body = self
            .get(&format!("{account_id}/insights"), token, &params, None)
            .await?;
        Ok(GraphPage::from_body(body).data.into_iter().next())
    }

    async fn campaign_ads(
        &self,
        token: &str,
        campaign_id: &str,
    ) -> Result<Vec<Value>, UpstreamError> {
        let params = [
            ("fields", AD_FIELDS.to_string()),
            ("limit", CAMPAIGN_ADS_LIMIT.to_string()),
        ];
        let body = self
            .get(&format!("{campaign_id}/ads"), token, &params, None)
            .await?;
        Ok(GraphPage::from_body(body).data)
    }

    async fn ad_account(&self, token: &str, account_id: &str) -> Result<Value, UpstreamError> {
        let params = [("fields", "id,name,account_status".to_string())];
        self.get(account_id, token, &params, Some(self.probe_timeout))
            .await
    }

    async fn me(&self, token: &str) -> Result<Value, UpstreamError> {
        let params = [("fields", "id,name".to_string())];
        self.get("me", token, &params, Some(self.probe_timeout)).await
    }
}

/// Maps a non-2xx Graph response onto the domain error, keeping Graph's own
/// `error.message` when the body carries one.
pub fn classify_failure(status: StatusCode, body: &str) -> UpstreamError {
    let error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned());

    let message = error
        .as_ref()
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Graph API returned status {status}"));
    let is_oauth = error
        .as_ref()
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        == Some("OAuthException");
    let code = error.as_ref().and_then(|e| e.get("code")).and_then(Value::as_i64);
    let auth_code = code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c));

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || auth_code {
        return UpstreamError::Unauthenticated(message);
    }
    if status == StatusCode::BAD_REQUEST && is_oauth && code.is_none() {
        return UpstreamError::Unauthenticated(message);
    }
    if status == StatusCode::BAD_REQUEST {
        return UpstreamError::InvalidRequest(message);
    }

    UpstreamError::Unavailable(message)
}
