// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Data models for normalized Meta ads data and the HTTP envelope.
//!
//! Everything here is the stable, display-ready shape served to clients.
//! Raw Graph API payloads never leave the `normalize` module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;

/// Meta obscures exact counts behind a `{lower_bound, upper_bound}` pair.
/// Bounds stay opaque numeric strings exactly as returned upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundedRange {
    pub lower_bound: Option<String>,
    pub upper_bound: Option<String>,
}

impl BoundedRange {
    /// Midpoint of the range, treating a missing bound as the other one.
    pub fn midpoint(&self) -> Option<f64> {
        let lower = self.lower_bound.as_deref().and_then(|v| v.parse::<f64>().ok());
        let upper = self.upper_bound.as_deref().and_then(|v| v.parse::<f64>().ok());
        match (lower, upper) {
            (Some(lo), Some(hi)) => Some((lo + hi) / 2.0),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Yellow,
    Blue,
    Red,
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReachTier {
    Low,
    Good,
    High,
    Premium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightSummary {
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub ctr: f64,
    pub cpc: f64,
    /// `None` when spend is zero and no filler policy is configured.
    pub roas: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    pub status_label: String,
    pub status_color: StatusColor,
    pub objective: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub start_at: Option<DateTime<Utc>>,
    pub stop_at: Option<DateTime<Utc>>,
    pub daily_budget: Option<String>,
    pub lifetime_budget: Option<String>,
    pub budget_remaining: Option<String>,
    pub spend_cap: Option<String>,
    pub insights: InsightSummary,
    pub niche: String,
    pub format: String,
    pub ticket_label: String,
    pub reach_tier: ReachTier,
    pub ads_manager_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdLibraryEntry {
    pub id: String,
    pub page_id: Option<String>,
    pub page_name: String,
    pub creative_bodies: Vec<String>,
    pub title: String,
    pub body: String,
    pub caption: Option<String>,
    pub snapshot_url: Option<String>,
    pub library_url: String,
    pub creation_time: Option<String>,
    pub delivery_start: Option<String>,
    pub delivery_stop: Option<String>,
    pub impressions: Option<BoundedRange>,
    pub spend: Option<BoundedRange>,
    pub impressions_display: String,
    pub spend_display: String,
    pub currency: String,
    pub platforms: Vec<String>,
    pub demographics: Vec<serde_json::Value>,
    pub languages: Vec<String>,
    pub estimated_audience: Option<BoundedRange>,
    pub is_active: bool,
    pub status_label: String,
}

/// One page of ad-library results as cached and served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdSearchPage {
    pub entries: Vec<AdLibraryEntry>,
    pub paging: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignAd {
    pub id: String,
    pub name: String,
    pub status: String,
    pub status_label: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub creative: Option<serde_json::Value>,
    pub targeting: Option<serde_json::Value>,
    pub bid_amount: Option<f64>,
    pub bid_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    pub total_campaigns: usize,
    pub active_campaigns: usize,
    pub paused_campaigns: usize,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub reach: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    FacebookApi,
    Mock,
}

/// Uniform success envelope. Failures are rendered by `AppError`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<DataSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            total: None,
            source: None,
            paging: None,
            cached: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message<M: Into<String>>(mut self, message: M) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_source(mut self, source: DataSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_paging(mut self, paging: Option<serde_json::Value>) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = Some(cached);
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AdLibraryQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub ad_type: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

/// `palavra` and `pais` are the dashboard's names for the search term and
/// country; they win over `search_terms` and `ad_reached_countries`.
#[derive(Debug, Default, Deserialize)]
pub struct MetaAdsQuery {
    #[serde(default)]
    pub palavra: Option<String>,
    #[serde(default)]
    pub search_terms: Option<String>,
    #[serde(default)]
    pub pais: Option<String>,
    #[serde(default)]
    pub ad_reached_countries: Option<String>,
    #[serde(default)]
    pub ad_active_status: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub min_spend: Option<String>,
    #[serde(default)]
    pub max_spend: Option<String>,
}

impl MetaAdsQuery {
    pub fn search_terms(&self) -> Option<&str> {
        first_present(self.palavra.as_deref(), self.search_terms.as_deref())
    }

    pub fn countries(&self) -> Option<&str> {
        first_present(self.pais.as_deref(), self.ad_reached_countries.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    #[serde(default)]
    pub pais: Option<String>,
    #[serde(default)]
    pub ad_reached_countries: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

impl CategoryQuery {
    pub fn countries(&self) -> Option<&str> {
        first_present(self.pais.as_deref(), self.ad_reached_countries.as_deref())
    }
}

fn first_present<'a>(preferred: Option<&'a str>, fallback: Option<&'a str>) -> Option<&'a str> {
    [preferred, fallback]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
pub struct CampaignsQuery {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub niche: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
}

/// Ads found for one category, searched keyword by keyword.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAds {
    pub category: &'static str,
    pub keywords: Vec<&'static str>,
    pub ads: Vec<AdLibraryEntry>,
}

/// Outcome of validating the configured token and ad account together.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSetup {
    pub ad_account_id: String,
    pub campaigns_found: usize,
    pub user: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub cache: CacheStats,
}
