// Copyright 2025 Memophor Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP API handlers for adlens.
//!
//! - `GET /api/ad-library` - Ad Library search, standard field set
//! - `GET /api/meta-ads` - Ad Library search, extended field set, spend filter
//! - `POST /api/meta-ads` - Ad Library connectivity probe
//! - `GET /api/meta-ads/categoria/:categoria` - Ad Library search over a fixed keyword group
//! - `GET /api/facebook-campaigns` - Campaigns with insights, filtered and sorted
//! - `POST /api/facebook-campaigns` - Ad account connectivity probe
//! - `POST /api/facebook-campaigns/refresh` - Clear the cache and reload campaigns
//! - `GET /api/facebook-campaigns/stats` - Account totals
//! - `GET /api/facebook-campaigns/:id/ads` - Ads of one campaign
//! - `GET /api/health` - Token check against the Graph API
//! - `POST /api/health/configure` - Token and ad account validation with campaign count
//! - `GET /api/cache/stats`, `POST /api/cache/clear` - Cache administration
//! - `GET /metrics` - Prometheus metrics export
//!
//! Every data route follows the same path: validate, look up the cache, call
//! the Graph API on a miss, normalize, populate the cache, then shape the view.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequestParts, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::cache::{cache_key, Cache, CacheStats};
use crate::category::{per_keyword_limit, AdCategory};
use crate::config::{AppConfig, Credentials};
use crate::demo::{demo_campaigns, demo_stats};
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::model::{
    AccountSetup, AccountStats, AdLibraryEntry, AdLibraryQuery, AdSearchPage, ApiResponse,
    CampaignAd, CampaignRecord, CampaignsQuery, CategoryAds, CategoryQuery, DataSource,
    HealthResponse, HealthStatus, MetaAdsQuery,
};
use crate::normalize::{
    normalize_archived_ad, normalize_campaign, normalize_campaign_ad, summarize_account,
    CampaignContext, Locale, ZeroSpendRoas,
};
use crate::upstream::{AdsUpstream, ArchiveFieldSet, ArchiveQuery, InsightsWindow, UpstreamError};
use crate::view::{CampaignFilter, SpendFilter};

const MAX_LIMIT: u32 = 500;
const AD_LIBRARY_LIMIT: u32 = 25;
const META_ADS_LIMIT: u32 = 20;
const CAMPAIGNS_LIMIT: u32 = 20;
const CATEGORY_LIMIT: u32 = 15;
const DEFAULT_COUNTRY: &str = "BR";
const ALL: &str = "ALL";

/// Query string extractor whose failures render as the JSON error envelope.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path extractor whose failures render as the JSON error envelope.
#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key_digest: Option<Vec<u8>>,
    pub ad_search_ttl: Duration,
    pub campaign_ttl: Duration,
    pub insights_window: InsightsWindow,
    pub zero_spend_roas: ZeroSpendRoas,
    pub locale: Locale,
    pub demo_mode: bool,
}

impl Settings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            api_key_digest: cfg.api_secret_key.as_deref().map(digest),
            ad_search_ttl: cfg.ad_search_ttl,
            campaign_ttl: cfg.campaign_ttl,
            insights_window: cfg.insights_window,
            zero_spend_roas: cfg.zero_spend_roas,
            locale: cfg.locale,
            demo_mode: cfg.demo_mode,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cache: Cache,
    pub metrics: Metrics,
    pub upstream: Arc<dyn AdsUpstream>,
    pub credentials: Credentials,
    pub settings: Settings,
}

impl AppState {
    fn campaign_context(&self) -> CampaignContext<'_> {
        CampaignContext {
            locale: self.settings.locale,
            zero_spend_roas: self.settings.zero_spend_roas,
            public_account_id: self.credentials.public_account_id(),
        }
    }

    /// Demo data stands in only when explicitly enabled and credentials are absent.
    fn serves_demo(&self) -> bool {
        self.settings.demo_mode && !self.credentials.is_campaign_ready()
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/facebook-campaigns",
            get(list_campaigns).post(test_ad_account),
        )
        .route("/api/facebook-campaigns/refresh", post(refresh_campaigns))
        .route("/api/facebook-campaigns/stats", get(campaign_stats))
        .route("/api/facebook-campaigns/:id/ads", get(list_campaign_ads))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache/clear", post(clear_cache))
        .route("/api/health/configure", post(configure_account))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/api/ad-library", get(search_ad_library))
        .route("/api/meta-ads", get(search_meta_ads).post(test_ad_library))
        .route("/api/meta-ads/categoria/:categoria", get(search_category))
        .route("/api/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .fallback(unknown_route)
        .with_state(state)
}

async fn unknown_route() -> AppError {
    AppError::not_found("route not found")
}

#[derive(Debug, Default, Deserialize)]
struct ApiKeyQuery {
    #[serde(default)]
    api_key: Option<String>,
}

/// Rejects requests without the shared key when one is configured.
async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = &state.settings.api_key_digest else {
        return Ok(next.run(request).await);
    };

    let from_header = request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let provided = from_header.or_else(|| {
        Query::<ApiKeyQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.api_key)
    });

    match provided {
        Some(key) if digest(&key) == *expected => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "rejected request with wrong api key");
            Err(AppError::unauthorized("invalid API key"))
        }
        None => Err(AppError::unauthorized("API key required")),
    }
}

/// Ad Library search with the standard field set
pub async fn search_ad_library(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AdLibraryQuery>,
) -> Result<Json<ApiResponse<Vec<AdLibraryEntry>>>, AppError> {
    let search_terms = required(query.q.as_deref(), "search term (q) is required")?;
    let limit = parse_limit(query.limit.as_deref(), AD_LIBRARY_LIMIT)?;
    let token = state.credentials.access_token()?;

    let archive = ArchiveQuery {
        search_terms,
        countries: param(query.country.as_deref(), DEFAULT_COUNTRY),
        active_status: param(query.ad_type.as_deref(), ALL),
        media_type: None,
        limit,
        field_set: ArchiveFieldSet::Standard,
    };
    let (page, cached) = search_archive(&state, token, &archive).await?;
    let total = page.entries.len();

    Ok(Json(
        ApiResponse::data(page.entries)
            .with_total(total)
            .with_cached(cached),
    ))
}

/// Ad Library search with the extended field set
pub async fn search_meta_ads(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MetaAdsQuery>,
) -> Result<Json<ApiResponse<Vec<AdLibraryEntry>>>, AppError> {
    let search_terms = required(query.search_terms(), "search_terms (or palavra) is required")?;
    let limit = parse_limit(query.limit.as_deref(), META_ADS_LIMIT)?;
    let spend_filter = SpendFilter::from_query(&query)?;
    let token = state.credentials.access_token()?;

    let media_type = param(query.media_type.as_deref(), ALL);
    let archive = ArchiveQuery {
        search_terms,
        countries: param(query.countries(), DEFAULT_COUNTRY),
        active_status: param(query.ad_active_status.as_deref(), ALL),
        media_type: (!media_type.eq_ignore_ascii_case(ALL)).then_some(media_type),
        limit,
        field_set: ArchiveFieldSet::Extended,
    };
    let (page, cached) = search_archive(&state, token, &archive).await?;
    let entries = spend_filter.apply(page.entries);
    let total = entries.len();

    Ok(Json(
        ApiResponse::data(entries)
            .with_total(total)
            .with_paging(page.paging)
            .with_cached(cached),
    ))
}

/// Ad Library connectivity probe
pub async fn test_ad_library(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let token = state.credentials.access_token()?;
    let probe = ArchiveQuery {
        search_terms: "test".to_string(),
        countries: DEFAULT_COUNTRY.to_string(),
        active_status: ALL.to_string(),
        media_type: None,
        limit: 1,
        field_set: ArchiveFieldSet::Probe,
    };

    let page = observe(
        &state,
        "ads_archive_probe",
        state.upstream.search_ads_archive(token, &probe),
    )
    .await?;

    Ok(Json(
        ApiResponse::data(json!({ "results": page.data.len() }))
            .with_message("Meta Ad Library connection OK"),
    ))
}

/// Ad Library search over the first keywords of a fixed category.
///
/// Each keyword goes through the regular search cache. A failed keyword is
/// skipped; the request only fails when every keyword failed.
pub async fn search_category(
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ApiQuery(query): ApiQuery<CategoryQuery>,
) -> Result<Json<ApiResponse<CategoryAds>>, AppError> {
    let category: AdCategory = name.parse().map_err(|_| {
        AppError::unknown_choice(format!("unknown category {name:?}"), AdCategory::names())
    })?;
    let limit = parse_limit(query.limit.as_deref(), CATEGORY_LIMIT)?;
    let token = state.credentials.access_token()?;

    let countries = param(query.countries(), DEFAULT_COUNTRY);
    let per_keyword = per_keyword_limit(limit);
    let state = &state;
    let searches = category.searched_keywords().iter().map(|keyword| {
        let archive = ArchiveQuery {
            search_terms: keyword.to_string(),
            countries: countries.clone(),
            active_status: ALL.to_string(),
            media_type: None,
            limit: per_keyword,
            field_set: ArchiveFieldSet::Extended,
        };
        async move { (*keyword, search_archive(state, token, &archive).await) }
    });

    let mut ads = Vec::new();
    let mut cached = true;
    let mut searched = 0;
    let mut failure = None;
    for (keyword, result) in join_all(searches).await {
        match result {
            Ok((page, hit)) => {
                searched += 1;
                cached &= hit;
                ads.extend(page.entries);
            }
            Err(error) => {
                tracing::warn!(keyword, %error, "category keyword search failed");
                if failure.is_none() {
                    failure = Some(error);
                }
            }
        }
    }
    if searched == 0 {
        if let Some(error) = failure {
            return Err(error);
        }
    }

    let total = ads.len();
    let body = CategoryAds {
        category: category.as_str(),
        keywords: category.searched_keywords().to_vec(),
        ads,
    };

    Ok(Json(
        ApiResponse::data(body)
            .with_total(total)
            .with_cached(searched > 0 && cached),
    ))
}

pub async fn list_campaigns(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CampaignsQuery>,
) -> Result<Json<ApiResponse<Vec<CampaignRecord>>>, AppError> {
    campaigns_response(&state, &query).await.map(Json)
}

/// Drop every cached response and reload campaigns from the Graph API
pub async fn refresh_campaigns(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CampaignsQuery>,
) -> Result<Json<ApiResponse<Vec<CampaignRecord>>>, AppError> {
    match state.cache.clear().await {
        Ok(removed) => {
            state.metrics.record_cache_clear();
            tracing::info!(removed, "cache cleared for campaign refresh");
        }
        Err(error) => {
            state.metrics.record_cache_error();
            tracing::warn!(%error, "cache clear failed during refresh");
        }
    }

    let response = campaigns_response(&state, &query).await?;
    Ok(Json(response.with_message("Campaigns refreshed")))
}

async fn campaigns_response(
    state: &AppState,
    query: &CampaignsQuery,
) -> Result<ApiResponse<Vec<CampaignRecord>>, AppError> {
    let filter = CampaignFilter::from_query(query)?;
    let limit = parse_limit(query.limit.as_deref(), CAMPAIGNS_LIMIT)?;

    if state.serves_demo() {
        tracing::debug!("serving demo campaigns");
        let records = filter.apply(demo_campaigns(limit as usize, &state.campaign_context()));
        let total = records.len();
        return Ok(ApiResponse::data(records)
            .with_total(total)
            .with_source(DataSource::Mock)
            .with_cached(false));
    }

    let token = state.credentials.access_token()?;
    let account = state.credentials.ad_account_id()?;

    let key = cache_key(
        "campaigns",
        &[("account", account), ("limit", &limit.to_string())],
    );
    let (records, cached) = load_through_cache(state, key, state.settings.campaign_ttl, || {
        fetch_campaigns(state, token, account, limit)
    })
    .await?;

    let records = filter.apply(records);
    let total = records.len();

    Ok(ApiResponse::data(records)
        .with_total(total)
        .with_source(DataSource::FacebookApi)
        .with_cached(cached))
}

async fn fetch_campaigns(
    state: &AppState,
    token: &str,
    account: &str,
    limit: u32,
) -> Result<Vec<CampaignRecord>, AppError> {
    let rows = observe(
        state,
        "campaigns",
        state.upstream.list_campaigns(token, account, limit),
    )
    .await?;

    let window = state.settings.insights_window;
    let lookups = rows.iter().map(|row| {
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        async move {
            if id.is_empty() {
                return None;
            }
            let call = state.upstream.campaign_insights(token, &id, window);
            match observe(state, "insights", call).await {
                Ok(insights) => insights,
                Err(error) => {
                    tracing::warn!(campaign = %id, %error, "insights lookup failed; using zero insights");
                    None
                }
            }
        }
    });
    let insights = join_all(lookups).await;

    let ctx = state.campaign_context();
    let records = rows
        .iter()
        .zip(insights.iter())
        .map(|(raw, insights)| normalize_campaign(raw, insights.as_ref(), &ctx))
        .collect();

    Ok(records)
}

/// Ad account connectivity probe
pub async fn test_ad_account(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let token = state.credentials.access_token()?;
    let account = state.credentials.ad_account_id()?;

    let details = observe(&state, "ad_account", state.upstream.ad_account(token, account)).await?;

    Ok(Json(
        ApiResponse::data(details).with_message("Facebook Ads connection established"),
    ))
}

pub async fn campaign_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AccountStats>>, AppError> {
    if state.serves_demo() {
        return Ok(Json(
            ApiResponse::data(demo_stats()).with_source(DataSource::Mock),
        ));
    }

    let token = state.credentials.access_token()?;
    let account = state.credentials.ad_account_id()?;

    let key = cache_key("account_stats", &[("account", account)]);
    let (stats, cached) = load_through_cache(&state, key, state.settings.campaign_ttl, || async {
        let window = state.settings.insights_window;
        let (campaigns, insights) = tokio::join!(
            observe(&state, "campaigns", state.upstream.list_campaigns(token, account, MAX_LIMIT)),
            observe(&state, "account_insights", state.upstream.account_insights(token, account, window)),
        );
        let campaigns = campaigns?;
        let insights = insights.unwrap_or_else(|error| {
            tracing::warn!(%error, "account insights lookup failed; reporting zero totals");
            None
        });
        Ok::<_, AppError>(summarize_account(&campaigns, insights.as_ref()))
    })
    .await?;

    Ok(Json(
        ApiResponse::data(stats)
            .with_source(DataSource::FacebookApi)
            .with_cached(cached),
    ))
}

pub async fn list_campaign_ads(
    State(state): State<AppState>,
    ApiPath(campaign_id): ApiPath<String>,
) -> Result<Json<ApiResponse<Vec<CampaignAd>>>, AppError> {
    if campaign_id.is_empty() || !campaign_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::validation("invalid campaign id"));
    }
    let token = state.credentials.access_token()?;

    let key = cache_key("campaign_ads", &[("campaign", &campaign_id)]);
    let (ads, cached) = load_through_cache(&state, key, state.settings.campaign_ttl, || async {
        let rows = observe(
            &state,
            "campaign_ads",
            state.upstream.campaign_ads(token, &campaign_id),
        )
        .await?;
        Ok::<_, AppError>(
            rows.iter()
                .map(|raw| normalize_campaign_ad(raw, state.settings.locale))
                .collect::<Vec<_>>(),
        )
    })
    .await?;
    let total = ads.len();

    Ok(Json(
        ApiResponse::data(ads)
            .with_total(total)
            .with_cached(cached),
    ))
}

/// Health check: verifies the configured token against `/me`
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let cache = state.cache.stats().await.unwrap_or_else(|error| {
        tracing::warn!(%error, "cache stats unavailable");
        CacheStats::default()
    });

    let (status_code, status, message) = match state.credentials.access_token() {
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            HealthStatus::Error,
            error.to_string(),
        ),
        Ok(token) => match observe(&state, "me", state.upstream.me(token)).await {
            Ok(_) => (
                StatusCode::OK,
                HealthStatus::Ok,
                "Meta Graph API reachable".to_string(),
            ),
            Err(UpstreamError::Unauthenticated(message)) => {
                (StatusCode::UNAUTHORIZED, HealthStatus::Error, message)
            }
            Err(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                HealthStatus::Error,
                error.to_string(),
            ),
        },
    };

    let body = HealthResponse {
        status,
        message,
        timestamp: Utc::now(),
        cache,
    };

    (status_code, Json(body))
}

/// Checks the token against `/me`, then counts the campaigns of the
/// configured ad account.
pub async fn configure_account(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AccountSetup>>, AppError> {
    let token = state.credentials.access_token()?;
    let account = state.credentials.ad_account_id()?;

    let user = observe(&state, "me", state.upstream.me(token)).await?;
    let campaigns = observe(
        &state,
        "campaigns",
        state.upstream.list_campaigns(token, account, MAX_LIMIT),
    )
    .await?;
    tracing::info!(account, campaigns = campaigns.len(), "ad account configured");

    let setup = AccountSetup {
        ad_account_id: account.to_string(),
        campaigns_found: campaigns.len(),
        user,
    };

    Ok(Json(
        ApiResponse::data(setup).with_message("Ad account configured"),
    ))
}

pub async fn cache_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CacheStats>>, AppError> {
    let stats = state.cache.stats().await?;
    state.metrics.update_cache_keys(stats.keys);

    Ok(Json(ApiResponse::data(stats)))
}

pub async fn clear_cache(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let removed = state.cache.clear().await?;
    state.metrics.record_cache_clear();
    state.metrics.update_cache_keys(0);

    Ok(Json(
        ApiResponse::data(json!({ "removed": removed })).with_message("Cache cleared"),
    ))
}

/// Metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state.metrics.export()
}

async fn search_archive(
    state: &AppState,
    token: &str,
    query: &ArchiveQuery,
) -> Result<(AdSearchPage, bool), AppError> {
    let params = query.params();
    let borrowed: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let key = cache_key("ads_archive", &borrowed);

    load_through_cache(state, key, state.settings.ad_search_ttl, || async {
        tracing::debug!(
            search_terms = %query.search_terms,
            field_set = query.field_set.as_str(),
            "searching ad library"
        );
        let page = observe(
            state,
            "ads_archive",
            state.upstream.search_ads_archive(token, query),
        )
        .await?;

        Ok::<_, AppError>(AdSearchPage {
            entries: page
                .data
                .iter()
                .map(|raw| normalize_archived_ad(raw, state.settings.locale))
                .collect(),
            paging: page.paging,
        })
    })
    .await
}

/// Serves `key` from the cache or runs `fetch` and stores its result.
///
/// Cache trouble never fails the request: a read error counts as a miss and
/// a write error is only logged. Returns the value and whether it was cached.
async fn load_through_cache<T, F, Fut>(
    state: &AppState,
    key: String,
    ttl: Duration,
    fetch: F,
) -> Result<(T, bool), AppError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    match state.cache.get(&key).await {
        Ok(Some(value)) => match serde_json::from_value::<T>(value) {
            Ok(hit) => {
                state.metrics.record_cache_hit();
                tracing::debug!(%key, "cache hit");
                return Ok((hit, true));
            }
            Err(error) => {
                tracing::warn!(%key, %error, "discarding undecodable cache entry");
                if let Err(error) = state.cache.delete(&key).await {
                    tracing::warn!(%key, %error, "cache delete failed");
                }
            }
        },
        Ok(None) => {}
        Err(error) => {
            state.metrics.record_cache_error();
            tracing::warn!(%key, %error, "cache read failed; treating as miss");
        }
    }
    state.metrics.record_cache_miss();

    let fresh = fetch().await?;

    match serde_json::to_value(&fresh) {
        Ok(value) => match state.cache.set(key.clone(), value, ttl).await {
            Ok(_) => state.metrics.record_cache_store(),
            Err(error) => {
                state.metrics.record_cache_error();
                tracing::warn!(%key, %error, "cache write failed");
            }
        },
        Err(error) => tracing::warn!(%key, %error, "response not cacheable"),
    }

    Ok((fresh, false))
}

/// Times one Graph API call and records its outcome.
async fn observe<T, Fut>(state: &AppState, operation: &'static str, call: Fut) -> Result<T, UpstreamError>
where
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let start = Instant::now();
    let result = call.await;
    state
        .metrics
        .record_upstream(operation, start.elapsed().as_secs_f64(), result.is_err());
    result
}

fn required(raw: Option<&str>, message: &'static str) -> Result<String, AppError> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::validation(message))
}

fn param(raw: Option<&str>, default: &str) -> String {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn parse_limit(raw: Option<&str>, default: u32) -> Result<u32, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<u32>() {
        Ok(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(limit),
        _ => Err(AppError::validation(format!(
            "limit must be an integer between 1 and {MAX_LIMIT}"
        ))),
    }
}

fn digest(key: &str) -> Vec<u8> {
    Sha256::digest(key.as_bytes()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackend, CacheEntry};
    use crate::upstream::{GraphPage, MockAdsUpstream};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    fn settings() -> Settings {
        Settings {
            api_key_digest: None,
            ad_search_ttl: Duration::from_secs(600),
            campaign_ttl: Duration::from_secs(300),
            insights_window: InsightsWindow {
                since: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
                until: NaiveDate::from_ymd_opt(2024, 12, 15).unwrap(),
            },
            zero_spend_roas: ZeroSpendRoas::NotApplicable,
            locale: Locale::PtBr,
            demo_mode: false,
        }
    }

    fn credentials() -> Credentials {
        Credentials::new(Some("tok".into()), Some("123".into()), None)
    }

    fn app_with(
        upstream: MockAdsUpstream,
        credentials: Credentials,
        settings: Settings,
        cache: Cache,
    ) -> (Router, Metrics) {
        let metrics = Metrics::new().unwrap();
        let state = AppState {
            cache,
            metrics: metrics.clone(),
            upstream: Arc::new(upstream),
            credentials,
            settings,
        };
        (router(state), metrics)
    }

    fn app(upstream: MockAdsUpstream) -> Router {
        app_with(
            upstream,
            credentials(),
            settings(),
            Cache::in_memory(Duration::from_secs(60)),
        )
        .0
    }

    async fn send(app: &Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_req(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn two_ads() -> GraphPage {
        GraphPage {
            data: vec![
                json!({
                    "id": "901",
                    "page_name": "Loja Apple BR",
                    "ad_creative_bodies": ["iPhone 15 com desconto"],
                    "impressions": {"lower_bound": "1000", "upper_bound": "4999"},
                    "spend": {"lower_bound": "100", "upper_bound": "199"},
                    "currency": "BRL"
                }),
                json!({
                    "id": "902",
                    "page_name": "Celulares Já",
                    "ad_delivery_stop_time": "2024-12-01",
                    "spend": {"lower_bound": "1000", "upper_bound": "1999"}
                }),
            ],
            paging: Some(json!({"cursors": {"after": "abc"}})),
        }
    }

    #[tokio::test]
    async fn ad_library_search_returns_normalized_entries() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_search_ads_archive()
            .withf(|token: &str, query: &ArchiveQuery| {
                token == "tok"
                    && query.search_terms == "iphone"
                    && query.countries == "BR"
                    && query.limit == 20
                    && query.field_set == ArchiveFieldSet::Standard
            })
            .times(1)
            .returning(|_, _| Ok(two_ads()));

        let app = app(upstream);
        let (status, body) = send(&app, get_req("/api/ad-library?q=iphone&country=BR&limit=20")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["total"], 2);
        assert_eq!(body["cached"], false);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["body"], "iPhone 15 com desconto");
        assert_eq!(body["data"][0]["spendDisplay"], "BRL 100 - 199");
        assert_eq!(body["data"][1]["statusLabel"], "Inativo");
    }

    #[tokio::test]
    async fn identical_search_within_ttl_calls_upstream_once() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_search_ads_archive()
            .times(1)
            .returning(|_, _| Ok(two_ads()));

        let app = app(upstream);
        let (_, first) = send(&app, get_req("/api/ad-library?q=iphone&limit=20&country=BR")).await;
        let (status, second) = send(&app, get_req("/api/ad-library?country=BR&q=iphone&limit=20")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["cached"], false);
        assert_eq!(second["cached"], true);
        assert_eq!(first["data"], second["data"]);
    }

    #[tokio::test]
    async fn missing_search_term_is_rejected_before_upstream() {
        let mut upstream = MockAdsUpstream::new();
        upstream.expect_search_ads_archive().never();
        let app = app(upstream);

        for uri in ["/api/ad-library", "/api/ad-library?q=%20%20", "/api/meta-ads?limit=5"] {
            let (status, body) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["success"], false);
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        }
    }

    #[tokio::test]
    async fn invalid_limit_is_rejected() {
        let mut upstream = MockAdsUpstream::new();
        upstream.expect_search_ads_archive().never();
        let app = app(upstream);

        for uri in ["/api/ad-library?q=x&limit=0", "/api/ad-library?q=x&limit=abc", "/api/meta-ads?search_terms=x&limit=501"] {
            let (status, _) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn missing_token_is_a_configuration_error() {
        let mut upstream = MockAdsUpstream::new();
        upstream.expect_search_ads_archive().never();
        let (app, _) = app_with(
            upstream,
            Credentials::default(),
            settings(),
            Cache::in_memory(Duration::from_secs(60)),
        );

        let (status, body) = send(&app, get_req("/api/ad-library?q=iphone")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn upstream_failures_map_to_outcome_class() {
        let cases = [
            (UpstreamError::Unauthenticated("Invalid OAuth access token".into()), StatusCode::UNAUTHORIZED),
            (UpstreamError::InvalidRequest("Invalid parameter".into()), StatusCode::BAD_REQUEST),
            (UpstreamError::Unavailable("Graph API returned status 503".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            let message = error.to_string();
            let mut upstream = MockAdsUpstream::new();
            upstream
                .expect_search_ads_archive()
                .times(1)
                .returning(move |_, _| Err(error.clone()));

            let (status, body) = send(&app(upstream), get_req("/api/meta-ads?search_terms=iphone")).await;
            assert_eq!(status, expected);
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], message.as_str());
        }
    }

    #[tokio::test]
    async fn failed_upstream_call_is_not_cached() {
        let mut upstream = MockAdsUpstream::new();
        let mut seq = mockall::Sequence::new();
        upstream
            .expect_search_ads_archive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(UpstreamError::Unavailable("timeout".into())));
        upstream
            .expect_search_ads_archive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(two_ads()));

        let app = app(upstream);
        let (first, _) = send(&app, get_req("/api/ad-library?q=iphone")).await;
        let (second, body) = send(&app, get_req("/api/ad-library?q=iphone")).await;
        assert_eq!(first, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(second, StatusCode::OK);
        assert_eq!(body["cached"], false);
    }

    #[tokio::test]
    async fn meta_ads_spend_filter_runs_after_the_cache() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_search_ads_archive()
            .withf(|_: &str, query: &ArchiveQuery| {
                query.field_set == ArchiveFieldSet::Extended && query.media_type.is_none()
            })
            .times(1)
            .returning(|_, _| Ok(two_ads()));

        let app = app(upstream);
        let (status, body) =
            send(&app, get_req("/api/meta-ads?search_terms=iphone&media_type=ALL&max_spend=500")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["id"], "901");
        assert_eq!(body["paging"]["cursors"]["after"], "abc");

        let (_, body) =
            send(&app, get_req("/api/meta-ads?search_terms=iphone&min_spend=1000")).await;
        assert_eq!(body["cached"], true);
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["id"], "902");
    }

    #[tokio::test]
    async fn health_without_token_reports_error() {
        let mut upstream = MockAdsUpstream::new();
        upstream.expect_me().never();
        let (app, _) = app_with(
            upstream,
            Credentials::default(),
            settings(),
            Cache::in_memory(Duration::from_secs(60)),
        );

        let (status, body) = send(&app, get_req("/api/health")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "ERROR");
        assert!(body["cache"]["keys"].is_u64());
    }

    #[tokio::test]
    async fn health_reflects_token_check() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_me()
            .times(1)
            .returning(|_| Ok(json!({"id": "1", "name": "Ops"})));
        let (status, body) = send(&app(upstream), get_req("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");

        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_me()
            .returning(|_| Err(UpstreamError::Unauthenticated("Session has expired".into())));
        let (status, body) = send(&app(upstream), get_req("/api/health")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "ERROR");
        assert_eq!(body["message"], "Session has expired");

        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_me()
            .returning(|_| Err(UpstreamError::Unavailable("Graph API request timed out".into())));
        let (status, _) = send(&app(upstream), get_req("/api/health")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn campaigns_join_insights_per_campaign() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_list_campaigns()
            .withf(|_: &str, account: &str, limit: &u32| account == "act_123" && *limit == 20)
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    json!({"id": "1001", "name": "Older", "status": "ACTIVE", "created_time": "2024-12-01T10:00:00+0000"}),
                    json!({"id": "1002", "name": "Newer", "status": "PAUSED", "created_time": "2024-12-05T10:00:00+0000"}),
                ])
            });
        upstream
            .expect_campaign_insights()
            .times(2)
            .returning(|_, id, _| match id {
                "1001" => Ok(Some(json!({
                    "impressions": "12000",
                    "spend": "40",
                    "actions": [{"action_type": "purchase", "value": "2"}]
                }))),
                _ => Err(UpstreamError::Unavailable("insights down".into())),
            });

        let (status, body) = send(&app(upstream), get_req("/api/facebook-campaigns")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "facebook_api");
        assert_eq!(body["total"], 2);

        let data = body["data"].as_array().unwrap();
        assert_eq!(data[0]["id"], "1002");
        assert_eq!(data[0]["statusLabel"], "Pausado");
        assert_eq!(data[0]["insights"]["spend"], 0.0);
        assert!(data[0]["insights"]["roas"].is_null());
        assert_eq!(data[1]["insights"]["roas"], 5.0);
        assert_eq!(data[1]["reachTier"], "good");
        assert_eq!(
            data[1]["adsManagerUrl"],
            "https://business.facebook.com/adsmanager/manage/campaigns/detail?act=123&selected_campaign_ids=1001"
        );
    }

    #[tokio::test]
    async fn campaigns_without_credentials_fail_unless_demo_mode() {
        let mut upstream = MockAdsUpstream::new();
        upstream.expect_list_campaigns().never();
        let (app, _) = app_with(
            upstream,
            Credentials::new(Some("tok".into()), None, None),
            settings(),
            Cache::in_memory(Duration::from_secs(60)),
        );
        let (status, body) = send(&app, get_req("/api/facebook-campaigns")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);

        let mut upstream = MockAdsUpstream::new();
        upstream.expect_list_campaigns().never();
        let mut demo = settings();
        demo.demo_mode = true;
        let (app, _) = app_with(
            upstream,
            Credentials::default(),
            demo,
            Cache::in_memory(Duration::from_secs(60)),
        );
        let (status, body) = send(&app, get_req("/api/facebook-campaigns?limit=3&sort=spend")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "mock");
        assert_eq!(body["total"], 3);

        let (_, stats) = send(&app, get_req("/api/facebook-campaigns/stats")).await;
        assert_eq!(stats["source"], "mock");
        assert_eq!(stats["data"]["totalCampaigns"], 6);
    }

    #[tokio::test]
    async fn refresh_clears_cache_and_refetches() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_list_campaigns()
            .times(2)
            .returning(|_, _, _| Ok(vec![json!({"id": "77", "status": "ACTIVE"})]));
        upstream
            .expect_campaign_insights()
            .times(2)
            .returning(|_, _, _| Ok(None));

        let app = app(upstream);
        let (_, first) = send(&app, get_req("/api/facebook-campaigns")).await;
        let (_, cached) = send(&app, get_req("/api/facebook-campaigns")).await;
        let (status, refreshed) = send(&app, post_req("/api/facebook-campaigns/refresh")).await;

        assert_eq!(first["cached"], false);
        assert_eq!(cached["cached"], true);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(refreshed["cached"], false);
        assert_eq!(refreshed["message"], "Campaigns refreshed");
    }

    #[tokio::test]
    async fn campaign_stats_tolerate_missing_account_insights() {
        let mut upstream = MockAdsUpstream::new();
        upstream.expect_list_campaigns().times(1).returning(|_, _, _| {
            Ok(vec![
                json!({"id": "1", "status": "ACTIVE"}),
                json!({"id": "2", "status": "PAUSED"}),
                json!({"id": "3", "status": "ACTIVE"}),
            ])
        });
        upstream
            .expect_account_insights()
            .times(1)
            .returning(|_, _, _| Err(UpstreamError::Unavailable("insights down".into())));

        let (status, body) = send(&app(upstream), get_req("/api/facebook-campaigns/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalCampaigns"], 3);
        assert_eq!(body["data"]["activeCampaigns"], 2);
        assert_eq!(body["data"]["pausedCampaigns"], 1);
        assert_eq!(body["data"]["impressions"], 0);
    }

    #[tokio::test]
    async fn campaign_ads_are_normalized_and_ids_validated() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_campaign_ads()
            .withf(|_: &str, campaign: &str| campaign == "1001")
            .times(1)
            .returning(|_, _| Ok(vec![json!({"id": "5", "name": "Ad", "status": "ACTIVE", "bid_amount": 150})]));

        let app = app(upstream);
        let (status, body) = send(&app, get_req("/api/facebook-campaigns/1001/ads")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["statusLabel"], "Ativo");
        assert_eq!(body["data"][0]["bidAmount"], 150.0);

        let (status, _) = send(&app, get_req("/api/facebook-campaigns/1.2/ads")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn probes_report_connectivity() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_ad_account()
            .withf(|_: &str, account: &str| account == "act_123")
            .returning(|_, _| Ok(json!({"id": "act_123", "name": "Main", "account_status": 1})));
        upstream
            .expect_search_ads_archive()
            .withf(|_: &str, query: &ArchiveQuery| query.field_set == ArchiveFieldSet::Probe && query.limit == 1)
            .returning(|_, _| Err(UpstreamError::Unauthenticated("Invalid OAuth access token".into())));

        let app = app(upstream);
        let (status, body) = send(&app, post_req("/api/facebook-campaigns")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Main");

        let (status, body) = send(&app, post_req("/api/meta-ads")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid OAuth access token");
    }

    #[tokio::test]
    async fn api_key_guards_campaign_and_cache_routes() {
        let mut keyed = settings();
        keyed.api_key_digest = Some(digest("s3cret"));
        let (app, _) = app_with(
            MockAdsUpstream::new(),
            credentials(),
            keyed,
            Cache::in_memory(Duration::from_secs(60)),
        );

        let (status, body) = send(&app, get_req("/api/cache/stats")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, get_req("/api/cache/stats?api_key=wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, get_req("/api/cache/stats?api_key=s3cret")).await;
        assert_eq!(status, StatusCode::OK);

        let with_header = HttpRequest::builder()
            .method("POST")
            .uri("/api/cache/clear")
            .header("x-api-key", "s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, with_header).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["removed"], 0);

        // ad library stays open: validation runs, not the key check
        let (status, _) = send(&app, get_req("/api/ad-library")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    struct BrokenCache;

    #[async_trait]
    impl CacheBackend for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<Value>, AppError> {
            Err(AppError::Internal(anyhow::anyhow!("store offline")))
        }

        async fn set(&self, _key: String, _value: Value, _ttl: Duration) -> Result<CacheEntry, AppError> {
            Err(AppError::Internal(anyhow::anyhow!("store offline")))
        }

        async fn delete(&self, _key: &str) -> Result<bool, AppError> {
            Err(AppError::Internal(anyhow::anyhow!("store offline")))
        }

        async fn clear(&self) -> Result<usize, AppError> {
            Err(AppError::Internal(anyhow::anyhow!("store offline")))
        }

        async fn purge_expired(&self) -> Result<usize, AppError> {
            Err(AppError::Internal(anyhow::anyhow!("store offline")))
        }

        async fn stats(&self) -> Result<CacheStats, AppError> {
            Err(AppError::Internal(anyhow::anyhow!("store offline")))
        }
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_upstream() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_search_ads_archive()
            .times(2)
            .returning(|_, _| Ok(two_ads()));

        let (app, metrics) = app_with(upstream, credentials(), settings(), Cache::new(BrokenCache));

        for _ in 0..2 {
            let (status, body) = send(&app, get_req("/api/ad-library?q=iphone")).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["cached"], false);
            assert_eq!(body["total"], 2);
        }
        assert_eq!(metrics.cache_errors.get(), 4);
    }

    #[tokio::test]
    async fn metrics_endpoint_exports_counters() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_search_ads_archive()
            .returning(|_, _| Ok(two_ads()));
        let (app, metrics) = app_with(
            upstream,
            credentials(),
            settings(),
            Cache::in_memory(Duration::from_secs(60)),
        );

        send(&app, get_req("/api/ad-library?q=iphone")).await;
        send(&app, get_req("/api/ad-library?q=iphone")).await;
        assert_eq!(metrics.cache_hits.get(), 1);
        assert_eq!(metrics.cache_misses.get(), 1);

        let response = app.clone().oneshot(get_req("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains(r#"adlens_upstream_requests_total{operation="ads_archive"} 1"#));
    }

    #[tokio::test]
    async fn malformed_query_answers_with_error_envelope() {
        let mut upstream = MockAdsUpstream::new();
        upstream.expect_search_ads_archive().never();
        upstream.expect_list_campaigns().never();
        let app = app(upstream);

        for uri in [
            "/api/ad-library?q=a&q=b",
            "/api/meta-ads?search_terms=a&limit=1&limit=2",
            "/api/meta-ads/categoria/moda?pais=BR&pais=PT",
            "/api/facebook-campaigns?sort=spend&sort=name",
        ] {
            let response = app.clone().oneshot(get_req(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(
                response.headers()["content-type"],
                "application/json",
                "{uri}"
            );
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["success"], false, "{uri}");
            assert!(body["error"].as_str().unwrap().contains("duplicate field"), "{uri}");
            assert!(body["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn meta_ads_accepts_dashboard_aliases() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_search_ads_archive()
            .withf(|_: &str, query: &ArchiveQuery| {
                query.search_terms == "iphone" && query.countries == "PT"
            })
            .times(1)
            .returning(|_, _| Ok(two_ads()));

        let (status, body) = send(
            &app(upstream),
            get_req("/api/meta-ads?palavra=iphone&search_terms=samsung&pais=PT"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
    }

    #[tokio::test]
    async fn category_search_splits_limit_across_keywords() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_search_ads_archive()
            .withf(|_: &str, query: &ArchiveQuery| {
                query.field_set == ArchiveFieldSet::Extended
                    && query.countries == "BR"
                    && query.limit == 5
            })
            .times(2)
            .returning(|_, query| match query.search_terms.as_str() {
                "iphone" => Ok(two_ads()),
                _ => Err(UpstreamError::Unavailable("timeout".into())),
            });

        let (status, body) =
            send(&app(upstream), get_req("/api/meta-ads/categoria/Tecnologia?limit=10")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["total"], 2);
        assert_eq!(body["cached"], false);
        assert_eq!(body["data"]["category"], "tecnologia");
        assert_eq!(body["data"]["keywords"], json!(["iphone", "samsung"]));
        assert_eq!(body["data"]["ads"][0]["id"], "901");
    }

    #[tokio::test]
    async fn category_search_is_served_from_cache() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_search_ads_archive()
            .times(2)
            .returning(|_, _| Ok(two_ads()));

        let app = app(upstream);
        let (_, first) = send(&app, get_req("/api/meta-ads/categoria/moda")).await;
        let (status, second) = send(&app, get_req("/api/meta-ads/categoria/moda")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["cached"], false);
        assert_eq!(second["cached"], true);
        assert_eq!(second["total"], 4);
    }

    #[tokio::test]
    async fn category_search_fails_when_every_keyword_fails() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_search_ads_archive()
            .times(2)
            .returning(|_, _| Err(UpstreamError::Unauthenticated("Invalid OAuth access token".into())));

        let (status, body) = send(&app(upstream), get_req("/api/meta-ads/categoria/casa")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid OAuth access token");
    }

    #[tokio::test]
    async fn unknown_category_lists_alternatives() {
        let mut upstream = MockAdsUpstream::new();
        upstream.expect_search_ads_archive().never();

        let (status, body) = send(&app(upstream), get_req("/api/meta-ads/categoria/esportes")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        let available = body["available"].as_array().unwrap();
        assert_eq!(available.len(), 6);
        assert!(available.contains(&json!("saude")));
    }

    #[tokio::test]
    async fn configure_checks_token_and_counts_campaigns() {
        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_me()
            .times(1)
            .returning(|_| Ok(json!({"id": "9", "name": "Ops"})));
        upstream
            .expect_list_campaigns()
            .withf(|_: &str, account: &str, limit: &u32| account == "act_123" && *limit == MAX_LIMIT)
            .times(1)
            .returning(|_, _, _| Ok(vec![json!({"id": "1"}), json!({"id": "2"}), json!({"id": "3"})]));

        let (status, body) = send(&app(upstream), post_req("/api/health/configure")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["adAccountId"], "act_123");
        assert_eq!(body["data"]["campaignsFound"], 3);
        assert_eq!(body["data"]["user"]["name"], "Ops");

        let mut upstream = MockAdsUpstream::new();
        upstream
            .expect_me()
            .returning(|_| Err(UpstreamError::Unauthenticated("Session has expired".into())));
        upstream.expect_list_campaigns().never();

        let (status, body) = send(&app(upstream), post_req("/api/health/configure")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn unknown_route_answers_with_error_envelope() {
        let (status, body) = send(&app(MockAdsUpstream::new()), get_req("/api/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "route not found");
    }

    #[test]
    fn limit_parsing() {
        tokio_test::assert_ok!(parse_limit(None, 20));
        assert_eq!(parse_limit(Some(" 7 "), 20).unwrap(), 7);
        assert_eq!(parse_limit(Some(""), 25).unwrap(), 25);
        tokio_test::assert_err!(parse_limit(Some("-1"), 20));
        tokio_test::assert_err!(parse_limit(Some("501"), 20));
    }
}
