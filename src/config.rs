// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use crate::error::AppError;
use crate::normalize::{Locale, ZeroSpendRoas};
use crate::upstream::InsightsWindow;

const ACCESS_TOKEN_VARS: [&str; 3] = ["FACEBOOK_ACCESS_TOKEN", "META_ACCESS_TOKEN", "META_TOKEN"];
const UPSTREAM_TIMEOUT_SECS: RangeInclusive<u64> = 10..=30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub credentials: Credentials,
    pub api_secret_key: Option<String>,
    pub upstream: UpstreamConfig,
    pub ad_search_ttl: Duration,
    pub campaign_ttl: Duration,
    pub janitor_interval: Duration,
    pub insights_window: InsightsWindow,
    pub zero_spend_roas: ZeroSpendRoas,
    pub locale: Locale,
    pub demo_mode: bool,
    pub static_dir: Option<PathBuf>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub version: String,
    pub timeout: Duration,
    pub probe_timeout: Duration,
}

/// Graph API secrets. Their absence is a configuration error surfaced per
/// request, so the service still boots without them.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    access_token: Option<String>,
    ad_account_id: Option<String>,
    public_account_id: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let listen_addr: SocketAddr = var("ADLENS_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .context("invalid ADLENS_ADDR")?;

        let access_token = ACCESS_TOKEN_VARS.iter().find_map(|key| var(*key));
        let credentials = Credentials::new(
            access_token,
            var("FACEBOOK_AD_ACCOUNT_ID"),
            var("NEXT_PUBLIC_FACEBOOK_AD_ACCOUNT_ID"),
        );

        let upstream = UpstreamConfig {
            base_url: var("ADLENS_GRAPH_BASE_URL")
                .unwrap_or_else(|| "https://graph.facebook.com".to_string()),
            version: var("ADLENS_GRAPH_VERSION").unwrap_or_else(|| "v19.0".to_string()),
            timeout: parse_timeout(&var, "ADLENS_UPSTREAM_TIMEOUT_SECONDS", 30)?,
            probe_timeout: parse_timeout(&var, "ADLENS_PROBE_TIMEOUT_SECONDS", 10)?,
        };

        let insights_window = InsightsWindow {
            since: parse_date(&var, "ADLENS_INSIGHTS_SINCE", "2024-12-01")?,
            until: parse_date(&var, "ADLENS_INSIGHTS_UNTIL", "2024-12-15")?,
        };
        if insights_window.since > insights_window.until {
            bail!("ADLENS_INSIGHTS_SINCE must not be after ADLENS_INSIGHTS_UNTIL");
        }

        let zero_spend_roas = var("ADLENS_ZERO_SPEND_ROAS")
            .map(|raw| raw.parse::<ZeroSpendRoas>())
            .transpose()
            .context("invalid ADLENS_ZERO_SPEND_ROAS")?
            .unwrap_or_default();

        let locale = var("ADLENS_LOCALE")
            .map(|raw| raw.parse::<Locale>())
            .transpose()
            .context("invalid ADLENS_LOCALE")?
            .unwrap_or_default();

        let log_format = match var("ADLENS_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("ADLENS_LOG_FORMAT must be text or json, got {other}"),
        };

        Ok(Self {
            listen_addr,
            credentials,
            api_secret_key: var("API_SECRET_KEY"),
            upstream,
            ad_search_ttl: parse_duration(&var, "ADLENS_AD_SEARCH_TTL", 600)?,
            campaign_ttl: parse_duration(&var, "ADLENS_CAMPAIGN_TTL", 300)?,
            janitor_interval: parse_duration(&var, "ADLENS_JANITOR_SECONDS", 60)?,
            insights_window,
            zero_spend_roas,
            locale,
            demo_mode: parse_flag(&var, "ADLENS_DEMO_MODE")?,
            static_dir: var("ADLENS_STATIC_DIR").map(PathBuf::from),
            log_format,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn janitor_interval(&self) -> Duration {
        self.janitor_interval
    }
}

impl Credentials {
    pub fn new(
        access_token: Option<String>,
        ad_account_id: Option<String>,
        public_account_id: Option<String>,
    ) -> Self {
        let ad_account_id = ad_account_id.map(|id| {
            if id.starts_with("act_") {
                id
            } else {
                format!("act_{id}")
            }
        });
        let public_account_id = public_account_id
            .or_else(|| ad_account_id.clone())
            .map(|id| id.trim_start_matches("act_").to_string());

        Self {
            access_token,
            ad_account_id,
            public_account_id,
        }
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn access_token(&self) -> Result<&str, AppError> {
        self.access_token.as_deref().ok_or_else(|| {
            AppError::configuration(
                "Meta access token is not configured; set FACEBOOK_ACCESS_TOKEN",
            )
        })
    }

    /// Ad account id, always carrying the `act_` prefix the Marketing API expects.
    pub fn ad_account_id(&self) -> Result<&str, AppError> {
        self.ad_account_id.as_deref().ok_or_else(|| {
            AppError::configuration("ad account is not configured; set FACEBOOK_AD_ACCOUNT_ID")
        })
    }

    /// Numeric account id used for Ads Manager deep links.
    pub fn public_account_id(&self) -> Option<&str> {
        self.public_account_id.as_deref()
    }

    pub fn is_campaign_ready(&self) -> bool {
        self.access_token.is_some() && self.ad_account_id.is_some()
    }
}

fn parse_duration<F>(var: &F, env_key: &str, default_secs: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = var(env_key).unwrap_or_else(|| default_secs.to_string());
    let secs: u64 = raw
        .parse()
        .with_context(|| format!("{env_key} must be an integer number of seconds"))?;

    Ok(Duration::from_secs(secs))
}

/// Graph request timeouts are bounded; zero would fail every call at once.
fn parse_timeout<F>(var: &F, env_key: &str, default_secs: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let timeout = parse_duration(var, env_key, default_secs)?;
    if !UPSTREAM_TIMEOUT_SECS.contains(&timeout.as_secs()) {
        bail!(
            "{env_key} must be between {} and {} seconds, got {}",
            UPSTREAM_TIMEOUT_SECS.start(),
            UPSTREAM_TIMEOUT_SECS.end(),
            timeout.as_secs()
        );
    }
    Ok(timeout)
}

fn parse_date<F>(var: &F, env_key: &str, default: &str) -> Result<NaiveDate>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = var(env_key).unwrap_or_else(|| default.to_string());
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .with_context(|| format!("{env_key} must be a YYYY-MM-DD date"))
}

fn parse_flag<F>(var: &F, env_key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(env_key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => bail!("{env_key} must be a boolean, got {other}"),
    }
}
