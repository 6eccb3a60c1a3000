// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Normalization of raw Graph API objects into display-stable records.
//!
//! Nothing in this module fails. Upstream objects are read through lenient
//! accessors, so a missing or malformed field degrades to zero, an empty list,
//! `None` or `"N/A"` instead of dropping the whole record. Graph returns most
//! numbers as strings, and the accessors accept both representations.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use serde_json::Value;
use thiserror::Error;

use crate::model::{
    AccountStats, AdLibraryEntry, BoundedRange, CampaignAd, CampaignRecord, InsightSummary,
    ReachTier, StatusColor,
};

const NOT_AVAILABLE: &str = "N/A";

const NICHES: [&str; 6] = [
    "Emagrecimento",
    "Renda Extra",
    "Saúde",
    "Sexualidade",
    "Beleza",
    "Espiritualidade",
];
const FORMATS: [&str; 3] = ["VSL", "Quiz", "Typebot"];
const TICKETS: [&str; 6] = ["R$ 67", "R$ 97", "R$ 147", "R$ 197", "R$ 297", "R$ 497"];

const CONVERSION_ACTIONS: [&str; 2] = ["purchase", "lead"];

const ADS_MANAGER_URL: &str = "https://business.facebook.com/adsmanager/manage/campaigns/detail";
const AD_LIBRARY_URL: &str = "https://www.facebook.com/ads/library/";

#[derive(Debug, Error)]
#[error("unsupported value {0:?}")]
pub struct UnknownOption(String);

impl UnknownOption {
    pub fn new(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Language of status labels and placeholders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    PtBr,
    En,
}

impl FromStr for Locale {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pt-br" | "pt_br" | "pt" => Ok(Locale::PtBr),
            "en" | "en-us" | "en_us" => Ok(Locale::En),
            _ => Err(UnknownOption::new(s)),
        }
    }
}

impl Locale {
    fn pick(self, pt: &'static str, en: &'static str) -> &'static str {
        match self {
            Locale::PtBr => pt,
            Locale::En => en,
        }
    }
}

/// What ROAS reports when a campaign has spent nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZeroSpendRoas {
    /// ROAS is undefined without spend and serializes as `null`.
    #[default]
    NotApplicable,
    /// Random filler in `[2, 7)` for demonstration dashboards.
    DemoFiller,
}

impl FromStr for ZeroSpendRoas {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" | "none" | "not_applicable" => Ok(ZeroSpendRoas::NotApplicable),
            "demo" | "random" => Ok(ZeroSpendRoas::DemoFiller),
            _ => Err(UnknownOption::new(s)),
        }
    }
}

impl ZeroSpendRoas {
    fn value(self) -> Option<f64> {
        match self {
            ZeroSpendRoas::NotApplicable => None,
            ZeroSpendRoas::DemoFiller => Some(rand::thread_rng().gen_range(2.0..7.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBadge {
    pub label: String,
    pub color: StatusColor,
}

/// Maps an upstream status enum to a label and color tag. Unknown statuses
/// keep their raw value as the label.
pub fn status_badge(status: &str, locale: Locale) -> StatusBadge {
    let (label, color) = match status {
        "ACTIVE" => (locale.pick("Ativo", "Active"), StatusColor::Green),
        "PAUSED" | "CAMPAIGN_PAUSED" | "ADSET_PAUSED" => {
            (locale.pick("Pausado", "Paused"), StatusColor::Yellow)
        }
        "PENDING_REVIEW" => (locale.pick("Em Análise", "In Review"), StatusColor::Blue),
        "DISAPPROVED" => (locale.pick("Reprovado", "Disapproved"), StatusColor::Red),
        "ARCHIVED" => (locale.pick("Arquivado", "Archived"), StatusColor::Gray),
        other => {
            return StatusBadge {
                label: other.to_string(),
                color: StatusColor::Gray,
            }
        }
    };

    StatusBadge {
        label: label.to_string(),
        color,
    }
}

/// Placeholder categories derived from a campaign id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub niche: &'static str,
    pub format: &'static str,
    pub ticket_label: &'static str,
}

impl Enrichment {
    pub fn for_campaign(id: &str) -> Self {
        Self {
            niche: NICHES[hash_index(id, NICHES.len())],
            format: FORMATS[hash_index(id, FORMATS.len())],
            ticket_label: TICKETS[hash_index(id, TICKETS.len())],
        }
    }
}

/// Reads the last two characters of `id` as hex and reduces them modulo `len`.
///
/// Only the leading hex digits of that suffix count, so `"1g"` reads as `1`;
/// a suffix without any hex digit maps to `0`. The result is always `< len`
/// for a non-zero `len`.
pub fn hash_index(id: &str, len: usize) -> usize {
    if len == 0 {
        return 0;
    }

    let chars: Vec<char> = id.chars().collect();
    let suffix = &chars[chars.len().saturating_sub(2)..];
    let value = suffix
        .iter()
        .map_while(|c| c.to_digit(16))
        .fold(0usize, |acc, digit| acc * 16 + digit as usize);

    value % len
}

/// `matched_conversions * 100 / spend`, or the zero-spend policy when nothing was spent.
pub fn compute_roas(spend: f64, conversions: f64, policy: ZeroSpendRoas) -> Option<f64> {
    if spend > 0.0 {
        Some(conversions.max(0.0) * 100.0 / spend)
    } else {
        policy.value()
    }
}

/// Value of the first `purchase` or `lead` action in an insights row.
pub fn matched_conversions(row: &Value) -> f64 {
    row.get("actions")
        .and_then(Value::as_array)
        .and_then(|actions| {
            actions.iter().find(|action| {
                action
                    .get("action_type")
                    .and_then(Value::as_str)
                    .map(|kind| CONVERSION_ACTIONS.contains(&kind))
                    .unwrap_or(false)
            })
        })
        .and_then(|action| action.get("value"))
        .and_then(number)
        .unwrap_or(0.0)
}

pub fn summarize_insights(row: Option<&Value>, policy: ZeroSpendRoas) -> InsightSummary {
    let empty = Value::Null;
    let row = row.unwrap_or(&empty);
    let spend = non_negative(row, "spend");

    InsightSummary {
        impressions: count(row, "impressions"),
        clicks: count(row, "clicks"),
        spend,
        ctr: non_negative(row, "ctr"),
        cpc: non_negative(row, "cpc"),
        roas: compute_roas(spend, matched_conversions(row), policy),
    }
}

pub fn reach_tier(impressions: u64) -> ReachTier {
    match impressions {
        0..=9_999 => ReachTier::Low,
        10_000..=49_999 => ReachTier::Good,
        50_000..=99_999 => ReachTier::High,
        _ => ReachTier::Premium,
    }
}

pub fn ads_manager_url(account_id: &str, campaign_id: &str) -> String {
    format!("{ADS_MANAGER_URL}?act={account_id}&selected_campaign_ids={campaign_id}")
}

#[derive(Debug, Clone, Copy)]
pub struct CampaignContext<'a> {
    pub locale: Locale,
    pub zero_spend_roas: ZeroSpendRoas,
    pub public_account_id: Option<&'a str>,
}

pub fn normalize_campaign(
    raw: &Value,
    insights: Option<&Value>,
    ctx: &CampaignContext<'_>,
) -> CampaignRecord {
    let id = text(raw, "id").unwrap_or_default();
    let status = text(raw, "status").unwrap_or_default();
    let badge = status_badge(&status, ctx.locale);
    let enrichment = Enrichment::for_campaign(&id);
    let insights = summarize_insights(insights, ctx.zero_spend_roas);
    let name = text(raw, "name")
        .unwrap_or_else(|| ctx.locale.pick("Campanha sem nome", "Untitled campaign").to_string());

    CampaignRecord {
        name,
        status_label: badge.label,
        status_color: badge.color,
        objective: text(raw, "objective"),
        created_at: time(raw, "created_time"),
        updated_at: time(raw, "updated_time"),
        start_at: time(raw, "start_time"),
        stop_at: time(raw, "stop_time"),
        daily_budget: text(raw, "daily_budget"),
        lifetime_budget: text(raw, "lifetime_budget"),
        budget_remaining: text(raw, "budget_remaining"),
        spend_cap: text(raw, "spend_cap"),
        reach_tier: reach_tier(insights.impressions),
        insights,
        niche: enrichment.niche.to_string(),
        format: enrichment.format.to_string(),
        ticket_label: enrichment.ticket_label.to_string(),
        ads_manager_url: ctx
            .public_account_id
            .filter(|_| !id.is_empty())
            .map(|account| ads_manager_url(account, &id)),
        status,
        id,
    }
}

pub fn normalize_archived_ad(raw: &Value, locale: Locale) -> AdLibraryEntry {
    let id = text(raw, "id").unwrap_or_default();
    let page_name = text(raw, "page_name")
        .unwrap_or_else(|| locale.pick("Anunciante não informado", "Unknown advertiser").to_string());
    let creative_bodies = string_list(raw, "ad_creative_bodies");
    let description = first_text(
        raw,
        &["ad_creative_link_descriptions", "ad_creative_link_description"],
    );
    let title = first_text(raw, &["ad_creative_link_titles", "ad_creative_link_title"]);
    let caption = first_text(raw, &["ad_creative_link_captions", "ad_creative_link_caption"]);
    let snapshot_url = text(raw, "ad_snapshot_url");
    let delivery_stop = text(raw, "ad_delivery_stop_time");
    let currency = text(raw, "currency").unwrap_or_else(|| "USD".to_string());
    let is_active = delivery_stop.is_none();
    let status_label = if is_active {
        locale.pick("Ativo", "Active")
    } else {
        locale.pick("Inativo", "Inactive")
    };

    let body = creative_bodies
        .first()
        .cloned()
        .or(description)
        .unwrap_or_else(|| locale.pick("Texto não disponível", "Text not available").to_string());

    AdLibraryEntry {
        page_id: text(raw, "page_id"),
        title: title.unwrap_or_else(|| page_name.clone()),
        body,
        caption,
        library_url: snapshot_url
            .clone()
            .unwrap_or_else(|| format!("{AD_LIBRARY_URL}?id={id}")),
        snapshot_url,
        creation_time: text(raw, "ad_creation_time"),
        delivery_start: text(raw, "ad_delivery_start_time"),
        delivery_stop,
        impressions: raw.get("impressions").and_then(bounded_range),
        spend: raw.get("spend").and_then(bounded_range),
        impressions_display: format_range(raw.get("impressions")),
        spend_display: format_spend(raw.get("spend"), &currency),
        currency,
        platforms: string_list(raw, "publisher_platforms"),
        demographics: raw
            .get("demographic_distribution")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        languages: string_list(raw, "languages"),
        estimated_audience: raw.get("estimated_audience_size").and_then(bounded_range),
        is_active,
        status_label: status_label.to_string(),
        creative_bodies,
        page_name,
        id,
    }
}

pub fn normalize_campaign_ad(raw: &Value, locale: Locale) -> CampaignAd {
    let status = text(raw, "status").unwrap_or_default();

    CampaignAd {
        id: text(raw, "id").unwrap_or_default(),
        name: text(raw, "name")
            .unwrap_or_else(|| locale.pick("Anúncio sem nome", "Untitled ad").to_string()),
        status_label: status_badge(&status, locale).label,
        status,
        created_at: time(raw, "created_time"),
        updated_at: time(raw, "updated_time"),
        creative: present(raw, "creative"),
        targeting: present(raw, "targeting"),
        bid_amount: raw.get("bid_amount").and_then(number),
        bid_type: text(raw, "bid_type"),
    }
}

pub fn summarize_account(campaigns: &[Value], insights: Option<&Value>) -> AccountStats {
    let total = campaigns.len();
    let active = campaigns
        .iter()
        .filter(|c| c.get("status").and_then(Value::as_str) == Some("ACTIVE"))
        .count();
    let empty = Value::Null;
    let row = insights.unwrap_or(&empty);

    AccountStats {
        total_campaigns: total,
        active_campaigns: active,
        paused_campaigns: total - active,
        impressions: count(row, "impressions"),
        clicks: count(row, "clicks"),
        spend: non_negative(row, "spend"),
        ctr: non_negative(row, "ctr"),
        cpc: non_negative(row, "cpc"),
        reach: count(row, "reach"),
    }
}

/// Reads a `{lower_bound, upper_bound}` object or a bare scalar.
pub fn bounded_range(value: &Value) -> Option<BoundedRange> {
    match value {
        Value::Object(map) => {
            let lower = map.get("lower_bound").and_then(scalar_text);
            let upper = map.get("upper_bound").and_then(scalar_text);
            if lower.is_none() && upper.is_none() {
                None
            } else {
                Some(BoundedRange {
                    lower_bound: lower,
                    upper_bound: upper,
                })
            }
        }
        other => scalar_text(other).map(|point| BoundedRange {
            lower_bound: Some(point.clone()),
            upper_bound: Some(point),
        }),
    }
}

/// Display string for a range or scalar; `"N/A"` when nothing usable is present.
pub fn format_range(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return NOT_AVAILABLE.to_string();
    };

    match value {
        Value::Object(map) => {
            let lower = map.get("lower_bound").and_then(number);
            let upper = map.get("upper_bound").and_then(number);
            match (lower, upper) {
                (Some(lo), Some(hi)) => format!("{} - {}", compact_number(lo), compact_number(hi)),
                (Some(lo), None) => format!("{}+", compact_number(lo)),
                (None, Some(hi)) => format!("0 - {}", compact_number(hi)),
                (None, None) => NOT_AVAILABLE.to_string(),
            }
        }
        other => number(other)
            .map(compact_number)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    }
}

pub fn format_spend(value: Option<&Value>, currency: &str) -> String {
    let display = format_range(value);
    if display == NOT_AVAILABLE {
        display
    } else {
        format!("{currency} {display}")
    }
}

/// `1234` becomes `1.2K`, `2500000` becomes `2.5M`.
pub fn compact_number(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

/// Graph timestamps look like `2024-01-10T12:00:00+0000`.
pub fn parse_graph_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn time(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    raw.get(key).and_then(Value::as_str).and_then(parse_graph_time)
}

fn text(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn present(raw: &Value, key: &str) -> Option<Value> {
    raw.get(key).filter(|v| !v.is_null()).cloned()
}

/// First text of the first key present, accepting either a list or a scalar.
fn first_text(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match raw.get(*key)? {
        Value::Array(items) => items.iter().find_map(scalar_text),
        other => scalar_text(other),
    })
}

fn string_list(raw: &Value, key: &str) -> Vec<String> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(scalar_text).collect())
        .unwrap_or_default()
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn non_negative(row: &Value, key: &str) -> f64 {
    row.get(key).and_then(number).unwrap_or(0.0).max(0.0)
}

fn count(row: &Value, key: &str) -> u64 {
    non_negative(row, key).trunc() as u64
}
