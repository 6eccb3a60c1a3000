// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Filtering and ordering of already-normalized lists.
//!
//! Runs after the cache, so none of these options take part in cache keys.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::AppError;
use crate::model::{AdLibraryEntry, CampaignRecord, CampaignsQuery, MetaAdsQuery};
use crate::normalize::UnknownOption;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CampaignSort {
    /// Newest first by creation time.
    #[default]
    Recent,
    Oldest,
    Spend,
    Roas,
    Impressions,
    Ctr,
    Name,
}

impl FromStr for CampaignSort {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recent" => Ok(CampaignSort::Recent),
            "oldest" => Ok(CampaignSort::Oldest),
            "spend" => Ok(CampaignSort::Spend),
            "roas" => Ok(CampaignSort::Roas),
            "impressions" => Ok(CampaignSort::Impressions),
            "ctr" => Ok(CampaignSort::Ctr),
            "name" => Ok(CampaignSort::Name),
            _ => Err(UnknownOption::new(s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignFilter {
    search: Option<String>,
    status: Option<String>,
    niche: Option<String>,
    format: Option<String>,
    sort: CampaignSort,
}

impl CampaignFilter {
    pub fn from_query(query: &CampaignsQuery) -> Result<Self, AppError> {
        let sort = match selector(query.sort.as_deref()) {
            Some(raw) => raw
                .parse()
                .map_err(|e| AppError::validation(format!("invalid sort: {e}")))?,
            None => CampaignSort::default(),
        };

        Ok(Self {
            search: selector(query.q.as_deref()).map(|q| q.to_lowercase()),
            status: selector(query.status.as_deref()).map(str::to_string),
            niche: selector(query.niche.as_deref()).map(str::to_string),
            format: selector(query.format.as_deref()).map(str::to_string),
            sort,
        })
    }

    pub fn matches(&self, record: &CampaignRecord) -> bool {
        if let Some(search) = &self.search {
            let hit = record.name.to_lowercase().contains(search)
                || record.niche.to_lowercase().contains(search);
            if !hit {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if !status.eq_ignore_ascii_case(&record.status)
                && !status.eq_ignore_ascii_case(&record.status_label)
            {
                return false;
            }
        }
        if self.niche.as_deref().is_some_and(|n| n != record.niche) {
            return false;
        }
        if self.format.as_deref().is_some_and(|f| f != record.format) {
            return false;
        }
        true
    }

    pub fn apply(&self, records: Vec<CampaignRecord>) -> Vec<CampaignRecord> {
        let mut kept: Vec<CampaignRecord> = records.into_iter().filter(|r| self.matches(r)).collect();
        kept.sort_by(|a, b| self.compare(a, b));
        kept
    }

    fn compare(&self, a: &CampaignRecord, b: &CampaignRecord) -> Ordering {
        match self.sort {
            CampaignSort::Recent => absent_last(a.created_at, b.created_at, |x, y| y.cmp(&x)),
            CampaignSort::Oldest => absent_last(a.created_at, b.created_at, |x, y| x.cmp(&y)),
            CampaignSort::Spend => b.insights.spend.total_cmp(&a.insights.spend),
            CampaignSort::Roas => {
                absent_last(a.insights.roas, b.insights.roas, |x, y| y.total_cmp(&x))
            }
            CampaignSort::Impressions => b.insights.impressions.cmp(&a.insights.impressions),
            CampaignSort::Ctr => b.insights.ctr.total_cmp(&a.insights.ctr),
            CampaignSort::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        }
    }
}

/// Spend bounds compared against the midpoint of each entry's spend range.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpendFilter {
    min: Option<f64>,
    max: Option<f64>,
}

impl SpendFilter {
    pub fn from_query(query: &MetaAdsQuery) -> Result<Self, AppError> {
        let min = parse_amount("min_spend", query.min_spend.as_deref())?;
        let max = parse_amount("max_spend", query.max_spend.as_deref())?;
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(AppError::validation("min_spend must not exceed max_spend"));
            }
        }
        Ok(Self { min, max })
    }

    pub fn is_active(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    /// Entries without a usable spend range never pass an active filter.
    pub fn matches(&self, entry: &AdLibraryEntry) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(midpoint) = entry.spend.as_ref().and_then(|s| s.midpoint()) else {
            return false;
        };
        self.min.map_or(true, |lo| midpoint >= lo) && self.max.map_or(true, |hi| midpoint <= hi)
    }

    pub fn apply(&self, entries: Vec<AdLibraryEntry>) -> Vec<AdLibraryEntry> {
        if !self.is_active() {
            return entries;
        }
        entries.into_iter().filter(|e| self.matches(e)).collect()
    }
}

/// Empty values and `all` mean "no filter".
fn selector(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

fn parse_amount(name: &str, raw: Option<&str>) -> Result<Option<f64>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(Some(value)),
        _ => Err(AppError::validation(format!(
            "{name} must be a non-negative number"
        ))),
    }
}

fn absent_last<T, F>(a: Option<T>, b: Option<T>, present: F) -> Ordering
where
    F: FnOnce(T, T) -> Ordering,
{
    match (a, b) {
        (Some(x), Some(y)) => present(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
