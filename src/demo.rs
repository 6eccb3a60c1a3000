// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Fixed demonstration campaigns for dashboards running without credentials.
//!
//! Only served when demo mode is switched on. The rows are raw Graph-shaped
//! objects pushed through the regular normalizer.

use serde_json::{json, Value};

use crate::model::{AccountStats, CampaignRecord};
use crate::normalize::{normalize_campaign, summarize_account, CampaignContext};

struct DemoCampaign {
    id: &'static str,
    name: &'static str,
    status: &'static str,
    objective: &'static str,
    created_time: &'static str,
    daily_budget: &'static str,
    impressions: u64,
    clicks: u64,
    spend: f64,
    purchases: u32,
}

const CAMPAIGNS: [DemoCampaign; 6] = [
    DemoCampaign {
        id: "120210000000000a1",
        name: "Desafio 21 Dias - VSL Principal",
        status: "ACTIVE",
        objective: "OUTCOME_SALES",
        created_time: "2024-12-10T09:30:00+0000",
        daily_budget: "15000",
        impressions: 148_200,
        clicks: 3_910,
        spend: 1_842.37,
        purchases: 61,
    },
    DemoCampaign {
        id: "120210000000000b4",
        name: "Renda Online - Quiz Topo de Funil",
        status: "ACTIVE",
        objective: "OUTCOME_LEADS",
        created_time: "2024-12-06T14:05:00+0000",
        daily_budget: "8000",
        impressions: 72_450,
        clicks: 2_004,
        spend: 640.10,
        purchases: 188,
    },
    DemoCampaign {
        id: "120210000000000c7",
        name: "Skincare Noturno - Remarketing",
        status: "PAUSED",
        objective: "OUTCOME_SALES",
        created_time: "2024-11-28T18:45:00+0000",
        daily_budget: "5000",
        impressions: 31_870,
        clicks: 655,
        spend: 402.90,
        purchases: 14,
    },
    DemoCampaign {
        id: "120210000000000d2",
        name: "Meditação Guiada - Typebot",
        status: "PENDING_REVIEW",
        objective: "OUTCOME_ENGAGEMENT",
        created_time: "2024-12-14T07:10:00+0000",
        daily_budget: "3000",
        impressions: 0,
        clicks: 0,
        spend: 0.0,
        purchases: 0,
    },
    DemoCampaign {
        id: "120210000000000e9",
        name: "Suplemento Natural - Teste A/B",
        status: "ADSET_PAUSED",
        objective: "OUTCOME_SALES",
        created_time: "2024-11-20T11:00:00+0000",
        daily_budget: "6000",
        impressions: 9_120,
        clicks: 118,
        spend: 96.44,
        purchases: 2,
    },
    DemoCampaign {
        id: "120210000000000f3",
        name: "Black Friday - Oferta Relâmpago",
        status: "ARCHIVED",
        objective: "OUTCOME_SALES",
        created_time: "2024-11-15T00:00:00+0000",
        daily_budget: "20000",
        impressions: 210_900,
        clicks: 5_420,
        spend: 3_215.80,
        purchases: 97,
    },
];

impl DemoCampaign {
    fn raw(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "status": self.status,
            "objective": self.objective,
            "created_time": self.created_time,
            "updated_time": self.created_time,
            "start_time": self.created_time,
            "daily_budget": self.daily_budget,
        })
    }

    fn insights(&self) -> Value {
        json!({
            "impressions": self.impressions.to_string(),
            "clicks": self.clicks.to_string(),
            "spend": format!("{:.2}", self.spend),
            "ctr": format!("{:.4}", ratio(self.clicks as f64 * 100.0, self.impressions as f64)),
            "cpc": format!("{:.4}", ratio(self.spend, self.clicks as f64)),
            "reach": (self.impressions * 7 / 10).to_string(),
            "actions": [{"action_type": "purchase", "value": self.purchases.to_string()}],
        })
    }
}

/// Up to `limit` demonstration campaigns, normalized like live data.
pub fn demo_campaigns(limit: usize, ctx: &CampaignContext<'_>) -> Vec<CampaignRecord> {
    CAMPAIGNS
        .iter()
        .take(limit)
        .map(|campaign| normalize_campaign(&campaign.raw(), Some(&campaign.insights()), ctx))
        .collect()
}

/// Account totals over every demonstration campaign.
pub fn demo_stats() -> AccountStats {
    let raw: Vec<Value> = CAMPAIGNS.iter().map(DemoCampaign::raw).collect();

    let impressions: u64 = CAMPAIGNS.iter().map(|c| c.impressions).sum();
    let clicks: u64 = CAMPAIGNS.iter().map(|c| c.clicks).sum();
    let spend: f64 = CAMPAIGNS.iter().map(|c| c.spend).sum();
    let totals = json!({
        "impressions": impressions,
        "clicks": clicks,
        "spend": format!("{spend:.2}"),
        "ctr": ratio(clicks as f64 * 100.0, impressions as f64),
        "cpc": ratio(spend, clicks as f64),
        "reach": impressions * 7 / 10,
    });

    summarize_account(&raw, Some(&totals))
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
