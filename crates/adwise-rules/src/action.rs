//! Typed actions and the analysis report they are published in.

use adwise_config::{LoserThresholds, ThresholdProfile, WinnerThresholds};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Suggestion attached to every scale candidate.
pub const SCALE_SUGGESTION: &str = "Increase budget gradually (+10–20%) or duplicate into a tighter structure (more specific keywords/ad groups).";

/// A recommended change, tagged in JSON by its `type` field.
///
/// Monetary amounts, conversions and ROAS are already rounded to two
/// decimals; ranking happens on unrounded values before construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Search term spending without converting; exclude it.
    #[serde(rename = "ADD_NEGATIVE")]
    NegativeKeywordCandidate {
        search_term: String,
        clicks: u64,
        cost: f64,
        why: String,
    },

    /// Campaign returning well above its spend; give it more budget.
    #[serde(rename = "SCALE_WINNER")]
    ScaleCandidate {
        campaign: String,
        cost: f64,
        conversions: f64,
        conversions_value: f64,
        roas: f64,
        suggestion: String,
    },

    /// Campaign spending heavily without conversions.
    #[serde(rename = "PAUSE_OR_RESTRUCTURE")]
    PauseCandidate {
        campaign: String,
        cost: f64,
        conversions: f64,
        why: String,
    },
}

impl Action {
    /// The JSON `type` tag.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Action::NegativeKeywordCandidate { .. } => "ADD_NEGATIVE",
            Action::ScaleCandidate { .. } => "SCALE_WINNER",
            Action::PauseCandidate { .. } => "PAUSE_OR_RESTRUCTURE",
        }
    }

    /// Campaign name or search term the action targets.
    pub fn entity(&self) -> &str {
        match self {
            Action::NegativeKeywordCandidate { search_term, .. } => search_term,
            Action::ScaleCandidate { campaign, .. } | Action::PauseCandidate { campaign, .. } => {
                campaign
            }
        }
    }

    /// Rounded spend in currency units.
    pub fn cost(&self) -> f64 {
        match self {
            Action::NegativeKeywordCandidate { cost, .. }
            | Action::ScaleCandidate { cost, .. }
            | Action::PauseCandidate { cost, .. } => *cost,
        }
    }
}

/// Round to two decimals for publication.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ─────────────────────────────────────────────────────────────────────────────
// Report
// ─────────────────────────────────────────────────────────────────────────────

/// Search-term cutoffs as published, including the implicit zero-conversion filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchTermReportThresholds {
    pub min_clicks: u64,
    pub min_cost: f64,
    pub conversions: u64,
}

/// Every cutoff a report was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportThresholds {
    pub search_terms: SearchTermReportThresholds,
    pub campaign_winners: WinnerThresholds,
    pub campaign_losers: LoserThresholds,
}

impl From<&ThresholdProfile> for ReportThresholds {
    fn from(profile: &ThresholdProfile) -> Self {
        Self {
            search_terms: SearchTermReportThresholds {
                min_clicks: profile.search_terms.min_clicks,
                min_cost: profile.search_terms.min_cost,
                conversions: 0,
            },
            campaign_winners: profile.campaign_winners,
            campaign_losers: profile.campaign_losers,
        }
    }
}

/// Output of one rule engine run.
///
/// `campaign_actions` lists winners (by ROAS) followed by losers (by cost).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Profile name the run used.
    pub mode: String,
    pub window_days: u32,
    pub generated_at: NaiveDate,
    pub thresholds: ReportThresholds,
    pub campaign_actions: Vec<Action>,
    pub search_term_actions: Vec<Action>,
}

impl AnalysisReport {
    /// A report with no actions for the given profile.
    pub fn empty(mode: impl Into<String>, profile: &ThresholdProfile, today: NaiveDate) -> Self {
        Self {
            mode: mode.into(),
            window_days: profile.window_days,
            generated_at: today,
            thresholds: ReportThresholds::from(profile),
            campaign_actions: Vec::new(),
            search_term_actions: Vec::new(),
        }
    }

    /// Whether the run flagged nothing.
    pub fn is_empty(&self) -> bool {
        self.campaign_actions.is_empty() && self.search_term_actions.is_empty()
    }

    /// Indented JSON, as written to `analysis_output.json`.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a report previously written by [`to_json_pretty`](Self::to_json_pretty).
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
