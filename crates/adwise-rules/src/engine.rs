//! Aggregation and threshold rules.
//!
//! Each rule sums rows per group key, filters the totals against the
//! profile's cutoffs and sorts the survivors. Groups are visited in lexical
//! key order and sorts are stable, so equal scores always come out in the
//! same order.

use std::collections::BTreeMap;

use adwise_config::{AdwiseConfig, ThresholdProfile};
use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use crate::action::{Action, AnalysisReport, SCALE_SUGGESTION, round2};
use crate::error::Result;
use crate::metrics::{CampaignDay, MetricsDb, SearchTermDay, micros_to_currency};

/// Summed counters of one search term over the window.
#[derive(Debug, Default, Clone, Copy)]
struct TermTotals {
    clicks: u64,
    cost_micros: i64,
}

/// Summed counters of one campaign over the window.
#[derive(Debug, Default, Clone, Copy)]
struct CampaignTotals {
    cost_micros: i64,
    conversions: f64,
    conversions_value: f64,
}

impl CampaignTotals {
    fn cost(&self) -> f64 {
        micros_to_currency(self.cost_micros)
    }

    /// Conversion value per unit of spend; zero spend yields 0.
    fn roas(&self) -> f64 {
        if self.cost_micros > 0 {
            self.conversions_value / self.cost()
        } else {
            0.0
        }
    }
}

/// Applies one validated threshold profile to metric rows.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    profile_name: String,
    profile: ThresholdProfile,
}

impl RuleEngine {
    /// Create an engine, rejecting an invalid profile.
    pub fn new(profile_name: impl Into<String>, profile: ThresholdProfile) -> Result<Self> {
        let profile_name = profile_name.into();
        profile.validate(&profile_name)?;
        Ok(Self {
            profile_name,
            profile,
        })
    }

    /// Create an engine for `name`, or the config's active profile.
    pub fn from_config(config: &AdwiseConfig, name: Option<&str>) -> Result<Self> {
        let name = name.unwrap_or_else(|| config.active_profile_name());
        let profile = config.profile(name)?;
        Self::new(name, profile)
    }

    /// Name of the profile, published as the report's `mode`.
    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    /// The profile in use.
    pub fn profile(&self) -> &ThresholdProfile {
        &self.profile
    }

    /// First day included in the decision window ending at `today`.
    pub fn window_start(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.profile.window_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Evaluate all rules over rows dated on or after the window start.
    pub fn analyze(
        &self,
        campaign_rows: &[CampaignDay],
        search_term_rows: &[SearchTermDay],
        today: NaiveDate,
    ) -> AnalysisReport {
        let since = self.window_start(today);

        let mut report = AnalysisReport::empty(&self.profile_name, &self.profile, today);
        report.search_term_actions =
            self.negative_keywords(search_term_rows.iter().filter(|r| r.date >= since));

        let campaigns = group_campaigns(campaign_rows.iter().filter(|r| r.date >= since));
        report.campaign_actions = self.winners(&campaigns);
        report.campaign_actions.extend(self.losers(&campaigns));

        info!(
            mode = %self.profile_name,
            since = %since,
            campaigns = campaigns.len(),
            campaign_actions = report.campaign_actions.len(),
            search_term_actions = report.search_term_actions.len(),
            "analysis complete"
        );
        report
    }

    /// Load the window from a metrics store and analyse it.
    ///
    /// An empty window is not an error: it is logged and yields a report
    /// without actions.
    pub fn analyze_store(
        &self,
        db: &MetricsDb,
        today: NaiveDate,
        customer: Option<&str>,
    ) -> Result<AnalysisReport> {
        let since = self.window_start(today);
        let campaigns = db.campaign_days_since(since, customer)?;
        let terms = db.search_term_days_since(since, customer)?;

        if campaigns.is_empty() && terms.is_empty() {
            warn!(
                since = %since,
                customer = customer.unwrap_or("*"),
                "No metric rows in the decision window; producing an empty report"
            );
            return Ok(AnalysisReport::empty(
                &self.profile_name,
                &self.profile,
                today,
            ));
        }

        Ok(self.analyze(&campaigns, &terms, today))
    }

    // ── Rules ───────────────────────────────────────────────────────────

    /// Search terms with spend and clicks but no conversions, by cost.
    fn negative_keywords<'a>(&self, rows: impl Iterator<Item = &'a SearchTermDay>) -> Vec<Action> {
        let cutoffs = self.profile.search_terms;

        let mut groups: BTreeMap<&str, TermTotals> = BTreeMap::new();
        for row in rows.filter(|r| r.metrics.conversions == 0.0) {
            let totals = groups.entry(row.search_term.as_str()).or_default();
            totals.clicks += row.metrics.clicks;
            totals.cost_micros += row.metrics.cost_micros;
        }

        let mut flagged: Vec<(&str, TermTotals)> = groups
            .into_iter()
            .filter(|(_, t)| {
                t.clicks >= cutoffs.min_clicks && micros_to_currency(t.cost_micros) >= cutoffs.min_cost
            })
            .collect();
        flagged.sort_by(|a, b| b.1.cost_micros.cmp(&a.1.cost_micros));

        let why = format!(
            "Spend with zero conversions in last {} days (thresholds: clicks>={}, cost>={})",
            self.profile.window_days,
            cutoffs.min_clicks,
            format_cutoff(cutoffs.min_cost)
        );

        debug!(count = flagged.len(), "negative keyword candidates");
        flagged
            .into_iter()
            .map(|(term, totals)| Action::NegativeKeywordCandidate {
                search_term: term.to_string(),
                clicks: totals.clicks,
                cost: round2(micros_to_currency(totals.cost_micros)),
                why: why.clone(),
            })
            .collect()
    }

    /// Campaigns clearing ROAS, conversion and spend cutoffs, by ROAS.
    fn winners(&self, groups: &BTreeMap<&str, CampaignTotals>) -> Vec<Action> {
        let cutoffs = self.profile.campaign_winners;

        let mut flagged: Vec<(&str, CampaignTotals, f64)> = groups
            .iter()
            .map(|(name, totals)| (*name, *totals, totals.roas()))
            .filter(|(_, t, roas)| {
                *roas >= cutoffs.min_roas
                    && t.conversions >= cutoffs.min_conversions
                    && t.cost() >= cutoffs.min_cost
            })
            .collect();
        flagged.sort_by(|a, b| b.2.total_cmp(&a.2));

        debug!(count = flagged.len(), "scale candidates");
        flagged
            .into_iter()
            .map(|(name, totals, roas)| Action::ScaleCandidate {
                campaign: name.to_string(),
                cost: round2(totals.cost()),
                conversions: round2(totals.conversions),
                conversions_value: round2(totals.conversions_value),
                roas: round2(roas),
                suggestion: SCALE_SUGGESTION.to_string(),
            })
            .collect()
    }

    /// Campaigns with high spend and exactly the loser conversion count, by cost.
    fn losers(&self, groups: &BTreeMap<&str, CampaignTotals>) -> Vec<Action> {
        let cutoffs = self.profile.campaign_losers;

        let mut flagged: Vec<(&str, CampaignTotals)> = groups
            .iter()
            .map(|(name, totals)| (*name, *totals))
            .filter(|(_, t)| t.cost() >= cutoffs.min_cost && t.conversions == cutoffs.conversions_equals)
            .collect();
        flagged.sort_by(|a, b| b.1.cost_micros.cmp(&a.1.cost_micros));

        let why = format!(
            "High spend with zero conversions in last {} days (threshold: cost>={})",
            self.profile.window_days,
            format_cutoff(cutoffs.min_cost)
        );

        debug!(count = flagged.len(), "pause candidates");
        flagged
            .into_iter()
            .map(|(name, totals)| Action::PauseCandidate {
                campaign: name.to_string(),
                cost: round2(totals.cost()),
                conversions: round2(totals.conversions),
                why: why.clone(),
            })
            .collect()
    }
}

/// Sum campaign rows per campaign name (exact, case-sensitive).
fn group_campaigns<'a>(
    rows: impl Iterator<Item = &'a CampaignDay>,
) -> BTreeMap<&'a str, CampaignTotals> {
    let mut groups: BTreeMap<&str, CampaignTotals> = BTreeMap::new();
    for row in rows {
        let totals = groups.entry(row.campaign_name.as_str()).or_default();
        totals.cost_micros += row.metrics.cost_micros;
        totals.conversions += row.metrics.conversions;
        totals.conversions_value += row.metrics.conversions_value;
    }
    groups
}

/// Render a cutoff the way it appears in configuration (`30.0`, `12.5`).
fn format_cutoff(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()
    }

    fn days_ago(n: u64) -> NaiveDate {
        today().checked_sub_days(Days::new(n)).unwrap()
    }

    fn micros(cost: f64) -> i64 {
        (cost * 1_000_000.0).round() as i64
    }

    fn term(name: &str, clicks: u64, cost: f64, conversions: f64, age: u64) -> SearchTermDay {
        SearchTermDay {
            date: days_ago(age),
            customer_id: "c1".to_string(),
            campaign_id: "1".to_string(),
            ad_group_id: "11".to_string(),
            search_term: name.to_string(),
            metrics: Metrics {
                impressions: clicks * 10,
                clicks,
                cost_micros: micros(cost),
                conversions,
                conversions_value: 0.0,
            },
        }
    }

    fn campaign(name: &str, cost: f64, conversions: f64, value: f64, age: u64) -> CampaignDay {
        CampaignDay {
            date: days_ago(age),
            customer_id: "c1".to_string(),
            campaign_id: name.to_lowercase(),
            campaign_name: name.to_string(),
            metrics: Metrics {
                impressions: 1000,
                clicks: 50,
                cost_micros: micros(cost),
                conversions,
                conversions_value: value,
            },
        }
    }

    fn engine_with_terms(min_clicks: u64, min_cost: f64) -> RuleEngine {
        let mut profile = ThresholdProfile::weekly();
        profile.search_terms.min_clicks = min_clicks;
        profile.search_terms.min_cost = min_cost;
        RuleEngine::new("weekly", profile).unwrap()
    }

    #[test]
    fn test_free_trial_negative_keyword() {
        let engine = engine_with_terms(20, 30.0);
        let report = engine.analyze(&[], &[term("free trial", 25, 40.0, 0.0, 1)], today());

        assert_eq!(report.search_term_actions.len(), 1);
        match &report.search_term_actions[0] {
            Action::NegativeKeywordCandidate {
                search_term,
                clicks,
                cost,
                why,
            } => {
                assert_eq!(search_term, "free trial");
                assert_eq!(*clicks, 25);
                assert_eq!(*cost, 40.0);
                assert_eq!(
                    why,
                    "Spend with zero conversions in last 7 days (thresholds: clicks>=20, cost>=30.0)"
                );
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_converting_rows_excluded_before_grouping() {
        let engine = engine_with_terms(20, 30.0);
        let rows = [
            term("pricing", 15, 25.0, 0.0, 1),
            term("pricing", 30, 60.0, 2.0, 2),
            term("pricing", 6, 6.0, 0.0, 3),
        ];
        let report = engine.analyze(&[], &rows, today());

        // Only the zero-conversion days count: 21 clicks, 31.0 cost
        assert_eq!(report.search_term_actions.len(), 1);
        match &report.search_term_actions[0] {
            Action::NegativeKeywordCandidate { clicks, cost, .. } => {
                assert_eq!(*clicks, 21);
                assert_eq!(*cost, 31.0);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_negatives_sorted_by_cost_and_case_sensitive() {
        let engine = engine_with_terms(1, 1.0);
        let rows = [
            term("Shoes", 5, 10.0, 0.0, 1),
            term("shoes", 5, 30.0, 0.0, 1),
            term("boots", 5, 20.0, 0.0, 1),
        ];
        let report = engine.analyze(&[], &rows, today());
        let terms: Vec<_> = report
            .search_term_actions
            .iter()
            .map(|a| a.entity())
            .collect();
        assert_eq!(terms, vec!["shoes", "boots", "Shoes"]);
    }

    #[test]
    fn test_rows_outside_window_ignored() {
        let engine = engine_with_terms(20, 30.0);
        let rows = [
            term("free trial", 25, 40.0, 0.0, 7),
            term("old term", 25, 40.0, 0.0, 8),
        ];
        let report = engine.analyze(&[], &rows, today());
        assert_eq!(report.search_term_actions.len(), 1);
        assert_eq!(report.search_term_actions[0].entity(), "free trial");
    }

    #[test]
    fn test_campaign_a_is_winner() {
        let engine = RuleEngine::new("weekly", ThresholdProfile::weekly()).unwrap();
        let rows = [
            campaign("A", 150.0, 2.0, 250.0, 1),
            campaign("A", 100.0, 1.0, 150.0, 2),
        ];
        let report = engine.analyze(&rows, &[], today());

        assert_eq!(
            report.campaign_actions,
            vec![Action::ScaleCandidate {
                campaign: "A".to_string(),
                cost: 250.0,
                conversions: 3.0,
                conversions_value: 400.0,
                roas: 1.6,
                suggestion: SCALE_SUGGESTION.to_string(),
            }]
        );
    }

    #[test]
    fn test_winners_then_losers() {
        let engine = RuleEngine::new("weekly", ThresholdProfile::weekly()).unwrap();
        let rows = [
            campaign("Brand", 300.0, 10.0, 900.0, 1),
            campaign("Generic", 250.0, 3.0, 400.0, 1),
            campaign("Display", 350.0, 0.0, 0.0, 1),
            campaign("Video", 500.0, 0.0, 0.0, 1),
            campaign("Tiny", 50.0, 0.0, 0.0, 1),
        ];
        let report = engine.analyze(&rows, &[], today());

        let summary: Vec<_> = report
            .campaign_actions
            .iter()
            .map(|a| (a.type_tag(), a.entity()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("SCALE_WINNER", "Brand"),
                ("SCALE_WINNER", "Generic"),
                ("PAUSE_OR_RESTRUCTURE", "Video"),
                ("PAUSE_OR_RESTRUCTURE", "Display"),
            ]
        );
    }

    #[test]
    fn test_winner_and_loser_exclusive() {
        let engine = RuleEngine::new("baseline", ThresholdProfile::baseline()).unwrap();
        let rows: Vec<_> = (0..20)
            .map(|i| {
                let conv = if i % 2 == 0 { 0.0 } else { 3.0 };
                campaign(&format!("C{i}"), 200.0 + 20.0 * i as f64, conv, 500.0, 1)
            })
            .collect();
        let report = engine.analyze(&rows, &[], today());

        let mut winners = Vec::new();
        let mut losers = Vec::new();
        for action in &report.campaign_actions {
            match action {
                Action::ScaleCandidate { campaign, .. } => winners.push(campaign.clone()),
                Action::PauseCandidate { campaign, .. } => losers.push(campaign.clone()),
                other => panic!("unexpected action: {other:?}"),
            }
        }
        assert!(!winners.is_empty());
        assert!(!losers.is_empty());
        assert!(winners.iter().all(|w| !losers.contains(w)));
    }

    #[test]
    fn test_zero_cost_group_never_winner() {
        let mut profile = ThresholdProfile::weekly();
        profile.campaign_winners.min_cost = 0.0;
        profile.campaign_winners.min_conversions = 0.0;
        let engine = RuleEngine::new("weekly", profile).unwrap();

        let report = engine.analyze(&[campaign("Free", 0.0, 5.0, 100.0, 1)], &[], today());
        assert!(
            report
                .campaign_actions
                .iter()
                .all(|a| a.type_tag() != "SCALE_WINNER")
        );
    }

    #[test]
    fn test_empty_input() {
        let engine = RuleEngine::new("weekly", ThresholdProfile::weekly()).unwrap();
        let report = engine.analyze(&[], &[], today());
        assert!(report.is_empty());
        assert_eq!(report.mode, "weekly");
        assert_eq!(report.window_days, 7);
        assert_eq!(report.generated_at, today());
    }

    #[test]
    fn test_report_json_is_deterministic() {
        let engine = RuleEngine::new("weekly", ThresholdProfile::weekly()).unwrap();
        let campaigns = [
            campaign("X", 300.0, 3.0, 600.0, 1),
            campaign("Y", 300.0, 3.0, 600.0, 1),
            campaign("Z", 400.0, 0.0, 0.0, 2),
        ];
        let terms = [
            term("a", 20, 25.0, 0.0, 1),
            term("b", 20, 25.0, 0.0, 1),
        ];

        let first = engine.analyze(&campaigns, &terms, today()).to_json_pretty().unwrap();
        let second = engine.analyze(&campaigns, &terms, today()).to_json_pretty().unwrap();
        assert_eq!(first, second);

        // Equal ROAS keeps lexical order
        let report = AnalysisReport::from_json(&first).unwrap();
        assert_eq!(report.campaign_actions[0].entity(), "X");
        assert_eq!(report.campaign_actions[1].entity(), "Y");
        assert_eq!(report.search_term_actions[0].entity(), "a");
    }

    #[test]
    fn test_report_json_shape() {
        let engine = engine_with_terms(20, 30.0);
        let report = engine.analyze(&[], &[term("free trial", 25, 40.0, 0.0, 1)], today());
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["mode"], "weekly");
        assert_eq!(json["generated_at"], "2026-03-20");
        assert_eq!(json["thresholds"]["search_terms"]["conversions"], 0);
        assert_eq!(json["search_term_actions"][0]["type"], "ADD_NEGATIVE");
        assert_eq!(json["search_term_actions"][0]["cost"], 40.0);
        assert!(json["campaign_actions"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let mut profile = ThresholdProfile::weekly();
        profile.window_days = 0;
        let err = RuleEngine::new("weekly", profile).unwrap_err();
        assert!(matches!(err, crate::RuleError::Configuration(_)));
    }

    #[test]
    fn test_from_config_unknown_profile() {
        let err = RuleEngine::from_config(&AdwiseConfig::new(), Some("monthly")).unwrap_err();
        assert!(err.to_string().contains("monthly"));
    }

    #[test]
    fn test_analyze_store_empty_window() {
        let db = MetricsDb::open_in_memory().unwrap();
        db.upsert_campaign_days(&[campaign("Old", 500.0, 0.0, 0.0, 30)])
            .unwrap();

        let engine = RuleEngine::new("weekly", ThresholdProfile::weekly()).unwrap();
        let report = engine.analyze_store(&db, today(), None).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_analyze_store_matches_slices() {
        let db = MetricsDb::open_in_memory().unwrap();
        let campaigns = [
            campaign("Brand", 300.0, 10.0, 900.0, 1),
            campaign("Display", 350.0, 0.0, 0.0, 2),
        ];
        let terms = [term("free trial", 25, 40.0, 0.0, 1)];
        db.upsert_campaign_days(&campaigns).unwrap();
        db.upsert_search_term_days(&terms).unwrap();

        let engine = RuleEngine::new("weekly", ThresholdProfile::weekly()).unwrap();
        let from_store = engine.analyze_store(&db, today(), Some("c1")).unwrap();
        let from_slices = engine.analyze(&campaigns, &terms, today());
        assert_eq!(from_store, from_slices);
    }

    #[test]
    fn test_format_cutoff() {
        assert_eq!(format_cutoff(30.0), "30.0");
        assert_eq!(format_cutoff(12.5), "12.5");
    }
}
