//! Recommendation prompt for the external text-generation step.

use adwise_rules::AnalysisReport;

use crate::error::Result;
use crate::retrieve::RecallContext;

/// A rendered consultant prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationPrompt {
    text: String,
}

impl RecommendationPrompt {
    /// Render the prompt for `analysis`, citing `context` as prior runs.
    pub fn build(analysis: &AnalysisReport, context: &RecallContext) -> Result<Self> {
        let window = analysis.window_days;
        let losers = analysis.thresholds.campaign_losers;
        let winners = analysis.thresholds.campaign_winners;
        let analysis_json = analysis.to_json_pretty()?;

        let mut text = format!(
            "You are a senior paid-search performance consultant.\n\
             You are conservative, data-driven and operationally realistic.\n\
             Assume every action is carried out by hand in the ads platform UI.\n\
             \n\
             Context:\n\
             - Campaign type: Search only\n\
             - Objective: maximise ROAS; protecting capital matters more than scale\n\
             - Decision window: {window} days\n\
             - All metrics below are pre-computed. Do NOT recalculate them.\n\
             \n\
             Hard constraints:\n\
             - Do NOT suggest automation, scripts, API usage or bidding strategy changes.\n\
             - Do NOT give generic advice.\n\
             - Do NOT invent features or UI elements the platform does not have.\n\
             \n\
             Prioritisation rules:\n\
             1) Any campaign with cost >= {lose_cost} AND conversions = {lose_conv} is HIGH priority.\n\
             2) Any campaign with ROAS >= {win_roas}, conversions >= {win_conv} and cost >= {win_cost} is HIGH or MEDIUM priority.\n\
             3) LOW priority is only for low-spend or informational items.\n\
             \n\
             Completeness rules:\n\
             - Cover EVERY item in campaign_actions and search_term_actions.\n\
             - Give each item its own detailed section; no placeholders, no omissions.\n\
             \n\
             Output format:\n\
             \n\
             # Priority Summary\n\
             ## High\n\
             ## Medium\n\
             ## Low\n\
             \n\
             # Action Details\n\
             ## [ITEM NAME]\n\
             - Type: (Scale winner | Pause / Restructure | Add negative keyword)\n\
             - Why it matters (cite cost, conversions, ROAS from the data):\n\
             - How to execute in the UI, step by step:\n\
             - Risks:\n\
             - Validation metric (after {window} days):\n\
             \n",
            lose_cost = losers.min_cost,
            lose_conv = losers.conversions_equals,
            win_roas = winners.min_roas,
            win_conv = winners.min_conversions,
            win_cost = winners.min_cost,
        );

        text.push_str("Prior runs (most similar first; use them for continuity, not as data):\n");
        if context.snippets.is_empty() {
            match &context.warning {
                Some(warning) => {
                    text.push_str(&format!("- No prior context available ({warning}).\n"));
                }
                None => text.push_str("- No prior runs recorded.\n"),
            }
        } else {
            for (i, snippet) in context.snippets.iter().enumerate() {
                text.push_str(&format!(
                    "\n### [{}] {} from {} (score {:.4}, source {})\n{}\n",
                    i + 1,
                    snippet.doc_type,
                    snippet.created_at,
                    snippet.score,
                    snippet.source,
                    snippet.content.trim_end()
                ));
            }
        }

        text.push_str("\nInput data (JSON):\n");
        text.push_str(&analysis_json);
        Ok(Self { text })
    }

    /// Query used to recall prior runs relevant to `analysis`.
    pub fn context_query(analysis: &AnalysisReport) -> String {
        let mut query = format!(
            "mode: {} window_days: {}",
            analysis.mode, analysis.window_days
        );
        for action in analysis
            .campaign_actions
            .iter()
            .chain(&analysis.search_term_actions)
        {
            query.push_str(&format!("\n{}: {}", action.type_tag(), action.entity()));
        }
        query
    }

    /// The prompt text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consume into the prompt text.
    pub fn into_string(self) -> String {
        self.text
    }
}

impl std::fmt::Display for RecommendationPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
