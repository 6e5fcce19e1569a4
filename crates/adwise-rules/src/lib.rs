//! Threshold rules over daily advertising metrics.
//!
//! ```text
//! CampaignDay / SearchTermDay rows ──► RuleEngine::analyze ──► AnalysisReport
//!                                        │
//!                                        ├─ negative keywords (search terms)
//!                                        ├─ winners  (campaigns, by ROAS)
//!                                        └─ losers   (campaigns, by cost)
//! ```
//!
//! Rows come either from slices or from a [`MetricsDb`].

pub mod action;
pub mod engine;
pub mod error;
pub mod metrics;

pub use action::{Action, AnalysisReport, ReportThresholds, SearchTermReportThresholds};
pub use engine::RuleEngine;
pub use error::{Result, RuleError};
pub use metrics::{CampaignDay, Metrics, MetricsBatch, MetricsCounts, MetricsDb, SearchTermDay};
