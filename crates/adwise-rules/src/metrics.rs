//! Daily metric rows and their SQLite store.
//!
//! Tables are keyed by `(date, customer_id, campaign_id)` and
//! `(date, customer_id, campaign_id, ad_group_id, search_term)`; writing the
//! same key again replaces the row, so re-ingesting a day is idempotent.

use std::path::Path;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ─────────────────────────────────────────────────────────────────────────────
// Row Types
// ─────────────────────────────────────────────────────────────────────────────

/// Performance counters shared by every row kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub impressions: u64,
    pub clicks: u64,
    /// Spend in micro-currency units (1 unit = 1_000_000 micros).
    pub cost_micros: i64,
    pub conversions: f64,
    pub conversions_value: f64,
}

impl Metrics {
    /// Spend in currency units.
    pub fn cost(&self) -> f64 {
        micros_to_currency(self.cost_micros)
    }
}

/// Convert micro-currency to currency units.
pub fn micros_to_currency(micros: i64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// One campaign on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDay {
    pub date: NaiveDate,
    pub customer_id: String,
    pub campaign_id: String,
    pub campaign_name: String,
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// One search term within one ad group on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTermDay {
    pub date: NaiveDate,
    pub customer_id: String,
    pub campaign_id: String,
    pub ad_group_id: String,
    pub search_term: String,
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// Ingestion payload: `{"campaigns": [...], "search_terms": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsBatch {
    pub campaigns: Vec<CampaignDay>,
    pub search_terms: Vec<SearchTermDay>,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsCounts {
    pub campaign_days: u64,
    pub search_term_days: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Metrics Store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite store for daily metric rows.
pub struct MetricsDb {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for MetricsDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsDb").finish_non_exhaustive()
    }
}

impl MetricsDb {
    /// Open or create the metrics database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        db.initialize()?;
        info!("Metrics store opened at {:?}", path);
        Ok(db)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Create tables if missing. Safe to call repeatedly.
    ///
    /// Does not touch `user_version`, so the file may be shared with the
    /// memory store.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS campaign_daily (
                date TEXT NOT NULL,
                customer_id TEXT NOT NULL,
                campaign_id TEXT NOT NULL,
                campaign_name TEXT NOT NULL,
                impressions INTEGER NOT NULL DEFAULT 0,
                clicks INTEGER NOT NULL DEFAULT 0,
                cost_micros INTEGER NOT NULL DEFAULT 0,
                conversions REAL NOT NULL DEFAULT 0,
                conversions_value REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (date, customer_id, campaign_id)
            );

            CREATE TABLE IF NOT EXISTS search_term_daily (
                date TEXT NOT NULL,
                customer_id TEXT NOT NULL,
                campaign_id TEXT NOT NULL,
                ad_group_id TEXT NOT NULL,
                search_term TEXT NOT NULL,
                impressions INTEGER NOT NULL DEFAULT 0,
                clicks INTEGER NOT NULL DEFAULT 0,
                cost_micros INTEGER NOT NULL DEFAULT 0,
                conversions REAL NOT NULL DEFAULT 0,
                conversions_value REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (date, customer_id, campaign_id, ad_group_id, search_term)
            );

            CREATE INDEX IF NOT EXISTS idx_campaign_daily_date ON campaign_daily(date);
            CREATE INDEX IF NOT EXISTS idx_search_term_daily_date ON search_term_daily(date);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace campaign rows in one transaction.
    pub fn upsert_campaign_days(&self, rows: &[CampaignDay]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO campaign_daily
                 (date, customer_id, campaign_id, campaign_name, impressions, clicks,
                  cost_micros, conversions, conversions_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.date.format(DATE_FORMAT).to_string(),
                    row.customer_id,
                    row.campaign_id,
                    row.campaign_name,
                    row.metrics.impressions as i64,
                    row.metrics.clicks as i64,
                    row.metrics.cost_micros,
                    row.metrics.conversions,
                    row.metrics.conversions_value,
                ])?;
            }
        }
        tx.commit()?;
        debug!(rows = rows.len(), "campaign rows upserted");
        Ok(rows.len())
    }

    /// Insert or replace search-term rows in one transaction.
    pub fn upsert_search_term_days(&self, rows: &[SearchTermDay]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO search_term_daily
                 (date, customer_id, campaign_id, ad_group_id, search_term, impressions,
                  clicks, cost_micros, conversions, conversions_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.date.format(DATE_FORMAT).to_string(),
                    row.customer_id,
                    row.campaign_id,
                    row.ad_group_id,
                    row.search_term,
                    row.metrics.impressions as i64,
                    row.metrics.clicks as i64,
                    row.metrics.cost_micros,
                    row.metrics.conversions,
                    row.metrics.conversions_value,
                ])?;
            }
        }
        tx.commit()?;
        debug!(rows = rows.len(), "search term rows upserted");
        Ok(rows.len())
    }

    /// Campaign rows dated on or after `since`, optionally for one customer.
    pub fn campaign_days_since(
        &self,
        since: NaiveDate,
        customer: Option<&str>,
    ) -> Result<Vec<CampaignDay>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT date, customer_id, campaign_id, campaign_name, impressions, clicks,
                    cost_micros, conversions, conversions_value
             FROM campaign_daily
             WHERE date >= ?1 AND (?2 IS NULL OR customer_id = ?2)
             ORDER BY date, customer_id, campaign_id",
        )?;
        let rows = stmt.query_map(
            params![since.format(DATE_FORMAT).to_string(), customer],
            |row| {
                Ok(CampaignDay {
                    date: parse_date(row, 0)?,
                    customer_id: row.get(1)?,
                    campaign_id: row.get(2)?,
                    campaign_name: row.get(3)?,
                    metrics: metrics_from(row, 4)?,
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Search-term rows dated on or after `since`, optionally for one customer.
    pub fn search_term_days_since(
        &self,
        since: NaiveDate,
        customer: Option<&str>,
    ) -> Result<Vec<SearchTermDay>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT date, customer_id, campaign_id, ad_group_id, search_term, impressions,
                    clicks, cost_micros, conversions, conversions_value
             FROM search_term_daily
             WHERE date >= ?1 AND (?2 IS NULL OR customer_id = ?2)
             ORDER BY date, customer_id, campaign_id, ad_group_id, search_term",
        )?;
        let rows = stmt.query_map(
            params![since.format(DATE_FORMAT).to_string(), customer],
            |row| {
                Ok(SearchTermDay {
                    date: parse_date(row, 0)?,
                    customer_id: row.get(1)?,
                    campaign_id: row.get(2)?,
                    ad_group_id: row.get(3)?,
                    search_term: row.get(4)?,
                    metrics: metrics_from(row, 5)?,
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Number of stored rows per table.
    pub fn count_rows(&self) -> Result<MetricsCounts> {
        let conn = self.conn.lock();
        let campaign_days: i64 =
            conn.query_row("SELECT COUNT(*) FROM campaign_daily", [], |row| row.get(0))?;
        let search_term_days: i64 =
            conn.query_row("SELECT COUNT(*) FROM search_term_daily", [], |row| row.get(0))?;
        Ok(MetricsCounts {
            campaign_days: campaign_days as u64,
            search_term_days: search_term_days as u64,
        })
    }
}

fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Read the five metric columns starting at `start`.
fn metrics_from(row: &Row<'_>, start: usize) -> rusqlite::Result<Metrics> {
    Ok(Metrics {
        impressions: row.get::<_, i64>(start)?.max(0) as u64,
        clicks: row.get::<_, i64>(start + 1)?.max(0) as u64,
        cost_micros: row.get(start + 2)?,
        conversions: row.get(start + 3)?,
        conversions_value: row.get(start + 4)?,
    })
}
