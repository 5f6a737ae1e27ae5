//! Database statistics and data freshness.
//!
//! A quick summary of what's loaded: record counts, fiscal-year coverage,
//! and how old the last import is. Staleness is surfaced as data for the
//! caller (or an LLM tool) to act on; nothing here triggers a refresh.

use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;

const IMPORT_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub record_count: i64,
    pub fiscal_year_min: Option<i64>,
    pub fiscal_year_max: Option<i64>,
    pub last_imported_at: Option<String>,
    pub source_file: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSummary {
    pub investments_table: TableSummary,
    pub summary_table: TableSummary,
    pub last_updated: Option<String>,
    pub aggregations_rebuilt_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Freshness {
    pub data_age_days: i64,
    pub freshness_status: &'static str,
    pub last_update: String,
    pub recommendation: &'static str,
}

pub async fn data_summary(pool: &SqlitePool) -> Result<DataSummary> {
    let investments_table = table_summary(pool, "investments").await?;
    let summary_table = table_summary(pool, "summary").await?;

    let last_updated = match (
        &investments_table.last_imported_at,
        &summary_table.last_imported_at,
    ) {
        (Some(a), Some(b)) => Some(a.max(b).clone()),
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    };

    let aggregations_rebuilt_at: Option<String> =
        sqlx::query_scalar("SELECT value FROM meta WHERE key = 'state_year_summary.rebuilt_at'")
            .fetch_optional(pool)
            .await?;

    Ok(DataSummary {
        investments_table,
        summary_table,
        last_updated,
        aggregations_rebuilt_at,
    })
}

async fn table_summary(pool: &SqlitePool, table: &str) -> Result<TableSummary> {
    let row = sqlx::query(&format!(
        "SELECT COUNT(*) AS record_count, MIN(fiscal_year) AS fy_min, \
         MAX(fiscal_year) AS fy_max, MAX(imported_at) AS last_imported FROM {}",
        table
    ))
    .fetch_one(pool)
    .await?;

    let source_file: Option<String> = sqlx::query_scalar(&format!(
        "SELECT source_file FROM {} ORDER BY imported_at DESC LIMIT 1",
        table
    ))
    .fetch_optional(pool)
    .await?;

    Ok(TableSummary {
        record_count: row.get("record_count"),
        fiscal_year_min: row.get("fy_min"),
        fiscal_year_max: row.get("fy_max"),
        last_imported_at: row.get("last_imported"),
        source_file,
    })
}

/// Freshness buckets, in days since the last completed import.
pub fn classify_freshness(age_days: i64) -> (&'static str, &'static str) {
    if age_days < 8 {
        ("very_fresh", "Data is from this week.")
    } else if age_days <= 14 {
        ("fresh", "Data is recent.")
    } else if age_days <= 21 {
        ("acceptable", "Data is from within this month.")
    } else if age_days <= 27 {
        (
            "getting_stale",
            "Consider running a refresh for the latest information.",
        )
    } else {
        (
            "stale",
            "Data is outdated. Run a refresh for current information.",
        )
    }
}

/// `None` when nothing has been imported yet.
pub async fn freshness(pool: &SqlitePool) -> Result<Option<Freshness>> {
    let summary = data_summary(pool).await?;
    let Some(last_update) = summary.last_updated else {
        return Ok(None);
    };

    let imported = NaiveDateTime::parse_from_str(&last_update, IMPORT_TS_FORMAT)?;
    let data_age_days = (Utc::now().naive_utc() - imported).num_days();
    let (freshness_status, recommendation) = classify_freshness(data_age_days);

    Ok(Some(Freshness {
        data_age_days,
        freshness_status,
        last_update,
        recommendation,
    }))
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, pool: &SqlitePool) -> Result<()> {
    let summary = data_summary(pool).await?;
    let fresh = freshness(pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Rural Data Gateway - Database Stats");
    println!("===================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    print_table("Investments", &summary.investments_table);
    print_table("Summary", &summary.summary_table);
    println!();
    println!(
        "  Aggregations rebuilt: {}",
        summary
            .aggregations_rebuilt_at
            .as_deref()
            .unwrap_or("never")
    );
    match fresh {
        Some(f) => println!(
            "  Freshness:   {} ({} days old). {}",
            f.freshness_status, f.data_age_days, f.recommendation
        ),
        None => println!("  Freshness:   no data imported yet"),
    }
    println!();

    Ok(())
}

fn print_table(label: &str, table: &TableSummary) {
    let years = match (table.fiscal_year_min, table.fiscal_year_max) {
        (Some(min), Some(max)) if min != max => format!("FY{}-FY{}", min, max),
        (Some(min), _) => format!("FY{}", min),
        _ => "no rows".to_string(),
    };
    println!(
        "  {:<12} {:>8} rows   {:<16} last import: {}",
        label,
        table.record_count,
        years,
        table.last_imported_at.as_deref().unwrap_or("never")
    );
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_buckets() {
        assert_eq!(classify_freshness(0).0, "very_fresh");
        assert_eq!(classify_freshness(7).0, "very_fresh");
        assert_eq!(classify_freshness(8).0, "fresh");
        assert_eq!(classify_freshness(14).0, "fresh");
        assert_eq!(classify_freshness(21).0, "acceptable");
        assert_eq!(classify_freshness(27).0, "getting_stale");
        assert_eq!(classify_freshness(28).0, "stale");
        assert_eq!(classify_freshness(400).0, "stale");
    }
}
