use anyhow::Result;
use sqlx::SqlitePool;

use crate::aggregate;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Structured table for indexed queries and aggregations
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS investments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fiscal_year INTEGER NOT NULL,
            state_name TEXT NOT NULL,
            county TEXT,
            county_fips TEXT,
            congressional_district TEXT,
            program_area TEXT,
            program TEXT,
            investment_type TEXT,
            investment_dollars_numeric REAL NOT NULL DEFAULT 0,
            investment_dollars_original TEXT NOT NULL DEFAULT '',
            number_of_investments INTEGER NOT NULL DEFAULT 1,
            borrower_name TEXT,
            city TEXT,
            lender_name TEXT,
            project_name TEXT,
            funding_code TEXT,
            naics_industry_sector TEXT,
            naics_national_industry_code TEXT,
            naics_national_industry TEXT,
            portfolio_type TEXT,
            persistent_poverty_community_status TEXT,
            zip_code TEXT,
            project_announced_description TEXT,
            source_file TEXT NOT NULL,
            imported_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Historical summary table, replace-by-natural-key on import
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS summary (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fiscal_year INTEGER NOT NULL,
            state_name TEXT NOT NULL,
            program_area TEXT NOT NULL,
            investment_dollars_numeric REAL NOT NULL DEFAULT 0,
            investment_dollars_original TEXT NOT NULL DEFAULT '',
            number_of_investments INTEGER NOT NULL DEFAULT 1,
            source_file TEXT NOT NULL,
            imported_at TEXT NOT NULL,
            UNIQUE(fiscal_year, state_name, program_area)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Key/value table for pipeline bookkeeping (per-table rebuild stamps)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes on the common query fields and composite lookup paths
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_fiscal_year ON investments(fiscal_year)",
        "CREATE INDEX IF NOT EXISTS idx_state_name ON investments(state_name)",
        "CREATE INDEX IF NOT EXISTS idx_program_area ON investments(program_area)",
        "CREATE INDEX IF NOT EXISTS idx_investment_dollars ON investments(investment_dollars_numeric)",
        "CREATE INDEX IF NOT EXISTS idx_county_fips ON investments(county_fips)",
        "CREATE INDEX IF NOT EXISTS idx_state_year ON investments(state_name, fiscal_year)",
        "CREATE INDEX IF NOT EXISTS idx_program_year ON investments(program_area, fiscal_year)",
        "CREATE INDEX IF NOT EXISTS idx_state_program_year ON investments(state_name, program_area, fiscal_year)",
    ];
    for index in indexes {
        sqlx::query(index).execute(pool).await?;
    }

    // Empty aggregation tables so reads work before the first rebuild
    aggregate::create_empty_tables(pool).await?;

    Ok(())
}
