//! Aggregation builder.
//!
//! Recomputes the three derived summary tables (state+year, program+year,
//! state+program+year) from the current `investments` set. Statistics are
//! computed only over strictly-positive dollar values, so the normalizer's
//! zero-defaults for suppressed amounts never skew an average.
//!
//! Each table is rebuilt two-phase: the new generation is assembled in a
//! staging table, then swapped into place inside a single transaction.
//! Readers never observe a missing or half-built table. The rebuild is a
//! pure function of `investments`: running it twice in a row produces
//! identical tables, row for row.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::PipelineError;
use crate::models::Grouping;

pub(crate) struct GroupSpec {
    pub grouping: Grouping,
    pub key_columns: &'static [(&'static str, &'static str)],
    /// Output column holding the distinct count of the counter dimension.
    pub distinct_column: &'static str,
    /// Source column the distinct count is taken over.
    pub distinct_source: &'static str,
}

pub(crate) const GROUPINGS: [GroupSpec; 3] = [
    GroupSpec {
        grouping: Grouping::StateYear,
        key_columns: &[
            ("state_name", "TEXT NOT NULL"),
            ("fiscal_year", "INTEGER NOT NULL"),
        ],
        distinct_column: "distinct_programs",
        distinct_source: "program_area",
    },
    GroupSpec {
        grouping: Grouping::ProgramYear,
        key_columns: &[
            ("program_area", "TEXT NOT NULL"),
            ("fiscal_year", "INTEGER NOT NULL"),
        ],
        distinct_column: "distinct_states",
        distinct_source: "state_name",
    },
    GroupSpec {
        grouping: Grouping::StateProgramYear,
        key_columns: &[
            ("state_name", "TEXT NOT NULL"),
            ("program_area", "TEXT NOT NULL"),
            ("fiscal_year", "INTEGER NOT NULL"),
        ],
        distinct_column: "distinct_counties",
        distinct_source: "county",
    },
];

impl GroupSpec {
    pub(crate) fn table(&self) -> &'static str {
        self.grouping.table()
    }

    fn key_names(&self) -> Vec<&'static str> {
        self.key_columns.iter().map(|(name, _)| *name).collect()
    }

    pub(crate) fn create_sql(&self, table: &str) -> String {
        let columns = self
            .key_columns
            .iter()
            .map(|(name, sql_type)| format!("{} {}", name, sql_type))
            .collect::<Vec<_>>()
            .join(",\n            ");
        let pk = self.key_names().join(", ");

        format!(
            r#"
        CREATE TABLE IF NOT EXISTS {table} (
            {columns},
            total_investments INTEGER NOT NULL,
            total_dollars REAL NOT NULL,
            avg_dollars REAL NOT NULL,
            min_dollars REAL NOT NULL,
            max_dollars REAL NOT NULL,
            {distinct} INTEGER NOT NULL,
            PRIMARY KEY ({pk})
        )
        "#,
            table = table,
            columns = columns,
            distinct = self.distinct_column,
            pk = pk,
        )
    }

    /// Grouping rows where a key dimension is NULL would collapse into one
    /// meaningless bucket, so they are excluded along with non-positive
    /// dollar values. The ORDER BY keeps insertion order deterministic so
    /// consecutive rebuilds produce identical tables.
    fn fill_sql(&self, table: &str) -> String {
        let keys = self.key_names().join(", ");
        let not_null = self
            .key_names()
            .iter()
            .map(|name| format!("{} IS NOT NULL", name))
            .collect::<Vec<_>>()
            .join(" AND ");

        format!(
            r#"
        INSERT INTO {table}
        SELECT {keys},
               COUNT(*),
               SUM(investment_dollars_numeric),
               ROUND(AVG(investment_dollars_numeric), 2),
               MIN(investment_dollars_numeric),
               MAX(investment_dollars_numeric),
               COUNT(DISTINCT {distinct_source})
        FROM investments
        WHERE investment_dollars_numeric > 0 AND {not_null}
        GROUP BY {keys}
        ORDER BY {keys}
        "#,
            table = table,
            keys = keys,
            distinct_source = self.distinct_source,
            not_null = not_null,
        )
    }
}

/// Create empty aggregation tables so reads work before the first rebuild.
pub async fn create_empty_tables(pool: &SqlitePool) -> Result<(), PipelineError> {
    for spec in &GROUPINGS {
        sqlx::query(&spec.create_sql(spec.table()))
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Rebuild all three aggregation tables from the current `investments` set.
///
/// Must run strictly after ingestion completes for a cycle; it reads the
/// table ingestion just replaced.
pub async fn rebuild_all(pool: &SqlitePool) -> Result<(), PipelineError> {
    let rebuilt_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    for spec in &GROUPINGS {
        rebuild_one(pool, spec, &rebuilt_at).await?;
        info!(table = spec.table(), "aggregation table rebuilt");
    }

    Ok(())
}

async fn rebuild_one(
    pool: &SqlitePool,
    spec: &GroupSpec,
    rebuilt_at: &str,
) -> Result<(), PipelineError> {
    let table = spec.table();
    let staging = format!("{}_new", table);

    // Assemble the new generation off to the side.
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", staging))
        .execute(pool)
        .await?;
    sqlx::query(&spec.create_sql(&staging)).execute(pool).await?;
    sqlx::query(&spec.fill_sql(&staging)).execute(pool).await?;

    // Swap in one transaction so there is no window without the table.
    let mut tx = pool.begin().await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("ALTER TABLE {} RENAME TO {}", staging, table))
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r#"
        INSERT INTO meta (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(format!("{}.rebuilt_at", table))
    .bind(rebuilt_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(())
}
