//! Ingestion engine: decode, clean, replace-import.
//!
//! One algorithm parameterized by schema: a located export is decoded under
//! the encoding fallback list, parsed as tab-separated records, cleaned per
//! the value-normalizer rules, and replace-imported into the structured
//! store. Decode and clean run to completion before any destructive write
//! begins, so a failed file never disturbs previously committed data.
//!
//! Detail imports wipe and re-insert the whole `investments` table inside
//! one transaction. Historical summary imports upsert by the natural key
//! (fiscal_year, state_name, program_area).

use chrono::Utc;
use csv::ReaderBuilder;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::dataset::DatasetKind;
use crate::decode;
use crate::error::PipelineError;
use crate::models::{InvestmentRecord, SummaryRecord};
use crate::normalize::{
    normalize_column_name, parse_currency, parse_fiscal_year, parse_investment_count,
};

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub kind: DatasetKind,
    pub source_file: String,
    pub encoding: &'static str,
    pub rows: u64,
}

pub async fn import_file(
    pool: &SqlitePool,
    kind: DatasetKind,
    path: &Path,
) -> Result<ImportOutcome, PipelineError> {
    let decoded = decode::decode_file(path)?;
    let rows = parse_rows(path, &decoded.text)?;

    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let imported_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let count = match kind {
        DatasetKind::Detail => {
            let records: Vec<InvestmentRecord> = rows.iter().map(detail_record).collect();
            replace_investments(pool, &records, &source_file, &imported_at).await?
        }
        DatasetKind::HistoricalSummary => {
            let records: Vec<SummaryRecord> = rows.iter().map(summary_record).collect();
            upsert_summary(pool, &records, &source_file, &imported_at).await?
        }
    };

    info!(
        kind = %kind,
        file = %source_file,
        encoding = decoded.encoding,
        rows = count,
        "import complete"
    );

    Ok(ImportOutcome {
        kind,
        source_file,
        encoding: decoded.encoding,
        rows: count,
    })
}

/// Parse decoded text as tab-separated records keyed by normalized header
/// names. Rows that are empty across every column are dropped; unrecognized
/// columns ride along untouched and are simply never read by the record
/// builders below.
fn parse_rows(path: &Path, text: &str) -> Result<Vec<HashMap<String, String>>, PipelineError> {
    let parse_err = |source: csv::Error| PipelineError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(parse_err)?
        .iter()
        .map(normalize_column_name)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(parse_err)?;

        let mut row = HashMap::new();
        for (idx, value) in record.iter().enumerate() {
            if let Some(header) = headers.get(idx) {
                row.insert(header.clone(), value.trim().to_string());
            }
        }

        if row.values().all(|v| v.is_empty()) {
            continue;
        }

        rows.push(row);
    }

    Ok(rows)
}

fn field<'a>(row: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    row.get(key).map(|s| s.as_str()).filter(|s| !s.is_empty())
}

fn text_field(row: &HashMap<String, String>, key: &str) -> Option<String> {
    field(row, key).map(|s| s.to_string())
}

/// A row that fails coercion degrades the value, never drops the row:
/// unparseable dollars become 0.0 (original text kept), a missing fiscal
/// year becomes 0, a missing state name becomes the empty string.
fn detail_record(row: &HashMap<String, String>) -> InvestmentRecord {
    let (dollars, original) = parse_currency(field(row, "investment_dollars"));

    InvestmentRecord {
        fiscal_year: parse_fiscal_year(field(row, "fiscal_year")),
        state_name: text_field(row, "state_name").unwrap_or_default(),
        county: text_field(row, "county"),
        county_fips: text_field(row, "county_fips"),
        congressional_district: text_field(row, "congressional_district"),
        program_area: text_field(row, "program_area"),
        program: text_field(row, "program"),
        investment_type: text_field(row, "investment_type"),
        investment_dollars_numeric: dollars,
        investment_dollars_original: original,
        number_of_investments: parse_investment_count(field(row, "number_of_investments")),
        borrower_name: text_field(row, "borrower_name"),
        city: text_field(row, "city"),
        lender_name: text_field(row, "lender_name"),
        project_name: text_field(row, "project_name"),
        funding_code: text_field(row, "funding_code"),
        naics_industry_sector: text_field(row, "naics_industry_sector"),
        naics_national_industry_code: text_field(row, "naics_national_industry_code"),
        naics_national_industry: text_field(row, "naics_national_industry"),
        portfolio_type: text_field(row, "portfolio_type"),
        persistent_poverty_community_status: text_field(
            row,
            "persistent_poverty_community_status",
        ),
        zip_code: text_field(row, "zip_code"),
        project_announced_description: text_field(row, "project_announced_description"),
    }
}

fn summary_record(row: &HashMap<String, String>) -> SummaryRecord {
    let (dollars, original) = parse_currency(field(row, "investment_dollars"));

    SummaryRecord {
        fiscal_year: parse_fiscal_year(field(row, "fiscal_year")),
        state_name: text_field(row, "state_name").unwrap_or_default(),
        program_area: text_field(row, "program_area").unwrap_or_default(),
        investment_dollars_numeric: dollars,
        investment_dollars_original: original,
        number_of_investments: parse_investment_count(field(row, "number_of_investments")),
    }
}

/// Full-wipe replace: delete everything, bulk-insert the new generation,
/// commit. Readers see either the old set or the new set, never a mix.
async fn replace_investments(
    pool: &SqlitePool,
    records: &[InvestmentRecord],
    source_file: &str,
    imported_at: &str,
) -> Result<u64, PipelineError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM investments").execute(&mut *tx).await?;

    for r in records {
        sqlx::query(
            r#"
            INSERT INTO investments (
                fiscal_year, state_name, county, county_fips, congressional_district,
                program_area, program, investment_type,
                investment_dollars_numeric, investment_dollars_original, number_of_investments,
                borrower_name, city, lender_name, project_name, funding_code,
                naics_industry_sector, naics_national_industry_code, naics_national_industry,
                portfolio_type, persistent_poverty_community_status, zip_code,
                project_announced_description, source_file, imported_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(r.fiscal_year)
        .bind(&r.state_name)
        .bind(&r.county)
        .bind(&r.county_fips)
        .bind(&r.congressional_district)
        .bind(&r.program_area)
        .bind(&r.program)
        .bind(&r.investment_type)
        .bind(r.investment_dollars_numeric)
        .bind(&r.investment_dollars_original)
        .bind(r.number_of_investments)
        .bind(&r.borrower_name)
        .bind(&r.city)
        .bind(&r.lender_name)
        .bind(&r.project_name)
        .bind(&r.funding_code)
        .bind(&r.naics_industry_sector)
        .bind(&r.naics_national_industry_code)
        .bind(&r.naics_national_industry)
        .bind(&r.portfolio_type)
        .bind(&r.persistent_poverty_community_status)
        .bind(&r.zip_code)
        .bind(&r.project_announced_description)
        .bind(source_file)
        .bind(imported_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(records.len() as u64)
}

/// Upsert by natural key. Duplicate (fiscal_year, state_name, program_area)
/// keys overwrite rather than duplicate; the end state matches a fresh
/// import of the file.
async fn upsert_summary(
    pool: &SqlitePool,
    records: &[SummaryRecord],
    source_file: &str,
    imported_at: &str,
) -> Result<u64, PipelineError> {
    let mut tx = pool.begin().await?;

    for r in records {
        sqlx::query(
            r#"
            INSERT INTO summary (
                fiscal_year, state_name, program_area,
                investment_dollars_numeric, investment_dollars_original,
                number_of_investments, source_file, imported_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fiscal_year, state_name, program_area) DO UPDATE SET
                investment_dollars_numeric = excluded.investment_dollars_numeric,
                investment_dollars_original = excluded.investment_dollars_original,
                number_of_investments = excluded.number_of_investments,
                source_file = excluded.source_file,
                imported_at = excluded.imported_at
            "#,
        )
        .bind(r.fiscal_year)
        .bind(&r.state_name)
        .bind(&r.program_area)
        .bind(r.investment_dollars_numeric)
        .bind(&r.investment_dollars_original)
        .bind(r.number_of_investments)
        .bind(source_file)
        .bind(imported_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(records.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn rows_from(text: &str) -> Vec<HashMap<String, String>> {
        parse_rows(&PathBuf::from("test.csv"), text).unwrap()
    }

    #[test]
    fn test_parse_rows_normalizes_headers() {
        let rows = rows_from("Fiscal Year\tState Name\n2023\tTexas\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("fiscal_year").unwrap(), "2023");
        assert_eq!(rows[0].get("state_name").unwrap(), "Texas");
    }

    #[test]
    fn test_parse_rows_drops_all_empty_rows() {
        let rows = rows_from("A\tB\n1\t2\n\t\n3\t4\n");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_parse_rows_tolerates_ragged_rows() {
        let rows = rows_from("A\tB\tC\n1\t2\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("c"), None);
    }

    #[test]
    fn test_detail_record_degrades_instead_of_dropping() {
        let rows = rows_from(
            "Fiscal Year\tState Name\tInvestment Dollars\tNumber of Investments\nbad\t\tWithheld\tn/a\n",
        );
        let record = detail_record(&rows[0]);
        assert_eq!(record.fiscal_year, 0);
        assert_eq!(record.state_name, "");
        assert_eq!(record.investment_dollars_numeric, 0.0);
        assert_eq!(record.investment_dollars_original, "Withheld");
        assert_eq!(record.number_of_investments, 1);
    }

    #[test]
    fn test_detail_record_ignores_unknown_columns() {
        let rows = rows_from("Fiscal Year\tState Name\tMystery Column\n2024\tIowa\tsurprise\n");
        let record = detail_record(&rows[0]);
        assert_eq!(record.fiscal_year, 2024);
        assert_eq!(record.state_name, "Iowa");
    }
}
