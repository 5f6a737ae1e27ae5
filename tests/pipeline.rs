//! End-to-end pipeline properties exercised through the library API against
//! throwaway databases: replace semantics, encoding fallback, aggregation
//! correctness and idempotence, natural-key upsert, and pagination.

use sqlx::SqlitePool;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use rural_data_gateway::config::{Config, DataConfig, DbConfig, QueryConfig, ServerConfig};
use rural_data_gateway::dataset::DatasetKind;
use rural_data_gateway::error::PipelineError;
use rural_data_gateway::models::AggregateKey;
use rural_data_gateway::query::RecordFilter;
use rural_data_gateway::{aggregate, db, ingest, migrate, query};

const DETAIL_HEADER: &str = "Fiscal Year\tState Name\tCounty\tProgram Area\tProgram\tInvestment Dollars\tNumber of Investments\tBorrower Name";
const SUMMARY_HEADER: &str =
    "Fiscal Year\tState Name\tProgram Area\tInvestment Dollars\tNumber of Investments";

fn test_config(root: &Path) -> Config {
    Config {
        db: DbConfig {
            path: root.join("data/rdg.sqlite"),
        },
        data: DataConfig {
            dir: root.join("exports"),
        },
        server: ServerConfig::default(),
        query: QueryConfig::default(),
    }
}

async fn setup() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(tmp.path());
    fs::create_dir_all(&cfg.data.dir).unwrap();

    let pool = db::connect(&cfg).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    (tmp, cfg, pool)
}

fn tsv(header: &str, rows: &[String]) -> String {
    let mut text = String::from(header);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

fn detail_row(
    year: i64,
    state: &str,
    county: &str,
    program_area: &str,
    dollars: &str,
    borrower: &str,
) -> String {
    format!(
        "{}\t{}\t{}\t{}\tDirect Loan\t{}\t1\t{}",
        year, state, county, program_area, dollars, borrower
    )
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

#[tokio::test]
async fn test_replace_import_supersedes_previous_file() {
    let (tmp, _cfg, pool) = setup().await;

    let file_a = tmp.path().join("usda_rural_data_1700000000.csv");
    fs::write(
        &file_a,
        tsv(
            DETAIL_HEADER,
            &[detail_row(2023, "Texas", "Travis", "Electric Programs", "100", "Acme Co")],
        ),
    )
    .unwrap();
    ingest::import_file(&pool, DatasetKind::Detail, &file_a)
        .await
        .unwrap();

    let file_b = tmp.path().join("usda_rural_data_1800000000.csv");
    fs::write(
        &file_b,
        tsv(
            DETAIL_HEADER,
            &[
                detail_row(2024, "Iowa", "Polk", "Business Programs", "200", "Prairie LLC"),
                detail_row(2024, "Iowa", "Linn", "Business Programs", "300", "Cedar Co-op"),
            ],
        ),
    )
    .unwrap();
    let outcome = ingest::import_file(&pool, DatasetKind::Detail, &file_b)
        .await
        .unwrap();
    assert_eq!(outcome.rows, 2);

    // Nothing from the superseded import remains.
    let leftover: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM investments WHERE source_file = 'usda_rural_data_1700000000.csv'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(leftover, 0);

    let page = query::query_records(&pool, &[], 100, 0).await.unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn test_latin1_fallback_produces_same_rows_as_utf8() {
    let (tmp, _cfg, pool) = setup().await;

    let text = tsv(
        DETAIL_HEADER,
        &[
            detail_row(2023, "Texas", "Bexar", "Electric Programs", "500", "Jos\u{e9} Electric"),
            detail_row(2023, "Texas", "Travis", "Electric Programs", "700", "Plain Co"),
        ],
    );

    let utf8_file = tmp.path().join("usda_rural_data_1.csv");
    fs::write(&utf8_file, &text).unwrap();
    let utf8_outcome = ingest::import_file(&pool, DatasetKind::Detail, &utf8_file)
        .await
        .unwrap();
    assert_eq!(utf8_outcome.encoding, "utf-8");

    // The same content as Latin-1 bytes: 0xE9 for the accented e makes the
    // UTF-8 attempt fail, so the engine must fall through.
    let latin1_bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
    let latin1_file = tmp.path().join("usda_rural_data_2.csv");
    fs::write(&latin1_file, &latin1_bytes).unwrap();
    let latin1_outcome = ingest::import_file(&pool, DatasetKind::Detail, &latin1_file)
        .await
        .unwrap();

    assert_eq!(latin1_outcome.encoding, "latin-1");
    assert_eq!(latin1_outcome.rows, utf8_outcome.rows);

    let borrower: String =
        sqlx::query_scalar("SELECT borrower_name FROM investments WHERE county = 'Bexar'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(borrower, "Jos\u{e9} Electric");
}

#[tokio::test]
async fn test_undecodable_file_leaves_previous_import_intact() {
    let (tmp, _cfg, pool) = setup().await;

    let good = tmp.path().join("usda_rural_data_1.csv");
    fs::write(
        &good,
        tsv(
            DETAIL_HEADER,
            &[
                detail_row(2023, "Texas", "Travis", "Electric Programs", "100", "Acme Co"),
                detail_row(2023, "Texas", "Bexar", "Electric Programs", "200", "Alamo Inc"),
            ],
        ),
    )
    .unwrap();
    ingest::import_file(&pool, DatasetKind::Detail, &good)
        .await
        .unwrap();

    // 0x81 fails every encoding in the fallback list.
    let bad = tmp.path().join("usda_rural_data_2.csv");
    fs::write(&bad, [b'x', 0x81, b'y']).unwrap();
    let err = ingest::import_file(&pool, DatasetKind::Detail, &bad)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Decode { .. }), "got: {:?}", err);

    // The previously committed rows are still queryable, untouched.
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM investments").await, 2);
    let page = query::query_records(&pool, &[RecordFilter::State("Texas".to_string())], 10, 0)
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn test_state_year_aggregates_exclude_placeholder_zeros() {
    let (tmp, _cfg, pool) = setup().await;

    let file = tmp.path().join("usda_rural_data_1.csv");
    fs::write(
        &file,
        tsv(
            DETAIL_HEADER,
            &[
                detail_row(2023, "Texas", "Travis", "Electric Programs", "100", "Acme Co"),
                detail_row(2023, "Texas", "Bexar", "Single Family Housing", "300", "Alamo Inc"),
                // Suppressed amount normalizes to 0.0 and must not skew stats.
                detail_row(2023, "Texas", "Hays", "Electric Programs", "Not Available", "Hill Co"),
            ],
        ),
    )
    .unwrap();
    ingest::import_file(&pool, DatasetKind::Detail, &file)
        .await
        .unwrap();
    aggregate::rebuild_all(&pool).await.unwrap();

    let row = query::get_aggregate(
        &pool,
        &AggregateKey::StateYear {
            state_name: "Texas".to_string(),
            fiscal_year: 2023,
        },
    )
    .await
    .unwrap()
    .expect("Texas/2023 aggregate should exist");

    assert_eq!(row.total_investments, 2);
    assert_eq!(row.total_dollars, 400.0);
    assert_eq!(row.avg_dollars, 200.0);
    assert_eq!(row.min_dollars, 100.0);
    assert_eq!(row.max_dollars, 300.0);
    assert_eq!(row.distinct_count, 2);

    // Absent keys are a normal None, not an error.
    let missing = query::get_aggregate(
        &pool,
        &AggregateKey::StateYear {
            state_name: "Vermont".to_string(),
            fiscal_year: 2023,
        },
    )
    .await
    .unwrap();
    assert!(missing.is_none());
}

async fn aggregation_snapshot(pool: &SqlitePool) -> Vec<String> {
    let selects = [
        "SELECT state_name || '|' || fiscal_year || '|' || total_investments || '|' || \
         total_dollars || '|' || avg_dollars || '|' || min_dollars || '|' || max_dollars || '|' \
         || distinct_programs FROM state_year_summary ORDER BY state_name, fiscal_year",
        "SELECT program_area || '|' || fiscal_year || '|' || total_investments || '|' || \
         total_dollars || '|' || avg_dollars || '|' || min_dollars || '|' || max_dollars || '|' \
         || distinct_states FROM program_year_summary ORDER BY program_area, fiscal_year",
        "SELECT state_name || '|' || program_area || '|' || fiscal_year || '|' || \
         total_investments || '|' || total_dollars || '|' || avg_dollars || '|' || min_dollars \
         || '|' || max_dollars || '|' || distinct_counties FROM state_program_year_summary \
         ORDER BY state_name, program_area, fiscal_year",
    ];

    let mut snapshot = Vec::new();
    for sql in selects {
        let rows: Vec<String> = sqlx::query_scalar(sql).fetch_all(pool).await.unwrap();
        snapshot.extend(rows);
    }
    snapshot
}

#[tokio::test]
async fn test_aggregation_rebuild_is_idempotent() {
    let (tmp, _cfg, pool) = setup().await;

    let file = tmp.path().join("usda_rural_data_1.csv");
    fs::write(
        &file,
        tsv(
            DETAIL_HEADER,
            &[
                detail_row(2022, "Iowa", "Polk", "Business Programs", "1,000", "Prairie LLC"),
                detail_row(2023, "Iowa", "Linn", "Business Programs", "2,500", "Cedar Co-op"),
                detail_row(2023, "Texas", "Travis", "Electric Programs", "4,000", "Acme Co"),
                detail_row(2023, "Texas", "Bexar", "Single Family Housing", "750", "Alamo Inc"),
            ],
        ),
    )
    .unwrap();
    ingest::import_file(&pool, DatasetKind::Detail, &file)
        .await
        .unwrap();

    aggregate::rebuild_all(&pool).await.unwrap();
    let first = aggregation_snapshot(&pool).await;
    assert!(!first.is_empty());

    aggregate::rebuild_all(&pool).await.unwrap();
    let second = aggregation_snapshot(&pool).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_summary_natural_key_upsert() {
    let (tmp, _cfg, pool) = setup().await;

    // Two rows with the same natural key in one file: the second wins.
    let file_a = tmp.path().join("usda_historical_data_1.csv");
    fs::write(
        &file_a,
        tsv(
            SUMMARY_HEADER,
            &[
                "2023\tTexas\tElectric Programs\t100\t2".to_string(),
                "2023\tTexas\tElectric Programs\t250\t3".to_string(),
                "2022\tIowa\tBusiness Programs\t500\t5".to_string(),
            ],
        ),
    )
    .unwrap();
    ingest::import_file(&pool, DatasetKind::HistoricalSummary, &file_a)
        .await
        .unwrap();

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM summary").await, 2);
    let dollars: f64 = sqlx::query_scalar(
        "SELECT investment_dollars_numeric FROM summary \
         WHERE fiscal_year = 2023 AND state_name = 'Texas' AND program_area = 'Electric Programs'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(dollars, 250.0);

    // Re-importing the same key overwrites rather than duplicates, and
    // untouched keys survive (upsert-by-key, not full wipe).
    let file_b = tmp.path().join("usda_historical_data_2.csv");
    fs::write(
        &file_b,
        tsv(
            SUMMARY_HEADER,
            &["2023\tTexas\tElectric Programs\t900\t4".to_string()],
        ),
    )
    .unwrap();
    ingest::import_file(&pool, DatasetKind::HistoricalSummary, &file_b)
        .await
        .unwrap();

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM summary").await, 2);
    let dollars: f64 = sqlx::query_scalar(
        "SELECT investment_dollars_numeric FROM summary \
         WHERE fiscal_year = 2023 AND state_name = 'Texas' AND program_area = 'Electric Programs'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(dollars, 900.0);
}

#[tokio::test]
async fn test_query_pagination_and_ordering() {
    let (tmp, _cfg, pool) = setup().await;

    let mut rows = Vec::new();
    for i in 1..=12 {
        rows.push(detail_row(
            2023,
            "Texas",
            "Travis",
            "Electric Programs",
            &(i * 100).to_string(),
            &format!("Borrower {}", i),
        ));
    }
    rows.push(detail_row(2023, "Iowa", "Polk", "Business Programs", "50", "Prairie LLC"));
    rows.push(detail_row(2023, "Iowa", "Linn", "Business Programs", "60", "Cedar Co-op"));

    let file = tmp.path().join("usda_rural_data_1.csv");
    fs::write(&file, tsv(DETAIL_HEADER, &rows)).unwrap();
    ingest::import_file(&pool, DatasetKind::Detail, &file)
        .await
        .unwrap();

    let filters = [RecordFilter::State("Texas".to_string())];
    let page = query::query_records(&pool, &filters, 5, 0).await.unwrap();

    assert_eq!(page.total, 12);
    assert_eq!(page.returned, 5);
    let dollars: Vec<f64> = page
        .data
        .iter()
        .map(|r| r.investment_dollars_numeric)
        .collect();
    assert_eq!(dollars, vec![1200.0, 1100.0, 1000.0, 900.0, 800.0]);

    // The last page is short but total stays the same.
    let tail = query::query_records(&pool, &filters, 5, 10).await.unwrap();
    assert_eq!(tail.total, 12);
    assert_eq!(tail.returned, 2);

    // Substring filters compose with exact ones.
    let borrower_page = query::query_records(
        &pool,
        &[RecordFilter::BorrowerName("Cedar".to_string())],
        10,
        0,
    )
    .await
    .unwrap();
    assert_eq!(borrower_page.total, 1);
    assert_eq!(borrower_page.data[0].state_name, "Iowa");
}

#[tokio::test]
async fn test_degraded_rows_are_kept_not_dropped() {
    let (tmp, _cfg, pool) = setup().await;

    let file = tmp.path().join("usda_rural_data_1.csv");
    fs::write(
        &file,
        tsv(
            DETAIL_HEADER,
            &[
                // Unparseable year, withheld dollars, junk count.
                "unknown\tTexas\tTravis\tElectric Programs\tDirect Loan\tWithheld\tn/a\tAcme Co"
                    .to_string(),
            ],
        ),
    )
    .unwrap();
    let outcome = ingest::import_file(&pool, DatasetKind::Detail, &file)
        .await
        .unwrap();
    assert_eq!(outcome.rows, 1);

    let row = sqlx::query_as::<_, (i64, f64, String, i64)>(
        "SELECT fiscal_year, investment_dollars_numeric, investment_dollars_original, \
         number_of_investments FROM investments",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(row.0, 0);
    assert_eq!(row.1, 0.0);
    assert_eq!(row.2, "Withheld");
    assert_eq!(row.3, 1);
}
