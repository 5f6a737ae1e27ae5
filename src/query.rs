//! Read-only, parameterized access to structured and aggregated rows.
//!
//! Filters are enums rather than string-keyed maps: an unsupported filter
//! cannot be constructed, so there is no silently-ignored filter key. All
//! operations take an explicit pool, never mutate state, and represent
//! "no matching rows" as an empty page or `None`, never as an error.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{
    AggregateKey, AggregateRow, Grouping, InvestmentRow, Page, SummaryRow,
};

/// Allowed filters over the `investments` table. State and fiscal year
/// match exactly; program area and borrower name match by substring.
#[derive(Debug, Clone)]
pub enum RecordFilter {
    State(String),
    FiscalYear(i64),
    ProgramArea(String),
    BorrowerName(String),
}

impl RecordFilter {
    fn condition(&self) -> &'static str {
        match self {
            RecordFilter::State(_) => "state_name = ?",
            RecordFilter::FiscalYear(_) => "fiscal_year = ?",
            RecordFilter::ProgramArea(_) => "program_area LIKE ?",
            RecordFilter::BorrowerName(_) => "borrower_name LIKE ?",
        }
    }
}

/// Allowed filters over the `summary` table. Borrower names do not exist at
/// this granularity, so the variant does not either.
#[derive(Debug, Clone)]
pub enum SummaryFilter {
    State(String),
    FiscalYear(i64),
    ProgramArea(String),
}

impl SummaryFilter {
    fn condition(&self) -> &'static str {
        match self {
            SummaryFilter::State(_) => "state_name = ?",
            SummaryFilter::FiscalYear(_) => "fiscal_year = ?",
            SummaryFilter::ProgramArea(_) => "program_area LIKE ?",
        }
    }
}

fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Query detail records, ordered by dollar value descending. `total` is the
/// full filtered count, independent of the pagination window.
pub async fn query_records(
    pool: &SqlitePool,
    filters: &[RecordFilter],
    limit: i64,
    offset: i64,
) -> Result<Page<InvestmentRow>> {
    let conditions: Vec<&str> = filters.iter().map(|f| f.condition()).collect();
    let where_sql = where_clause(&conditions);

    let count_sql = format!("SELECT COUNT(*) FROM investments{}", where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for filter in filters {
        count_query = match filter {
            RecordFilter::State(v) => count_query.bind(v.clone()),
            RecordFilter::FiscalYear(v) => count_query.bind(*v),
            RecordFilter::ProgramArea(v) => count_query.bind(format!("%{}%", v)),
            RecordFilter::BorrowerName(v) => count_query.bind(format!("%{}%", v)),
        };
    }
    let total = count_query.fetch_one(pool).await?;

    let data_sql = format!(
        r#"
        SELECT fiscal_year, state_name, county, program_area, program,
               investment_dollars_numeric, number_of_investments, borrower_name,
               city, lender_name, project_name, investment_type
        FROM investments{}
        ORDER BY investment_dollars_numeric DESC
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );
    let mut data_query = sqlx::query(&data_sql);
    for filter in filters {
        data_query = match filter {
            RecordFilter::State(v) => data_query.bind(v.clone()),
            RecordFilter::FiscalYear(v) => data_query.bind(*v),
            RecordFilter::ProgramArea(v) => data_query.bind(format!("%{}%", v)),
            RecordFilter::BorrowerName(v) => data_query.bind(format!("%{}%", v)),
        };
    }
    let rows = data_query.bind(limit).bind(offset).fetch_all(pool).await?;

    let data: Vec<InvestmentRow> = rows
        .iter()
        .map(|row| InvestmentRow {
            fiscal_year: row.get("fiscal_year"),
            state_name: row.get("state_name"),
            county: row.get("county"),
            program_area: row.get("program_area"),
            program: row.get("program"),
            investment_dollars_numeric: row.get("investment_dollars_numeric"),
            number_of_investments: row.get("number_of_investments"),
            borrower_name: row.get("borrower_name"),
            city: row.get("city"),
            lender_name: row.get("lender_name"),
            project_name: row.get("project_name"),
            investment_type: row.get("investment_type"),
        })
        .collect();

    let returned = data.len() as i64;
    Ok(Page {
        data,
        total,
        limit,
        offset,
        returned,
    })
}

/// Query historical summary rows, newest fiscal year first.
pub async fn query_summary(
    pool: &SqlitePool,
    filters: &[SummaryFilter],
    limit: i64,
    offset: i64,
) -> Result<Page<SummaryRow>> {
    let conditions: Vec<&str> = filters.iter().map(|f| f.condition()).collect();
    let where_sql = where_clause(&conditions);

    let count_sql = format!("SELECT COUNT(*) FROM summary{}", where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for filter in filters {
        count_query = match filter {
            SummaryFilter::State(v) => count_query.bind(v.clone()),
            SummaryFilter::FiscalYear(v) => count_query.bind(*v),
            SummaryFilter::ProgramArea(v) => count_query.bind(format!("%{}%", v)),
        };
    }
    let total = count_query.fetch_one(pool).await?;

    let data_sql = format!(
        r#"
        SELECT fiscal_year, state_name, program_area,
               investment_dollars_numeric, number_of_investments
        FROM summary{}
        ORDER BY fiscal_year DESC, investment_dollars_numeric DESC
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );
    let mut data_query = sqlx::query(&data_sql);
    for filter in filters {
        data_query = match filter {
            SummaryFilter::State(v) => data_query.bind(v.clone()),
            SummaryFilter::FiscalYear(v) => data_query.bind(*v),
            SummaryFilter::ProgramArea(v) => data_query.bind(format!("%{}%", v)),
        };
    }
    let rows = data_query.bind(limit).bind(offset).fetch_all(pool).await?;

    let data: Vec<SummaryRow> = rows
        .iter()
        .map(|row| SummaryRow {
            fiscal_year: row.get("fiscal_year"),
            state_name: row.get("state_name"),
            program_area: row.get("program_area"),
            investment_dollars_numeric: row.get("investment_dollars_numeric"),
            number_of_investments: row.get("number_of_investments"),
        })
        .collect();

    let returned = data.len() as i64;
    Ok(Page {
        data,
        total,
        limit,
        offset,
        returned,
    })
}

fn select_columns(grouping: Grouping) -> &'static str {
    match grouping {
        Grouping::StateYear => {
            "state_name, fiscal_year, total_investments, total_dollars, avg_dollars, \
             min_dollars, max_dollars, distinct_programs AS distinct_count"
        }
        Grouping::ProgramYear => {
            "program_area, fiscal_year, total_investments, total_dollars, avg_dollars, \
             min_dollars, max_dollars, distinct_states AS distinct_count"
        }
        Grouping::StateProgramYear => {
            "state_name, program_area, fiscal_year, total_investments, total_dollars, \
             avg_dollars, min_dollars, max_dollars, distinct_counties AS distinct_count"
        }
    }
}

fn dimensions(grouping: Grouping) -> (bool, bool) {
    match grouping {
        Grouping::StateYear => (true, false),
        Grouping::ProgramYear => (false, true),
        Grouping::StateProgramYear => (true, true),
    }
}

fn aggregate_row(row: &SqliteRow, has_state: bool, has_program: bool) -> AggregateRow {
    AggregateRow {
        state_name: has_state.then(|| row.get("state_name")),
        program_area: has_program.then(|| row.get("program_area")),
        fiscal_year: row.get("fiscal_year"),
        total_investments: row.get("total_investments"),
        total_dollars: row.get("total_dollars"),
        avg_dollars: row.get("avg_dollars"),
        min_dollars: row.get("min_dollars"),
        max_dollars: row.get("max_dollars"),
        distinct_count: row.get("distinct_count"),
    }
}

/// Point lookup into one aggregation table by natural key. An absent key is
/// a normal `None` result, not an error.
pub async fn get_aggregate(
    pool: &SqlitePool,
    key: &AggregateKey,
) -> Result<Option<AggregateRow>> {
    let grouping = key.grouping();
    let (has_state, has_program) = dimensions(grouping);

    let sql = match key {
        AggregateKey::StateYear { .. } => format!(
            "SELECT {} FROM {} WHERE state_name = ? AND fiscal_year = ?",
            select_columns(grouping),
            grouping.table()
        ),
        AggregateKey::ProgramYear { .. } => format!(
            "SELECT {} FROM {} WHERE program_area = ? AND fiscal_year = ?",
            select_columns(grouping),
            grouping.table()
        ),
        AggregateKey::StateProgramYear { .. } => format!(
            "SELECT {} FROM {} WHERE state_name = ? AND program_area = ? AND fiscal_year = ?",
            select_columns(grouping),
            grouping.table()
        ),
    };

    let query = sqlx::query(&sql);
    let query = match key {
        AggregateKey::StateYear {
            state_name,
            fiscal_year,
        } => query.bind(state_name.clone()).bind(*fiscal_year),
        AggregateKey::ProgramYear {
            program_area,
            fiscal_year,
        } => query.bind(program_area.clone()).bind(*fiscal_year),
        AggregateKey::StateProgramYear {
            state_name,
            program_area,
            fiscal_year,
        } => query
            .bind(state_name.clone())
            .bind(program_area.clone())
            .bind(*fiscal_year),
    };

    let row = query.fetch_optional(pool).await?;
    Ok(row.map(|r| aggregate_row(&r, has_state, has_program)))
}

/// Ranking query over an aggregation table, largest total dollars first.
pub async fn top_n(pool: &SqlitePool, grouping: Grouping, n: i64) -> Result<Vec<AggregateRow>> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY total_dollars DESC LIMIT ?",
        select_columns(grouping),
        grouping.table()
    );
    let rows = sqlx::query(&sql).bind(n).fetch_all(pool).await?;

    let (has_state, has_program) = dimensions(grouping);
    Ok(rows
        .iter()
        .map(|r| aggregate_row(r, has_state, has_program))
        .collect())
}

/// List state+year aggregates, optionally narrowed to one state or year.
pub async fn list_state_year(
    pool: &SqlitePool,
    state_name: Option<&str>,
    fiscal_year: Option<i64>,
) -> Result<Vec<AggregateRow>> {
    let mut conditions = Vec::new();
    if state_name.is_some() {
        conditions.push("state_name = ?");
    }
    if fiscal_year.is_some() {
        conditions.push("fiscal_year = ?");
    }

    let sql = format!(
        "SELECT {} FROM state_year_summary{} ORDER BY fiscal_year DESC, total_dollars DESC",
        select_columns(Grouping::StateYear),
        where_clause(&conditions)
    );

    let mut query = sqlx::query(&sql);
    if let Some(state) = state_name {
        query = query.bind(state.to_string());
    }
    if let Some(year) = fiscal_year {
        query = query.bind(year);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(|r| aggregate_row(r, true, false)).collect())
}

/// List state+program+year aggregates, optionally narrowed on any key.
pub async fn list_state_program_year(
    pool: &SqlitePool,
    state_name: Option<&str>,
    program_area: Option<&str>,
    fiscal_year: Option<i64>,
) -> Result<Vec<AggregateRow>> {
    let mut conditions = Vec::new();
    if state_name.is_some() {
        conditions.push("state_name = ?");
    }
    if program_area.is_some() {
        conditions.push("program_area = ?");
    }
    if fiscal_year.is_some() {
        conditions.push("fiscal_year = ?");
    }

    let sql = format!(
        "SELECT {} FROM state_program_year_summary{} \
         ORDER BY fiscal_year DESC, total_dollars DESC",
        select_columns(Grouping::StateProgramYear),
        where_clause(&conditions)
    );

    let mut query = sqlx::query(&sql);
    if let Some(state) = state_name {
        query = query.bind(state.to_string());
    }
    if let Some(program) = program_area {
        query = query.bind(program.to_string());
    }
    if let Some(year) = fiscal_year {
        query = query.bind(year);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(|r| aggregate_row(r, true, true)).collect())
}

/// List program+year aggregates, optionally narrowed to one program or year.
pub async fn list_program_year(
    pool: &SqlitePool,
    program_area: Option<&str>,
    fiscal_year: Option<i64>,
) -> Result<Vec<AggregateRow>> {
    let mut conditions = Vec::new();
    if program_area.is_some() {
        conditions.push("program_area = ?");
    }
    if fiscal_year.is_some() {
        conditions.push("fiscal_year = ?");
    }

    let sql = format!(
        "SELECT {} FROM program_year_summary{} ORDER BY fiscal_year DESC, total_dollars DESC",
        select_columns(Grouping::ProgramYear),
        where_clause(&conditions)
    );

    let mut query = sqlx::query(&sql);
    if let Some(program) = program_area {
        query = query.bind(program.to_string());
    }
    if let Some(year) = fiscal_year {
        query = query.bind(year);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(|r| aggregate_row(r, false, true)).collect())
}
