//! Core data types for the ingestion and query pipeline.
//!
//! These represent the two record kinds that flow from a raw export into the
//! store, and the shapes the query layer hands back to its callers.

use serde::Serialize;

/// One cleaned detail transaction, ready for replace-import.
///
/// `fiscal_year` and `state_name` are always present after cleaning: a row
/// whose values fail coercion is degraded (`0` / empty string), never
/// dropped. The original dollars text is preserved verbatim for audit.
#[derive(Debug, Clone)]
pub struct InvestmentRecord {
    pub fiscal_year: i64,
    pub state_name: String,
    pub county: Option<String>,
    pub county_fips: Option<String>,
    pub congressional_district: Option<String>,
    pub program_area: Option<String>,
    pub program: Option<String>,
    pub investment_type: Option<String>,
    pub investment_dollars_numeric: f64,
    pub investment_dollars_original: String,
    pub number_of_investments: i64,
    pub borrower_name: Option<String>,
    pub city: Option<String>,
    pub lender_name: Option<String>,
    pub project_name: Option<String>,
    pub funding_code: Option<String>,
    pub naics_industry_sector: Option<String>,
    pub naics_national_industry_code: Option<String>,
    pub naics_national_industry: Option<String>,
    pub portfolio_type: Option<String>,
    pub persistent_poverty_community_status: Option<String>,
    pub zip_code: Option<String>,
    pub project_announced_description: Option<String>,
}

/// One cleaned historical summary row, keyed by
/// (fiscal_year, state_name, program_area).
#[derive(Debug, Clone)]
pub struct SummaryRecord {
    pub fiscal_year: i64,
    pub state_name: String,
    pub program_area: String,
    pub investment_dollars_numeric: f64,
    pub investment_dollars_original: String,
    pub number_of_investments: i64,
}

/// The subset of `investments` columns served by record queries.
#[derive(Debug, Clone, Serialize)]
pub struct InvestmentRow {
    pub fiscal_year: i64,
    pub state_name: String,
    pub county: Option<String>,
    pub program_area: Option<String>,
    pub program: Option<String>,
    pub investment_dollars_numeric: f64,
    pub number_of_investments: i64,
    pub borrower_name: Option<String>,
    pub city: Option<String>,
    pub lender_name: Option<String>,
    pub project_name: Option<String>,
    pub investment_type: Option<String>,
}

/// A `summary` row as served by summary queries.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub fiscal_year: i64,
    pub state_name: String,
    pub program_area: String,
    pub investment_dollars_numeric: f64,
    pub number_of_investments: i64,
}

/// One page of query results. `total` is the full filtered count,
/// independent of the pagination window.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub returned: i64,
}

/// The three derived aggregation granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    StateYear,
    ProgramYear,
    StateProgramYear,
}

impl Grouping {
    pub fn table(&self) -> &'static str {
        match self {
            Grouping::StateYear => "state_year_summary",
            Grouping::ProgramYear => "program_year_summary",
            Grouping::StateProgramYear => "state_program_year_summary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "state_year" | "states" => Some(Grouping::StateYear),
            "program_year" | "programs" => Some(Grouping::ProgramYear),
            "state_program_year" | "state_programs" => Some(Grouping::StateProgramYear),
            _ => None,
        }
    }
}

/// Natural key for a point lookup into one aggregation table. The grouping
/// is implied by the variant, so a key can never address the wrong table.
#[derive(Debug, Clone)]
pub enum AggregateKey {
    StateYear {
        state_name: String,
        fiscal_year: i64,
    },
    ProgramYear {
        program_area: String,
        fiscal_year: i64,
    },
    StateProgramYear {
        state_name: String,
        program_area: String,
        fiscal_year: i64,
    },
}

impl AggregateKey {
    pub fn grouping(&self) -> Grouping {
        match self {
            AggregateKey::StateYear { .. } => Grouping::StateYear,
            AggregateKey::ProgramYear { .. } => Grouping::ProgramYear,
            AggregateKey::StateProgramYear { .. } => Grouping::StateProgramYear,
        }
    }
}

/// One row from any of the three aggregation tables. Key columns not part
/// of the row's grouping are `None`. All statistics are computed over
/// strictly-positive dollar values only.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateRow {
    pub state_name: Option<String>,
    pub program_area: Option<String>,
    pub fiscal_year: i64,
    pub total_investments: i64,
    pub total_dollars: f64,
    pub avg_dollars: f64,
    pub min_dollars: f64,
    pub max_dollars: f64,
    /// Distinct values of the counter dimension: programs for state+year,
    /// states for program+year, counties for state+program+year.
    pub distinct_count: i64,
}
