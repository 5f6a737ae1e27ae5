//! # Rural Data Gateway CLI (`rdg`)
//!
//! The `rdg` binary is the operator interface for the pipeline. It provides
//! commands for database initialization, running the refresh cycle,
//! importing individual exports, rebuilding aggregations, querying records,
//! and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! rdg --config ./config/rdg.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rdg init` | Create the SQLite database and schema |
//! | `rdg refresh` | Run the full pipeline: locate, import, aggregate |
//! | `rdg import <kind>` | Import one export file for one record kind |
//! | `rdg aggregate` | Rebuild the aggregation tables |
//! | `rdg query` | Query investment records with filters |
//! | `rdg top` | Rank aggregates by total dollars |
//! | `rdg stats` | Show database statistics and freshness |
//! | `rdg serve api` | Start the JSON HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rural_data_gateway::dataset::DatasetKind;
use rural_data_gateway::models::Grouping;
use rural_data_gateway::query::{RecordFilter, SummaryFilter};
use rural_data_gateway::{
    aggregate, config, db, ingest, locate, migrate, query, refresh, server, stats,
};

/// Rural Data Gateway CLI: ingest, aggregate, and query USDA
/// rural-investment exports.
#[derive(Parser)]
#[command(
    name = "rdg",
    about = "Rural Data Gateway: a local ingestion, aggregation, and query pipeline for USDA rural-investment data",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rdg.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the `investments` and `summary`
    /// tables with their indexes, and empty aggregation tables. Idempotent.
    Init,

    /// Run a full refresh cycle.
    ///
    /// Locates the newest export per record kind in the data directory,
    /// replace-imports each one, then rebuilds the aggregation tables.
    /// A kind with no export on disk is skipped.
    Refresh,

    /// Import a single export file for one record kind.
    Import {
        /// Record kind: `detail` or `historical`.
        kind: String,

        /// Explicit file path. Defaults to the newest matching export in
        /// the data directory.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Rebuild the three aggregation tables from current investments.
    Aggregate,

    /// Query investment records.
    ///
    /// State and fiscal year filter exactly; program and borrower filter by
    /// substring. Results are ordered by dollar value descending.
    Query {
        /// Filter by exact state name (canonical, e.g. "Texas").
        #[arg(long)]
        state: Option<String>,

        /// Filter by program area substring.
        #[arg(long)]
        program: Option<String>,

        /// Filter by fiscal year.
        #[arg(long)]
        fiscal_year: Option<i64>,

        /// Filter by borrower name substring (detail records only).
        #[arg(long)]
        borrower: Option<String>,

        /// Maximum rows to return.
        #[arg(long)]
        limit: Option<i64>,

        /// Rows to skip before the first returned row.
        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Query the historical summary table instead of detail records.
        #[arg(long)]
        summary: bool,
    },

    /// Rank aggregation rows by total dollars descending.
    Top {
        /// Grouping: `states`, `programs`, or `state_programs`.
        #[arg(default_value = "states")]
        grouping: String,

        /// Number of rows to return.
        #[arg(long, default_value_t = 10)]
        n: i64,
    },

    /// Show database statistics and data freshness.
    Stats,

    /// Start the HTTP API server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the JSON query API on the configured bind address.
    Api,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rural_data_gateway=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Refresh => {
            let pool = db::connect(&cfg).await?;
            let report = refresh::run_refresh(&cfg, &pool).await?;
            pool.close().await;
            refresh::print_report(&report);
        }
        Commands::Import { kind, file } => {
            let kind = DatasetKind::parse(&kind)
                .ok_or_else(|| anyhow::anyhow!("unknown kind: '{}'. Use detail or historical.", kind))?;

            let path = match file {
                Some(path) => path,
                None => match locate::find_latest(&cfg.data.dir, kind)? {
                    Some(located) => located.path,
                    None => {
                        println!("no {} export found in {}", kind, cfg.data.dir.display());
                        return Ok(());
                    }
                },
            };

            let pool = db::connect(&cfg).await?;
            let outcome = ingest::import_file(&pool, kind, &path).await?;
            pool.close().await;
            println!(
                "imported {} rows from {} ({})",
                outcome.rows, outcome.source_file, outcome.encoding
            );
        }
        Commands::Aggregate => {
            let pool = db::connect(&cfg).await?;
            aggregate::rebuild_all(&pool).await?;
            pool.close().await;
            println!("Aggregation tables rebuilt.");
        }
        Commands::Query {
            state,
            program,
            fiscal_year,
            borrower,
            limit,
            offset,
            summary,
        } => {
            let pool = db::connect(&cfg).await?;
            let limit = limit.unwrap_or(cfg.query.default_limit);

            if summary {
                let mut filters = Vec::new();
                if let Some(v) = state {
                    filters.push(SummaryFilter::State(v));
                }
                if let Some(v) = program {
                    filters.push(SummaryFilter::ProgramArea(v));
                }
                if let Some(v) = fiscal_year {
                    filters.push(SummaryFilter::FiscalYear(v));
                }

                let page = query::query_summary(&pool, &filters, limit, offset).await?;
                for (i, row) in page.data.iter().enumerate() {
                    println!(
                        "{}. FY{} {} / {}: ${:.2} ({} investments)",
                        offset + i as i64 + 1,
                        row.fiscal_year,
                        row.state_name,
                        row.program_area,
                        row.investment_dollars_numeric,
                        row.number_of_investments
                    );
                }
                println!();
                println!("showing {} of {} matching rows", page.returned, page.total);
            } else {
                let mut filters = Vec::new();
                if let Some(v) = state {
                    filters.push(RecordFilter::State(v));
                }
                if let Some(v) = program {
                    filters.push(RecordFilter::ProgramArea(v));
                }
                if let Some(v) = fiscal_year {
                    filters.push(RecordFilter::FiscalYear(v));
                }
                if let Some(v) = borrower {
                    filters.push(RecordFilter::BorrowerName(v));
                }

                let page = query::query_records(&pool, &filters, limit, offset).await?;
                for (i, row) in page.data.iter().enumerate() {
                    println!(
                        "{}. ${:.2} FY{} {}",
                        offset + i as i64 + 1,
                        row.investment_dollars_numeric,
                        row.fiscal_year,
                        row.state_name
                    );
                    if let Some(ref program) = row.program_area {
                        println!("    program: {}", program);
                    }
                    if let Some(ref borrower) = row.borrower_name {
                        println!("    borrower: {}", borrower);
                    }
                }
                println!();
                println!(
                    "showing {} of {} matching records",
                    page.returned, page.total
                );
            }
            pool.close().await;
        }
        Commands::Top { grouping, n } => {
            let grouping = Grouping::parse(&grouping).ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown grouping: '{}'. Use states, programs, or state_programs.",
                    grouping
                )
            })?;

            let pool = db::connect(&cfg).await?;
            let rows = query::top_n(&pool, grouping, n).await?;
            pool.close().await;

            for (i, row) in rows.iter().enumerate() {
                let label = match (&row.state_name, &row.program_area) {
                    (Some(state), Some(program)) => format!("{} / {}", state, program),
                    (Some(state), None) => state.clone(),
                    (None, Some(program)) => program.clone(),
                    (None, None) => "(unknown)".to_string(),
                };
                println!(
                    "{}. {} FY{}: ${:.2} across {} investments",
                    i + 1,
                    label,
                    row.fiscal_year,
                    row.total_dollars,
                    row.total_investments
                );
            }
        }
        Commands::Stats => {
            let pool = db::connect(&cfg).await?;
            stats::run_stats(&cfg, &pool).await?;
            pool.close().await;
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
