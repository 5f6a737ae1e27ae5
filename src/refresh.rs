//! Pipeline orchestration.
//!
//! One refresh cycle: locate the newest export for each record kind,
//! replace-import it, then rebuild the aggregation tables. The cycle is
//! strictly sequential and single-writer; it is triggered only by an
//! explicit operator or tool action, never a timer. A kind with no export
//! on disk is skipped, a file that fails to decode is reported without
//! touching previously committed data, and a store-level failure aborts
//! the cycle.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::aggregate;
use crate::config::Config;
use crate::dataset::DatasetKind;
use crate::error::PipelineError;
use crate::ingest;
use crate::locate;

#[derive(Debug, Serialize)]
pub struct RefreshReport {
    pub datasets: Vec<KindReport>,
    pub aggregates_rebuilt: bool,
}

#[derive(Debug, Serialize)]
pub struct KindReport {
    pub kind: &'static str,
    #[serde(flatten)]
    pub outcome: KindOutcome,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KindOutcome {
    Imported {
        rows: u64,
        source_file: String,
        encoding: &'static str,
    },
    NoFile,
    Failed {
        error: String,
    },
}

pub async fn run_refresh(config: &Config, pool: &SqlitePool) -> Result<RefreshReport> {
    let mut datasets = Vec::new();
    let mut any_imported = false;

    for kind in DatasetKind::ALL {
        let outcome = match locate::find_latest(&config.data.dir, kind)? {
            None => {
                info!(kind = %kind, "no export found, skipping");
                KindOutcome::NoFile
            }
            Some(located) => match ingest::import_file(pool, kind, &located.path).await {
                Ok(imported) => {
                    any_imported = true;
                    KindOutcome::Imported {
                        rows: imported.rows,
                        source_file: imported.source_file,
                        encoding: imported.encoding,
                    }
                }
                // A store failure is fatal to the cycle; file-level
                // failures only skip this kind and keep the prior data.
                Err(err @ PipelineError::Store(_)) => return Err(err.into()),
                Err(err) => {
                    warn!(kind = %kind, error = %err, "import failed, keeping previous data");
                    KindOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            },
        };

        datasets.push(KindReport {
            kind: kind.tag(),
            outcome,
        });
    }

    // Nothing imported means investments is unchanged, so the previous
    // aggregation generation is still consistent with it.
    if any_imported {
        aggregate::rebuild_all(pool).await?;
    }

    Ok(RefreshReport {
        datasets,
        aggregates_rebuilt: any_imported,
    })
}

pub fn print_report(report: &RefreshReport) {
    println!("refresh");
    for dataset in &report.datasets {
        match &dataset.outcome {
            KindOutcome::Imported {
                rows,
                source_file,
                encoding,
            } => {
                println!(
                    "  {}: imported {} rows from {} ({})",
                    dataset.kind, rows, source_file, encoding
                );
            }
            KindOutcome::NoFile => {
                println!("  {}: no export found, skipped", dataset.kind);
            }
            KindOutcome::Failed { error } => {
                println!("  {}: failed: {}", dataset.kind, error);
            }
        }
    }
    if report.aggregates_rebuilt {
        println!("  aggregations: rebuilt");
    } else {
        println!("  aggregations: unchanged");
    }
    println!("ok");
}
