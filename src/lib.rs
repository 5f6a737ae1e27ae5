//! # Rural Data Gateway
//!
//! A local ingestion, aggregation, and query pipeline for USDA
//! rural-investment data.
//!
//! An out-of-process fetcher drops tab-separated CSV exports into a data
//! directory. Each refresh cycle locates the newest export per record kind,
//! decodes it under an encoding fallback list, normalizes the notoriously
//! inconsistent cell values, replace-imports the rows into SQLite, and
//! rebuilds three precomputed aggregation tables. Reads are served from the
//! last completed rebuild via a CLI, a JSON HTTP API, and a semantic tool
//! surface for LLM clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌───────────┐
//! │ Locator  │──▶│  Ingestion Engine      │──▶│  SQLite    │
//! │ data dir │   │ decode→clean→replace  │   │ +aggregates│
//! └──────────┘   └───────────────────────┘   └────┬──────┘
//!                                                 │
//!                              ┌──────────────────┤
//!                              ▼                  ▼
//!                         ┌──────────┐      ┌──────────┐
//!                         │   CLI    │      │   HTTP   │
//!                         │  (rdg)   │      │ API+tools│
//!                         └──────────┘      └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Cell value normalization |
//! | [`dataset`] | Record-kind schema definitions |
//! | [`locate`] | Newest-export file selection |
//! | [`decode`] | Encoding fallback decoding |
//! | [`ingest`] | Clean and replace-import |
//! | [`aggregate`] | Aggregation table rebuild |
//! | [`query`] | Filtered and aggregate reads |
//! | [`refresh`] | Full pipeline orchestration |
//! | [`stats`] | Statistics and data freshness |
//! | [`resolve`] | Semantic name resolution (tool layer) |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`error`] | Pipeline error taxonomy |

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod db;
pub mod decode;
pub mod error;
pub mod ingest;
pub mod locate;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod query;
pub mod refresh;
pub mod resolve;
pub mod server;
pub mod stats;
