//! Cosign core library: the bill cosponsorship ETL pipeline.
//!
//! Bill status XML documents are parsed into bills, sponsor identity strings
//! are resolved into members, and every bipartisan bill is folded into a
//! sparse member-by-member matrix of shared bills. The matrix cells are then
//! tagged with the policy areas and subjects of the bills behind them. All
//! collections live in one SQLite database.

pub mod config;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod store;

pub use config::PipelineConfig;
pub use errors::{CosignError, CosignResult, ErrorCategory};
pub use indexer::pipeline::{run_pipeline, RunReport, Stages};
pub use store::database::Database;
pub use store::schema::Collections;
