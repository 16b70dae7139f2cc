//! Pipeline configuration and shared bounds.

use std::path::PathBuf;

use tracing::warn;

pub const DEFAULT_WORKERS: usize = 16;
pub const MAX_WORKERS: usize = 64;
pub const DEFAULT_CONGRESS: u32 = 116;
pub const DEFAULT_BILL_TYPE: &str = "house-bill";

pub const ENV_WORKERS: &str = "COSIGN_WORKERS";
pub const ENV_CONGRESS: &str = "COSIGN_CONGRESS";
pub const ENV_BILL_TYPE: &str = "COSIGN_BILL_TYPE";

pub fn clamp_workers(value: usize) -> usize {
    value.clamp(1, MAX_WORKERS)
}

/// Settings shared by every pipeline stage.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Directory holding one XML document per bill.
    pub bills_dir: PathBuf,
    pub db_path: PathBuf,
    /// Ceiling on concurrently in-flight units within a stage.
    pub workers: usize,
    pub congress: u32,
    pub bill_type: String,
}

impl PipelineConfig {
    pub fn new(bills_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            bills_dir: bills_dir.into(),
            db_path: db_path.into(),
            workers: DEFAULT_WORKERS,
            congress: DEFAULT_CONGRESS,
            bill_type: DEFAULT_BILL_TYPE.to_string(),
        }
    }

    /// Build a config from defaults, then apply `COSIGN_*` overrides.
    pub fn from_env(bills_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(bills_dir, db_path);
        if let Some(workers) = env_number::<usize>(ENV_WORKERS) {
            config.workers = workers;
        }
        if let Some(congress) = env_number::<u32>(ENV_CONGRESS) {
            config.congress = congress;
        }
        if let Ok(bill_type) = std::env::var(ENV_BILL_TYPE) {
            let trimmed = bill_type.trim();
            if !trimmed.is_empty() {
                config.bill_type = trimmed.to_string();
            }
        }
        config.workers = clamp_workers(config.workers);
        config
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = clamp_workers(workers);
        self
    }

    pub fn bill_link(&self, number: i64) -> String {
        format!(
            "https://www.congress.gov/bill/{}th-congress/{}/{}",
            self.congress, self.bill_type, number
        )
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}
