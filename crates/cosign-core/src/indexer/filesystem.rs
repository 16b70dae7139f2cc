//! Filesystem scanning for the bill document directory.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{CosignError, CosignResult};

const BILL_EXTENSION: &str = "xml";

pub fn is_bill_document(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(BILL_EXTENSION))
        .unwrap_or(false)
}

/// List the `*.xml` files directly inside `dir`, sorted by file name.
pub fn scan_bill_files(dir: &Path) -> CosignResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CosignError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("bill directory {} does not exist", dir.display()),
        )));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && is_bill_document(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
