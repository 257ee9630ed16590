//! Data validation utilities.
//!
//! Every `.ron` file under the data directory is parsed according to its
//! name: `units*.ron` as a unit catalog, `battle*.ron` as a battle
//! configuration. Other files (scenarios, host settings) belong to the
//! front ends and are skipped. Catalog entries must be unique across all
//! catalog files.

use std::path::{Path, PathBuf};

use arena_core::config::BattleConfig;
use arena_core::data::UnitCatalog;
use arena_core::error::GameError;
use thiserror::Error;

/// Error type for data validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The directory or a file could not be read.
    #[error("Cannot read '{path}': {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A file is not valid RON.
    #[error("Syntax error in '{path}': {message}")]
    Syntax {
        /// Offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// A file parsed but its content is invalid.
    #[error("Invalid data in '{path}': {source}")]
    Content {
        /// Offending file.
        path: PathBuf,
        /// Validation failure.
        source: GameError,
    },
    /// No data files were found.
    #[error("No .ron files found under '{0}'")]
    Empty(PathBuf),
}

/// How a data file is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// List of unit stats.
    UnitCatalog,
    /// Battle tuning.
    BattleConfig,
    /// Not validated here.
    Other,
}

impl DataKind {
    /// Classify a file by its name.
    #[must_use]
    pub fn of(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem.starts_with("units") {
            Self::UnitCatalog
        } else if stem.starts_with("battle") {
            Self::BattleConfig
        } else {
            Self::Other
        }
    }
}

/// Counts of what a successful validation covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Unit catalog files.
    pub catalogs: usize,
    /// Battle configuration files.
    pub configs: usize,
    /// Files skipped.
    pub skipped: usize,
    /// Unit entries across all catalogs.
    pub unit_entries: usize,
}

/// Validate all RON data files in a directory.
///
/// # Errors
///
/// Returns the first error found, in path order.
pub fn validate_data_directory(path: &Path) -> Result<ValidationReport, ValidationError> {
    let mut files = Vec::new();
    collect_ron_files(path, &mut files)?;
    if files.is_empty() {
        return Err(ValidationError::Empty(path.to_path_buf()));
    }
    files.sort();

    let mut report = ValidationReport::default();
    let mut combined = UnitCatalog::new();
    for file in &files {
        let source = std::fs::read_to_string(file).map_err(|source| ValidationError::Io {
            path: file.clone(),
            source,
        })?;
        let kind = DataKind::of(file);
        tracing::debug!(file = %file.display(), ?kind, "Validating");

        match kind {
            DataKind::UnitCatalog => {
                let catalog = UnitCatalog::from_ron_str(&source, &file.display().to_string())
                    .map_err(|e| content_or_syntax(file, e))?;
                for unit in catalog.iter() {
                    combined
                        .insert(unit.clone())
                        .map_err(|source| ValidationError::Content {
                            path: file.clone(),
                            source,
                        })?;
                }
                report.catalogs += 1;
            }
            DataKind::BattleConfig => {
                BattleConfig::from_ron_str(&source, &file.display().to_string())
                    .map_err(|e| content_or_syntax(file, e))?;
                report.configs += 1;
            }
            DataKind::Other => {
                tracing::debug!(file = %file.display(), "Skipping file of unknown kind");
                report.skipped += 1;
            }
        }
    }
    report.unit_entries = combined.len();
    Ok(report)
}

fn content_or_syntax(path: &Path, error: GameError) -> ValidationError {
    match error {
        GameError::DataParseError { message, .. } => ValidationError::Syntax {
            path: path.to_path_buf(),
            message,
        },
        source => ValidationError::Content {
            path: path.to_path_buf(),
            source,
        },
    }
}

fn collect_ron_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ValidationError> {
    let io_error = |source| ValidationError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_dir() {
            collect_ron_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "ron") {
            out.push(path);
        }
    }
    Ok(())
}
