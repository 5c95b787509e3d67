//! Match configuration loading from data files.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and the
//! loaders that turn a match file, or a directory holding a match file and
//! an optional tuning override, into a validated [`MatchConfig`].

use serde::de::DeserializeOwned;
use sol_core::config::{ConfigError, MatchConfig, Tuning};
use std::path::{Path, PathBuf};

/// Base name of the match file inside a data directory.
pub const MATCH_FILE: &str = "match";

/// Base name of the optional tuning override inside a data directory.
pub const TUNING_FILE: &str = "tuning";

// ===========================================================================
// Errors
// ===========================================================================

/// Why a match could not be read from disk.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// No `{file}.*` exists in the directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// Extension is not `.ron`, `.toml` or `.json`.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// The same base name exists in two formats, so the choice is ambiguous.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// The file is not valid for its format or does not fit the schema.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The file parsed but describes a match that cannot start.
    #[error("invalid match in {file}: {source}")]
    Invalid {
        file: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// On-disk formats, picked by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Find `{base_name}` under `dir` in any supported format. `Ok(None)` when
/// absent; more than one match is a [`DataLoadError::ConflictingFormats`].
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }

    Ok(found)
}

/// [`find_data_file`] for files the match cannot start without.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Parse `path` with the reader its extension names.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

// ===========================================================================
// Match loading
// ===========================================================================

fn validated(config: MatchConfig, file: &Path) -> Result<MatchConfig, DataLoadError> {
    config.validate().map_err(|source| DataLoadError::Invalid {
        file: file.to_path_buf(),
        source,
    })?;
    Ok(config)
}

/// Load and validate a single match file.
pub fn load_match_config(path: &Path) -> Result<MatchConfig, DataLoadError> {
    let config: MatchConfig = deserialize_file(path)?;
    tracing::debug!(file = %path.display(), players = config.players.len(), "match file loaded");
    validated(config, path)
}

/// Load `match.*` from `dir`, replacing its tuning with `tuning.*` when that
/// file exists, then validate the result.
pub fn load_match_dir(dir: &Path) -> Result<MatchConfig, DataLoadError> {
    let match_path = require_data_file(dir, MATCH_FILE)?;
    let mut config: MatchConfig = deserialize_file(&match_path)?;

    if let Some(tuning_path) = find_data_file(dir, TUNING_FILE)? {
        config.tuning = deserialize_file::<Tuning>(&tuning_path)?;
        tracing::debug!(file = %tuning_path.display(), "tuning override applied");
    }

    validated(config, &match_path)
}

// ===========================================================================
// Tests
// ===========================================================================
