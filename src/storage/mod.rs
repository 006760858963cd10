pub mod csv_store;
pub mod json_store;
pub mod yaml_store;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::model::{to_map, QuestionMap, QuestionRecord};

pub use csv_store::CsvStore;
pub use json_store::JsonStore;
pub use yaml_store::YamlStore;

static TRAILING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Csv,
    Yaml,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
            Format::Yaml => "yaml",
        }
    }

    /// Infer the format from a file extension (`yml` counts as YAML).
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yml" => Some(Format::Yaml),
            other => other.parse().ok(),
        }
    }
}

impl FromStr for Format {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            "yaml" => Ok(Format::Yaml),
            _ => Err(StorageError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Load/save contract shared by every dataset format. Implementations only
/// provide the byte-level encoding; file handling lives in the provided methods.
pub trait QuestionStore {
    fn format(&self) -> Format;

    fn decode(&self, raw: &[u8]) -> Result<Vec<QuestionRecord>, StorageError>;

    fn encode(&self, records: &[&QuestionRecord]) -> Result<Vec<u8>, StorageError>;

    /// Strict load used by the quiz and the converter.
    fn load(&self, path: &Path) -> Result<QuestionMap, StorageError> {
        if !path.exists() {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }
        let raw = fs::read(path).map_err(|e| StorageError::io(path, e))?;
        Ok(to_map(self.decode(&raw)?))
    }

    /// Tolerant load used before scraping: a missing or corrupt file yields an
    /// empty map so a run can always start from scratch.
    fn load_existing(&self, path: &Path) -> QuestionMap {
        match self.load(path) {
            Ok(map) => map,
            Err(StorageError::NotFound(_)) => {
                info!("No existing dataset at {}. Starting fresh.", path.display());
                QuestionMap::new()
            }
            Err(e) => {
                warn!(
                    "Could not load existing {} from {}: {}. Starting fresh.",
                    self.format(),
                    path.display(),
                    e
                );
                QuestionMap::new()
            }
        }
    }

    /// Rewrite the whole file with every record, sorted by question number
    /// when all ids carry one.
    fn save(&self, questions: &QuestionMap, path: &Path) -> Result<(), StorageError> {
        let records = sorted_records(questions);
        let body = self.encode(&records)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        fs::write(path, body).map_err(|e| StorageError::io(path, e))?;
        debug!("Saved {} questions to {}", records.len(), path.display());
        Ok(())
    }
}

pub fn store_for(format: Format) -> Box<dyn QuestionStore> {
    match format {
        Format::Json => Box::new(JsonStore),
        Format::Csv => Box::new(CsvStore),
        Format::Yaml => Box::new(YamlStore),
    }
}

/// Factory keyed on a format name; unknown names are a configuration error.
pub fn store_named(name: &str) -> Result<Box<dyn QuestionStore>, StorageError> {
    Ok(store_for(name.parse()?))
}

/// Store matching a dataset file's extension, JSON when there is none.
pub fn store_for_path(path: &Path) -> Box<dyn QuestionStore> {
    store_for(Format::from_path(path).unwrap_or(Format::Json))
}

fn trailing_number(id: &str) -> Option<u64> {
    TRAILING_NUMBER_RE.captures(id)?.get(1)?.as_str().parse().ok()
}

/// Records in save order. Falls back to insertion order as soon as one id has
/// no trailing number.
pub fn sorted_records(questions: &QuestionMap) -> Vec<&QuestionRecord> {
    let keyed: Option<Vec<(u64, &QuestionRecord)>> = questions
        .values()
        .map(|q| trailing_number(&q.id).map(|n| (n, q)))
        .collect();

    match keyed {
        Some(mut keyed) => {
            keyed.sort_by_key(|(n, _)| *n);
            keyed.into_iter().map(|(_, q)| q).collect()
        }
        None => questions.values().collect(),
    }
}

/// Decode records one at a time. A record that does not fit is logged and
/// dropped; the rest of the file still loads.
pub(crate) fn decode_each<V, E: fmt::Display>(
    items: impl IntoIterator<Item = V>,
    decode: impl Fn(V) -> Result<QuestionRecord, E>,
) -> Vec<QuestionRecord> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match decode(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed record #{}: {}", i + 1, e);
                None
            }
        })
        .collect()
}

pub fn backup_path(path: &Path, now: DateTime<Local>) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy();
    let stamped = format!("backup_{}_{}", now.format("%Y%m%d_%H%M"), name);
    Some(path.with_file_name(stamped))
}

/// Copy an existing dataset to `backup_<YYYYMMDD_HHMM>_<name>` next to it.
/// Returns the backup path, or `None` when there was nothing to back up.
pub fn create_backup(path: &Path) -> Result<Option<PathBuf>, StorageError> {
    create_backup_at(path, Local::now())
}

pub fn create_backup_at(
    path: &Path,
    now: DateTime<Local>,
) -> Result<Option<PathBuf>, StorageError> {
    if !path.is_file() {
        return Ok(None);
    }
    let Some(target) = backup_path(path, now) else {
        return Ok(None);
    };
    fs::copy(path, &target).map_err(|e| StorageError::io(&target, e))?;
    info!("Backup created: {}", target.display());
    Ok(Some(target))
}
