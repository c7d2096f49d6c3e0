//! Named fixture datasets
//!
//! Each dataset is a JSON array of flat objects stored as
//! `<fixtures_dir>/<name>.json`. Rows are addressed by position.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};

/// A single fixture row: field name to scalar value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureRow(pub Map<String, Value>);

impl FixtureRow {
    pub fn raw(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    /// Field rendered as text, `None` when absent or null
    pub fn text(&self, field: &str) -> Option<String> {
        self.raw(field).map(scalar_to_string)
    }

    /// Field interpreted as a flag, `None` when absent
    pub fn flag(&self, field: &str) -> Option<bool> {
        match self.raw(field)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Some(true),
                "false" | "no" | "n" | "0" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.0.insert(field.to_string(), value);
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A row picked from a dataset for one test case
#[derive(Debug, Clone)]
pub struct BoundRow {
    pub dataset: String,
    pub index: usize,
    pub row: FixtureRow,
}

impl BoundRow {
    fn missing(&self, field: &str) -> E2eError {
        E2eError::MissingField {
            dataset: self.dataset.clone(),
            index: self.index,
            field: field.to_string(),
        }
    }

    /// Required text field
    pub fn text(&self, field: &str) -> E2eResult<String> {
        self.row.text(field).ok_or_else(|| self.missing(field))
    }

    /// Optional flag, absent means `default`
    pub fn flag_or(&self, field: &str, default: bool) -> bool {
        self.row.flag(field).unwrap_or(default)
    }

    pub fn optional_text(&self, field: &str) -> Option<String> {
        self.row.text(field)
    }
}

/// Read side of the fixture backing store
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
    cache: Arc<RwLock<HashMap<String, Arc<Vec<FixtureRow>>>>>,
}

impl FixtureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load a dataset, served from cache after the first read
    pub fn load_data(&self, name: &str) -> E2eResult<Arc<Vec<FixtureRow>>> {
        if let Some(rows) = self.cache.read().get(name) {
            return Ok(rows.clone());
        }
        self.reload_data(name)
    }

    /// Re-read a dataset from disk, superseding the cached copy
    pub fn reload_data(&self, name: &str) -> E2eResult<Arc<Vec<FixtureRow>>> {
        let rows = Arc::new(read_dataset(&self.root, name)?);
        debug!("Loaded {} row(s) from dataset '{}'", rows.len(), name);
        self.cache.write().insert(name.to_string(), rows.clone());
        Ok(rows)
    }

    /// Pick one row of a dataset
    pub fn row(&self, name: &str, index: usize) -> E2eResult<BoundRow> {
        let rows = self.load_data(name)?;
        pick(name, &rows, index)
    }

    /// Pick one row after re-reading the dataset
    pub fn reload_row(&self, name: &str, index: usize) -> E2eResult<BoundRow> {
        let rows = self.reload_data(name)?;
        pick(name, &rows, index)
    }
}

fn pick(name: &str, rows: &[FixtureRow], index: usize) -> E2eResult<BoundRow> {
    let row = rows.get(index).cloned().ok_or_else(|| E2eError::RowOutOfRange {
        dataset: name.to_string(),
        index,
        len: rows.len(),
    })?;
    Ok(BoundRow {
        dataset: name.to_string(),
        index,
        row,
    })
}

fn dataset_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{}.json", name))
}

fn read_dataset(root: &Path, name: &str) -> E2eResult<Vec<FixtureRow>> {
    let path = dataset_path(root, name);
    if !path.exists() {
        return Err(E2eError::DatasetNotFound(name.to_string()));
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write side: persists values discovered by flows into the backing files
#[derive(Debug, Clone)]
pub struct FixtureWriter {
    root: PathBuf,
}

impl FixtureWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Set `field` on row `index` of dataset `name` and persist the file
    pub fn write_field(&self, name: &str, index: usize, field: &str, value: Value) -> E2eResult<()> {
        let mut rows = read_dataset(&self.root, name)?;
        let len = rows.len();
        let row = rows.get_mut(index).ok_or_else(|| E2eError::RowOutOfRange {
            dataset: name.to_string(),
            index,
            len,
        })?;
        row.set(field, value);

        let path = dataset_path(&self.root, name);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(serde_json::to_string_pretty(&rows)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| E2eError::Io(e.error))?;

        info!("Recorded {}[{}].{} in {}", name, index, field, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_dataset(dir: &Path, name: &str, rows: Value) {
        std::fs::write(dir.join(format!("{}.json", name)), rows.to_string()).unwrap();
    }

    #[test]
    fn test_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureStore::new(dir.path());
        assert!(matches!(store.load_data("dt_missing"), Err(E2eError::DatasetNotFound(_))));
    }

    #[test]
    fn test_row_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), "dt_patient", json!([{ "name": "A" }]));
        let store = FixtureStore::new(dir.path());
        let err = store.row("dt_patient", 4).unwrap_err();
        assert!(matches!(err, E2eError::RowOutOfRange { index: 4, len: 1, .. }));
    }

    #[test]
    fn test_reload_sees_write_back() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), "dt_patient", json!([{ "name": "A", "mrn": null }]));
        let store = FixtureStore::new(dir.path());
        let writer = FixtureWriter::new(dir.path());

        let stale = store.row("dt_patient", 0).unwrap();
        assert!(stale.optional_text("mrn").is_none());

        writer.write_field("dt_patient", 0, "mrn", json!("MRN0001")).unwrap();

        // cached copy is still stale
        assert!(store.row("dt_patient", 0).unwrap().optional_text("mrn").is_none());

        let fresh = store.reload_row("dt_patient", 0).unwrap();
        assert_eq!(fresh.text("mrn").unwrap(), "MRN0001");
        assert!(stale.optional_text("mrn").is_none());
    }

    #[test]
    fn test_missing_field_is_named() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), "dt_patient", json!([{ "name": "A" }]));
        let store = FixtureStore::new(dir.path());
        let row = store.row("dt_patient", 0).unwrap();
        let err = row.text("icNo").unwrap_err();
        assert_eq!(err.to_string(), "Fixture 'dt_patient'[0] has no field 'icNo'");
    }

    #[test]
    fn test_flag_parsing() {
        let row = FixtureRow(
            json!({ "a": true, "b": "Yes", "c": "no", "d": 0, "e": "maybe" })
                .as_object()
                .unwrap()
                .clone(),
        );
        assert_eq!(row.flag("a"), Some(true));
        assert_eq!(row.flag("b"), Some(true));
        assert_eq!(row.flag("c"), Some(false));
        assert_eq!(row.flag("d"), Some(false));
        assert_eq!(row.flag("e"), None);
        assert_eq!(row.flag("z"), None);
    }

    #[test]
    fn test_numbers_render_as_text() {
        let row = FixtureRow(json!({ "age": 42 }).as_object().unwrap().clone());
        assert_eq!(row.text("age").as_deref(), Some("42"));
    }
}
