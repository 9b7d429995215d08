//! Loading of raw corpus items and labeled queries.
//!
//! Supports:
//! - A single JSON array per file
//! - JSON Lines (one object per line)

use crate::error::{OptimizeError, Result};
use crate::settings::{DataSettings, InputDataType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A single corpus item to be embedded and indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Unique identifier for this item.
    pub item_id: String,
    /// The text that gets embedded.
    pub text: String,
}

/// A query together with the identifiers of the items that answer it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledItem {
    /// The query text.
    pub query: String,
    /// Items considered relevant for the query.
    pub relevant_item_ids: Vec<String>,
}

impl LabeledItem {
    /// Relevant identifiers as a set (duplicates collapse).
    pub fn relevant_set(&self) -> HashSet<&str> {
        self.relevant_item_ids.iter().map(String::as_str).collect()
    }
}

/// Raw items and labeled queries for one run.
#[derive(Debug, Clone)]
pub struct EvalData {
    pub raw_items: Vec<RawItem>,
    pub labeled_items: Vec<LabeledItem>,
}

impl EvalData {
    /// Load both files described by `settings`.
    pub fn load(settings: &DataSettings) -> Result<Self> {
        let raw_items = load_raw_items(&settings.raw_data_path, settings.input_data_type)?;
        let labeled_items =
            load_labeled_items(&settings.labeled_data_path, settings.input_data_type)?;

        Ok(Self {
            raw_items,
            labeled_items,
        })
    }
}

/// Load and check raw items.
///
/// Item identifiers must be non-empty and unique within the file.
pub fn load_raw_items(path: &Path, format: InputDataType) -> Result<Vec<RawItem>> {
    let items: Vec<RawItem> = load_records(path, format)?;

    let mut seen = HashSet::new();
    for item in &items {
        if item.item_id.trim().is_empty() {
            return Err(OptimizeError::data_format(path, "raw item with empty item_id"));
        }
        if !seen.insert(item.item_id.as_str()) {
            return Err(OptimizeError::data_format(
                path,
                format!("duplicate item_id '{}'", item.item_id),
            ));
        }
    }

    Ok(items)
}

/// Load and check labeled queries.
///
/// Every query must list at least one relevant item.
pub fn load_labeled_items(path: &Path, format: InputDataType) -> Result<Vec<LabeledItem>> {
    let items: Vec<LabeledItem> = load_records(path, format)?;

    for (idx, item) in items.iter().enumerate() {
        if item.relevant_item_ids.is_empty() {
            return Err(OptimizeError::data_format(
                path,
                format!("labeled item {} ('{}') has no relevant_item_ids", idx, item.query),
            ));
        }
    }

    Ok(items)
}

fn load_records<T: DeserializeOwned>(path: &Path, format: InputDataType) -> Result<Vec<T>> {
    if !path.is_file() {
        return Err(OptimizeError::DataNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|e| OptimizeError::io(path, e))?;

    match format {
        InputDataType::Json => serde_json::from_str(&content)
            .map_err(|e| OptimizeError::data_format(path, e.to_string())),
        InputDataType::Jsonl => {
            let mut records = Vec::new();
            for (line_num, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let record = serde_json::from_str(line).map_err(|e| {
                    OptimizeError::data_format(path, format!("line {}: {}", line_num + 1, e))
                })?;
                records.push(record);
            }
            Ok(records)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_raw_json() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "raw.json",
            r#"[{"item_id": "a", "text": "alpha"}, {"item_id": "b", "text": "beta"}]"#,
        );

        let items = load_raw_items(&path, InputDataType::Json).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].item_id, "b");
    }

    #[test]
    fn test_load_labeled_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "labeled.jsonl",
            "{\"query\": \"q1\", \"relevant_item_ids\": [\"a\"]}\n\n{\"query\": \"q2\", \"relevant_item_ids\": [\"a\", \"b\"]}\n",
        );

        let items = load_labeled_items(&path, InputDataType::Jsonl).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].relevant_set().len(), 2);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "raw.json",
            r#"[{"item_id": "a", "text": "x"}, {"item_id": "a", "text": "y"}]"#,
        );

        let err = load_raw_items(&path, InputDataType::Json).unwrap_err();
        assert!(matches!(err, OptimizeError::DataFormat { .. }));
    }

    #[test]
    fn test_empty_relevant_set_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "labeled.json",
            r#"[{"query": "q", "relevant_item_ids": []}]"#,
        );

        assert!(load_labeled_items(&path, InputDataType::Json).is_err());
    }

    #[test]
    fn test_malformed_jsonl_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "raw.jsonl", "{\"item_id\": \"a\", \"text\": \"x\"}\nnot json\n");

        let err = load_raw_items(&path, InputDataType::Jsonl).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_missing_file() {
        let result = load_raw_items(Path::new("/nonexistent/raw.json"), InputDataType::Json);
        assert!(matches!(result, Err(OptimizeError::DataNotFound(_))));
    }
}
