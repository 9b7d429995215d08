//! Local copies of evaluation and study reports.
//!
//! Supports both JSON (human-readable) and bincode (compact binary) formats.

use crate::error::{OptimizeError, Result};
use crate::eval::EvalReport;
use crate::study::StudyReport;
use bincode::{Decode, Encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Save format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// JSON format (human-readable, larger).
    Json,
    /// Bincode format (binary, compact).
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json,
        }
    }
}

/// Save a study report; the format follows the file extension.
pub fn save_study_report(report: &StudyReport, path: &Path) -> Result<()> {
    save(report, path, SaveFormat::from_path(path))
}

pub fn load_study_report(path: &Path) -> Result<StudyReport> {
    load(path, SaveFormat::from_path(path))
}

/// Save an evaluation report; the format follows the file extension.
pub fn save_eval_report(report: &EvalReport, path: &Path) -> Result<()> {
    save(report, path, SaveFormat::from_path(path))
}

pub fn load_eval_report(path: &Path) -> Result<EvalReport> {
    load(path, SaveFormat::from_path(path))
}

fn save<T: Serialize + Encode>(value: &T, path: &Path, format: SaveFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| OptimizeError::io(parent, e))?;
        }
    }

    let data = match format {
        SaveFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| OptimizeError::Serialization(e.to_string()))?
            .into_bytes(),
        SaveFormat::Bincode => bincode::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| OptimizeError::Serialization(e.to_string()))?,
    };

    fs::write(path, &data).map_err(|e| OptimizeError::io(path, e))
}

fn load<T: DeserializeOwned + Decode<()>>(path: &Path, format: SaveFormat) -> Result<T> {
    if !path.is_file() {
        return Err(OptimizeError::DataNotFound(path.to_path_buf()));
    }

    let data = fs::read(path).map_err(|e| OptimizeError::io(path, e))?;

    match format {
        SaveFormat::Json => {
            serde_json::from_slice(&data).map_err(|e| OptimizeError::Serialization(e.to_string()))
        }
        SaveFormat::Bincode => {
            let (value, _): (T, usize) =
                bincode::decode_from_slice(&data, bincode::config::standard())
                    .map_err(|e| OptimizeError::Serialization(e.to_string()))?;
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{RetrievalMetrics, ThresholdResult};
    use crate::settings::{EmbeddingProvider, EmbeddingSettings, RunId};
    use crate::study::{MetricName, TrialParams, TrialResult};
    use tempfile::TempDir;

    fn create_test_report() -> StudyReport {
        let trial = TrialResult {
            number: 0,
            test_id: RunId::from_string("trial-0"),
            params: TrialParams {
                embedding: EmbeddingSettings::new(
                    EmbeddingProvider::Hf,
                    "sentence-transformers/all-MiniLM-L6-v2",
                    384,
                ),
                ret_k: 4,
                ef_runtime: 10,
                ef_construction: 200,
                m: 16,
            },
            metrics: RetrievalMetrics {
                precision_at_k: 0.25,
                recall_at_k: 1.0,
                f1_at_k: 0.4,
            },
            threshold: Some(ThresholdResult {
                threshold: 0.3,
                precision: 1.0,
                recall: 1.0,
                f1: 1.0,
            }),
            avg_query_time_ms: 1.5,
            indexing_time_secs: 0.2,
            objective: 0.4,
        };

        StudyReport {
            study_id: RunId::from_string("study-1"),
            metrics: vec![MetricName::F1AtK],
            weights: vec![1.0],
            trials: vec![trial],
            best_trial: Some(0),
            total_time_secs: 1.0,
        }
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("study.json");

        let original = create_test_report();
        save_study_report(&original, &path).unwrap();

        let loaded = load_study_report(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_save_and_load_bincode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("study.bin");

        let original = create_test_report();
        save_study_report(&original, &path).unwrap();

        let loaded = load_study_report(&path).unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.best().unwrap().params.m, 16);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SaveFormat::from_path(Path::new("test.json")), SaveFormat::Json);
        assert_eq!(SaveFormat::from_path(Path::new("test.bin")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("test.bincode")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("test")), SaveFormat::Json);
    }

    #[test]
    fn test_load_nonexistent() {
        let result = load_study_report(Path::new("/nonexistent/study.json"));
        assert!(matches!(result, Err(OptimizeError::DataNotFound(_))));
    }

    #[test]
    fn test_json_is_readable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("study.json");

        save_study_report(&create_test_report(), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"f1_at_k\""));
        assert!(content.contains("all-MiniLM-L6-v2"));
    }
}
