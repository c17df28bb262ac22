//! Per-batch outcome summary

use crate::{MergeError, RecordError, Result};
use serde::{Deserialize, Serialize};

/// Archive entry holding the serialized [`BatchReport`]
pub const REPORT_ENTRY_NAME: &str = "errors.json";

/// What happened to every record of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Records seen
    pub total: usize,
    /// Records that produced output
    pub rendered: usize,
    /// Archive entry names in write order
    pub entries: Vec<String>,
    /// Records without a usable key
    pub skipped: Vec<RecordError>,
    /// Records whose rendering failed
    pub failed: Vec<RecordError>,
}

impl BatchReport {
    /// No record was skipped or failed
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }

    /// Pretty-printed JSON, as written to [`REPORT_ENTRY_NAME`]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Turn any failed record into an error
    ///
    /// Skipped records alone do not make the batch fail.
    pub fn into_result(self) -> Result<Self> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(MergeError::PartialFailure {
                rendered: self.rendered,
                skipped: self.skipped.len(),
                failed: self.failed.len(),
                total: self.total,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report() -> BatchReport {
        BatchReport {
            total: 3,
            rendered: 2,
            entries: vec!["Alice.jpg".into(), "Bob.jpg".into()],
            skipped: vec![RecordError::EmptyKey {
                row: 2,
                column: "Name".into(),
            }],
            failed: Vec::new(),
        }
    }

    #[test]
    fn test_skips_do_not_fail() {
        let r = report();
        assert!(!r.is_clean());
        assert_eq!(r.clone().into_result().unwrap(), r);
    }

    #[test]
    fn test_failure_into_result() {
        let mut r = report();
        r.failed.push(RecordError::Render {
            row: 3,
            detail: "boom".into(),
        });
        match r.into_result() {
            Err(MergeError::PartialFailure {
                rendered,
                skipped,
                failed,
                total,
            }) => assert_eq!((rendered, skipped, failed, total), (2, 1, 1, 3)),
            other => panic!("expected PartialFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();
        assert_eq!(json["total"], 3);
        assert_eq!(json["skipped"][0]["kind"], "empty_key");
        assert_eq!(json["skipped"][0]["row"], 2);
        assert_eq!(json["failed"], serde_json::json!([]));
    }
}
