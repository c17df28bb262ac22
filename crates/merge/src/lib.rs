//! Merge - bulk personalisation of templates from tabular records
//!
//! This crate provides:
//! - Record loading from CSV with key-column resolution
//! - Image mode: draw one text line per record onto a raster template
//! - Document mode: fill a PDF form per record, optionally flattened or
//!   rasterized to one JPEG per page
//! - Packaging of every rendered record into a single zip archive with a
//!   per-record error report
//!
//! # Example
//!
//! ```ignore
//! use merge::{BatchRenderer, MergeConfig, PlacementConfig, RecordSet, Template};
//!
//! let template = Template::from_path("card.png")?;
//! let records = RecordSet::from_path("names.csv")?;
//! let config = MergeConfig::image(PlacementConfig::default());
//!
//! let renderer = BatchRenderer::new(&template, &config, &records)?;
//! let bundle = renderer.generate(&records)?;
//! std::fs::write("invitations.zip", &bundle.bytes)?;
//! ```

mod archive;
mod document;
mod overlay;
#[cfg(feature = "pdfium")]
mod pdfium;
mod raster;
mod records;
mod renderer;
mod report;
mod schema;

pub use archive::{package_archive, sanitize_entry_name, ArchiveWriter, Artifact, OutputBundle};
pub use document::{resolve_field_values, DocumentTemplate, FieldInfo, TemplateFieldReader};
pub use overlay::{draw_overlay, encode_jpeg, text_origin, ImageTemplate, OverlayFont};
#[cfg(feature = "pdfium")]
pub use pdfium::{PdfiumRasterizer, PDFIUM_LIB_PATH_ENV};
pub use raster::PageRasterizer;
pub use records::{Record, RecordSet};
pub use renderer::{
    list_fields, preview, BatchRenderer, RecordOutcome, RenderBatch, RenderedRecord, Template,
};
pub use report::{BatchReport, REPORT_ENTRY_NAME};
pub use schema::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Font used when no font file is configured
pub static BUNDLED_FONT: &[u8] = include_bytes!("../../../fonts/DejaVuSans.ttf");

/// Fatal errors: the batch cannot run at all
///
/// Problems with a single record use [`RecordError`] and are collected in the
/// [`BatchReport`] instead.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Malformed template: {0}")]
    MalformedTemplate(String),

    #[error("Field mapping error: {0}")]
    FieldMapping(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Rasterization failed: {0}")]
    Raster(String),

    /// Returned by [`BatchReport::into_result`] when the caller wants any
    /// record failure to fail the whole run.
    #[error("{failed}/{total} records failed ({skipped} skipped)")]
    PartialFailure {
        rendered: usize,
        skipped: usize,
        failed: usize,
        total: usize,
    },

    #[error("PDF error: {0}")]
    Pdf(#[from] pdf_form::PdfError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;

/// A non-fatal error for a single record
///
/// `MissingKey` and `EmptyKey` mean the record was skipped; `MissingValue`,
/// `Render` and `Encoding` mean it was attempted and failed. Either way the
/// batch goes on.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordError {
    #[error("Row {row}: key column '{column}' is missing")]
    MissingKey { row: usize, column: String },

    #[error("Row {row}: key column '{column}' is empty")]
    EmptyKey { row: usize, column: String },

    #[error("Row {row}: column '{column}' is missing")]
    MissingValue { row: usize, column: String },

    #[error("Row {row}: render failed: {detail}")]
    Render { row: usize, detail: String },

    #[error("Row {row}: encoding failed: {detail}")]
    Encoding { row: usize, detail: String },
}

impl RecordError {
    /// 1-based data row the error belongs to
    pub fn row(&self) -> usize {
        match self {
            RecordError::MissingKey { row, .. }
            | RecordError::EmptyKey { row, .. }
            | RecordError::MissingValue { row, .. }
            | RecordError::Render { row, .. }
            | RecordError::Encoding { row, .. } => *row,
        }
    }

    /// Whether the record was skipped rather than failed
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            RecordError::MissingKey { .. } | RecordError::EmptyKey { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_failure_display() {
        let e = MergeError::PartialFailure {
            rendered: 8,
            skipped: 1,
            failed: 1,
            total: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/10"), "got: {msg}");
        assert!(msg.contains("1 skipped"), "got: {msg}");
    }

    #[test]
    fn test_record_error_row_and_skip() {
        let skip = RecordError::EmptyKey {
            row: 2,
            column: "Name".into(),
        };
        assert_eq!(skip.row(), 2);
        assert!(skip.is_skip());

        let fail = RecordError::Render {
            row: 5,
            detail: "boom".into(),
        };
        assert_eq!(fail.row(), 5);
        assert!(!fail.is_skip());
    }

    #[test]
    fn test_missing_value_is_a_failure() {
        let e = RecordError::MissingValue {
            row: 4,
            column: "Full Name".into(),
        };
        assert_eq!(e.row(), 4);
        assert!(!e.is_skip());
        assert_eq!(e.to_string(), "Row 4: column 'Full Name' is missing");
    }

    #[test]
    fn test_record_error_serializes_with_kind_tag() {
        let e = RecordError::MissingKey {
            row: 3,
            column: "Name".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "missing_key", "row": 3, "column": "Name" })
        );
    }

    #[test]
    fn test_pdf_error_converts() {
        let e: MergeError = pdf_form::PdfError::FieldNotFound("x".into()).into();
        assert!(matches!(e, MergeError::Pdf(_)));
    }
}
