//! PDF Form - AcroForm manipulation
//!
//! This crate provides functionality for:
//! - Opening and saving PDF documents
//! - Listing the fillable fields of an AcroForm
//! - Writing field values with generated appearance streams
//! - Flattening filled fields into static page content
//!
//! # Example
//!
//! ```ignore
//! use pdf_form::{FieldValues, FontData, FormDocument};
//!
//! let font = FontData::from_ttf("DejaVuSans", include_bytes!("fonts/DejaVuSans.ttf"))?;
//! let mut doc = FormDocument::open("form.pdf")?;
//! let mut values = FieldValues::new();
//! values.insert("name".to_string(), "Alice".to_string());
//! doc.fill(&values, &font)?;
//! doc.flatten()?;
//! doc.save("filled.pdf")?;
//! ```

mod document;
mod field;
mod font;
mod text;

pub use document::{FieldValues, FormDocument};
pub use field::{decode_pdf_string, encode_pdf_string, FieldKind, FormField};
pub use font::{FontData, FontObjects, GlyphMap};
pub use text::{parse_default_appearance, AppearanceStyle, Color};

use thiserror::Error;

/// Errors that can occur during PDF form operations
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Failed to open PDF: {0}")]
    OpenError(String),

    #[error("Failed to save PDF: {0}")]
    SaveError(String),

    #[error("Failed to parse font: {0}")]
    FontParseError(String),

    #[error("Form field not found: {0}")]
    FieldNotFound(String),

    #[error("Field '{name}' cannot be filled: {reason}")]
    UnsupportedField { name: String, reason: String },

    #[error("Invalid page number: {0} (document has {1} pages)")]
    InvalidPage(usize, usize),

    #[error("PDF parsing error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Lopdf error: {0}")]
    LopdfError(#[from] lopdf::Error),
}

/// Result type for PDF form operations
pub type Result<T> = std::result::Result<T, PdfError>;

/// Horizontal text alignment inside a field (the `/Q` quadding entry)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    /// Map a `/Q` value to an alignment; unknown values fall back to left
    pub fn from_quadding(q: i64) -> Self {
        match q {
            1 => Align::Center,
            2 => Align::Right,
            _ => Align::Left,
        }
    }
}

/// Field flag bits (`/Ff`) used by the filler
pub mod flags {
    /// Text field: multi-line
    pub const MULTILINE: i64 = 1 << 12;
    /// Text field: password (never rendered in clear)
    pub const PASSWORD: i64 = 1 << 13;
    /// Button field: radio button group
    pub const RADIO: i64 = 1 << 15;
    /// Button field: push button
    pub const PUSHBUTTON: i64 = 1 << 16;
    /// Choice field: combo box
    pub const COMBO: i64 = 1 << 17;
}

/// Annotation flag bits (`/F`)
pub mod annot_flags {
    /// Annotation is hidden and must not be drawn
    pub const HIDDEN: i64 = 1 << 1;
}
