//! Job configuration types
//!
//! Everything a batch needs is carried in one immutable [`MergeConfig`]. It
//! deserializes from JSON (camelCase keys, everything but `mode` optional) and is
//! checked once with [`MergeConfig::validate`] before any record is rendered.

use crate::{MergeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Allowed font sizes for image mode, in pixels
pub const FONT_SIZE_RANGE: std::ops::RangeInclusive<u32> = 10..=100;

/// Allowed rasterization resolutions
pub const DPI_RANGE: std::ops::RangeInclusive<u32> = 36..=600;

/// Resolution used when rasterizing filled documents
pub const DEFAULT_DPI: u32 = 200;

/// JPEG quality used when none is configured
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// RGB text color, written as `#RRGGBB` in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Create color from RGB values (0-255)
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Black color
    pub fn black() -> Self {
        Self::from_rgb(0, 0, 0)
    }

    /// Parse `#RRGGBB` or `#RGB` (the leading `#` is optional)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || MergeError::InvalidConfig(format!("invalid color '{hex}', expected #RRGGBB"));
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match digits.len() {
            6 => Ok(Self::from_rgb(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => {
                let expand = |i: usize| channel(&digits[i..i + 1]).map(|v| v * 17);
                Ok(Self::from_rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            _ => Err(invalid()),
        }
    }

    /// Lowercase `#rrggbb` form
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Color as a PDF fill color (values 0.0 - 1.0)
    pub fn to_pdf(&self) -> pdf_form::Color {
        pdf_form::Color::from_rgb(self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = MergeError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl FromStr for Color {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Horizontal text placement
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

impl FromStr for Align {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Align::Left),
            "center" | "centre" => Ok(Align::Center),
            "right" => Ok(Align::Right),
            other => Err(MergeError::InvalidConfig(format!(
                "unknown alignment '{other}', expected left, center or right"
            ))),
        }
    }
}

impl fmt::Display for Align {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        };
        f.write_str(s)
    }
}

/// Text placement for image mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlacementConfig {
    /// Font size in pixels (10 - 100)
    pub font_size: u32,

    /// Text color
    pub color: Color,

    /// Vertical position of the text top, as a percentage of template height
    pub y_percent: f32,

    /// Horizontal alignment
    pub align: Align,

    /// Distance from the template edge for left and right alignment, in pixels
    pub margin: u32,

    /// Column providing the drawn text; defaults to the key column
    pub text_column: Option<String>,

    /// Quality of the encoded JPEG (1 - 100)
    pub jpeg_quality: u8,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            font_size: 40,
            color: Color::black(),
            y_percent: 50.0,
            align: Align::Center,
            margin: 10,
            text_column: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl PlacementConfig {
    /// Start a builder from the defaults
    pub fn builder() -> PlacementConfigBuilder {
        PlacementConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<()> {
        if !FONT_SIZE_RANGE.contains(&self.font_size) {
            return Err(MergeError::InvalidConfig(format!(
                "font size must be {}-{}, got {}",
                FONT_SIZE_RANGE.start(),
                FONT_SIZE_RANGE.end(),
                self.font_size
            )));
        }
        if !self.y_percent.is_finite() || !(0.0..=100.0).contains(&self.y_percent) {
            return Err(MergeError::InvalidConfig(format!(
                "vertical position must be 0-100 percent, got {}",
                self.y_percent
            )));
        }
        validate_quality(self.jpeg_quality)
    }
}

/// Builder for [`PlacementConfig`]
#[derive(Debug)]
pub struct PlacementConfigBuilder {
    config: PlacementConfig,
}

impl PlacementConfigBuilder {
    pub fn font_size(mut self, size: u32) -> Self {
        self.config.font_size = size;
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.config.color = color;
        self
    }

    pub fn y_percent(mut self, percent: f32) -> Self {
        self.config.y_percent = percent;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.config.align = align;
        self
    }

    pub fn margin(mut self, margin: u32) -> Self {
        self.config.margin = margin;
        self
    }

    pub fn text_column(mut self, column: impl Into<String>) -> Self {
        self.config.text_column = Some(column.into());
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<PlacementConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Template field -> CSV column
///
/// Fields left out of the mapping are not written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, String>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `field` to `column`, replacing any earlier column
    pub fn insert(&mut self, field: impl Into<String>, column: impl Into<String>) {
        self.0.insert(field.into(), column.into());
    }

    /// Parse a `Field=Column` pair
    ///
    /// The split happens at the last `=`, so field names may contain `=`.
    pub fn parse_pair(pair: &str) -> Result<(String, String)> {
        let (field, column) = pair.rsplit_once('=').ok_or_else(|| {
            MergeError::FieldMapping(format!("expected FIELD=COLUMN, got '{pair}'"))
        })?;
        let (field, column) = (field.trim(), column.trim());
        if field.is_empty() || column.is_empty() {
            return Err(MergeError::FieldMapping(format!(
                "expected FIELD=COLUMN, got '{pair}'"
            )));
        }
        Ok((field.to_string(), column.to_string()))
    }

    /// Column mapped to a field
    pub fn column(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Iterate `(field, column)` pairs in field order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(f, c)| (f.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that every field exists in the template and every column in the data
    pub fn validate(&self, fields: &[String], headers: &[String]) -> Result<()> {
        for (field, column) in self.iter() {
            if !fields.iter().any(|f| f == field) {
                return Err(MergeError::FieldMapping(format!(
                    "field '{field}' does not exist in the template (available: {})",
                    fields.join(", ")
                )));
            }
            if !headers.iter().any(|h| h == column) {
                return Err(MergeError::FieldMapping(format!(
                    "column '{column}' mapped to field '{field}' does not exist in the data"
                )));
            }
        }
        Ok(())
    }
}

impl<F: Into<String>, C: Into<String>> FromIterator<(F, C)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (F, C)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(f, c)| (f.into(), c.into()))
                .collect(),
        )
    }
}

/// Output format of document mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum DocumentOutput {
    /// One filled PDF per record (`<key>_filled.pdf`)
    #[default]
    Pdf,
    /// One JPEG per page per record (`<key>_page<N>.jpg`)
    Jpeg {
        #[serde(default = "default_dpi")]
        dpi: u32,
        #[serde(default = "default_quality")]
        quality: u8,
    },
}

fn default_dpi() -> u32 {
    DEFAULT_DPI
}

fn default_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl DocumentOutput {
    /// JPEG output at the default resolution and quality
    pub fn jpeg() -> Self {
        DocumentOutput::Jpeg {
            dpi: DEFAULT_DPI,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Settings for document mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentConfig {
    /// Which column fills which field
    pub mapping: FieldMapping,

    /// Make the filled fields static page content
    pub flatten: bool,

    /// PDF or rasterized JPEG pages
    pub output: DocumentOutput,
}

impl DocumentConfig {
    pub fn validate(&self) -> Result<()> {
        if let DocumentOutput::Jpeg { dpi, quality } = self.output {
            if !DPI_RANGE.contains(&dpi) {
                return Err(MergeError::InvalidConfig(format!(
                    "DPI must be {}-{}, got {dpi}",
                    DPI_RANGE.start(),
                    DPI_RANGE.end()
                )));
            }
            validate_quality(quality)?;
        }
        Ok(())
    }
}

fn validate_quality(quality: u8) -> Result<()> {
    if !(1..=100).contains(&quality) {
        return Err(MergeError::InvalidConfig(format!(
            "JPEG quality must be 1-100, got {quality}"
        )));
    }
    Ok(())
}

/// What to produce for each record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RenderMode {
    /// Draw text onto a raster template
    Image(PlacementConfig),
    /// Fill a PDF form template
    Document(DocumentConfig),
}

impl Default for RenderMode {
    fn default() -> Self {
        RenderMode::Image(PlacementConfig::default())
    }
}

/// Complete description of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MergeConfig {
    /// Column whose value names each output file; defaults to the first column
    pub key_column: Option<String>,

    /// Render mode and its settings; the `mode` key is required in JSON
    #[serde(flatten)]
    pub mode: RenderMode,

    /// Add `errors.json` to the archive when records were skipped or failed
    pub include_manifest: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            key_column: None,
            mode: RenderMode::default(),
            include_manifest: true,
        }
    }
}

impl MergeConfig {
    /// Image mode with the given placement
    pub fn image(placement: PlacementConfig) -> Self {
        Self {
            mode: RenderMode::Image(placement),
            ..Self::default()
        }
    }

    /// Document mode with the given settings
    pub fn document(document: DocumentConfig) -> Self {
        Self {
            mode: RenderMode::Document(document),
            ..Self::default()
        }
    }

    /// Use `column` as the key column
    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    /// Parse a configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the mode settings
    pub fn validate(&self) -> Result<()> {
        if let Some(key) = &self.key_column {
            if key.trim().is_empty() {
                return Err(MergeError::InvalidConfig(
                    "key column name is empty".to_string(),
                ));
            }
        }
        match &self.mode {
            RenderMode::Image(placement) => placement.validate(),
            RenderMode::Document(document) => document.validate(),
        }
    }
}
