//! Batch rendering
//!
//! [`BatchRenderer`] turns a template, a validated [`MergeConfig`] and a
//! [`RecordSet`] into one [`RecordOutcome`] per record, in record order. The
//! template is shared read-only; every record is rendered onto a fresh copy.

use crate::archive::{package_archive, Artifact, OutputBundle};
use crate::document::{resolve_field_values, DocumentTemplate, FieldInfo, TemplateFieldReader};
use crate::overlay::{draw_overlay, encode_jpeg, ImageTemplate, OverlayFont};
use crate::{
    DocumentConfig, DocumentOutput, MergeConfig, MergeError, PageRasterizer, PlacementConfig,
    Record, RecordError, RecordSet, RenderMode, Result, BUNDLED_FONT,
};
use pdf_form::FontData;
use std::path::Path;
use tracing::{debug, info, warn};

/// Name given to the embedded appearance font in filled documents
const BUNDLED_FONT_NAME: &str = "DejaVuSans";
const CUSTOM_FONT_NAME: &str = "RsmCustomFont";

/// A loaded template, either a raster image or a fillable PDF
#[derive(Debug, Clone)]
pub enum Template {
    Image(ImageTemplate),
    Document(DocumentTemplate),
}

impl Template {
    /// Detect the template kind from its content and parse it
    ///
    /// Data carrying a `%PDF-` header near the start is a document; anything
    /// else must decode as an image.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(MergeError::MissingInput("template is empty".to_string()));
        }
        let head = &data[..data.len().min(1024)];
        if head.windows(5).any(|w| w == b"%PDF-") {
            Ok(Template::Document(DocumentTemplate::from_bytes(data)?))
        } else {
            Ok(Template::Image(ImageTemplate::from_bytes(data)?))
        }
    }

    /// Read a template file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            MergeError::MissingInput(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_bytes(&data)
    }

    /// `"image"` or `"document"`
    pub fn kind(&self) -> &'static str {
        match self {
            Template::Image(_) => "image",
            Template::Document(_) => "document",
        }
    }
}

/// Fillable fields of a template; image templates have none
pub fn list_fields(template: &Template) -> Vec<FieldInfo> {
    match template {
        Template::Image(_) => Vec::new(),
        Template::Document(document) => document.field_infos(),
    }
}

/// Render one sample text with image-mode placement, as JPEG bytes
///
/// # Arguments
/// * `template` - Raster template
/// * `text` - Sample text
/// * `placement` - Text placement; validated first
/// * `font` - Font to draw with
pub fn preview(
    template: &ImageTemplate,
    text: &str,
    placement: &PlacementConfig,
    font: &OverlayFont,
) -> Result<Vec<u8>> {
    placement.validate()?;
    let image = draw_overlay(template, text, placement, font);
    encode_jpeg(&image, placement.jpeg_quality)
}

/// Output of one successfully rendered record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRecord {
    pub row: usize,
    pub key: String,
    pub artifacts: Vec<Artifact>,
}

/// What happened to one record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Rendered(RenderedRecord),
    /// No usable key; nothing was attempted
    Skipped(RecordError),
    /// Rendering or encoding failed
    Failed(RecordError),
}

impl From<std::result::Result<RenderedRecord, RecordError>> for RecordOutcome {
    fn from(result: std::result::Result<RenderedRecord, RecordError>) -> Self {
        match result {
            Ok(record) => RecordOutcome::Rendered(record),
            Err(e) if e.is_skip() => RecordOutcome::Skipped(e),
            Err(e) => RecordOutcome::Failed(e),
        }
    }
}

/// Fonts for both render modes, loaded from the same file
#[derive(Debug, Clone)]
struct Fonts {
    overlay: OverlayFont,
    document: FontData,
}

impl Fonts {
    fn bundled() -> Result<Self> {
        Ok(Self {
            overlay: OverlayFont::bundled()?,
            document: FontData::from_ttf(BUNDLED_FONT_NAME, BUNDLED_FONT)?,
        })
    }

    fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let document = FontData::from_ttf(CUSTOM_FONT_NAME, &data)
            .map_err(|e| MergeError::InvalidConfig(format!("cannot parse font: {e}")))?;
        Ok(Self {
            overlay: OverlayFont::from_bytes(data)?,
            document,
        })
    }
}

/// Renders records against one template with one configuration
///
/// Everything that can be checked up front (mode, key column, mapping) is
/// checked by [`BatchRenderer::new`]; after that, problems are per record.
pub struct BatchRenderer<'a> {
    template: &'a Template,
    config: &'a MergeConfig,
    key_column: String,
    fonts: Fonts,
    rasterizer: Option<&'a dyn PageRasterizer>,
}

impl std::fmt::Debug for BatchRenderer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRenderer")
            .field("template", &self.template.kind())
            .field("key_column", &self.key_column)
            .field("rasterizer", &self.rasterizer.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> BatchRenderer<'a> {
    /// Create a renderer
    ///
    /// # Arguments
    /// * `template` - Loaded template; must match the configured mode
    /// * `config` - Batch configuration
    /// * `records` - Records the batch will run over, used to check columns
    pub fn new(template: &'a Template, config: &'a MergeConfig, records: &RecordSet) -> Result<Self> {
        config.validate()?;
        let key_column = records.key_column(config.key_column.as_deref())?;

        match (&config.mode, template) {
            (RenderMode::Image(placement), Template::Image(_)) => {
                if let Some(column) = &placement.text_column {
                    if !records.has_column(column) {
                        return Err(MergeError::InvalidConfig(format!(
                            "text column '{column}' not found (columns: {})",
                            records.headers().join(", ")
                        )));
                    }
                }
            }
            (RenderMode::Document(document), Template::Document(form)) => {
                document
                    .mapping
                    .validate(&form.field_names(), records.headers())?;
                if document.mapping.is_empty() {
                    warn!("no fields are mapped; documents will be copies of the template");
                }
            }
            (RenderMode::Image(_), Template::Document(_)) => {
                return Err(MergeError::InvalidConfig(
                    "image mode needs a PNG or JPEG template, got a PDF".to_string(),
                ))
            }
            (RenderMode::Document(_), Template::Image(_)) => {
                return Err(MergeError::InvalidConfig(
                    "document mode needs a PDF form template, got an image".to_string(),
                ))
            }
        }

        Ok(Self {
            template,
            config,
            key_column,
            fonts: Fonts::bundled()?,
            rasterizer: None,
        })
    }

    /// Rasterizer for JPEG document output
    pub fn with_rasterizer(mut self, rasterizer: &'a dyn PageRasterizer) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Draw with this TrueType font instead of the bundled one
    pub fn with_font_bytes(mut self, data: Vec<u8>) -> Result<Self> {
        self.fonts = Fonts::from_bytes(data)?;
        Ok(self)
    }

    /// Resolved key column
    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Check that every capability the configuration needs is present
    pub fn ensure_ready(&self) -> Result<()> {
        if let RenderMode::Document(DocumentConfig {
            output: DocumentOutput::Jpeg { .. },
            ..
        }) = self.config.mode
        {
            if self.rasterizer.is_none() {
                return Err(MergeError::InvalidConfig(
                    "JPEG output needs a page rasterizer".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Render a single record
    pub fn render_one(&self, record: &Record) -> std::result::Result<RenderedRecord, RecordError> {
        let key = record.key(&self.key_column)?.to_string();
        let row = record.row();

        let artifacts = match (&self.config.mode, self.template) {
            (RenderMode::Image(placement), Template::Image(image)) => {
                let text = match &placement.text_column {
                    Some(column) => record.value(column)?.trim(),
                    None => key.as_str(),
                };
                vec![self.render_image(image, placement, row, &key, text)?]
            }
            (RenderMode::Document(document), Template::Document(form)) => {
                self.render_document(form, document, record, &key)?
            }
            _ => {
                return Err(RecordError::Render {
                    row,
                    detail: format!("template is not usable in {} mode", self.template.kind()),
                })
            }
        };

        debug!(row, key = %key, artifacts = artifacts.len(), "rendered record");
        Ok(RenderedRecord {
            row,
            key,
            artifacts,
        })
    }

    fn render_image(
        &self,
        template: &ImageTemplate,
        placement: &PlacementConfig,
        row: usize,
        key: &str,
        text: &str,
    ) -> std::result::Result<Artifact, RecordError> {
        let image = draw_overlay(template, text, placement, &self.fonts.overlay);
        let bytes = encode_jpeg(&image, placement.jpeg_quality).map_err(|e| RecordError::Encoding {
            row,
            detail: e.to_string(),
        })?;
        Ok(Artifact::new(row, key, ".jpg", bytes))
    }

    fn render_document(
        &self,
        template: &DocumentTemplate,
        document: &DocumentConfig,
        record: &Record,
        key: &str,
    ) -> std::result::Result<Vec<Artifact>, RecordError> {
        let row = record.row();
        let values = resolve_field_values(&document.mapping, record)?;
        let pdf = template
            .render(&values, &self.fonts.document, document.flatten)
            .map_err(|e| RecordError::Render {
                row,
                detail: e.to_string(),
            })?;

        match document.output {
            DocumentOutput::Pdf => Ok(vec![Artifact::new(row, key, "_filled.pdf", pdf)]),
            DocumentOutput::Jpeg { dpi, quality } => {
                let rasterizer = self.rasterizer.ok_or_else(|| RecordError::Render {
                    row,
                    detail: "no page rasterizer configured".to_string(),
                })?;
                let pages = rasterizer
                    .rasterize(&pdf, dpi)
                    .map_err(|e| RecordError::Render {
                        row,
                        detail: e.to_string(),
                    })?;

                pages
                    .iter()
                    .enumerate()
                    .map(|(i, page)| {
                        let bytes = encode_jpeg(&page.to_rgb8(), quality).map_err(|e| {
                            RecordError::Encoding {
                                row,
                                detail: format!("page {}: {e}", i + 1),
                            }
                        })?;
                        Ok(Artifact::new(row, key, format!("_page{}.jpg", i + 1), bytes))
                    })
                    .collect()
            }
        }
    }

    /// Lazily render every record in order
    pub fn render_batch<'r>(&'r self, records: &'r RecordSet) -> RenderBatch<'r, 'a> {
        RenderBatch {
            renderer: self,
            records: records.iter(),
        }
    }

    /// Render every record and package the results into a zip archive
    pub fn generate(&self, records: &RecordSet) -> Result<OutputBundle> {
        self.ensure_ready()?;
        info!(
            mode = self.template.kind(),
            records = records.len(),
            key_column = %self.key_column,
            "starting batch"
        );
        package_archive(self.render_batch(records), self.config.include_manifest)
    }

    /// Render `text` with the configured placement, without any record
    pub fn preview(&self, text: &str) -> Result<Vec<u8>> {
        match (&self.config.mode, self.template) {
            (RenderMode::Image(placement), Template::Image(image)) => {
                preview(image, text, placement, &self.fonts.overlay)
            }
            _ => Err(MergeError::InvalidConfig(
                "preview is only available in image mode".to_string(),
            )),
        }
    }
}

/// Iterator returned by [`BatchRenderer::render_batch`]
///
/// Each record is rendered when the iterator reaches it.
#[derive(Debug)]
pub struct RenderBatch<'r, 'a> {
    renderer: &'r BatchRenderer<'a>,
    records: std::slice::Iter<'r, Record>,
}

impl Iterator for RenderBatch<'_, '_> {
    type Item = RecordOutcome;

    fn next(&mut self) -> Option<RecordOutcome> {
        let record = self.records.next()?;
        Some(self.renderer.render_one(record).into())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    fn image_template() -> Template {
        Template::Image(ImageTemplate::from_image(RgbImage::from_pixel(
            120,
            60,
            Rgb([255, 255, 255]),
        )))
    }

    fn records() -> RecordSet {
        RecordSet::from_rows(
            ["Name", "Title"],
            [vec!["Alice", "Dr."], vec!["", "Mx."], vec!["Bob", ""]],
        )
    }

    #[test]
    fn test_template_from_bytes_detects_kind() {
        let mut png = Vec::new();
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(Template::from_bytes(&png).unwrap().kind(), "image");

        assert!(matches!(
            Template::from_bytes(b"%PDF-1.4\n%%EOF"),
            Err(MergeError::MalformedTemplate(_))
        ));
        assert!(matches!(
            Template::from_bytes(b""),
            Err(MergeError::MissingInput(_))
        ));
    }

    #[test]
    fn test_render_one_outcomes() {
        let template = image_template();
        let config = MergeConfig::image(PlacementConfig::default());
        let records = records();
        let renderer = BatchRenderer::new(&template, &config, &records).unwrap();

        let alice = renderer.render_one(records.get(0).unwrap()).unwrap();
        assert_eq!(alice.key, "Alice");
        assert_eq!(alice.artifacts[0].file_name(), "Alice.jpg");

        let outcome = RecordOutcome::from(renderer.render_one(records.get(1).unwrap()));
        assert!(matches!(
            outcome,
            RecordOutcome::Skipped(RecordError::EmptyKey { row: 2, .. })
        ));
    }

    #[test]
    fn test_render_batch_preserves_order() {
        let template = image_template();
        let config = MergeConfig::image(PlacementConfig::default());
        let records = records();
        let renderer = BatchRenderer::new(&template, &config, &records).unwrap();

        let rows: Vec<(usize, bool)> = renderer
            .render_batch(&records)
            .map(|o| match o {
                RecordOutcome::Rendered(r) => (r.row, true),
                RecordOutcome::Skipped(e) | RecordOutcome::Failed(e) => (e.row(), false),
            })
            .collect();
        assert_eq!(rows, vec![(1, true), (2, false), (3, true)]);
    }

    #[test]
    fn test_new_rejects_mode_mismatch_and_bad_columns() {
        let template = image_template();
        let records = records();

        let document = MergeConfig::document(DocumentConfig::default());
        assert!(matches!(
            BatchRenderer::new(&template, &document, &records),
            Err(MergeError::InvalidConfig(_))
        ));

        let bad_key = MergeConfig::image(PlacementConfig::default()).with_key_column("Email");
        assert!(matches!(
            BatchRenderer::new(&template, &bad_key, &records),
            Err(MergeError::InvalidConfig(_))
        ));

        let bad_text = MergeConfig::image(PlacementConfig {
            text_column: Some("Nickname".into()),
            ..PlacementConfig::default()
        });
        assert!(matches!(
            BatchRenderer::new(&template, &bad_text, &records),
            Err(MergeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_text_column_is_drawn_but_key_names_the_file() {
        let template = image_template();
        let config = MergeConfig::image(PlacementConfig {
            text_column: Some("Title".into()),
            ..PlacementConfig::default()
        });
        let records = records();
        let renderer = BatchRenderer::new(&template, &config, &records).unwrap();

        let bob = renderer.render_one(records.get(2).unwrap()).unwrap();
        assert_eq!(bob.artifacts[0].file_name(), "Bob.jpg");
    }

    #[test]
    fn test_preview_matches_render() {
        let template = image_template();
        let config = MergeConfig::image(PlacementConfig::default());
        let records = records();
        let renderer = BatchRenderer::new(&template, &config, &records).unwrap();

        let preview = renderer.preview("Alice").unwrap();
        let rendered = renderer.render_one(records.get(0).unwrap()).unwrap();
        assert_eq!(preview, rendered.artifacts[0].bytes);
    }

    #[test]
    fn test_list_fields_of_image_is_empty() {
        assert!(list_fields(&image_template()).is_empty());
    }

    #[test]
    fn test_custom_font_rejects_garbage() {
        let template = image_template();
        let config = MergeConfig::image(PlacementConfig::default());
        let records = records();
        let renderer = BatchRenderer::new(&template, &config, &records).unwrap();
        assert!(matches!(
            renderer.with_font_bytes(vec![1, 2, 3]),
            Err(MergeError::InvalidConfig(_))
        ));
    }
}
