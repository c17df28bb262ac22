//! WASM bindings for rsmerge
//!
//! This crate provides JavaScript-friendly API for:
//! - Image mode: live preview and bulk invitation generation
//! - Document mode: listing PDF form fields and bulk form filling
//!
//! Every generate call returns the zip archive bytes. Page rasterization is
//! not available here, so document mode always produces PDFs.
//!
//! # Example (JavaScript)
//!
//! ```javascript
//! import init, { InvitationGenerator, FormFiller } from 'rsmerge-wasm';
//!
//! await init();
//!
//! const invites = new InvitationGenerator();
//! invites.loadTemplate(pngBytes);
//! invites.loadCsv(csvBytes);
//! invites.setConfig(JSON.stringify({ mode: "image", fontSize: 48, align: "center" }));
//! const sample = invites.preview("Sample Name");   // JPEG bytes
//! const zip = invites.generate();                   // invitations.zip bytes
//!
//! const filler = new FormFiller();
//! filler.loadTemplate(pdfBytes);
//! filler.loadCsv(csvBytes);
//! console.log(filler.fieldNames());
//! const filled = filler.generate(JSON.stringify({ name: "Name", city: "--None--" }), true);
//! ```

use merge::{
    BatchRenderer, BatchReport, DocumentConfig, FieldMapping, MergeConfig, OverlayFont,
    PlacementConfig, RecordSet, RenderMode, Template,
};
use wasm_bindgen::prelude::*;

/// Column choice meaning "leave this field empty"
pub const NONE_OPTION: &str = "--None--";

// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js_strings(values: &[String]) -> Vec<JsValue> {
    values.iter().map(|s| JsValue::from_str(s)).collect()
}

fn report_to_js(report: Option<&BatchReport>) -> Result<JsValue, JsValue> {
    match report {
        Some(report) => serde_wasm_bindgen::to_value(report).map_err(js_error),
        None => Ok(JsValue::NULL),
    }
}

/// Image mode: one line of text per record drawn onto a PNG/JPEG template
#[wasm_bindgen]
pub struct InvitationGenerator {
    template: Option<Template>,
    records: Option<RecordSet>,
    config: MergeConfig,
    font: Option<Vec<u8>>,
    last_report: Option<BatchReport>,
}

#[wasm_bindgen]
impl InvitationGenerator {
    /// Create a generator with the default placement
    #[wasm_bindgen(constructor)]
    pub fn new() -> InvitationGenerator {
        InvitationGenerator {
            template: None,
            records: None,
            config: MergeConfig::image(PlacementConfig::default()),
            font: None,
            last_report: None,
        }
    }

    /// Load the image template
    ///
    /// @param data - PNG or JPEG bytes (Uint8Array)
    #[wasm_bindgen(js_name = loadTemplate)]
    pub fn load_template(&mut self, data: &[u8]) -> Result<(), JsValue> {
        match Template::from_bytes(data).map_err(js_error)? {
            template @ Template::Image(_) => {
                self.template = Some(template);
                Ok(())
            }
            Template::Document(_) => Err(js_error(
                "this is a PDF; use FormFiller for form templates",
            )),
        }
    }

    /// Load the records
    ///
    /// @param data - CSV bytes with a header row (Uint8Array)
    #[wasm_bindgen(js_name = loadCsv)]
    pub fn load_csv(&mut self, data: &[u8]) -> Result<(), JsValue> {
        self.records = Some(RecordSet::from_csv_bytes(data).map_err(js_error)?);
        Ok(())
    }

    /// Column headers of the loaded CSV
    ///
    /// @returns Array of column names
    pub fn headers(&self) -> Vec<JsValue> {
        self.records
            .as_ref()
            .map(|r| to_js_strings(r.headers()))
            .unwrap_or_default()
    }

    /// Replace the configuration
    ///
    /// @param json - MergeConfig JSON with `"mode": "image"`
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, json: &str) -> Result<(), JsValue> {
        let config = MergeConfig::from_json(json).map_err(js_error)?;
        if !matches!(config.mode, RenderMode::Image(_)) {
            return Err(js_error("InvitationGenerator needs \"mode\": \"image\""));
        }
        self.config = config;
        Ok(())
    }

    /// Draw with a custom font instead of the bundled one
    ///
    /// @param data - TTF/OTF bytes (Uint8Array)
    #[wasm_bindgen(js_name = loadFont)]
    pub fn load_font(&mut self, data: &[u8]) -> Result<(), JsValue> {
        OverlayFont::from_bytes(data.to_vec()).map_err(js_error)?;
        self.font = Some(data.to_vec());
        Ok(())
    }

    /// Render a sample text with the current placement
    ///
    /// @param text - Sample text
    /// @returns JPEG bytes (Uint8Array)
    pub fn preview(&self, text: &str) -> Result<Vec<u8>, JsValue> {
        let Some(Template::Image(template)) = &self.template else {
            return Err(js_error("Template not loaded. Call loadTemplate() first."));
        };
        let RenderMode::Image(placement) = &self.config.mode else {
            return Err(js_error("configuration is not in image mode"));
        };
        let font = match &self.font {
            Some(data) => OverlayFont::from_bytes(data.clone()),
            None => OverlayFont::bundled(),
        }
        .map_err(js_error)?;
        merge::preview(template, text, placement, &font).map_err(js_error)
    }

    /// Render every record
    ///
    /// @returns Zip archive bytes (Uint8Array)
    pub fn generate(&mut self) -> Result<Vec<u8>, JsValue> {
        let (template, records) = match (&self.template, &self.records) {
            (Some(template), Some(records)) => (template, records),
            _ => {
                return Err(js_error(
                    "Template or CSV not loaded. Call loadTemplate() and loadCsv() first.",
                ))
            }
        };

        let mut renderer = BatchRenderer::new(template, &self.config, records).map_err(js_error)?;
        if let Some(font) = &self.font {
            renderer = renderer.with_font_bytes(font.clone()).map_err(js_error)?;
        }
        let bundle = renderer.generate(records).map_err(js_error)?;
        self.last_report = Some(bundle.report);
        Ok(bundle.bytes)
    }

    /// Report of the last `generate()` call, or `null`
    ///
    /// @returns { total, rendered, entries, skipped, failed }
    #[wasm_bindgen(js_name = lastReport)]
    pub fn last_report(&self) -> Result<JsValue, JsValue> {
        report_to_js(self.last_report.as_ref())
    }
}

impl Default for InvitationGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Document mode: one filled PDF per record
#[wasm_bindgen]
pub struct FormFiller {
    template: Option<Template>,
    records: Option<RecordSet>,
    key_column: Option<String>,
    last_report: Option<BatchReport>,
}

#[wasm_bindgen]
impl FormFiller {
    #[wasm_bindgen(constructor)]
    pub fn new() -> FormFiller {
        FormFiller {
            template: None,
            records: None,
            key_column: None,
            last_report: None,
        }
    }

    /// Load the PDF form
    ///
    /// @param data - PDF bytes (Uint8Array)
    #[wasm_bindgen(js_name = loadTemplate)]
    pub fn load_template(&mut self, data: &[u8]) -> Result<(), JsValue> {
        match Template::from_bytes(data).map_err(js_error)? {
            template @ Template::Document(_) => {
                self.template = Some(template);
                Ok(())
            }
            Template::Image(_) => Err(js_error(
                "this is an image; use InvitationGenerator for image templates",
            )),
        }
    }

    /// Load the records
    ///
    /// @param data - CSV bytes with a header row (Uint8Array)
    #[wasm_bindgen(js_name = loadCsv)]
    pub fn load_csv(&mut self, data: &[u8]) -> Result<(), JsValue> {
        self.records = Some(RecordSet::from_csv_bytes(data).map_err(js_error)?);
        Ok(())
    }

    /// Column naming each output file (default: first column)
    #[wasm_bindgen(js_name = setKeyColumn)]
    pub fn set_key_column(&mut self, column: &str) {
        self.key_column = Some(column.to_string()).filter(|c| !c.trim().is_empty());
    }

    /// Column headers of the loaded CSV, preceded by `--None--`
    ///
    /// @returns Choices for a field's column selector
    #[wasm_bindgen(js_name = columnChoices)]
    pub fn column_choices(&self) -> Vec<JsValue> {
        let mut choices = vec![JsValue::from_str(NONE_OPTION)];
        if let Some(records) = &self.records {
            choices.extend(to_js_strings(records.headers()));
        }
        choices
    }

    /// Names of the form's fields, in document order
    #[wasm_bindgen(js_name = fieldNames)]
    pub fn field_names(&self) -> Vec<JsValue> {
        self.template
            .as_ref()
            .map(|t| {
                merge::list_fields(t)
                    .into_iter()
                    .map(|f| JsValue::from_str(&f.name))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Form fields with kind, current value and options
    ///
    /// @returns Array of { name, kind, value?, options? }
    pub fn fields(&self) -> Result<JsValue, JsValue> {
        let fields = self.template.as_ref().map(merge::list_fields).unwrap_or_default();
        serde_wasm_bindgen::to_value(&fields).map_err(js_error)
    }

    /// Fill the form once per record
    ///
    /// @param mappingJson - JSON object of field -> column; `--None--` or ""
    ///   leaves a field empty
    /// @param flatten - Make the filled fields static content
    /// @returns Zip archive bytes (Uint8Array)
    pub fn generate(&mut self, mapping_json: &str, flatten: bool) -> Result<Vec<u8>, JsValue> {
        let (template, records) = match (&self.template, &self.records) {
            (Some(template), Some(records)) => (template, records),
            _ => {
                return Err(js_error(
                    "Template or CSV not loaded. Call loadTemplate() and loadCsv() first.",
                ))
            }
        };

        let config = document_config(mapping_json, flatten, self.key_column.clone())
            .map_err(js_error)?;
        let bundle = BatchRenderer::new(template, &config, records)
            .and_then(|renderer| renderer.generate(records))
            .map_err(js_error)?;
        self.last_report = Some(bundle.report);
        Ok(bundle.bytes)
    }

    /// Report of the last `generate()` call, or `null`
    #[wasm_bindgen(js_name = lastReport)]
    pub fn last_report(&self) -> Result<JsValue, JsValue> {
        report_to_js(self.last_report.as_ref())
    }
}

impl Default for FormFiller {
    fn default() -> Self {
        Self::new()
    }
}

/// Document-mode config from a selector mapping
fn document_config(
    mapping_json: &str,
    flatten: bool,
    key_column: Option<String>,
) -> Result<MergeConfig, String> {
    let selected: std::collections::BTreeMap<String, String> =
        serde_json::from_str(mapping_json).map_err(|e| format!("invalid mapping JSON: {e}"))?;
    let mapping: FieldMapping = selected
        .into_iter()
        .filter(|(_, column)| !column.is_empty() && column != NONE_OPTION)
        .collect();

    let mut config = MergeConfig::document(DocumentConfig {
        mapping,
        flatten,
        ..DocumentConfig::default()
    });
    config.key_column = key_column;
    Ok(config)
}
