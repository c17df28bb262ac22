//! Document mode: PDF form templates

use crate::{FieldMapping, MergeError, Record, RecordError, Result};
use pdf_form::{FieldValues, FontData, FormDocument, FormField, PdfError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A template field as shown to users building a mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Fully qualified field name
    pub name: String,
    /// Field kind (`text`, `checkbox`, `radio`, `choice`, ...)
    pub kind: String,
    /// Value already present in the template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Allowed values for radio groups and choice fields
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub options: Vec<String>,
}

impl From<&FormField> for FieldInfo {
    fn from(field: &FormField) -> Self {
        let options = if field.options.is_empty() {
            field.on_states.clone()
        } else {
            field.options.clone()
        };
        Self {
            name: field.name.clone(),
            kind: field.kind.to_string(),
            value: field.value.clone(),
            options,
        }
    }
}

/// Anything that can list the fillable fields of a template
pub trait TemplateFieldReader {
    /// Fields in document order
    fn field_infos(&self) -> Vec<FieldInfo>;

    /// Field names in document order
    fn field_names(&self) -> Vec<String> {
        self.field_infos().into_iter().map(|f| f.name).collect()
    }
}

impl TemplateFieldReader for FormDocument {
    fn field_infos(&self) -> Vec<FieldInfo> {
        self.fields().iter().map(FieldInfo::from).collect()
    }
}

/// A parsed PDF form template
///
/// The parsed document is never modified; every fill works on a clone.
#[derive(Debug, Clone)]
pub struct DocumentTemplate {
    form: FormDocument,
}

impl DocumentTemplate {
    /// Parse a PDF template that has at least one form field
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let form = FormDocument::open_from_bytes(data)
            .map_err(|e| MergeError::MalformedTemplate(e.to_string()))?;
        if form.fields().is_empty() {
            return Err(MergeError::MalformedTemplate(
                "document has no fillable form fields".to_string(),
            ));
        }
        Ok(Self { form })
    }

    /// Read and parse a PDF template file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            MergeError::MissingInput(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_bytes(&data)
    }

    pub fn page_count(&self) -> usize {
        self.form.page_count()
    }

    /// Fill a copy of the template and serialize it
    ///
    /// Fillable fields without a value are cleared first, so values stored in
    /// the template never leak into the output.
    ///
    /// # Arguments
    /// * `values` - Field name -> value
    /// * `font` - Font for generated appearances
    /// * `flatten` - Turn the fields into static content
    pub fn render(
        &self,
        values: &FieldValues,
        font: &FontData,
        flatten: bool,
    ) -> std::result::Result<Vec<u8>, PdfError> {
        let unmapped: Vec<String> = self
            .form
            .fields()
            .into_iter()
            .filter(|f| f.kind.is_fillable() && !values.contains_key(&f.name))
            .map(|f| f.name)
            .collect();

        let mut form = self.form.clone();
        form.clear_fields(unmapped.as_slice())?;
        form.fill(values, font)?;
        if flatten {
            form.flatten()?;
        }
        form.to_bytes()
    }
}

impl TemplateFieldReader for DocumentTemplate {
    fn field_infos(&self) -> Vec<FieldInfo> {
        self.form.field_infos()
    }
}

/// Field values for one record
///
/// Each mapped field takes its column's value. A row too short to have a
/// mapped column fails with [`RecordError::MissingValue`].
pub fn resolve_field_values(
    mapping: &FieldMapping,
    record: &Record,
) -> std::result::Result<FieldValues, RecordError> {
    mapping
        .iter()
        .map(|(field, column)| Ok((field.to_string(), record.value(column)?.to_string())))
        .collect()
}
