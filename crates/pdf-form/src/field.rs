//! AcroForm field discovery

use crate::{flags, Align};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::HashSet;
use std::fmt;

/// The kind of an interactive form field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Checkbox,
    Radio,
    Choice,
    Signature,
    PushButton,
    Unknown,
}

impl FieldKind {
    /// Lowercase name of the kind, as shown in field listings
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Radio => "radio",
            FieldKind::Choice => "choice",
            FieldKind::Signature => "signature",
            FieldKind::PushButton => "pushbutton",
            FieldKind::Unknown => "unknown",
        }
    }

    /// Whether the filler can write a value into this kind of field
    pub fn is_fillable(&self) -> bool {
        matches!(
            self,
            FieldKind::Text | FieldKind::Checkbox | FieldKind::Radio | FieldKind::Choice
        )
    }

    fn detect(field_type: Option<&[u8]>, ff: i64) -> Self {
        match field_type {
            Some(b"Tx") => FieldKind::Text,
            Some(b"Ch") => FieldKind::Choice,
            Some(b"Sig") => FieldKind::Signature,
            Some(b"Btn") if ff & flags::PUSHBUTTON != 0 => FieldKind::PushButton,
            Some(b"Btn") if ff & flags::RADIO != 0 => FieldKind::Radio,
            Some(b"Btn") => FieldKind::Checkbox,
            _ => FieldKind::Unknown,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal form field together with its widget annotations
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    /// Fully qualified name (`parent.child`)
    pub name: String,
    /// Field kind
    pub kind: FieldKind,
    /// Current value, if any
    pub value: Option<String>,
    /// Field flags (`/Ff`), inherited from ancestors when absent
    pub flags: i64,
    /// Default appearance string (`/DA`), inherited from ancestors or the form
    pub default_appearance: Option<String>,
    /// Text alignment (`/Q`)
    pub align: Align,
    /// Appearance state names that switch a checkbox or radio button on
    pub on_states: Vec<String>,
    /// Export values of a choice field
    pub options: Vec<String>,
    pub(crate) id: ObjectId,
    pub(crate) widgets: Vec<ObjectId>,
}

impl FormField {
    /// Number of widget annotations showing this field
    pub fn widget_count(&self) -> usize {
        self.widgets.len()
    }
}

/// Attributes a field inherits from its ancestors
#[derive(Debug, Clone, Default)]
struct Inherited {
    field_type: Option<Vec<u8>>,
    flags: Option<i64>,
    default_appearance: Option<String>,
    quadding: Option<i64>,
    value: Option<Object>,
}

impl Inherited {
    fn from_acroform(acroform: &Dictionary, doc: &Document) -> Self {
        Self {
            default_appearance: get_deref(acroform, b"DA", doc)
                .and_then(|o| o.as_str().ok())
                .map(decode_pdf_string),
            quadding: get_deref(acroform, b"Q", doc).and_then(|o| o.as_i64().ok()),
            ..Self::default()
        }
    }

    fn merge(&self, node: &Dictionary, doc: &Document) -> Self {
        let mut next = self.clone();
        if let Some(ft) = get_deref(node, b"FT", doc).and_then(|o| o.as_name().ok()) {
            next.field_type = Some(ft.to_vec());
        }
        if let Some(ff) = get_deref(node, b"Ff", doc).and_then(|o| o.as_i64().ok()) {
            next.flags = Some(ff);
        }
        if let Some(da) = get_deref(node, b"DA", doc).and_then(|o| o.as_str().ok()) {
            next.default_appearance = Some(decode_pdf_string(da));
        }
        if let Some(q) = get_deref(node, b"Q", doc).and_then(|o| o.as_i64().ok()) {
            next.quadding = Some(q);
        }
        if let Some(v) = get_deref(node, b"V", doc) {
            next.value = Some(v.clone());
        }
        next
    }
}

/// Look up a key and follow references to the final object
pub(crate) fn get_deref<'a>(dict: &'a Dictionary, key: &[u8], doc: &'a Document) -> Option<&'a Object> {
    let object = dict.get(key).ok()?;
    doc.dereference(object).ok().map(|(_, object)| object)
}

/// The AcroForm dictionary of the document, if it has one
pub(crate) fn acroform(doc: &Document) -> Option<&Dictionary> {
    let catalog = doc.catalog().ok()?;
    get_deref(catalog, b"AcroForm", doc)?.as_dict().ok()
}

/// Collect every terminal field of the document's AcroForm
///
/// Documents without a form yield an empty list.
pub(crate) fn collect_fields(doc: &Document) -> Vec<FormField> {
    let Some(acroform) = acroform(doc) else {
        return Vec::new();
    };
    let roots: Vec<ObjectId> = get_deref(acroform, b"Fields", doc)
        .and_then(|o| o.as_array().ok())
        .map(|arr| arr.iter().filter_map(|o| o.as_reference().ok()).collect())
        .unwrap_or_default();

    let defaults = Inherited::from_acroform(acroform, doc);
    let mut fields = Vec::new();
    let mut visited = HashSet::new();
    for root in roots {
        walk(doc, root, None, &defaults, &mut fields, &mut visited);
    }
    fields
}

fn walk(
    doc: &Document,
    id: ObjectId,
    parent_name: Option<&str>,
    inherited: &Inherited,
    out: &mut Vec<FormField>,
    visited: &mut HashSet<ObjectId>,
) {
    if !visited.insert(id) {
        tracing::warn!(?id, "cycle in form field tree");
        return;
    }
    let Ok(node) = doc.get_dictionary(id) else {
        tracing::warn!(?id, "form field is not a dictionary");
        return;
    };

    let partial = get_deref(node, b"T", doc)
        .and_then(|o| o.as_str().ok())
        .map(decode_pdf_string);
    let name = match (parent_name, partial) {
        (Some(parent), Some(partial)) => format!("{parent}.{partial}"),
        (None, Some(partial)) => partial,
        (Some(parent), None) => parent.to_string(),
        (None, None) => String::new(),
    };
    let inherited = inherited.merge(node, doc);

    // Kids with a /T are child fields, kids without one are widgets of this field
    let mut child_fields = Vec::new();
    let mut widgets = Vec::new();
    if let Some(kids) = get_deref(node, b"Kids", doc).and_then(|o| o.as_array().ok()) {
        for kid in kids.iter().filter_map(|o| o.as_reference().ok()) {
            match doc.get_dictionary(kid) {
                Ok(kid_dict) if kid_dict.has(b"T") => child_fields.push(kid),
                Ok(_) => widgets.push(kid),
                Err(_) => tracing::warn!(?kid, "skipping unreadable form field kid"),
            }
        }
    }

    if !child_fields.is_empty() {
        for child in child_fields {
            walk(doc, child, Some(&name), &inherited, out, visited);
        }
        return;
    }

    if is_widget(node) {
        widgets.insert(0, id);
    }
    out.push(build_field(doc, id, name, &inherited, widgets));
}

fn is_widget(dict: &Dictionary) -> bool {
    dict.get(b"Subtype")
        .and_then(Object::as_name)
        .map(|s| s == b"Widget")
        .unwrap_or(false)
        || dict.has(b"Rect")
}

fn build_field(
    doc: &Document,
    id: ObjectId,
    name: String,
    inherited: &Inherited,
    widgets: Vec<ObjectId>,
) -> FormField {
    let ff = inherited.flags.unwrap_or(0);
    let kind = FieldKind::detect(inherited.field_type.as_deref(), ff);

    let on_states = if matches!(kind, FieldKind::Checkbox | FieldKind::Radio) {
        collect_on_states(doc, &widgets)
    } else {
        Vec::new()
    };

    let options = if kind == FieldKind::Choice {
        doc.get_dictionary(id)
            .ok()
            .and_then(|node| get_deref(node, b"Opt", doc))
            .and_then(|o| o.as_array().ok())
            .map(|opts| opts.iter().filter_map(|o| option_export_value(doc, o)).collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    FormField {
        name,
        kind,
        value: inherited.value.as_ref().and_then(|v| value_to_string(doc, v)),
        flags: ff,
        default_appearance: inherited.default_appearance.clone(),
        align: Align::from_quadding(inherited.quadding.unwrap_or(0)),
        on_states,
        options,
        id,
        widgets,
    }
}

/// Names of the non-`Off` states in each widget's normal appearance
fn collect_on_states(doc: &Document, widgets: &[ObjectId]) -> Vec<String> {
    let mut states: Vec<String> = Vec::new();
    for &widget in widgets {
        let Some(normal) = doc
            .get_dictionary(widget)
            .ok()
            .and_then(|w| get_deref(w, b"AP", doc))
            .and_then(|ap| ap.as_dict().ok())
            .and_then(|ap| get_deref(ap, b"N", doc))
            .and_then(|n| n.as_dict().ok())
        else {
            continue;
        };
        for (key, _) in normal.iter() {
            let state = String::from_utf8_lossy(key).into_owned();
            if state != "Off" && !states.contains(&state) {
                states.push(state);
            }
        }
    }
    states
}

fn option_export_value(doc: &Document, opt: &Object) -> Option<String> {
    let (_, opt) = doc.dereference(opt).ok()?;
    match opt {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Array(pair) => pair
            .first()
            .and_then(|o| o.as_str().ok())
            .map(decode_pdf_string),
        _ => None,
    }
}

fn value_to_string(doc: &Document, value: &Object) -> Option<String> {
    let (_, value) = doc.dereference(value).ok()?;
    match value {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|o| o.as_str().ok())
                .map(decode_pdf_string)
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

/// Decode a PDF text string
///
/// Handles UTF-16BE and UTF-8 strings marked with a byte order mark; anything
/// else is read as PDFDocEncoding, approximated by Latin-1.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode text as a PDF text string
///
/// ASCII text is written as a literal string; anything else as UTF-16BE with
/// a byte order mark.
pub fn encode_pdf_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_pdf_string(b"Alice"), "Alice");
        assert_eq!(decode_pdf_string(&[0x43, 0x61, 0x66, 0xE9]), "Café");
    }

    #[test]
    fn test_decode_utf16() {
        let bytes = [0xFE, 0xFF, 0x00, 0x4A, 0x00, 0xF6];
        assert_eq!(decode_pdf_string(&bytes), "Jö");
    }

    #[test]
    fn test_decode_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("Zoë".as_bytes());
        assert_eq!(decode_pdf_string(&bytes), "Zoë");
    }

    #[test]
    fn test_encode_ascii_is_literal() {
        assert_eq!(encode_pdf_string("Bob"), Object::string_literal("Bob"));
    }

    #[test]
    fn test_encode_non_ascii_round_trip() {
        let encoded = encode_pdf_string("Ñandú");
        let bytes = encoded.as_str().unwrap();
        assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
        assert_eq!(decode_pdf_string(bytes), "Ñandú");
    }

    #[test]
    fn test_field_kind_detection() {
        assert_eq!(FieldKind::detect(Some(b"Tx"), 0), FieldKind::Text);
        assert_eq!(FieldKind::detect(Some(b"Btn"), 0), FieldKind::Checkbox);
        assert_eq!(FieldKind::detect(Some(b"Btn"), flags::RADIO), FieldKind::Radio);
        assert_eq!(
            FieldKind::detect(Some(b"Btn"), flags::PUSHBUTTON),
            FieldKind::PushButton
        );
        assert_eq!(FieldKind::detect(Some(b"Sig"), 0), FieldKind::Signature);
        assert_eq!(FieldKind::detect(None, 0), FieldKind::Unknown);
    }

    #[test]
    fn test_collect_fields_hierarchy() {
        let mut doc = Document::with_version("1.7");
        let child = doc.add_object(dictionary! {
            "T" => Object::string_literal("first"),
            "Subtype" => "Widget",
            "Rect" => vec![0.into(), 0.into(), 100.into(), 20.into()],
        });
        let parent = doc.add_object(dictionary! {
            "T" => Object::string_literal("name"),
            "FT" => "Tx",
            "Q" => 1,
            "Kids" => vec![child.into()],
        });
        let acroform = doc.add_object(dictionary! {
            "Fields" => vec![parent.into()],
            "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
        });
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "AcroForm" => acroform,
        });
        doc.trailer.set("Root", catalog);

        let fields = collect_fields(&doc);
        assert_eq!(fields.len(), 1);
        let field = &fields[0];
        assert_eq!(field.name, "name.first");
        assert_eq!(field.kind, FieldKind::Text);
        assert_eq!(field.align, Align::Center);
        assert_eq!(field.default_appearance.as_deref(), Some("/Helv 0 Tf 0 g"));
        assert_eq!(field.widgets, vec![child]);
    }

    #[test]
    fn test_collect_fields_without_acroform() {
        let mut doc = Document::with_version("1.7");
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", catalog);
        assert!(collect_fields(&doc).is_empty());
    }
}
