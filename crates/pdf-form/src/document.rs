//! Fillable PDF document wrapper

use crate::field::{acroform, collect_fields, get_deref};
use crate::text::{
    generate_field_appearance, number, parse_default_appearance, TextRenderContext, FIELD_PADDING,
};
use crate::{
    annot_flags, encode_pdf_string, flags, FieldKind, FontData, FormField, GlyphMap, PdfError,
    Result,
};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// Field name -> value to write
pub type FieldValues = HashMap<String, String>;

/// Resource name of the embedded font inside generated appearance streams
const APPEARANCE_FONT: &str = "FRsm";

/// Upper bound for auto-sized (`/DA` size 0) text
const AUTO_FONT_SIZE_MAX: f32 = 12.0;

/// Smallest size shrink-to-fit will go down to
const MIN_FONT_SIZE: f32 = 4.0;

/// Limit when walking the page tree for inherited attributes
const MAX_TREE_DEPTH: usize = 32;

/// A PDF document with an interactive form
#[derive(Debug, Clone)]
pub struct FormDocument {
    /// The underlying lopdf document
    inner: Document,
}

impl FormDocument {
    /// Open a PDF document from a file
    ///
    /// # Arguments
    /// * `path` - Path to the PDF file
    ///
    /// # Example
    /// ```ignore
    /// let doc = FormDocument::open("form.pdf")?;
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = Document::load(path).map_err(|e| PdfError::OpenError(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Open a PDF document from bytes
    ///
    /// # Arguments
    /// * `data` - PDF file bytes
    pub fn open_from_bytes(data: &[u8]) -> Result<Self> {
        let inner = Document::load_mem(data).map_err(|e| PdfError::OpenError(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Wrap an already loaded lopdf document
    pub fn from_document(inner: Document) -> Self {
        Self { inner }
    }

    /// Get the number of pages in the document
    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    /// Whether the document has an AcroForm dictionary
    pub fn has_form(&self) -> bool {
        acroform(&self.inner).is_some()
    }

    /// All terminal fields of the form, in document order
    pub fn fields(&self) -> Vec<FormField> {
        collect_fields(&self.inner)
    }

    /// Look up a field by its fully qualified name
    pub fn field(&self, name: &str) -> Option<FormField> {
        self.fields().into_iter().find(|f| f.name == name)
    }

    /// Current value of a field
    ///
    /// Returns `None` both for unknown fields and for fields without a value.
    pub fn field_value(&self, name: &str) -> Option<String> {
        self.field(name).and_then(|f| f.value)
    }

    /// Write values into the named fields
    ///
    /// Text and choice fields get a generated appearance drawn with `font`;
    /// check boxes and radio groups switch to the requested state. Every name
    /// is validated before anything is written, so a failed fill leaves the
    /// document unchanged.
    ///
    /// # Arguments
    /// * `values` - Field name -> value
    /// * `font` - Font used for the appearance streams
    pub fn fill(&mut self, values: &FieldValues, font: &FontData) -> Result<()> {
        let fields = self.fields();

        let mut unknown: Vec<&String> = values
            .keys()
            .filter(|name| !fields.iter().any(|f| &f.name == *name))
            .collect();
        unknown.sort();
        if let Some(name) = unknown.first() {
            return Err(PdfError::FieldNotFound((*name).clone()));
        }

        // Document order keeps object numbering stable between runs
        let mut plan: Vec<(&FormField, &str)> = Vec::new();
        for field in &fields {
            let Some(value) = values.get(&field.name) else {
                continue;
            };
            if check_fillable(field, value)? {
                plan.push((field, value.as_str()));
            }
        }

        let used_chars: BTreeSet<char> = plan
            .iter()
            .filter(|(field, _)| is_text_like(field.kind))
            .flat_map(|(field, value)| display_text(field, value).chars().collect::<Vec<_>>())
            .collect();
        let embedded = if plan.iter().any(|(field, _)| is_text_like(field.kind)) {
            Some(self.embed_font_object(font, &used_chars))
        } else {
            None
        };

        for (field, value) in plan {
            match (field.kind, &embedded) {
                (FieldKind::Text | FieldKind::Choice, Some((font_id, glyphs))) => {
                    self.fill_text(field, value, font, *font_id, glyphs)?
                }
                (FieldKind::Checkbox, _) => {
                    let state = checkbox_state(field, value);
                    self.set_button_state(field, &state)?
                }
                (FieldKind::Radio, _) => {
                    let state = if value.trim().is_empty() {
                        "Off".to_string()
                    } else {
                        value.to_string()
                    };
                    self.set_button_state(field, &state)?
                }
                _ => {
                    return Err(PdfError::UnsupportedField {
                        name: field.name.clone(),
                        reason: format!("{} fields cannot be filled", field.kind),
                    })
                }
            }
            tracing::trace!(field = %field.name, "filled");
        }

        self.mark_need_appearances(embedded.map(|(font_id, _)| font_id))
    }

    /// Reset fields to blank
    ///
    /// Text and choice fields lose their value and appearance; check boxes
    /// and radio groups are switched off. Unknown names and fields that
    /// cannot be filled are ignored.
    ///
    /// # Arguments
    /// * `names` - Fully qualified names of the fields to clear
    pub fn clear_fields<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        for field in self.fields() {
            if !field.kind.is_fillable() || !names.iter().any(|n| n.as_ref() == field.name) {
                continue;
            }
            match field.kind {
                FieldKind::Checkbox | FieldKind::Radio => self.set_button_state(&field, "Off")?,
                _ => {
                    let dict = self.inner.get_dictionary_mut(field.id)?;
                    let own_value = dict.remove(b"V").is_some();
                    dict.remove(b"I");
                    // A value inherited from a parent field is shadowed instead
                    if field.value.is_some() && !own_value {
                        dict.set("V", Object::string_literal(""));
                    }
                    for &widget in &field.widgets {
                        self.inner.get_dictionary_mut(widget)?.remove(b"AP");
                    }
                }
            }
            tracing::trace!(field = %field.name, "cleared");
        }
        Ok(())
    }

    /// Flatten the form into static page content
    ///
    /// Each visible widget's normal appearance is drawn into its page, then
    /// the widget annotations and the AcroForm dictionary are removed. Other
    /// annotations (links, comments) are kept.
    pub fn flatten(&mut self) -> Result<()> {
        let widget_ids: HashSet<ObjectId> = self
            .fields()
            .iter()
            .flat_map(|f| f.widgets.iter().copied())
            .collect();

        let pages = self.inner.get_pages();
        let mut next_name = 1usize;
        for page_id in pages.values().copied() {
            let annots = self.page_annotations(page_id);
            if annots.is_empty() {
                continue;
            }

            let mut kept = Vec::with_capacity(annots.len());
            let mut draws: Vec<(String, ObjectId, [f64; 6])> = Vec::new();
            for annot in annots {
                let Ok(annot_id) = annot.as_reference() else {
                    kept.push(annot);
                    continue;
                };
                let Ok(dict) = self.inner.get_dictionary(annot_id) else {
                    kept.push(annot);
                    continue;
                };
                if !widget_ids.contains(&annot_id) && !is_widget_annotation(dict) {
                    kept.push(annot);
                    continue;
                }
                if let Some((xobject_id, matrix)) = self.widget_placement(dict) {
                    draws.push((format!("RsmFlat{next_name}"), xobject_id, matrix));
                    next_name += 1;
                }
            }

            if !draws.is_empty() {
                let mut content = Vec::new();
                for (name, xobject_id, m) in &draws {
                    self.ensure_form_xobject(*xobject_id)?;
                    content.extend_from_slice(
                        format!(
                            "q\n{} {} {} {} {} {} cm\n/{} Do\nQ\n",
                            number(m[0]),
                            number(m[1]),
                            number(m[2]),
                            number(m[3]),
                            number(m[4]),
                            number(m[5]),
                            name
                        )
                        .as_bytes(),
                    );
                }
                let xobjects: Vec<(String, ObjectId)> =
                    draws.into_iter().map(|(name, id, _)| (name, id)).collect();
                self.add_xobjects_to_page_resources(page_id, &xobjects)?;
                self.append_to_content_stream(page_id, &content)?;
            }

            let page = self.inner.get_dictionary_mut(page_id)?;
            if kept.is_empty() {
                page.remove(b"Annots");
            } else {
                page.set("Annots", kept);
            }
        }

        self.inner.catalog_mut()?.remove(b"AcroForm");
        tracing::debug!(pages = pages.len(), "flattened form");
        Ok(())
    }

    /// Save the document to a file
    ///
    /// # Arguments
    /// * `path` - Output file path
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.inner.compress();
        self.inner
            .save(path)
            .map_err(|e| PdfError::SaveError(e.to_string()))?;
        Ok(())
    }

    /// Save the document to bytes
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.inner.compress();

        let mut buffer = Vec::new();
        self.inner
            .save_to(&mut buffer)
            .map_err(|e| PdfError::SaveError(e.to_string()))?;

        Ok(buffer)
    }

    /// Get a reference to the underlying lopdf document
    pub fn inner(&self) -> &Document {
        &self.inner
    }

    /// Write a text or choice value and its appearance into every widget
    fn fill_text(
        &mut self,
        field: &FormField,
        value: &str,
        font: &FontData,
        font_id: ObjectId,
        glyphs: &GlyphMap,
    ) -> Result<()> {
        self.inner
            .get_dictionary_mut(field.id)?
            .set("V", encode_pdf_string(value));

        let style = parse_default_appearance(field.default_appearance.as_deref().unwrap_or(""));
        let shown = display_text(field, value);

        for &widget in &field.widgets {
            let Some(rect) = self
                .inner
                .get_dictionary(widget)
                .ok()
                .and_then(|dict| read_rect(&self.inner, dict, b"Rect"))
            else {
                tracing::warn!(field = %field.name, ?widget, "widget has no usable /Rect");
                continue;
            };
            let width = rect[2] - rect[0];
            let height = rect[3] - rect[1];

            let font_size = resolve_font_size(style.font_size, &shown, font, width, height);
            let ctx = TextRenderContext {
                font_name: APPEARANCE_FONT.to_string(),
                font_size,
                text_width: font.text_width_points(&shown, font_size) as f64,
                color: style.color,
            };
            let baseline = baseline_offset(font, font_size, height);
            let content = generate_field_appearance(
                &glyphs.encode_text_hex(&shown),
                width,
                height,
                baseline,
                field.align,
                &ctx,
            );

            let appearance = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                    "Resources" => dictionary! {
                        "Font" => dictionary! { APPEARANCE_FONT => font_id },
                    },
                },
                content,
            );
            let appearance_id = self.inner.add_object(appearance);
            self.inner
                .get_dictionary_mut(widget)?
                .set("AP", dictionary! { "N" => appearance_id });
        }
        Ok(())
    }

    /// Set `/V` on the field and `/AS` on each widget
    ///
    /// Widgets whose appearance has no `state` entry are switched off, which
    /// selects exactly one button of a radio group.
    fn set_button_state(&mut self, field: &FormField, state: &str) -> Result<()> {
        self.inner
            .get_dictionary_mut(field.id)?
            .set("V", Object::Name(state.as_bytes().to_vec()));

        for &widget in &field.widgets {
            let shown = if self.widget_has_state(widget, state) {
                state
            } else {
                "Off"
            };
            self.inner
                .get_dictionary_mut(widget)?
                .set("AS", Object::Name(shown.as_bytes().to_vec()));
        }
        Ok(())
    }

    fn widget_has_state(&self, widget: ObjectId, state: &str) -> bool {
        self.inner
            .get_dictionary(widget)
            .ok()
            .and_then(|w| get_deref(w, b"AP", &self.inner))
            .and_then(|ap| ap.as_dict().ok())
            .and_then(|ap| get_deref(ap, b"N", &self.inner))
            .and_then(|n| n.as_dict().ok())
            .map(|n| n.has(state.as_bytes()))
            .unwrap_or(false)
    }

    /// Embed a font subset and return the Type0 font object id with the
    /// glyph ids to draw through it
    fn embed_font_object(
        &mut self,
        font: &FontData,
        used_chars: &BTreeSet<char>,
    ) -> (ObjectId, GlyphMap) {
        let font_objects = font.to_pdf_objects(used_chars);

        let font_file_id = self.inner.add_object(font_objects.font_file_stream);

        let mut font_descriptor = font_objects.font_descriptor;
        font_descriptor.set("FontFile2", Object::Reference(font_file_id));
        let font_descriptor_id = self.inner.add_object(font_descriptor);

        let mut cid_font = font_objects.cid_font;
        cid_font.set("FontDescriptor", Object::Reference(font_descriptor_id));
        let cid_font_id = self.inner.add_object(cid_font);

        let mut type0_font = font_objects.type0_font;
        type0_font.set(
            "DescendantFonts",
            Object::Array(vec![Object::Reference(cid_font_id)]),
        );

        let tounicode_id = self.inner.add_object(font_objects.tounicode_stream);
        type0_font.set("ToUnicode", Object::Reference(tounicode_id));

        (self.inner.add_object(type0_font), font_objects.glyphs)
    }

    /// Mutable access to the AcroForm dictionary, inline or referenced
    fn acroform_mut(&mut self) -> Result<&mut Dictionary> {
        let acroform = self.inner.catalog()?.get(b"AcroForm")?.clone();
        match acroform {
            Object::Reference(id) => Ok(self.inner.get_dictionary_mut(id)?),
            Object::Dictionary(_) => Ok(self
                .inner
                .catalog_mut()?
                .get_mut(b"AcroForm")?
                .as_dict_mut()?),
            _ => Err(PdfError::ParseError(
                "AcroForm is not a dictionary".to_string(),
            )),
        }
    }

    fn mark_need_appearances(&mut self, font_id: Option<ObjectId>) -> Result<()> {
        let acroform = self.acroform_mut()?;
        acroform.set("NeedAppearances", true);

        if let Some(font_id) = font_id {
            let mut resources = match acroform.get(b"DR") {
                Ok(Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            };
            let mut fonts = match resources.get(b"Font") {
                Ok(Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            };
            fonts.set(APPEARANCE_FONT, font_id);
            resources.set("Font", fonts);
            // Referenced /DR dictionaries are left alone
            if !matches!(acroform.get(b"DR"), Ok(Object::Reference(_))) {
                acroform.set("DR", resources);
            }
        }
        Ok(())
    }

    /// The page's `/Annots` entries, following an indirect array
    fn page_annotations(&self, page_id: ObjectId) -> Vec<Object> {
        self.inner
            .get_dictionary(page_id)
            .ok()
            .and_then(|page| get_deref(page, b"Annots", &self.inner))
            .and_then(|annots| annots.as_array().ok())
            .cloned()
            .unwrap_or_default()
    }

    /// Where and what to draw for a widget being flattened
    ///
    /// Returns the appearance XObject id and the matrix mapping its `/BBox`
    /// onto the widget's `/Rect`, or `None` for hidden widgets and widgets
    /// without a normal appearance.
    fn widget_placement(&self, widget: &Dictionary) -> Option<(ObjectId, [f64; 6])> {
        let flags = get_deref(widget, b"F", &self.inner)
            .and_then(|f| f.as_i64().ok())
            .unwrap_or(0);
        if flags & annot_flags::HIDDEN != 0 {
            return None;
        }

        let ap = get_deref(widget, b"AP", &self.inner)?.as_dict().ok()?;
        let normal = ap.get(b"N").ok()?;
        let xobject_id = match normal {
            Object::Reference(id) => match self.inner.get_object(*id).ok()? {
                Object::Stream(_) => *id,
                Object::Dictionary(states) => self.state_appearance(widget, states)?,
                _ => return None,
            },
            Object::Dictionary(states) => self.state_appearance(widget, states)?,
            _ => return None,
        };

        let rect = read_rect(&self.inner, widget, b"Rect")?;
        let stream = self.inner.get_object(xobject_id).ok()?.as_stream().ok()?;
        let bbox = read_rect(&self.inner, &stream.dict, b"BBox").unwrap_or([
            0.0,
            0.0,
            rect[2] - rect[0],
            rect[3] - rect[1],
        ]);

        let bbox_w = bbox[2] - bbox[0];
        let bbox_h = bbox[3] - bbox[1];
        let sx = if bbox_w.abs() > f64::EPSILON { (rect[2] - rect[0]) / bbox_w } else { 1.0 };
        let sy = if bbox_h.abs() > f64::EPSILON { (rect[3] - rect[1]) / bbox_h } else { 1.0 };

        Some((
            xobject_id,
            [sx, 0.0, 0.0, sy, rect[0] - bbox[0] * sx, rect[1] - bbox[1] * sy],
        ))
    }

    /// The appearance selected by the widget's `/AS` state
    fn state_appearance(&self, widget: &Dictionary, states: &Dictionary) -> Option<ObjectId> {
        let state = get_deref(widget, b"AS", &self.inner)?.as_name().ok()?;
        states.get(state).ok()?.as_reference().ok()
    }

    /// Form XObjects without a `/Subtype` cannot be painted with `Do`
    fn ensure_form_xobject(&mut self, id: ObjectId) -> Result<()> {
        let stream = self.inner.get_object_mut(id)?.as_stream_mut()?;
        if !stream.dict.has(b"Subtype") {
            stream.dict.set("Type", "XObject");
            stream.dict.set("Subtype", "Form");
        }
        Ok(())
    }

    /// Resources that apply to a page, including ones inherited from the page tree
    fn effective_resources(&self, page_id: ObjectId) -> Dictionary {
        let mut node_id = page_id;
        for _ in 0..MAX_TREE_DEPTH {
            let Ok(node) = self.inner.get_dictionary(node_id) else {
                break;
            };
            if let Some(resources) =
                get_deref(node, b"Resources", &self.inner).and_then(|r| r.as_dict().ok())
            {
                return resources.clone();
            }
            match node.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => node_id = parent,
                Err(_) => break,
            }
        }
        Dictionary::new()
    }

    /// Add XObjects to a page's Resources dictionary in a single operation
    ///
    /// The resulting dictionary is stored inline on the page so shared or
    /// inherited resources of other pages stay untouched.
    fn add_xobjects_to_page_resources(
        &mut self,
        page_id: ObjectId,
        xobjects: &[(String, ObjectId)],
    ) -> Result<()> {
        let mut resources = self.effective_resources(page_id);

        let mut xobject_dict = get_deref(&resources, b"XObject", &self.inner)
            .and_then(|x| x.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        for (name, id) in xobjects {
            xobject_dict.set(name.as_bytes(), Object::Reference(*id));
        }
        resources.set("XObject", xobject_dict);

        self.inner
            .get_dictionary_mut(page_id)?
            .set("Resources", resources);
        Ok(())
    }

    /// Append content to a page's content stream
    ///
    /// The existing content is wrapped in `q`/`Q` so graphics state it leaves
    /// behind does not leak into the appended operators.
    fn append_to_content_stream(&mut self, page_id: ObjectId, content: &[u8]) -> Result<()> {
        let existing = self.inner.get_page_content(page_id)?;

        let mut new_content = Vec::with_capacity(existing.len() + content.len() + 8);
        new_content.extend_from_slice(b"q\n");
        new_content.extend_from_slice(&existing);
        new_content.extend_from_slice(b"\nQ\n");
        new_content.extend_from_slice(content);

        let stream_id = self
            .inner
            .add_object(Stream::new(Dictionary::new(), new_content));
        self.inner
            .get_dictionary_mut(page_id)?
            .set("Contents", Object::Reference(stream_id));
        Ok(())
    }
}

/// Decide whether a field takes part in a fill
///
/// Returns `Ok(false)` for fields that are skipped (an empty value for a
/// field kind that cannot hold one) and an error for values that can never
/// be written.
fn check_fillable(field: &FormField, value: &str) -> Result<bool> {
    let value = value.trim();
    if !field.kind.is_fillable() {
        return if value.is_empty() {
            Ok(false)
        } else {
            Err(PdfError::UnsupportedField {
                name: field.name.clone(),
                reason: format!("{} fields cannot be filled", field.kind),
            })
        };
    }
    if field.kind == FieldKind::Radio
        && !value.is_empty()
        && !field.on_states.iter().any(|s| s == value)
    {
        return Err(PdfError::UnsupportedField {
            name: field.name.clone(),
            reason: format!(
                "'{value}' is not one of the options [{}]",
                field.on_states.join(", ")
            ),
        });
    }
    Ok(true)
}

fn is_text_like(kind: FieldKind) -> bool {
    matches!(kind, FieldKind::Text | FieldKind::Choice)
}

/// The text actually drawn for a value
fn display_text(field: &FormField, value: &str) -> String {
    if field.flags & flags::PASSWORD != 0 {
        return "*".repeat(value.chars().count());
    }
    // Appearances are single line
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Appearance state for a check box value
fn checkbox_state(field: &FormField, value: &str) -> String {
    let value = value.trim();
    if let Some(state) = field.on_states.iter().find(|s| s.as_str() == value) {
        return state.clone();
    }
    let on = matches!(
        value.to_ascii_lowercase().as_str(),
        "yes" | "true" | "on" | "1" | "x"
    );
    if on {
        field
            .on_states
            .first()
            .cloned()
            .unwrap_or_else(|| "Yes".to_string())
    } else {
        if !value.is_empty() && !matches!(value.to_ascii_lowercase().as_str(), "no" | "false" | "off" | "0") {
            tracing::warn!(field = %field.name, value, "unrecognised check box value, leaving unchecked");
        }
        "Off".to_string()
    }
}

/// Pick the font size for a field box
///
/// A size of 0 fits the box height (capped at 12pt); any size then shrinks
/// until the text fits the box width.
fn resolve_font_size(requested: f32, text: &str, font: &FontData, width: f64, height: f64) -> f32 {
    let em_height =
        (font.ascender() as f32 - font.descender() as f32) / font.units_per_em() as f32;
    let inner_height = ((height - 2.0 * FIELD_PADDING) as f32).max(1.0);
    let mut size = if requested > 0.0 {
        requested
    } else {
        (inner_height / em_height).min(AUTO_FONT_SIZE_MAX)
    };

    let inner_width = (width - 2.0 * FIELD_PADDING) as f32;
    let text_width = font.text_width_points(text, size);
    if text_width > inner_width && inner_width > 0.0 {
        size = (size * inner_width / text_width).max(MIN_FONT_SIZE);
    }
    size
}

/// Baseline that vertically centers one line of text in the box
fn baseline_offset(font: &FontData, font_size: f32, height: f64) -> f64 {
    let units = font.units_per_em() as f64;
    let ascent = font.ascender() as f64 / units * font_size as f64;
    let descent = -(font.descender() as f64) / units * font_size as f64;
    (height - (ascent + descent)) / 2.0 + descent
}

fn is_widget_annotation(dict: &Dictionary) -> bool {
    dict.get(b"Subtype")
        .and_then(Object::as_name)
        .map(|s| s == b"Widget")
        .unwrap_or(false)
}

/// Read a rectangle array and normalise it to `[llx, lly, urx, ury]`
fn read_rect(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<[f64; 4]> {
    let values = get_deref(dict, key, doc)?.as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    let mut v = [0.0f64; 4];
    for (slot, object) in v.iter_mut().zip(values) {
        let (_, object) = doc.dereference(object).ok()?;
        *slot = object.as_float().ok()? as f64;
    }
    Some([v[0].min(v[2]), v[1].min(v[3]), v[0].max(v[2]), v[1].max(v[3])])
}
