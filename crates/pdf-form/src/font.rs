//! Font handling for generated field appearances

use crate::{PdfError, Result};
use lopdf::{Dictionary, Object, Stream};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use subsetter::GlyphRemapper;

/// TrueType font used to draw field values
///
/// The raw font bytes are shared, so cloning a `FontData` for every filled
/// document is cheap.
#[derive(Debug, Clone)]
pub struct FontData {
    /// Font name, used as the PDF `/BaseFont`
    pub name: String,
    /// Raw TTF data
    ttf_data: Arc<[u8]>,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
}

/// Glyph ids of an embedded font subset, keyed by character
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlyphMap(BTreeMap<char, u16>);

impl GlyphMap {
    /// Glyph id of a character inside the subset
    pub fn get(&self, c: char) -> Option<u16> {
        self.0.get(&c).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode text as hex string for the PDF Tj operator (Identity-H)
    ///
    /// Characters outside the subset are drawn as glyph 0.
    pub fn encode_text_hex(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len() * 4 + 2);
        result.push('<');
        for c in text.chars() {
            let gid = self.get(c).unwrap_or(0);
            result.push_str(&format!("{gid:04X}"));
        }
        result.push('>');
        result
    }
}

/// PDF objects generated for font embedding
pub struct FontObjects {
    /// Type0 font dictionary
    pub type0_font: Dictionary,
    /// CIDFont Type2 dictionary
    pub cid_font: Dictionary,
    /// Font descriptor dictionary
    pub font_descriptor: Dictionary,
    /// Font file stream (TTF data)
    pub font_file_stream: Stream,
    /// ToUnicode CMap stream
    pub tounicode_stream: Stream,
    /// Glyph ids to encode text with
    pub glyphs: GlyphMap,
}

impl FontData {
    /// Create font data from TTF bytes
    ///
    /// # Arguments
    /// * `name` - Font name (must not contain whitespace)
    /// * `ttf_data` - TrueType font file bytes
    pub fn from_ttf(name: &str, ttf_data: &[u8]) -> Result<Self> {
        let face = ttf_parser::Face::parse(ttf_data, 0)
            .map_err(|e| PdfError::FontParseError(format!("{e:?}")))?;

        Ok(Self {
            name: name.replace(char::is_whitespace, ""),
            units_per_em: face.units_per_em(),
            ascender: face.ascender(),
            descender: face.descender(),
            ttf_data: Arc::from(ttf_data),
        })
    }

    /// Parse the font face on demand
    ///
    /// The face borrows from `ttf_data`, so it is not stored in the struct.
    fn face(&self) -> Option<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.ttf_data, 0).ok()
    }

    /// Get glyph ID for a character
    pub fn glyph_id(&self, c: char) -> Option<u16> {
        self.face()
            .and_then(|face| face.glyph_index(c))
            .map(|id| id.0)
    }

    /// Check if font has a glyph for the given character
    pub fn has_glyph(&self, c: char) -> bool {
        self.glyph_id(c).map(|id| id != 0).unwrap_or(false)
    }

    /// Get font units per em
    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    /// Get font ascender (font units)
    pub fn ascender(&self) -> i16 {
        self.ascender
    }

    /// Get font descender (font units, negative below the baseline)
    pub fn descender(&self) -> i16 {
        self.descender
    }

    /// Calculate text width in font units
    pub fn text_width(&self, text: &str) -> u32 {
        let Some(face) = self.face() else {
            return 0;
        };

        text.chars()
            .filter_map(|c| face.glyph_index(c))
            .filter_map(|id| face.glyph_hor_advance(id))
            .map(u32::from)
            .sum()
    }

    /// Calculate text width in points for a given font size
    pub fn text_width_points(&self, text: &str, font_size: f32) -> f32 {
        let width = self.text_width(text);
        (width as f32 / self.units_per_em as f32) * font_size
    }

    /// Subset the font down to the glyphs of `used_chars`
    ///
    /// Glyphs are renumbered in character order, so the same characters
    /// always give the same subset. If the font cannot be subset it is
    /// embedded whole with its original glyph ids.
    pub fn subset(&self, used_chars: &BTreeSet<char>) -> (Vec<u8>, GlyphMap) {
        let Some(face) = self.face() else {
            return (self.ttf_data.to_vec(), GlyphMap::default());
        };
        let original: BTreeMap<char, u16> = used_chars
            .iter()
            .filter_map(|&c| Some((c, face.glyph_index(c)?.0)))
            .collect();

        let mut remapper = GlyphRemapper::new();
        let remapped = original
            .iter()
            .map(|(&c, &gid)| (c, remapper.remap(gid)))
            .collect();

        match subsetter::subset(&self.ttf_data, 0, &remapper) {
            Ok(data) => (data, GlyphMap(remapped)),
            Err(e) => {
                tracing::warn!(font = %self.name, error = ?e, "font subsetting failed, embedding the whole font");
                (self.ttf_data.to_vec(), GlyphMap(original))
            }
        }
    }

    /// Generate all PDF objects needed to embed this font
    ///
    /// The font program is subset to `used_chars`; text drawn with it must
    /// be encoded through the returned [`GlyphMap`]. References between the
    /// objects are placeholders; the document fills them in when it adds the
    /// objects.
    ///
    /// # Arguments
    /// * `used_chars` - Characters drawn with this font (drives the subset, /W and ToUnicode)
    pub fn to_pdf_objects(&self, used_chars: &BTreeSet<char>) -> FontObjects {
        let font_name = Object::Name(self.name.clone().into_bytes());
        let (font_program, glyphs) = self.subset(used_chars);

        let tounicode_content = generate_tounicode_cmap(&glyphs);
        let tounicode_stream = Stream::new(Dictionary::new(), tounicode_content.into_bytes());

        let font_file_stream = Stream::new(
            Dictionary::from_iter(vec![("Length1", (font_program.len() as i64).into())]),
            font_program,
        );

        // Metrics in the descriptor are expressed in 1/1000 em
        let scale = 1000.0 / self.units_per_em as f32;
        let ascent = (self.ascender as f32 * scale).round() as i64;
        let descent = (self.descender as f32 * scale).round() as i64;

        let font_descriptor = Dictionary::from_iter(vec![
            ("Type", "FontDescriptor".into()),
            ("FontName", font_name.clone()),
            ("Flags", 32.into()), // Nonsymbolic
            (
                "FontBBox",
                vec![0.into(), descent.into(), 1000.into(), ascent.into()].into(),
            ),
            ("ItalicAngle", 0.into()),
            ("Ascent", ascent.into()),
            ("Descent", descent.into()),
            ("CapHeight", ascent.into()),
            ("StemV", 80.into()),
            ("FontFile2", Object::Reference((0, 0))),
        ]);

        let cid_system_info = Dictionary::from_iter(vec![
            ("Registry", Object::string_literal("Adobe")),
            ("Ordering", Object::string_literal("Identity")),
            ("Supplement", 0.into()),
        ]);

        let cid_font = Dictionary::from_iter(vec![
            ("Type", "Font".into()),
            ("Subtype", "CIDFontType2".into()),
            ("BaseFont", font_name.clone()),
            ("CIDSystemInfo", cid_system_info.into()),
            ("FontDescriptor", Object::Reference((0, 0))),
            ("CIDToGIDMap", "Identity".into()),
            ("W", self.generate_widths_array(&glyphs).into()),
            ("DW", 1000.into()),
        ]);

        let type0_font = Dictionary::from_iter(vec![
            ("Type", "Font".into()),
            ("Subtype", "Type0".into()),
            ("BaseFont", font_name),
            ("Encoding", "Identity-H".into()),
            ("DescendantFonts", vec![Object::Reference((0, 0))].into()),
            ("ToUnicode", Object::Reference((0, 0))),
        ]);

        FontObjects {
            type0_font,
            cid_font,
            font_descriptor,
            font_file_stream,
            tounicode_stream,
            glyphs,
        }
    }

    /// Generate /W array for glyph widths: `[gid1 [w1] gid2 [w2] ...]`
    ///
    /// Glyph ids are the subset ids; advances come from the full font.
    fn generate_widths_array(&self, glyphs: &GlyphMap) -> Vec<Object> {
        let Some(face) = self.face() else {
            return Vec::new();
        };

        let scale = 1000.0 / self.units_per_em as f32;
        let mut advances: BTreeMap<u16, u16> = BTreeMap::new();
        for (&c, &gid) in &glyphs.0 {
            let advance = face
                .glyph_index(c)
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(self.units_per_em);
            advances.entry(gid).or_insert(advance);
        }

        let mut widths = Vec::with_capacity(advances.len() * 2);
        for (gid, advance) in advances {
            widths.push(i64::from(gid).into());
            widths.push(vec![((advance as f32 * scale).round() as i64).into()].into());
        }
        widths
    }
}

/// Generate ToUnicode CMap stream content
fn generate_tounicode_cmap(glyphs: &GlyphMap) -> String {
    let mut cmap = String::new();

    cmap.push_str("/CIDInit /ProcSet findresource begin\n");
    cmap.push_str("12 dict begin\n");
    cmap.push_str("begincmap\n");
    cmap.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    cmap.push_str("/CMapName /Adobe-Identity-UCS def\n");
    cmap.push_str("/CMapType 2 def\n");
    cmap.push_str("1 begincodespacerange\n");
    cmap.push_str("<0000> <FFFF>\n");
    cmap.push_str("endcodespacerange\n");

    // One character per glyph; glyph 0 has no text
    let mut mappings: BTreeMap<u16, char> = BTreeMap::new();
    for (&c, &gid) in &glyphs.0 {
        if gid != 0 {
            mappings.entry(gid).or_insert(c);
        }
    }
    let mappings: Vec<(u16, char)> = mappings.into_iter().collect();

    // bfchar sections are limited to 100 entries
    for chunk in mappings.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, c) in chunk {
            let mut utf16 = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut utf16)
                .iter()
                .map(|unit| format!("{unit:04X}"))
                .collect();
            cmap.push_str(&format!("<{gid:04X}> <{hex}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\n");
    cmap.push_str("CMapName currentdict /CMap defineresource pop\n");
    cmap.push_str("end\n");
    cmap.push_str("end\n");

    cmap
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEJAVU: &[u8] = include_bytes!("../../../fonts/DejaVuSans.ttf");

    fn font() -> FontData {
        FontData::from_ttf("DejaVu Sans", DEJAVU).unwrap()
    }

    #[test]
    fn test_from_ttf_strips_whitespace_from_name() {
        assert_eq!(font().name, "DejaVuSans");
    }

    #[test]
    fn test_from_ttf_rejects_garbage() {
        let result = FontData::from_ttf("broken", &[0u8; 100]);
        assert!(matches!(result, Err(PdfError::FontParseError(_))));
    }

    #[test]
    fn test_glyph_lookup() {
        let font = font();
        assert!(font.has_glyph('A'));
        assert!(font.has_glyph('é'));
        assert_ne!(font.glyph_id('A'), font.glyph_id('B'));
    }

    #[test]
    fn test_text_width_points_scales_with_size() {
        let font = font();
        let w12 = font.text_width_points("Hello", 12.0);
        let w24 = font.text_width_points("Hello", 24.0);
        assert!(w12 > 0.0);
        assert!((w24 - 2.0 * w12).abs() < 0.001);
    }

    #[test]
    fn test_text_width_empty() {
        assert_eq!(font().text_width(""), 0);
    }

    #[test]
    fn test_subset_renumbers_glyphs() {
        let font = font();
        let used: BTreeSet<char> = "Al".chars().collect();
        let (program, glyphs) = font.subset(&used);

        assert!(program.len() < DEJAVU.len() / 10, "subset is {} bytes", program.len());
        ttf_parser::Face::parse(&program, 0).unwrap();
        // .notdef keeps id 0, then characters in order
        assert_eq!(glyphs.get('A'), Some(1));
        assert_eq!(glyphs.get('l'), Some(2));
        assert_eq!(glyphs.get('x'), None);
    }

    #[test]
    fn test_glyph_map_encode_text_hex() {
        let used: BTreeSet<char> = "AB".chars().collect();
        let (_, glyphs) = font().subset(&used);

        assert_eq!(glyphs.encode_text_hex(""), "<>");
        assert_eq!(glyphs.encode_text_hex("AB"), "<00010002>");
        // Unknown characters fall back to .notdef
        assert_eq!(glyphs.encode_text_hex("Z"), "<0000>");
    }

    #[test]
    fn test_to_pdf_objects() {
        let font = font();
        let used: BTreeSet<char> = "Hello".chars().collect();
        let objects = font.to_pdf_objects(&used);

        assert_eq!(
            objects.type0_font.get(b"Encoding").unwrap().as_name_str().unwrap(),
            "Identity-H"
        );
        // H, e, l, o -> four [gid [width]] pairs
        let widths = objects.cid_font.get(b"W").unwrap().as_array().unwrap();
        assert_eq!(widths.len(), 8);
        assert_eq!(objects.glyphs.len(), 4);
        assert!(!objects.font_file_stream.content.is_empty());
        assert!(objects.font_file_stream.content.len() < DEJAVU.len() / 10);
    }

    #[test]
    fn test_tounicode_cmap() {
        let used: BTreeSet<char> = "A".chars().collect();
        let (_, glyphs) = font().subset(&used);
        let cmap = generate_tounicode_cmap(&glyphs);

        assert!(cmap.contains("begincmap"));
        assert!(cmap.contains("<0001> <0041>"));
        assert!(cmap.contains("endcmap"));
    }

    #[test]
    fn test_tounicode_cmap_empty() {
        let cmap = generate_tounicode_cmap(&GlyphMap::default());
        assert!(cmap.contains("/CIDInit"));
        assert!(!cmap.contains("beginbfchar"));
    }
}
