//! Text operators for field appearance streams

use crate::Align;

/// Padding between the field border and its text, in points
pub const FIELD_PADDING: f64 = 2.0;

/// RGB Color (values 0.0 - 1.0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    /// Create a new RGB color (values 0.0 - 1.0)
    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Create color from RGB values (0-255)
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    /// Black color
    pub fn black() -> Self {
        Self::rgb(0.0, 0.0, 0.0)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}

/// Font size and color requested by a field's default appearance (`/DA`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppearanceStyle {
    /// Font size in points; 0 means auto-size to the field
    pub font_size: f32,
    /// Text color
    pub color: Color,
}

impl Default for AppearanceStyle {
    fn default() -> Self {
        Self {
            font_size: 0.0,
            color: Color::black(),
        }
    }
}

/// Parse a default appearance string such as `/Helv 12 Tf 0 0 1 rg`
///
/// Only the size operand of `Tf` and the fill color operators (`g`, `rg`, `k`)
/// are read. The font itself is always replaced by the embedded font.
pub fn parse_default_appearance(da: &str) -> AppearanceStyle {
    let mut style = AppearanceStyle::default();
    let tokens: Vec<&str> = da.split_whitespace().collect();
    let num = |i: usize| tokens.get(i).and_then(|t| t.parse::<f32>().ok());

    for (i, token) in tokens.iter().enumerate() {
        match *token {
            "Tf" if i >= 1 => {
                if let Some(size) = num(i - 1) {
                    style.font_size = size.max(0.0);
                }
            }
            "g" if i >= 1 => {
                if let Some(gray) = num(i - 1) {
                    style.color = Color::rgb(gray, gray, gray);
                }
            }
            "rg" if i >= 3 => {
                if let (Some(r), Some(g), Some(b)) = (num(i - 3), num(i - 2), num(i - 1)) {
                    style.color = Color::rgb(r, g, b);
                }
            }
            "k" if i >= 4 => {
                if let (Some(c), Some(m), Some(y), Some(k)) =
                    (num(i - 4), num(i - 3), num(i - 2), num(i - 1))
                {
                    style.color =
                        Color::rgb((1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k));
                }
            }
            _ => {}
        }
    }

    style
}

/// Context for rendering text
pub struct TextRenderContext {
    /// PDF font resource name (e.g., "FRsm")
    pub font_name: String,
    /// Font size in points
    pub font_size: f32,
    /// Text width in points (for alignment)
    pub text_width: f64,
    /// Text color (RGB)
    pub color: Color,
}

/// Calculate the X origin of text inside a field box
///
/// # Arguments
/// * `text_width` - Width of text in points
/// * `container_width` - Width of the field box
/// * `align` - Desired alignment
pub fn calculate_x_offset(text_width: f64, container_width: f64, align: Align) -> f64 {
    let x = match align {
        Align::Left => FIELD_PADDING,
        Align::Center => (container_width - text_width) / 2.0,
        Align::Right => container_width - text_width - FIELD_PADDING,
    };
    x.max(FIELD_PADDING.min(container_width / 2.0))
}

/// Format a coordinate for a content stream (at most 3 decimals, no trailing zeros)
pub(crate) fn number(v: f64) -> String {
    let s = format!("{:.3}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Generate PDF operators for a single line of text
///
/// # Arguments
/// * `text_hex` - Hex-encoded glyph ids (e.g., "<0041004200>")
/// * `x` - X coordinate in points
/// * `y` - Baseline Y coordinate in points
/// * `ctx` - Text rendering context
pub fn generate_text_operators(text_hex: &str, x: f64, y: f64, ctx: &TextRenderContext) -> Vec<u8> {
    let mut ops = String::new();

    ops.push_str("BT\n");
    ops.push_str(&format!(
        "{} {} {} rg\n",
        number(ctx.color.r as f64),
        number(ctx.color.g as f64),
        number(ctx.color.b as f64)
    ));
    ops.push_str(&format!("/{} {} Tf\n", ctx.font_name, number(ctx.font_size as f64)));
    ops.push_str(&format!("{} {} Td\n", number(x), number(y)));
    ops.push_str(&format!("{text_hex} Tj\n"));
    ops.push_str("ET\n");

    ops.into_bytes()
}

/// Generate the complete normal appearance of a text field
///
/// The text is clipped to the padded field box and marked as variable text
/// (`/Tx BMC ... EMC`) so viewers that regenerate appearances recognise it.
///
/// # Arguments
/// * `text_hex` - Hex-encoded glyph ids
/// * `width` - Field box width
/// * `height` - Field box height
/// * `baseline` - Baseline Y inside the box
/// * `align` - Field quadding
/// * `ctx` - Text rendering context
pub fn generate_field_appearance(
    text_hex: &str,
    width: f64,
    height: f64,
    baseline: f64,
    align: Align,
    ctx: &TextRenderContext,
) -> Vec<u8> {
    let mut ops = Vec::new();
    ops.extend_from_slice(b"/Tx BMC\nq\n");
    ops.extend_from_slice(
        format!(
            "{} {} {} {} re W n\n",
            number(FIELD_PADDING / 2.0),
            number(FIELD_PADDING / 2.0),
            number((width - FIELD_PADDING).max(0.0)),
            number((height - FIELD_PADDING).max(0.0))
        )
        .as_bytes(),
    );

    let x = calculate_x_offset(ctx.text_width, width, align);
    ops.extend_from_slice(&generate_text_operators(text_hex, x, baseline, ctx));

    ops.extend_from_slice(b"Q\nEMC\n");
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(width: f64) -> TextRenderContext {
        TextRenderContext {
            font_name: "FRsm".to_string(),
            font_size: 12.0,
            text_width: width,
            color: Color::black(),
        }
    }

    #[test]
    fn test_x_offset_left() {
        assert_eq!(calculate_x_offset(100.0, 500.0, Align::Left), FIELD_PADDING);
    }

    #[test]
    fn test_x_offset_center() {
        assert_eq!(calculate_x_offset(100.0, 500.0, Align::Center), 200.0);
    }

    #[test]
    fn test_x_offset_right() {
        assert_eq!(calculate_x_offset(100.0, 500.0, Align::Right), 398.0);
    }

    #[test]
    fn test_x_offset_never_left_of_padding() {
        // Text wider than the box starts at the padding instead of going negative
        assert_eq!(calculate_x_offset(600.0, 500.0, Align::Center), FIELD_PADDING);
        assert_eq!(calculate_x_offset(600.0, 500.0, Align::Right), FIELD_PADDING);
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(number(100.0), "100");
        assert_eq!(number(12.5), "12.5");
        assert_eq!(number(1.0 / 3.0), "0.333");
        assert_eq!(number(-0.0001), "0");
    }

    #[test]
    fn test_generate_text_operators() {
        let ops = generate_text_operators("<0041>", 100.0, 700.0, &ctx(10.0));
        let ops = String::from_utf8(ops).unwrap();

        assert_eq!(ops, "BT\n0 0 0 rg\n/FRsm 12 Tf\n100 700 Td\n<0041> Tj\nET\n");
    }

    #[test]
    fn test_generate_text_operators_with_color() {
        let mut ctx = ctx(10.0);
        ctx.color = Color::rgb(1.0, 0.0, 0.0);
        let ops = String::from_utf8(generate_text_operators("<0041>", 0.0, 0.0, &ctx)).unwrap();
        assert!(ops.contains("1 0 0 rg"));
    }

    #[test]
    fn test_generate_field_appearance_clips_and_marks() {
        let ops = generate_field_appearance("<0041>", 200.0, 20.0, 6.0, Align::Center, &ctx(50.0));
        let ops = String::from_utf8(ops).unwrap();

        assert!(ops.starts_with("/Tx BMC\nq\n1 1 198 18 re W n\n"));
        assert!(ops.contains("75 6 Td"));
        assert!(ops.ends_with("Q\nEMC\n"));
    }

    #[test]
    fn test_parse_default_appearance_size_and_rgb() {
        let style = parse_default_appearance("/Helv 10 Tf 0 0 1 rg");
        assert_eq!(style.font_size, 10.0);
        assert_eq!(style.color, Color::rgb(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_parse_default_appearance_auto_and_gray() {
        let style = parse_default_appearance("0.5 g /Helv 0 Tf");
        assert_eq!(style.font_size, 0.0);
        assert_eq!(style.color, Color::rgb(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_parse_default_appearance_cmyk() {
        let style = parse_default_appearance("/Cour 9 Tf 0 0 0 1 k");
        assert_eq!(style.color, Color::black());
    }

    #[test]
    fn test_parse_default_appearance_empty() {
        assert_eq!(parse_default_appearance(""), AppearanceStyle::default());
    }
}
