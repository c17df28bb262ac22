//! Image mode: one line of text drawn onto a raster template

use crate::{Align, MergeError, PlacementConfig, Result, BUNDLED_FONT};
use ab_glyph::{Font, FontArc, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::Path;

/// A decoded raster template
///
/// Decoded once and shared read-only by every record; each render draws on
/// its own copy.
#[derive(Debug, Clone)]
pub struct ImageTemplate {
    image: RgbImage,
}

impl ImageTemplate {
    /// Decode a PNG or JPEG template
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data)
            .map_err(|e| MergeError::MalformedTemplate(format!("cannot decode image: {e}")))?;
        Ok(Self::from_image(image.to_rgb8()))
    }

    /// Read and decode a template file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            MergeError::MissingInput(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_bytes(&data)
    }

    /// Wrap an already decoded image
    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// TrueType / OpenType font used for image mode
#[derive(Clone)]
pub struct OverlayFont {
    font: FontArc,
}

impl std::fmt::Debug for OverlayFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayFont").finish_non_exhaustive()
    }
}

impl OverlayFont {
    /// The bundled DejaVu Sans
    pub fn bundled() -> Result<Self> {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|e| MergeError::InvalidConfig(format!("bundled font is invalid: {e}")))?;
        Ok(Self { font })
    }

    /// Load a font from its file bytes
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(data)
            .map_err(|e| MergeError::InvalidConfig(format!("cannot parse font: {e}")))?;
        Ok(Self { font })
    }

    /// Pixel scale for a font size given as an em size in pixels
    ///
    /// `PxScale` measures ascent-to-descent height, so the em size is
    /// converted with the font's own metrics.
    pub fn scale(&self, font_size: u32) -> PxScale {
        let size = font_size as f32;
        let units_per_em = self.font.units_per_em().unwrap_or(1000.0);
        PxScale::from(size * self.font.height_unscaled() / units_per_em)
    }

    /// Rendered width and height of `text`, in pixels
    pub fn measure(&self, text: &str, font_size: u32) -> (u32, u32) {
        text_size(self.scale(font_size), &self.font, text)
    }
}

/// Top-left corner of the text box
///
/// `x` follows the alignment (margin from the left edge, centered, or margin
/// from the right edge) and never goes below 0. `y` is the configured
/// percentage of the template height, rounded to the nearest pixel.
///
/// # Arguments
/// * `template_size` - Template width and height in pixels
/// * `text_width` - Measured text width in pixels
/// * `config` - Placement settings
pub fn text_origin(template_size: (u32, u32), text_width: u32, config: &PlacementConfig) -> (i32, i32) {
    let (width, height) = (i64::from(template_size.0), i64::from(template_size.1));
    let text_width = i64::from(text_width);
    let margin = i64::from(config.margin);

    let x = match config.align {
        Align::Left => margin,
        Align::Center => (width - text_width).div_euclid(2),
        Align::Right => width - text_width - margin,
    };
    let y = (f64::from(config.y_percent) / 100.0 * height as f64).round() as i64;

    (clamp_i32(x.max(0)), clamp_i32(y))
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Draw `text` onto a copy of the template
pub fn draw_overlay(
    template: &ImageTemplate,
    text: &str,
    config: &PlacementConfig,
    font: &OverlayFont,
) -> RgbImage {
    let mut canvas = template.image.clone();
    let (text_width, _) = font.measure(text, config.font_size);
    let (x, y) = text_origin((canvas.width(), canvas.height()), text_width, config);

    let color = Rgb([config.color.r, config.color.g, config.color.b]);
    draw_text_mut(
        &mut canvas,
        color,
        x,
        y,
        font.scale(config.font_size),
        &font.font,
        text,
    );
    canvas
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| MergeError::Encoding(format!("JPEG encoding failed: {e}")))?;
    Ok(buffer)
}
