//! PDF page rasterization seam

use crate::Result;
use image::DynamicImage;

/// Renders every page of a PDF to an image
///
/// Document mode uses this for JPEG output. The default implementation is
/// `PdfiumRasterizer` (feature `pdfium`); hosts without a native PDF engine
/// can plug in their own.
pub trait PageRasterizer {
    /// Render all pages in order
    ///
    /// # Arguments
    /// * `pdf` - Serialized PDF document
    /// * `dpi` - Output resolution; a page of `w` points becomes
    ///   `w * dpi / 72` pixels wide
    fn rasterize(&self, pdf: &[u8], dpi: u32) -> Result<Vec<DynamicImage>>;
}

impl<T: PageRasterizer + ?Sized> PageRasterizer for &T {
    fn rasterize(&self, pdf: &[u8], dpi: u32) -> Result<Vec<DynamicImage>> {
        (**self).rasterize(pdf, dpi)
    }
}
