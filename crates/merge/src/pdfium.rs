//! Page rasterization backed by the Pdfium library

use crate::{MergeError, PageRasterizer, Result};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable pointing at a directory or file containing libpdfium
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// [`PageRasterizer`] using a dynamically loaded Pdfium
pub struct PdfiumRasterizer {
    pdfium: Pdfium,
}

impl std::fmt::Debug for PdfiumRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumRasterizer").finish_non_exhaustive()
    }
}

impl PdfiumRasterizer {
    /// Bind to libpdfium
    ///
    /// Searches `$PDFIUM_LIB_PATH`, then the current directory, then the
    /// system library paths.
    pub fn new() -> Result<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(value) = std::env::var_os(PDFIUM_LIB_PATH_ENV) {
            let path = PathBuf::from(value);
            if path.is_dir() {
                candidates.push(Pdfium::pdfium_platform_library_name_at_path(&path));
            } else {
                candidates.push(path);
            }
        }
        candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

        let bindings = match candidates
            .iter()
            .find_map(|path| Pdfium::bind_to_library(path).ok())
        {
            Some(bindings) => bindings,
            None => Pdfium::bind_to_system_library().map_err(|e| {
                MergeError::Raster(format!(
                    "cannot load the Pdfium library (set {PDFIUM_LIB_PATH_ENV}): {e}"
                ))
            })?,
        };
        debug!("bound Pdfium library");

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// Bind to a specific libpdfium file
    pub fn from_library<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bindings = Pdfium::bind_to_library(path.as_ref()).map_err(|e| {
            MergeError::Raster(format!(
                "cannot load Pdfium from {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &[u8], dpi: u32) -> Result<Vec<DynamicImage>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| MergeError::Raster(format!("cannot open filled PDF: {e:?}")))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

        let mut images = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                MergeError::Raster(format!("page {}: {e:?}", index + 1))
            })?;
            let image = bitmap.as_image();
            debug!(
                page = index + 1,
                width = image.width(),
                height = image.height(),
                "rendered page"
            );
            images.push(image);
        }
        Ok(images)
    }
}
