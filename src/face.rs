use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::glyph::{CoverageBitmap, Glyph, GlyphMetrics};

/// One opened font, configured to rasterize at the precalculation size.
///
/// Rendering mutates no state here, but the pipeline still funnels all
/// `render` calls through the single producer thread; faces are consulted in
/// command-line order so later fonts act as fallbacks.
pub struct FontFace {
    font: fontdue::Font,
    size: u32,
    dropdown: f32,
}

impl FontFace {
    pub fn open(path: &Path, size: u32, dropdown: f32) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|e| anyhow::anyhow!("failed to read font file {}: {e}", path.display()))?;
        Self::from_bytes(bytes, size, dropdown)
            .with_context(|| format!("failed to parse font {}", path.display()))
    }

    pub fn from_bytes(bytes: Vec<u8>, size: u32, dropdown: f32) -> Result<Self> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        Ok(Self {
            font,
            size,
            dropdown,
        })
    }

    /// True iff the font maps the code point to a non-zero glyph index.
    pub fn has(&self, code: u32) -> bool {
        char::from_u32(code).is_some_and(|ch| self.font.lookup_glyph_index(ch) != 0)
    }

    /// Rasterize a code point into a coverage bitmap and wrap it in a
    /// `Glyph` ready for crunching. None if the font does not map the code
    /// point (or it is not a valid scalar value).
    pub fn render(&self, code: u32, target_size: u32) -> Option<Glyph> {
        let ch = char::from_u32(code)?;
        let index = self.font.lookup_glyph_index(ch);
        if index == 0 {
            return None;
        }

        let (metrics, buffer) = self.font.rasterize_indexed(index, self.size as f32);
        let coverage = CoverageBitmap {
            width: metrics.width as u32,
            rows: metrics.height as u32,
            buffer,
        };

        // fontdue reports pen offsets from the baseline and advances in
        // whole pixels; downstream keeps FreeType's conventions, where `top`
        // is the bitmap's upper edge and advances are 1/64ths of a pixel.
        let pen = GlyphMetrics {
            left: metrics.xmin as f32,
            top: (metrics.ymin + metrics.height as i32) as f32,
            advance_x: metrics.advance_width * 64.0,
            advance_y: metrics.advance_height * 64.0,
        };

        Some(Glyph::new(
            code,
            coverage,
            self.size,
            target_size,
            self.dropdown,
            pen,
        ))
    }
}
