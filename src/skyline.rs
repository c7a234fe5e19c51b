use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::glyph::Glyph;
use crate::xml::{Coordinates, XmlWriter};

/// Some graphics hardware only takes texture dimensions on a 4 pixel
/// granularity.
pub const SIZE_STEP: u32 = 4;

/// A placement candidate inside a skyline. A default-constructed location is
/// invalid; a zero-area location is a valid placement that occupies nothing.
#[derive(Clone, Copy, Default, Debug)]
pub struct SkyLineLocation {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub wasted: u32,
    pub valid: bool,
}

impl SkyLineLocation {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            wasted: 0,
            valid: true,
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }
}

/// Single-attempt skyline packer over a fixed width and height ceiling.
/// Tracks the occupied height per column; new glyphs are seated on top of
/// the contour. The backing atlas bitmap is only allocated once a glyph is
/// actually inserted, so dry-run fitting stays cheap.
pub struct SkyLine {
    line: Vec<u32>,
    width: u32,
    max_height: u32,
    wasted: u32,
    bitmap: Option<Vec<u8>>,
}

impl SkyLine {
    pub fn new(width: u32, max_height: u32) -> Self {
        Self {
            line: vec![0; width as usize],
            width,
            max_height,
            wasted: 0,
            bitmap: None,
        }
    }

    /// Find the lowest contour position the glyph's tile fits into. Zero-area
    /// tiles fit everywhere and nowhere; they get a valid zero-area location.
    pub fn fit(&self, glyph: &Glyph) -> SkyLineLocation {
        let bitmap_w = glyph.crunched_width();
        let bitmap_h = glyph.crunched_height();

        if bitmap_w == 0 || bitmap_h == 0 {
            return SkyLineLocation::new(0, 0, 0, 0);
        }
        if bitmap_w > self.width || bitmap_h > self.max_height {
            return SkyLineLocation::invalid();
        }

        let min_h = self.line.iter().copied().min().unwrap_or(0);
        let max_h = self
            .line
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            .min(self.max_height - bitmap_h);

        for yy in min_h..=max_h {
            for col in 0..self.width {
                if self.line[col as usize] != yy {
                    continue;
                }

                // Consider placements whose rightmost column is this one.
                let start = col.saturating_sub(bitmap_w - 1);
                let end = col.min(self.width - bitmap_w);

                let mut xx = start;
                while xx <= end {
                    let mut fitting = 0u32;
                    while self.line[(xx + fitting) as usize] <= yy {
                        fitting += 1;
                        if fitting >= bitmap_w {
                            let mut location = SkyLineLocation::new(xx, yy, bitmap_w, bitmap_h);
                            location.wasted = self.wasted_space(&location);
                            return location;
                        }
                    }
                    xx += 1;
                }
            }
        }

        SkyLineLocation::invalid()
    }

    /// Raise the contour over the location's span. Every covered column must
    /// currently sit at or below the location's seat.
    pub fn allocate(&mut self, location: &SkyLineLocation) {
        let end_height = location.y + location.height;
        for ii in location.x..location.x + location.width {
            debug_assert!(location.y >= self.line[ii as usize]);
            self.line[ii as usize] = end_height;
        }
        self.wasted += location.wasted;
    }

    fn wasted_space(&self, location: &SkyLineLocation) -> u32 {
        let mut wasted = 0;
        for ii in location.x..location.x + location.width {
            wasted += location.y - self.line[ii as usize];
        }
        wasted
    }

    /// Copy a crunched tile into the atlas and write the glyph's texture
    /// coordinates. The atlas is laid out scanlines bottom to top for direct
    /// disk write, while crunched tiles run top to bottom like their
    /// rendered sources, so rows are flipped on the way in.
    fn insert(&mut self, location: &SkyLineLocation, glyph: &mut Glyph) {
        if location.width == 0 || location.height == 0 {
            return;
        }

        let Some(tile) = glyph.crunched() else {
            return;
        };
        debug_assert_eq!(glyph.crunched_width(), location.width);
        debug_assert_eq!(glyph.crunched_height(), location.height);

        let bitmap = self
            .bitmap
            .get_or_insert_with(|| vec![0u8; (self.width * self.max_height) as usize]);

        let scanline = location.width as usize;
        for ii in 0..location.height {
            let src = ((location.height - 1 - ii) * location.width) as usize;
            let dst = ((location.y + ii) * self.width + location.x) as usize;
            bitmap[dst..dst + scanline].copy_from_slice(&tile[src..src + scanline]);
        }

        let fw = self.width as f32;
        let fh = self.max_height as f32;
        let s1 = location.x as f32 / fw;
        let t1 = location.y as f32 / fh;
        let s2 = s1 + location.width as f32 / fw;
        let t2 = t1 + location.height as f32 / fh;
        glyph.set_texcoords(s1, t1, s2, t2);
    }

    /// Dry-run packing pass: fit and allocate until the first glyph that
    /// does not fit, without touching pixels. The glyph list must be sorted
    /// tallest first; the pass halts at the first miss even when smaller
    /// glyphs behind it would still fit.
    pub fn fit_count(&mut self, glyphs: &[Option<Glyph>]) -> usize {
        let mut count = 0;
        for glyph in glyphs.iter().flatten() {
            let location = self.fit(glyph);
            if !location.valid {
                break;
            }
            self.allocate(&location);
            count += 1;
        }
        count
    }

    /// Placing pass: like `fit_count`, but also blits each placed tile,
    /// stamps the page index, writes the glyph's XML record and replaces the
    /// storage entry with a placeholder for the following `trim`.
    pub fn fit_all<W: Write>(
        &mut self,
        glyphs: &mut [Option<Glyph>],
        page: u32,
        xml: &mut XmlWriter<W>,
        coordinates: Coordinates,
    ) -> Result<usize> {
        let mut count = 0;
        for slot in glyphs.iter_mut() {
            let Some(glyph) = slot.as_mut() else {
                continue;
            };

            let location = self.fit(glyph);
            if !location.valid {
                break;
            }
            self.allocate(&location);
            self.insert(&location, glyph);
            glyph.set_page(page);
            xml.write_glyph(glyph, coordinates)?;
            *slot = None;
            count += 1;
        }
        Ok(count)
    }

    /// Tallest occupied column, rounded up to the size step.
    pub fn used_height(&self) -> u32 {
        let top = self.line.iter().copied().max().unwrap_or(0);
        let remainder = top % SIZE_STEP;
        if remainder > 0 {
            top - remainder + SIZE_STEP
        } else {
            top
        }
    }

    /// Fraction of the used area covered by glyph pixels. Space wasted under
    /// placed glyphs and the open sky above every column both count against
    /// it.
    pub fn usage(&self) -> f32 {
        let used_height = self.used_height();
        if used_height == 0 {
            return 0.0;
        }

        let mut wasted = u64::from(self.wasted);
        for &column in &self.line {
            wasted += u64::from(used_height - column);
        }

        1.0 - wasted as f32 / (u64::from(self.width) * u64::from(used_height)) as f32
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let pixels = match &self.bitmap {
            Some(bitmap) => bitmap.clone(),
            None => vec![0u8; (self.width * self.max_height) as usize],
        };

        let image = image::GrayImage::from_raw(self.width, self.max_height, pixels)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "atlas buffer does not match {}x{}",
                    self.width,
                    self.max_height
                )
            })?;
        image
            .save(path)
            .with_context(|| format!("failed to write atlas png: {}", path.display()))
    }

    #[cfg(test)]
    pub(crate) fn line(&self) -> &[u32] {
        &self.line
    }

    #[cfg(test)]
    pub(crate) fn atlas_pixel(&self, x: u32, y: u32) -> u8 {
        self.bitmap
            .as_ref()
            .map_or(0, |bitmap| bitmap[(y * self.width + x) as usize])
    }
}
