use std::fmt;

/// Grayscale coverage bitmap rasterized at the precalculation size.
/// A byte of 128 or more counts as inside the glyph outline.
pub struct CoverageBitmap {
    pub width: u32,
    pub rows: u32,
    pub buffer: Vec<u8>,
}

fn coverage_inside(bitmap: &CoverageBitmap, px: i32, py: i32) -> bool {
    if px < 0 || py < 0 {
        return false;
    }

    let (ux, uy) = (px as u32, py as u32);
    if ux >= bitmap.width || uy >= bitmap.rows {
        return false;
    }

    bitmap.buffer[(uy * bitmap.width + ux) as usize] > 127
}

/// Signed-distance-field byte for one source pixel: scan the surrounding
/// diamond-capped window for the nearest pixel of opposite polarity
/// (Manhattan distance) and map the distance so the outline sits at 128.
fn distance_field_value(
    bitmap: &CoverageBitmap,
    px: i32,
    py: i32,
    search: i32,
    dist_scale: f32,
) -> u8 {
    let inside = coverage_inside(bitmap, px, py);
    let mut closest = f32::MAX;

    for ii in (px - search)..=(px + search) {
        for jj in (py - search)..=(py + search) {
            let dist = ((ii - px).abs() + (jj - py).abs()) as f32;
            if dist < closest && coverage_inside(bitmap, ii, jj) != inside {
                closest = dist;
            }
        }
    }

    let value = if inside {
        (0.5 + (closest + 0.5) * dist_scale).min(1.0)
    } else {
        (0.5 - (closest + 0.5) * dist_scale).max(0.0)
    };

    (value * 255.0).round() as u8
}

/// Pen metrics of a rasterized glyph: pixel offsets of the bitmap's top
/// left corner from the pen position, advances in 1/64 pixel units.
#[derive(Clone, Copy, Default)]
pub struct GlyphMetrics {
    pub left: f32,
    pub top: f32,
    pub advance_x: f32,
    pub advance_y: f32,
}

/// One rendered glyph: the transient coverage bitmap until `crunch` runs,
/// the cropped SDF tile and normalized metrics afterwards.
pub struct Glyph {
    code: u32,
    coverage: Option<CoverageBitmap>,
    crunched: Option<Vec<u8>>,
    size: u32,
    target_size: u32,
    dropdown: f32,
    width: f32,
    height: f32,
    left: f32,
    top: f32,
    advance_x: f32,
    advance_y: f32,
    bitmap_w: u32,
    bitmap_h: u32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    s1: f32,
    t1: f32,
    s2: f32,
    t2: f32,
    page: u32,
}

impl Glyph {
    /// Wrap a freshly rasterized coverage bitmap.
    pub fn new(
        code: u32,
        coverage: CoverageBitmap,
        size: u32,
        target_size: u32,
        dropdown: f32,
        metrics: GlyphMetrics,
    ) -> Self {
        let extent = target_size * 2 + 1;

        Self {
            code,
            width: coverage.width as f32,
            height: coverage.rows as f32,
            coverage: Some(coverage),
            crunched: None,
            size,
            target_size,
            dropdown,
            left: metrics.left,
            top: metrics.top,
            advance_x: metrics.advance_x,
            advance_y: metrics.advance_y,
            bitmap_w: extent,
            bitmap_h: extent,
            x1: 0.0,
            y1: 0.0,
            x2: 0.0,
            y2: 0.0,
            s1: 0.0,
            t1: 0.0,
            s2: 0.0,
            t2: 0.0,
            page: 0,
        }
    }

    /// Collapse the coverage bitmap into the cropped SDF tile.
    ///
    /// The tile is sampled outward from its center one edge row or column
    /// at a time. An edge stops growing once an expansion writes only zero
    /// samples; a non-zero sample landing on the first or last cell of an
    /// edge re-opens the perpendicular edges. Expansion always proceeds far
    /// enough to cover the coverage bitmap, and never past the tile
    /// boundary.
    pub fn crunch(&mut self) {
        let Some(coverage) = self.coverage.take() else {
            return;
        };

        let fsize = self.size as f32;
        let ftarget = self.target_size as f32;
        let dist_scale = 0.5 / (fsize * self.dropdown);
        let step = fsize / ftarget;
        let pixel_scale = 1.0 / ftarget;
        let search = (fsize * self.dropdown).ceil() as i32;
        let ox = (coverage.width / 2) as i32;
        let oy = (coverage.rows / 2) as i32;
        let target = self.target_size;
        let tile_w = self.bitmap_w;
        let horiz_expand = (((ox as f32) / step).ceil() as u32).min(target);
        let vert_expand = (((oy as f32) / step).ceil() as u32).min(target);

        let mut left =
            (self.left + ox as f32) / fsize - (self.bitmap_w as f32) * 0.5 / ftarget;
        let mut top =
            (self.top - oy as f32) / fsize + (self.bitmap_h as f32) * 0.5 / ftarget;

        // Tile cell (tx, ty) samples the source at
        // (ox + round((tx - target) * step), oy + round((ty - target) * step)).
        let sample = |dx: i32, dy: i32| -> u8 {
            distance_field_value(
                &coverage,
                ((dx as f32) * step).round() as i32 + ox,
                ((dy as f32) * step).round() as i32 + oy,
                search,
                dist_scale,
            )
        };

        let mut tile = vec![0u8; (self.bitmap_w * self.bitmap_h) as usize];
        tile[(target * tile_w + target) as usize] = sample(0, 0);

        let mut grown_down = 0u32;
        let mut grown_left = 0u32;
        let mut grown_right = 0u32;
        let mut grown_up = 0u32;
        let mut scope_horiz = 1u32;
        let mut scope_vert = 1u32;
        let mut down_done = false;
        let mut left_done = false;
        let mut right_done = false;
        let mut up_done = false;
        let mut expansion = 0u32;

        loop {
            let mut done = true;

            if grown_down < target && (!down_done || expansion < vert_expand) {
                down_done = true;
                grown_down += 1;
                scope_vert += 1;

                let ty = target + grown_down;
                for ii in 0..scope_horiz {
                    let value = sample(ii as i32 - grown_left as i32, grown_down as i32);
                    if value > 0 {
                        if ii == 0 {
                            left_done = false;
                        } else if ii + 1 >= scope_horiz {
                            right_done = false;
                        }
                        down_done = false;
                        done = false;
                    }
                    tile[(ty * tile_w + target - grown_left + ii) as usize] = value;
                }
            }
            if grown_left < target && (!left_done || expansion < horiz_expand) {
                left_done = true;
                grown_left += 1;
                scope_horiz += 1;

                let tx = target - grown_left;
                for ii in 0..scope_vert {
                    let value = sample(-(grown_left as i32), ii as i32 - grown_up as i32);
                    if value > 0 {
                        if ii == 0 {
                            up_done = false;
                        } else if ii + 1 >= scope_vert {
                            down_done = false;
                        }
                        left_done = false;
                        done = false;
                    }
                    tile[((target - grown_up + ii) * tile_w + tx) as usize] = value;
                }
            }
            if grown_right < target && (!right_done || expansion < horiz_expand) {
                right_done = true;
                grown_right += 1;
                scope_horiz += 1;

                let tx = target + grown_right;
                for ii in 0..scope_vert {
                    let value = sample(grown_right as i32, ii as i32 - grown_up as i32);
                    if value > 0 {
                        if ii == 0 {
                            up_done = false;
                        } else if ii + 1 >= scope_vert {
                            down_done = false;
                        }
                        right_done = false;
                        done = false;
                    }
                    tile[((target - grown_up + ii) * tile_w + tx) as usize] = value;
                }
            }
            if grown_up < target && (!up_done || expansion < vert_expand) {
                up_done = true;
                grown_up += 1;
                scope_vert += 1;

                let ty = target - grown_up;
                for ii in 0..scope_horiz {
                    let value = sample(ii as i32 - grown_left as i32, -(grown_up as i32));
                    if value > 0 {
                        if ii == 0 {
                            left_done = false;
                        } else if ii + 1 >= scope_horiz {
                            right_done = false;
                        }
                        up_done = false;
                        done = false;
                    }
                    tile[(ty * tile_w + target - grown_left + ii) as usize] = value;
                }
            }

            expansion += 1;
            if expansion >= horiz_expand && expansion >= vert_expand && done {
                break;
            }
        }

        self.crunched = Some(tile);

        // Absolute metrics in units of the font size.
        self.width /= fsize;
        self.height /= fsize;
        self.left /= fsize;
        self.top /= fsize;

        // Advances arrive as 1/64ths of a pixel.
        self.advance_x /= fsize * 64.0;
        self.advance_y /= fsize * 64.0;

        // Cropping the leading edges shifts the quad corners by one
        // tile-space pixel per removed row or column.
        left += self.contract_left() as f32 * pixel_scale;
        top -= self.contract_up() as f32 * pixel_scale;

        self.contract_right();
        self.contract_down();

        let fwidth = self.bitmap_w as f32 / ftarget;
        let fheight = self.bitmap_h as f32 / ftarget;

        self.x1 = left;
        self.y1 = top - fheight;
        self.x2 = left + fwidth;
        self.y2 = top;
    }

    fn contract_down(&mut self) -> u32 {
        let mut empty_rows = 0;
        for ii in 0..self.bitmap_h {
            if !self.is_empty_row(self.bitmap_h - ii - 1) {
                break;
            }
            empty_rows += 1;
        }

        if empty_rows >= self.bitmap_h {
            self.collapse();
            return empty_rows;
        }
        if empty_rows > 1 {
            self.sub_crunched(0, 0, self.bitmap_w, self.bitmap_h - empty_rows + 1);
            return empty_rows - 1;
        }
        0
    }

    fn contract_left(&mut self) -> u32 {
        let mut empty_columns = 0;
        for ii in 0..self.bitmap_w {
            if !self.is_empty_column(ii) {
                break;
            }
            empty_columns += 1;
        }

        if empty_columns >= self.bitmap_w {
            self.collapse();
            return empty_columns;
        }
        if empty_columns > 1 {
            self.sub_crunched(
                empty_columns - 1,
                0,
                self.bitmap_w - empty_columns + 1,
                self.bitmap_h,
            );
            return empty_columns - 1;
        }
        0
    }

    fn contract_right(&mut self) -> u32 {
        let mut empty_columns = 0;
        for ii in 0..self.bitmap_w {
            if !self.is_empty_column(self.bitmap_w - ii - 1) {
                break;
            }
            empty_columns += 1;
        }

        if empty_columns >= self.bitmap_w {
            self.collapse();
            return empty_columns;
        }
        if empty_columns > 1 {
            self.sub_crunched(0, 0, self.bitmap_w - empty_columns + 1, self.bitmap_h);
            return empty_columns - 1;
        }
        0
    }

    fn contract_up(&mut self) -> u32 {
        let mut empty_rows = 0;
        for ii in 0..self.bitmap_h {
            if !self.is_empty_row(ii) {
                break;
            }
            empty_rows += 1;
        }

        if empty_rows >= self.bitmap_h {
            self.collapse();
            return empty_rows;
        }
        if empty_rows > 1 {
            self.sub_crunched(
                0,
                empty_rows - 1,
                self.bitmap_w,
                self.bitmap_h - empty_rows + 1,
            );
            return empty_rows - 1;
        }
        0
    }

    fn collapse(&mut self) {
        self.bitmap_w = 0;
        self.bitmap_h = 0;
        self.crunched = None;
    }

    fn is_empty_column(&self, column: u32) -> bool {
        let Some(tile) = &self.crunched else {
            return true;
        };
        (0..self.bitmap_h).all(|ii| tile[(ii * self.bitmap_w + column) as usize] == 0)
    }

    fn is_empty_row(&self, row: u32) -> bool {
        let Some(tile) = &self.crunched else {
            return true;
        };
        (0..self.bitmap_w).all(|ii| tile[(row * self.bitmap_w + ii) as usize] == 0)
    }

    fn sub_crunched(&mut self, px: u32, py: u32, pw: u32, ph: u32) {
        let Some(tile) = &self.crunched else {
            return;
        };

        let mut replacement = vec![0u8; (pw * ph) as usize];
        for jj in 0..ph {
            for ii in 0..pw {
                replacement[(jj * pw + ii) as usize] =
                    tile[((jj + py) * self.bitmap_w + ii + px) as usize];
            }
        }

        self.bitmap_w = pw;
        self.bitmap_h = ph;
        self.crunched = Some(replacement);
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    /// Crunched SDF tile, row-major top-to-bottom. None until `crunch` has
    /// run, and None afterwards for a zero-area tile.
    pub fn crunched(&self) -> Option<&[u8]> {
        self.crunched.as_deref()
    }

    pub fn crunched_width(&self) -> u32 {
        self.bitmap_w
    }

    pub fn crunched_height(&self) -> u32 {
        self.bitmap_h
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn advance_x(&self) -> f32 {
        self.advance_x
    }

    pub fn advance_y(&self) -> f32 {
        self.advance_y
    }

    pub fn quad(&self) -> (f32, f32, f32, f32) {
        (self.x1, self.y1, self.x2, self.y2)
    }

    pub fn texcoords(&self) -> (f32, f32, f32, f32) {
        (self.s1, self.t1, self.s2, self.t2)
    }

    pub fn set_texcoords(&mut self, s1: f32, t1: f32, s2: f32, t2: f32) {
        self.s1 = s1;
        self.t1 = t1;
        self.s2 = s2;
        self.t2 = t2;
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page;
    }

    #[cfg(test)]
    pub(crate) fn with_crunched(code: u32, width: u32, height: u32) -> Self {
        Self::with_tile(code, width, height, vec![128; (width * height) as usize])
    }

    #[cfg(test)]
    pub(crate) fn with_tile(code: u32, width: u32, height: u32, tile: Vec<u8>) -> Self {
        let mut glyph = Self::new(
            code,
            CoverageBitmap {
                width: 0,
                rows: 0,
                buffer: Vec::new(),
            },
            16,
            4,
            0.25,
            GlyphMetrics::default(),
        );
        glyph.coverage = None;
        glyph.crunched = Some(tile);
        glyph.bitmap_w = width;
        glyph.bitmap_h = height;
        glyph
    }
}

impl fmt::Display for Glyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tile) = &self.crunched {
            for jj in 0..self.bitmap_h {
                for ii in 0..self.bitmap_w {
                    let value = tile[(jj * self.bitmap_w + ii) as usize];
                    let cc = if value > 140 {
                        '#'
                    } else if value > 115 {
                        'X'
                    } else if value > 0 {
                        '.'
                    } else {
                        ' '
                    };
                    write!(f, "{cc}")?;
                }
                writeln!(f)?;
            }
        }
        writeln!(
            f,
            "Unicode: {} Size: {} x {}",
            self.code, self.width, self.height
        )?;
        writeln!(
            f,
            "Left/Top: {} / {} Advance: {} / {}",
            self.left, self.top, self.advance_x, self.advance_y
        )
    }
}
