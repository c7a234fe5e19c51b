use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::dispatch::Dispatcher;
use crate::skyline::{SkyLine, SIZE_STEP};
use crate::storage::GlyphStorage;

/// Parallel search over candidate atlas widths. Every width from the size
/// ceiling down to the size step gets one dry-run packing attempt on the
/// worker pool; the best observed (count, usage) pair decides the page
/// dimensions the driver then realizes for real.
pub struct SkyLineFitter {
    max_size: u32,
    best: Mutex<Best>,
    verbose: bool,
}

#[derive(Default)]
struct Best {
    count: usize,
    usage: f32,
    width: u32,
    height: u32,
    last_print_width: usize,
}

impl SkyLineFitter {
    pub fn new(max_size: u32, verbose: bool) -> Self {
        Self {
            // Round down to the next step.
            max_size: max_size - max_size % SIZE_STEP,
            best: Mutex::new(Best::default()),
            verbose,
        }
    }

    /// Queue one attempt per candidate width. The storage is only read; the
    /// attempts race on nothing but the best tuple.
    pub fn queue(self: &Arc<Self>, dispatcher: &Dispatcher, storage: &Arc<GlyphStorage>) {
        let mut width = self.max_size;
        while width > 0 {
            let fitter = Arc::clone(self);
            let storage = Arc::clone(storage);
            let max_height = self.max_size;

            dispatcher.dispatch(move || {
                let mut skyline = SkyLine::new(width, max_height);
                let count = {
                    let glyphs = storage.glyphs();
                    skyline.fit_count(&glyphs)
                };
                fitter.store_attempt(count, skyline.usage(), width, skyline.used_height());
            });

            width -= SIZE_STEP;
        }
    }

    /// Keep an attempt that places at least as many glyphs at strictly
    /// better usage. A higher count at merely equal usage loses.
    fn store_attempt(&self, count: usize, usage: f32, width: u32, height: u32) {
        let mut best = self.best.lock().unwrap();
        if count >= best.count && usage > best.usage {
            best.count = count;
            best.usage = usage;
            best.width = width;
            best.height = height;

            if self.verbose {
                let line = format!(
                    "\rBest: {} / {} ({}x{})",
                    best.count, best.usage, best.width, best.height
                );
                let padding = best.last_print_width.saturating_sub(line.len());
                best.last_print_width = line.len();
                print!("{line}{}", " ".repeat(padding));
                std::io::stdout().flush().ok();
            }
        }
    }

    pub fn best_size(&self) -> (u32, u32) {
        let best = self.best.lock().unwrap();
        (best.width, best.height)
    }
}
