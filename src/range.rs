use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::face::FontFace;
use crate::storage::GlyphStorage;

/// A deduplicated, sorted set of code points with an enable flag. Ranges are
/// only mutated while the command line is interpreted; rendering reads them.
#[derive(Default, Clone)]
pub struct GlyphRange {
    codes: Vec<u32>,
    enabled: bool,
}

impl GlyphRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn span(start: u32, end: u32) -> Self {
        let mut range = Self::new();
        range.add_span(start, end);
        range
    }

    pub fn add(&mut self, code: u32) {
        self.codes.push(code);
        self.normalize();
    }

    pub fn add_span(&mut self, start: u32, end: u32) {
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        self.codes.extend(start..=end);
        self.normalize();
    }

    pub fn remove(&mut self, code: u32) {
        self.codes.retain(|&cc| cc != code);
    }

    pub fn remove_span(&mut self, start: u32, end: u32) {
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        self.codes.retain(|&cc| cc < start || cc > end);
    }

    fn normalize(&mut self) {
        self.codes.sort_unstable();
        self.codes.dedup();
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn codes(&self) -> &[u32] {
        &self.codes
    }

    /// Walk the range in ascending order and submit every code point seen
    /// for the first time. Each point is rendered by the first face that
    /// claims it and its crunch is handed to the worker pool; points no face
    /// renders are reported missing. Returns the number of dispatched
    /// crunches.
    pub fn queue(
        &self,
        storage: &Arc<GlyphStorage>,
        dispatcher: &Dispatcher,
        faces: &[FontFace],
        target_size: u32,
    ) -> usize {
        if !self.enabled {
            return 0;
        }

        let mut dispatched = 0;
        for &code in &self.codes {
            if !storage.mark(code) {
                continue;
            }

            let mut rendered = false;
            for face in faces {
                if !face.has(code) {
                    continue;
                }
                if let Some(mut glyph) = face.render(code, target_size) {
                    storage.concurrency_increment();
                    let storage = Arc::clone(storage);
                    dispatcher.dispatch(move || {
                        glyph.crunch();
                        storage.add(glyph);
                    });
                    dispatched += 1;
                    rendered = true;
                    break;
                }
            }

            if !rendered {
                storage.missing(code);
            }
        }

        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Maps U+0041 only, advance 500/1000 em.
    static A_ONLY_FONT: &[u8] = include_bytes!("testdata/a_only.ttf");
    /// Maps U+0041 and U+00E9, advance 800/1000 em.
    static A_EACUTE_FONT: &[u8] = include_bytes!("testdata/a_eacute.ttf");

    #[test]
    fn spans_are_sorted_and_deduplicated() {
        let mut range = GlyphRange::span(0x45, 0x41);
        range.add(0x43);
        range.add_span(0x44, 0x48);
        assert_eq!(
            range.codes(),
            &[0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48]
        );
    }

    #[test]
    fn remove_span_handles_reversed_bounds() {
        let mut range = GlyphRange::span(0x20, 0x7E);
        range.remove_span(90, 65);
        assert!(range.codes().iter().all(|&cc| !(65..=90).contains(&cc)));
        assert_eq!(range.codes().len(), 95 - 26);
    }

    #[test]
    fn remove_single_code_point() {
        let mut range = GlyphRange::span(10, 12);
        range.remove(11);
        assert_eq!(range.codes(), &[10, 12]);
    }

    #[test]
    fn disabled_range_queues_nothing() {
        let range = GlyphRange::span(0x41, 0x5A);
        let storage = Arc::new(GlyphStorage::with_concurrency(4, false));
        let pool = Dispatcher::new(1);

        assert_eq!(range.queue(&storage, &pool, &[], 4), 0);
        assert!(storage.is_empty());
        assert_eq!(storage.missing_count(), 0);
    }

    #[test]
    fn unrenderable_points_are_reported_missing_once() {
        let mut range = GlyphRange::span(0x41, 0x43);
        range.enable();
        let storage = Arc::new(GlyphStorage::with_concurrency(4, false));
        let pool = Dispatcher::new(1);

        // No faces at all: every newly marked point is missing.
        assert_eq!(range.queue(&storage, &pool, &[], 4), 0);
        assert_eq!(storage.missing_count(), 3);

        // A second walk marks nothing new and reports nothing new.
        assert_eq!(range.queue(&storage, &pool, &[], 4), 0);
        assert_eq!(storage.missing_count(), 3);
    }

    #[test]
    fn first_face_claiming_a_glyph_wins() {
        let a_only = FontFace::from_bytes(A_ONLY_FONT.to_vec(), 64, 0.25).unwrap();
        let a_eacute = FontFace::from_bytes(A_EACUTE_FONT.to_vec(), 64, 0.25).unwrap();
        assert!(a_only.has(0x41));
        assert!(!a_only.has(0xE9));
        assert!(a_eacute.has(0xE9));

        let mut range = GlyphRange::new();
        range.add(0x41);
        range.add(0xE9);
        range.enable();

        let storage = Arc::new(GlyphStorage::with_concurrency(4, false));
        let pool = Dispatcher::new(2);
        let dispatched = range.queue(&storage, &pool, &[a_only, a_eacute], 4);
        pool.wait();

        assert_eq!(dispatched, 2);
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.missing_count(), 0);

        // The two fixture fonts carry different advances, so the normalized
        // advance tells which one supplied each glyph: U+0041 comes from the
        // first face even though both map it, U+00E9 falls back to the
        // second.
        let glyphs = storage.glyphs();
        let advance_of = |code: u32| {
            glyphs
                .iter()
                .flatten()
                .find(|glyph| glyph.code() == code)
                .map(|glyph| glyph.advance_x())
                .unwrap()
        };
        assert!((advance_of(0x41) - 0.5).abs() < 1e-4);
        assert!((advance_of(0xE9) - 0.8).abs() < 1e-4);
    }

    #[test]
    fn missing_face_falls_through_without_blocking_others() {
        let a_only = FontFace::from_bytes(A_ONLY_FONT.to_vec(), 64, 0.25).unwrap();

        let mut range = GlyphRange::new();
        range.add(0x41);
        range.add(0xE9);
        range.enable();

        let storage = Arc::new(GlyphStorage::with_concurrency(4, false));
        let pool = Dispatcher::new(1);
        let dispatched = range.queue(&storage, &pool, &[a_only], 4);
        pool.wait();

        assert_eq!(dispatched, 1);
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.missing_count(), 1);
    }
}
