use std::cmp::Ordering;
use std::collections::HashSet;
use std::io::Write;
use std::sync::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dispatch;
use crate::glyph::Glyph;

/// Shared registry for the glyph pipeline: a mark map preventing duplicate
/// submissions, the list of crunched glyphs, and a bounded in-flight counter
/// that backpressures the producer while workers crunch.
pub struct GlyphStorage {
    glyphs: RwLock<Vec<Option<Glyph>>>,
    guard: Mutex<Guard>,
    cond: Condvar,
    concurrency: usize,
    verbose: bool,
}

struct Guard {
    marked: HashSet<u32>,
    missing: Vec<u32>,
    in_flight: usize,
    failure_pending: bool,
}

/// Tallest first, then widest; placeholder entries sort to the tail so
/// `trim` can drop them in one truncate.
fn tallest_first(lhs: &Option<Glyph>, rhs: &Option<Glyph>) -> Ordering {
    match (lhs, rhs) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(lhs), Some(rhs)) => rhs
            .crunched_height()
            .cmp(&lhs.crunched_height())
            .then_with(|| rhs.crunched_width().cmp(&lhs.crunched_width())),
    }
}

impl GlyphStorage {
    pub fn new(verbose: bool) -> Self {
        // One glyph waiting per worker at practically all times.
        Self::with_concurrency(dispatch::hardware_concurrency() * 2, verbose)
    }

    pub fn with_concurrency(concurrency: usize, verbose: bool) -> Self {
        Self {
            glyphs: RwLock::new(Vec::new()),
            guard: Mutex::new(Guard {
                marked: HashSet::new(),
                missing: Vec::new(),
                in_flight: 0,
                failure_pending: false,
            }),
            cond: Condvar::new(),
            concurrency: concurrency.max(1),
            verbose,
        }
    }

    /// Mark a code point for rendering. True only on first sight; a code
    /// point can never be submitted twice in a session.
    pub fn mark(&self, code: u32) -> bool {
        self.guard.lock().unwrap().marked.insert(code)
    }

    /// Block until an in-flight slot frees up, then take it. Called by the
    /// producer before dispatching a crunch.
    pub fn concurrency_increment(&self) {
        let mut guard = self.guard.lock().unwrap();
        while guard.in_flight >= self.concurrency {
            guard = self.cond.wait(guard).unwrap();
        }
        guard.in_flight += 1;
    }

    /// File a crunched glyph and release its in-flight slot.
    pub fn add(&self, glyph: Glyph) {
        let mut guard = self.guard.lock().unwrap();
        assert!(
            guard.marked.contains(&glyph.code()),
            "glyph {} was never marked for rendering",
            glyph.code()
        );

        let art = self.verbose.then(|| glyph.to_string());
        self.glyphs.write().unwrap().push(Some(glyph));

        guard.in_flight -= 1;
        self.cond.notify_one();

        if let Some(art) = art {
            if guard.failure_pending {
                eprintln!();
                guard.failure_pending = false;
            }
            print!("{art}");
            std::io::stdout().flush().ok();
        }
    }

    /// Record that no face could render a code point. Failures print as one
    /// running `Failed: ...` line until a completed glyph breaks it.
    pub fn missing(&self, code: u32) {
        let mut guard = self.guard.lock().unwrap();
        guard.missing.push(code);

        if self.verbose {
            if !guard.failure_pending {
                eprint!("Failed:");
                guard.failure_pending = true;
            }
            eprint!(" {code}");
            std::io::stderr().flush().ok();
        }
    }

    pub fn missing_count(&self) -> usize {
        self.guard.lock().unwrap().missing.len()
    }

    pub fn len(&self) -> usize {
        self.glyphs.read().unwrap().iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sort(&self) {
        self.glyphs.write().unwrap().sort_by(tallest_first);
    }

    /// Sort, then drop the placeholder tail left behind by a packing pass.
    pub fn trim(&self) {
        let mut glyphs = self.glyphs.write().unwrap();
        glyphs.sort_by(tallest_first);
        if let Some(first_gap) = glyphs.iter().position(Option::is_none) {
            glyphs.truncate(first_gap);
        }
    }

    /// Read-only view for concurrent fitting attempts.
    pub fn glyphs(&self) -> RwLockReadGuard<'_, Vec<Option<Glyph>>> {
        self.glyphs.read().unwrap()
    }

    /// Exclusive view for the placing pass.
    pub fn glyphs_mut(&self) -> RwLockWriteGuard<'_, Vec<Option<Glyph>>> {
        self.glyphs.write().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn mark_is_unique_per_code_point() {
        let storage = GlyphStorage::with_concurrency(4, false);
        assert!(storage.mark(65));
        assert!(!storage.mark(65));
        assert!(storage.mark(66));
        assert!(!storage.mark(65));
    }

    #[test]
    fn add_files_marked_glyphs() {
        let storage = GlyphStorage::with_concurrency(4, false);
        storage.mark(65);
        storage.concurrency_increment();
        storage.add(Glyph::with_crunched(65, 3, 3));

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.missing_count(), 0);
    }

    #[test]
    #[should_panic(expected = "never marked")]
    fn add_rejects_unmarked_glyphs() {
        let storage = GlyphStorage::with_concurrency(4, false);
        storage.concurrency_increment();
        storage.add(Glyph::with_crunched(65, 3, 3));
    }

    #[test]
    fn missing_is_tracked_separately() {
        let storage = GlyphStorage::with_concurrency(4, false);
        storage.mark(0xD800);
        storage.missing(0xD800);
        assert_eq!(storage.missing_count(), 1);
        assert!(storage.is_empty());
    }

    #[test]
    fn sort_orders_tallest_then_widest_with_gaps_last() {
        let storage = GlyphStorage::with_concurrency(8, false);
        for (code, w, h) in [(1u32, 4u32, 2u32), (2, 2, 8), (3, 6, 8), (4, 1, 1)] {
            storage.mark(code);
            storage.concurrency_increment();
            storage.add(Glyph::with_crunched(code, w, h));
        }
        storage.glyphs_mut()[1] = None;
        storage.sort();

        let glyphs = storage.glyphs();
        let order: Vec<u32> = glyphs.iter().flatten().map(Glyph::code).collect();
        assert_eq!(order, vec![3, 1, 4]);
        assert!(glyphs[3].is_none());
    }

    #[test]
    fn trim_drops_placeholders() {
        let storage = GlyphStorage::with_concurrency(8, false);
        for code in [1u32, 2, 3] {
            storage.mark(code);
            storage.concurrency_increment();
            storage.add(Glyph::with_crunched(code, 2, 2));
        }
        storage.glyphs_mut()[0] = None;
        storage.glyphs_mut()[2] = None;
        storage.trim();

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.glyphs().len(), 1);
    }

    #[test]
    fn concurrency_gate_blocks_at_the_ceiling() {
        let storage = Arc::new(GlyphStorage::with_concurrency(1, false));
        storage.mark(65);
        storage.concurrency_increment();

        let blocked = {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                storage.concurrency_increment();
            })
        };

        // The second increment cannot pass until the first slot is released.
        thread::sleep(Duration::from_millis(50));
        assert!(!blocked.is_finished());

        storage.add(Glyph::with_crunched(65, 2, 2));
        blocked.join().unwrap();
    }
}
