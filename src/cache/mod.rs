//! Render cache
//!
//! Memoizes the whole pipeline per content identity. An entry is reused only
//! while its stored fingerprint matches the item being rendered; anything
//! else is a miss that recomputes and replaces the entry.
//!
//! Locking is two-level: the identity map lock is held only to look up,
//! insert or evict cells, and each cell has its own lock held across the
//! recomputation so one identity is never rendered by two workers at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::content::{ChangeSet, ContentItem, Fingerprint, Identity};
use crate::error::Result;
use crate::pipeline::Pipeline;

/// Entry bound used when none is configured
pub const DEFAULT_MAX_ENTRIES: usize = 512;

/// A stored page for one identity
#[derive(Debug)]
pub struct CacheEntry<P> {
    pub fingerprint: Fingerprint,
    pub page: Arc<P>,
}

#[derive(Debug)]
struct Cell<P> {
    entry: Mutex<Option<CacheEntry<P>>>,
    last_access: AtomicU64,
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Thread-safe render cache in front of a [`Pipeline`]
pub struct RenderCache<P> {
    pipeline: Arc<Pipeline<P>>,
    cells: Mutex<HashMap<Identity, Arc<Cell<P>>>>,
    max_entries: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking render leaves the entry cleared, so the data is still usable
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P> RenderCache<P> {
    pub fn new(pipeline: Arc<Pipeline<P>>) -> Self {
        Self::with_capacity(pipeline, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache holding at most `max_entries` identities
    pub fn with_capacity(pipeline: Arc<Pipeline<P>>, max_entries: usize) -> Self {
        Self {
            pipeline,
            cells: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline<P>> {
        &self.pipeline
    }

    /// Rendered page for `item`, computed at most once per fingerprint
    pub fn get_or_render(&self, item: &ContentItem) -> Result<Arc<P>> {
        let identity = item.identity();
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;

        let cell = {
            let mut cells = lock(&self.cells);
            Arc::clone(cells.entry(identity.clone()).or_insert_with(|| {
                Arc::new(Cell {
                    entry: Mutex::new(None),
                    last_access: AtomicU64::new(0),
                })
            }))
        };
        cell.last_access.store(tick, Ordering::Relaxed);

        let mut entry = lock(&cell.entry);
        if let Some(cached) = entry.as_ref() {
            if cached.fingerprint == item.fingerprint() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache hit: {}", identity);
                return Ok(Arc::clone(&cached.page));
            }
            tracing::debug!("Cache stale: {} ({} -> {})", identity, cached.fingerprint, item.fingerprint());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Drop the stale version before rendering so a failure leaves nothing behind
        *entry = None;
        match self.pipeline.render(item) {
            Ok(page) => {
                let page = Arc::new(page);
                *entry = Some(CacheEntry {
                    fingerprint: item.fingerprint(),
                    page: Arc::clone(&page),
                });
                drop(entry);
                drop(cell);
                self.evict();
                Ok(page)
            }
            Err(e) => {
                drop(entry);
                self.forget(identity, cell);
                Err(e)
            }
        }
    }

    /// Drop the cell of a failed render unless another worker is using it
    fn forget(&self, identity: &Identity, cell: Arc<Cell<P>>) {
        let mut cells = lock(&self.cells);
        if let Some(current) = cells.get(identity) {
            // One reference in the map, one held here
            if Arc::ptr_eq(current, &cell) && Arc::strong_count(&cell) == 2 {
                cells.remove(identity);
            }
        }
    }

    /// Evict least recently used identities above the bound. Cells referenced
    /// outside the map belong to in-flight lookups and are kept.
    fn evict(&self) {
        let mut cells = lock(&self.cells);
        if cells.len() <= self.max_entries {
            return;
        }

        let mut idle: Vec<(u64, Identity)> = cells
            .iter()
            .filter(|(_, cell)| Arc::strong_count(cell) == 1)
            .map(|(id, cell)| (cell.last_access.load(Ordering::Relaxed), id.clone()))
            .collect();
        idle.sort();

        let excess = cells.len() - self.max_entries;
        for (_, id) in idle.into_iter().take(excess) {
            cells.remove(&id);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache evict: {}", id);
        }
    }

    /// Forget the entry for one identity
    pub fn invalidate(&self, identity: &Identity) -> bool {
        lock(&self.cells).remove(identity).is_some()
    }

    /// Forget entries for items a rescan found removed
    pub fn apply(&self, changes: &ChangeSet) {
        for identity in &changes.removed {
            if self.invalidate(identity) {
                tracing::debug!("Cache invalidated: {}", identity);
            }
        }
    }

    /// Forget everything, e.g. after rules or layouts changed
    pub fn clear(&self) {
        lock(&self.cells).clear();
    }

    /// Fingerprint currently stored for an identity
    pub fn fingerprint(&self, identity: &Identity) -> Option<Fingerprint> {
        let cell = lock(&self.cells).get(identity).cloned()?;
        let entry = lock(&cell.entry);
        entry.as_ref().map(|e| e.fingerprint)
    }

    pub fn len(&self) -> usize {
        lock(&self.cells).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composition;
    use crate::error::ErrorKind;
    use crate::layout::SlotDeclaration;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, SystemTime};

    fn counting_pipeline(delay: Duration) -> (Arc<Pipeline<String>>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pipeline = Pipeline::builder()
            .layout(
                "default",
                vec![SlotDeclaration::required("main")],
                move |c: &Composition<'_>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(delay);
                    c.slot_html("main")
                },
            )
            .unwrap()
            .build();
        (Arc::new(pipeline), calls)
    }

    fn item(identity: &str, raw: &str, secs: u64) -> ContentItem {
        ContentItem::new(identity, raw, SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn test_unchanged_item_renders_once() {
        let (pipeline, calls) = counting_pipeline(Duration::ZERO);
        let cache = RenderCache::new(pipeline);
        let item = item("a.md", "Hello", 1);

        let first = cache.get_or_render(&item).unwrap();
        let second = cache.get_or_render(&item).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                evictions: 0,
                entries: 1
            }
        );
    }

    #[test]
    fn test_changed_item_replaces_entry() {
        let (pipeline, calls) = counting_pipeline(Duration::ZERO);
        let cache = RenderCache::new(pipeline);

        let v1 = item("a.md", "First", 1);
        let v2 = item("a.md", "Second", 2);
        let first = cache.get_or_render(&v1).unwrap();
        let second = cache.get_or_render(&v2).unwrap();

        assert_eq!(first.as_str(), "<p>First</p>\n");
        assert_eq!(second.as_str(), "<p>Second</p>\n");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.fingerprint(v2.identity()), Some(v2.fingerprint()));
    }

    #[test]
    fn test_mtime_change_is_a_miss() {
        let (pipeline, calls) = counting_pipeline(Duration::ZERO);
        let cache = RenderCache::new(pipeline);
        cache.get_or_render(&item("a.md", "Same", 1)).unwrap();
        cache.get_or_render(&item("a.md", "Same", 2)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_stores_nothing() {
        let (pipeline, _) = counting_pipeline(Duration::ZERO);
        let cache = RenderCache::new(pipeline);

        let good = item("a.md", "Fine", 1);
        cache.get_or_render(&good).unwrap();
        assert_eq!(cache.len(), 1);

        let broken = item("a.md", ":::slot main\nnever closed\n", 2);
        let err = cache.get_or_render(&broken).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnterminatedBlock { .. }));
        assert!(cache.is_empty());
        assert_eq!(cache.fingerprint(good.identity()), None);
    }

    #[test]
    fn test_concurrent_requests_render_once() {
        let (pipeline, calls) = counting_pipeline(Duration::from_millis(50));
        let cache = Arc::new(RenderCache::new(pipeline));
        let item = Arc::new(item("a.md", "Shared", 1));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let item = Arc::clone(&item);
                thread::spawn(move || cache.get_or_render(&item).unwrap())
            })
            .collect();
        let pages: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pages.iter().all(|p| Arc::ptr_eq(p, &pages[0])));
    }

    #[test]
    fn test_distinct_identities_render_in_parallel() {
        let (pipeline, calls) = counting_pipeline(Duration::ZERO);
        let cache = Arc::new(RenderCache::new(pipeline));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let item = item(&format!("{}.md", i), &format!("Page {}", i), 1);
                    cache.get_or_render(&item).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let (pipeline, _) = counting_pipeline(Duration::ZERO);
        let cache = RenderCache::with_capacity(pipeline, 2);

        let a = item("a.md", "A", 1);
        let b = item("b.md", "B", 1);
        let c = item("c.md", "C", 1);
        cache.get_or_render(&a).unwrap();
        cache.get_or_render(&b).unwrap();
        // Touch `a` so `b` becomes the oldest
        cache.get_or_render(&a).unwrap();
        cache.get_or_render(&c).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.fingerprint(a.identity()).is_some());
        assert!(cache.fingerprint(b.identity()).is_none());
        assert!(cache.fingerprint(c.identity()).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let (pipeline, calls) = counting_pipeline(Duration::ZERO);
        let cache = RenderCache::new(pipeline);
        let a = item("a.md", "A", 1);
        let b = item("b.md", "B", 1);
        cache.get_or_render(&a).unwrap();
        cache.get_or_render(&b).unwrap();

        assert!(cache.invalidate(a.identity()));
        assert!(!cache.invalidate(a.identity()));
        cache.get_or_render(&a).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let changes = ChangeSet {
            removed: vec![b.identity().clone()],
            ..Default::default()
        };
        cache.apply(&changes);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_in_flight_render_is_never_evicted() {
        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(AtomicBool::new(false));
        let (gate, open) = (Arc::clone(&started), Arc::clone(&release));
        let pipeline = Pipeline::builder()
            .layout(
                "default",
                vec![SlotDeclaration::required("main")],
                move |c: &Composition<'_>| {
                    if c.identity.as_str() == "slow.md" {
                        gate.wait();
                        while !open.load(Ordering::SeqCst) {
                            thread::sleep(Duration::from_millis(1));
                        }
                    }
                    c.slot_html("main")
                },
            )
            .unwrap()
            .build();
        let cache = Arc::new(RenderCache::with_capacity(Arc::new(pipeline), 1));

        let slow = item("slow.md", "Slow", 1);
        let worker = {
            let cache = Arc::clone(&cache);
            let slow = slow.clone();
            thread::spawn(move || cache.get_or_render(&slow).unwrap())
        };
        started.wait();

        // Overflow the bound while `slow.md` is still composing
        let fast = item("fast.md", "Fast", 1);
        assert_eq!(cache.get_or_render(&fast).unwrap().as_str(), "<p>Fast</p>\n");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 1);

        release.store(true, Ordering::SeqCst);
        assert_eq!(worker.join().unwrap().as_str(), "<p>Slow</p>\n");
        assert_eq!(cache.fingerprint(slow.identity()), Some(slow.fingerprint()));
        assert_eq!(cache.fingerprint(fast.identity()), None);

        cache.get_or_render(&slow).unwrap();
        assert_eq!(cache.stats().hits, 1);
    }
}
