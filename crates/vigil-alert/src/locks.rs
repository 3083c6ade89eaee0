use lru::LruCache;
use std::sync::{Arc, Mutex};
use vigil_common::Fingerprint;

pub const DEFAULT_LOCK_CAPACITY: usize = 10_000;

/// Per-fingerprint mutual exclusion.
///
/// The table maps each fingerprint to its own lock so that transitions for
/// one fingerprint are applied one at a time while different fingerprints
/// proceed in parallel. The table is kept in LRU order and trimmed back to
/// `capacity`; a lock that is held or awaited is never evicted.
pub struct FingerprintLocks {
    capacity: usize,
    table: Mutex<LruCache<Fingerprint, Arc<Mutex<()>>>>,
}

impl FingerprintLocks {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            table: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Runs `f` while holding the lock for `fingerprint`.
    pub fn with_lock<R>(&self, fingerprint: &Fingerprint, f: impl FnOnce() -> R) -> R {
        let lock = self.handle(fingerprint);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }

    fn handle(&self, fingerprint: &Fingerprint) -> Arc<Mutex<()>> {
        let mut table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = table.get(fingerprint) {
            return Arc::clone(existing);
        }
        let lock = Arc::new(Mutex::new(()));
        table.put(fingerprint.clone(), Arc::clone(&lock));
        Self::trim(&mut table, self.capacity);
        lock
    }

    /// Evicts idle entries, least recently used first, until the table is
    /// back at capacity. Returns how many entries were dropped.
    pub fn compact(&self) -> usize {
        let mut table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::trim(&mut table, self.capacity)
    }

    fn trim(table: &mut LruCache<Fingerprint, Arc<Mutex<()>>>, capacity: usize) -> usize {
        if table.len() <= capacity {
            return 0;
        }
        let excess = table.len() - capacity;
        // Only the table holds an idle lock, so strong_count == 1.
        let idle: Vec<Fingerprint> = table
            .iter()
            .rev()
            .filter(|(_, lock)| Arc::strong_count(lock) == 1)
            .map(|(fp, _)| fp.clone())
            .take(excess)
            .collect();
        for fp in &idle {
            table.pop(fp);
        }
        if idle.len() < excess {
            tracing::debug!(
                size = table.len(),
                capacity,
                "Fingerprint lock table over capacity, all remaining entries busy"
            );
        }
        idle.len()
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FingerprintLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn fp(n: usize) -> Fingerprint {
        Fingerprint::from(format!("fp-{n}"))
    }

    #[test]
    fn table_is_trimmed_to_capacity() {
        let locks = FingerprintLocks::new(3);
        for n in 0..10 {
            locks.with_lock(&fp(n), || {});
        }
        assert_eq!(locks.len(), 3);
    }

    #[test]
    fn held_lock_is_never_evicted() {
        let locks = Arc::new(FingerprintLocks::new(1));
        let hot = fp(0);
        locks.with_lock(&hot, || {
            // Inserting others while `hot` is held must not evict it.
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                for n in 1..5 {
                    locks.with_lock(&fp(n), || {});
                }
            })
            .join()
            .unwrap();
        });
        // hot survived every insert; only the newest idle entry is left with it
        assert_eq!(locks.len(), 2);
        assert_eq!(locks.compact(), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn same_fingerprint_is_serialized() {
        let locks = Arc::new(FingerprintLocks::new(16));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let target = fp(42);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                let target = target.clone();
                thread::spawn(move || {
                    locks.with_lock(&target, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
