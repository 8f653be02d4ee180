//! Process-wide id generators.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source. Initialized to the max id already on disk; ids
/// are never reused.
#[derive(Debug)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new(last_issued: u64) -> Self {
        Self {
            last: AtomicU64::new(last_issued),
        }
    }

    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn last_issued(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

/// One generator per entity type.
#[derive(Debug)]
pub struct IdGenerators {
    pub units: IdGenerator,
    pub instructions: IdGenerator,
    pub evaluations: IdGenerator,
    pub mutations: IdGenerator,
    pub tombstones: IdGenerator,
    pub populations: IdGenerator,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_start_past_the_seed() {
        let generator = IdGenerator::new(7);
        assert_eq!(generator.next(), 8);
        assert_eq!(generator.next(), 9);
        assert_eq!(generator.last_issued(), 9);
    }

    #[test]
    fn concurrent_draws_never_collide() {
        let generator = IdGenerator::new(0);
        let ids = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| (0..1000).map(|_| generator.next()).collect::<Vec<_>>()))
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
        assert_eq!(generator.last_issued(), 4000);
    }
}
