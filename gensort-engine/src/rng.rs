//! The pooled RNG provider.
//!
//! One process-wide pool hands thread-local generators to workers, one
//! per call, returned on drop. The n-th generator ever created is seeded
//! `base_seed + n`, so runs with the same base seed give the first N
//! workers identical streams.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub struct RngPool {
    base_seed: u64,
    created: AtomicU64,
    pool: Mutex<Vec<ChaCha8Rng>>,
}

impl RngPool {
    pub fn new(base_seed: u64) -> Self {
        Self {
            base_seed,
            created: AtomicU64::new(0),
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Borrow a generator; it returns to the pool when the guard drops.
    pub fn borrow(&self) -> PooledRng<'_> {
        let rng = self.pool.lock().pop().unwrap_or_else(|| {
            let n = self.created.fetch_add(1, Ordering::Relaxed);
            ChaCha8Rng::seed_from_u64(self.base_seed.wrapping_add(n))
        });
        PooledRng {
            pool: self,
            rng: Some(rng),
        }
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }
}

pub struct PooledRng<'a> {
    pool: &'a RngPool,
    rng: Option<ChaCha8Rng>,
}

impl Deref for PooledRng<'_> {
    type Target = ChaCha8Rng;

    fn deref(&self) -> &ChaCha8Rng {
        self.rng.as_ref().unwrap()
    }
}

impl DerefMut for PooledRng<'_> {
    fn deref_mut(&mut self) -> &mut ChaCha8Rng {
        self.rng.as_mut().unwrap()
    }
}

impl Drop for PooledRng<'_> {
    fn drop(&mut self) {
        if let Some(rng) = self.rng.take() {
            self.pool.pool.lock().push(rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    #[test]
    fn same_base_seed_gives_the_same_first_stream() {
        let pool_a = RngPool::new(42);
        let pool_b = RngPool::new(42);
        let mut rng_a = pool_a.borrow();
        let mut rng_b = pool_b.borrow();
        let draws_a: Vec<u64> = (0..8).map(|_| rng_a.next_u64()).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| rng_b.next_u64()).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn generators_are_recycled_not_reseeded() {
        let pool = RngPool::new(1);
        {
            let mut rng = pool.borrow();
            rng.next_u64();
        }
        // The returned generator comes back with its stream advanced.
        let mut recycled = pool.borrow();
        let mut fresh = ChaCha8Rng::seed_from_u64(1);
        fresh.next_u64();
        assert_eq!(recycled.next_u64(), fresh.next_u64());
        assert_eq!(pool.created.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn concurrent_borrows_get_distinct_generators() {
        let pool = RngPool::new(9);
        let guard_a = pool.borrow();
        let guard_b = pool.borrow();
        drop(guard_a);
        drop(guard_b);
        assert_eq!(pool.created.load(Ordering::Relaxed), 2);
    }
}
