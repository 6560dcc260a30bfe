//! Recycling pool for "image available" semaphores.
//!
//! A semaphore handed to `acquire_next_image` cannot be reused until the
//! submission that waits on it has finished. The scheduler lends one per
//! frame, parks it on the frame slot, and returns it here once the slot's
//! fence shows that submission has completed.
//!
//! The pool is generic so its bookkeeping can be tested without a GPU.

/// Lazily growing free list.
///
/// Every entry the pool ever created is either free (in the pool) or lent
/// out, never both: `created() == lent() + free()`.
#[derive(Debug)]
pub struct SemaphorePool<T> {
    free: Vec<T>,
    created: usize,
    lent: usize,
}

impl<T> Default for SemaphorePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SemaphorePool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            created: 0,
            lent: 0,
        }
    }

    /// Lends an entry, creating one with `create` only if none is free.
    ///
    /// # Errors
    ///
    /// Propagates the error from `create`; the counts are left unchanged.
    pub fn acquire_with<E>(&mut self, create: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let entry = match self.free.pop() {
            Some(entry) => entry,
            None => {
                let entry = create()?;
                self.created += 1;
                entry
            }
        };
        self.lent += 1;
        Ok(entry)
    }

    /// Live entries: created and not yet discarded.
    #[inline]
    pub fn created(&self) -> usize {
        self.created
    }

    /// Entries currently lent out.
    #[inline]
    pub fn lent(&self) -> usize {
        self.lent
    }

    /// Entries currently waiting in the pool.
    #[inline]
    pub fn free(&self) -> usize {
        self.free.len()
    }
}

impl<T: PartialEq> SemaphorePool<T> {
    /// Returns a lent entry to the pool.
    ///
    /// # Errors
    ///
    /// Hands `entry` back if it is already free or nothing is lent out.
    pub fn release(&mut self, entry: T) -> Result<(), T> {
        if self.lent == 0 || self.free.contains(&entry) {
            return Err(entry);
        }
        self.lent -= 1;
        self.free.push(entry);
        Ok(())
    }

    /// Drops a lent entry instead of returning it.
    ///
    /// For a semaphore that was signaled but will never be waited on; it
    /// must not be handed to another acquire.
    ///
    /// # Errors
    ///
    /// Hands `entry` back if it is free or nothing is lent out.
    pub fn discard(&mut self, entry: T) -> Result<(), T> {
        if self.lent == 0 || self.free.contains(&entry) {
            return Err(entry);
        }
        self.lent -= 1;
        self.created -= 1;
        drop(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> impl FnMut() -> Result<u32, ()> {
        let mut next = 0;
        move || {
            next += 1;
            Ok(next)
        }
    }

    fn assert_conserved<T>(pool: &SemaphorePool<T>) {
        assert_eq!(pool.created(), pool.lent() + pool.free());
    }

    #[test]
    fn test_grows_lazily() {
        let mut pool = SemaphorePool::new();
        let mut create = counter();

        let a = pool.acquire_with(&mut create).unwrap();
        let b = pool.acquire_with(&mut create).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.created(), 2);
        assert_eq!(pool.lent(), 2);
        assert_eq!(pool.free(), 0);
        assert_conserved(&pool);
    }

    #[test]
    fn test_reuses_released_entries() {
        let mut pool = SemaphorePool::new();
        let mut create = counter();

        let a = pool.acquire_with(&mut create).unwrap();
        pool.release(a).unwrap();
        let again = pool.acquire_with(&mut create).unwrap();

        assert_eq!(again, a);
        assert_eq!(pool.created(), 1);
        assert_conserved(&pool);
    }

    #[test]
    fn test_double_release_rejected() {
        let mut pool = SemaphorePool::new();
        let mut create = counter();

        let a = pool.acquire_with(&mut create).unwrap();
        let _b = pool.acquire_with(&mut create).unwrap();
        pool.release(a).unwrap();

        assert_eq!(pool.release(a), Err(a));
        assert_eq!(pool.lent(), 1);
        assert_conserved(&pool);
    }

    #[test]
    fn test_release_with_nothing_lent_rejected() {
        let mut pool: SemaphorePool<u32> = SemaphorePool::new();
        assert_eq!(pool.release(7), Err(7));
        assert_eq!(pool.created(), 0);
    }

    #[test]
    fn test_failed_create_keeps_counts() {
        let mut pool: SemaphorePool<u32> = SemaphorePool::new();
        let result = pool.acquire_with(|| Err("out of memory"));
        assert_eq!(result, Err("out of memory"));
        assert_eq!(pool.created(), 0);
        assert_eq!(pool.lent(), 0);
    }

    #[test]
    fn test_discarded_entry_is_never_lent_again() {
        let mut pool = SemaphorePool::new();
        let mut create = counter();

        let signaled = pool.acquire_with(&mut create).unwrap();
        pool.discard(signaled).unwrap();
        assert_eq!(pool.created(), 0);
        assert_conserved(&pool);

        let next = pool.acquire_with(&mut create).unwrap();
        assert_ne!(next, signaled);
        assert_eq!(pool.created(), 1);
        assert_conserved(&pool);
    }

    #[test]
    fn test_discard_of_free_entry_rejected() {
        let mut pool = SemaphorePool::new();
        let mut create = counter();

        let a = pool.acquire_with(&mut create).unwrap();
        let _b = pool.acquire_with(&mut create).unwrap();
        pool.release(a).unwrap();

        assert_eq!(pool.discard(a), Err(a));
        assert_eq!(pool.free(), 1);
        assert_conserved(&pool);
    }

    #[test]
    fn test_conservation_over_frame_cycles() {
        // Three slots, each parking one semaphore until its next reuse
        let mut pool = SemaphorePool::new();
        let mut create = counter();
        let mut parked: [Option<u32>; 3] = [None; 3];

        for frame in 0..30 {
            let slot = frame % 3;
            let sem = pool.acquire_with(&mut create).unwrap();
            if let Some(old) = parked[slot].replace(sem) {
                pool.release(old).unwrap();
            }
            assert_conserved(&pool);
            assert_eq!(pool.lent(), parked.iter().flatten().count());
        }

        // Steady state never needs more than one spare
        assert!(pool.created() <= 4);
    }
}
