//! Purpose: Memoize the most recent expensive load, keyed by its input.
//! Exports: `SingleSlotCache`.
//! Role: Explicit replacement for a size-1 memoizing decorator on a global function.
//! Invariants: At most one entry is held; a different key evicts it.
//! Invariants: A failed load leaves the previous entry in place.

#[derive(Debug)]
pub struct SingleSlotCache<K, V> {
    slot: Option<(K, V)>,
    hits: u64,
    misses: u64,
}

impl<K, V> Default for SingleSlotCache<K, V> {
    fn default() -> Self {
        Self {
            slot: None,
            hits: 0,
            misses: 0,
        }
    }
}

impl<K: PartialEq, V> SingleSlotCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        match &self.slot {
            Some((cached, value)) if cached == key => Some(value),
            _ => None,
        }
    }

    pub fn get_or_try_insert_with<E, F>(&mut self, key: K, load: F) -> Result<&V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        let (cached, value) = match self.slot.take() {
            Some((cached, value)) if cached == key => {
                self.hits += 1;
                (cached, value)
            }
            previous => match load(&key) {
                Ok(value) => {
                    self.misses += 1;
                    (key, value)
                }
                Err(err) => {
                    self.slot = previous;
                    return Err(err);
                }
            },
        };
        let (_, value) = self.slot.insert((cached, value));
        Ok(value)
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
