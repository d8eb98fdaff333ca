//! Arena-backed [`VariableStore`].
//!
//! Handles are indices into a flat `Vec<f64>`. Embeddings that already own
//! their state implement [`VariableStore`] directly instead.

use crate::domain::VarHandle;
use crate::ports::VariableStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArenaStore {
    values: Vec<f64>,
}

impl ArenaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Allocate a new scalar and return its handle.
    pub fn push(&mut self, value: f64) -> VarHandle {
        let index = u32::try_from(self.values.len()).unwrap_or(u32::MAX);
        self.values.push(value);
        VarHandle::new(index)
    }

    #[must_use]
    pub fn get(&self, handle: VarHandle) -> Option<f64> {
        self.values.get(handle.index()).copied()
    }

    pub fn get_mut(&mut self, handle: VarHandle) -> Option<&mut f64> {
        self.values.get_mut(handle.index())
    }

    /// Drop every scalar from `len` on; their handles stop resolving.
    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl VariableStore for ArenaStore {
    fn read(&self, handle: VarHandle) -> Option<f64> {
        self.get(handle)
    }

    fn write(&mut self, handle: VarHandle, value: f64) -> bool {
        match self.get_mut(handle) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_read_write() {
        let mut store = ArenaStore::new();
        let a = store.push(1.0);
        let b = store.push(2.0);
        assert_ne!(a, b);

        assert!(store.write(b, 5.0));
        assert_eq!(store.read(a), Some(1.0));
        assert_eq!(store.read(b), Some(5.0));
    }

    #[test]
    fn test_truncated_handle_is_stale() {
        let mut store = ArenaStore::new();
        store.push(0.0);
        let gone = store.push(1.0);
        store.truncate(1);

        assert_eq!(store.read(gone), None);
        assert!(!store.write(gone, 3.0));
        assert_eq!(store.len(), 1);
    }
}
