//! Per-place pipeline leases
//!
//! At most one acquisition runs per place. A lease is released when dropped,
//! including when the request future holding it is dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default)]
pub struct PlaceLeases {
    held: Arc<Mutex<HashSet<i64>>>,
}

impl PlaceLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lease for `place_id`, or `None` if another run holds it
    pub fn try_acquire(&self, place_id: i64) -> Option<PlaceLease> {
        if !self.lock().insert(place_id) {
            return None;
        }
        Some(PlaceLease {
            place_id,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, place_id: i64) -> bool {
        self.lock().contains(&place_id)
    }
}

/// Exclusive right to run the pipeline for one place
#[derive(Debug)]
pub struct PlaceLease {
    place_id: i64,
    held: Arc<Mutex<HashSet<i64>>>,
}

impl PlaceLease {
    pub fn place_id(&self) -> i64 {
        self.place_id
    }
}

impl Drop for PlaceLease {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.place_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected_until_drop() {
        let leases = PlaceLeases::new();
        let lease = leases.try_acquire(3).unwrap();
        assert_eq!(lease.place_id(), 3);
        assert!(leases.try_acquire(3).is_none());
        assert!(leases.try_acquire(4).is_some());

        drop(lease);
        assert!(!leases.is_held(3));
        assert!(leases.try_acquire(3).is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let leases = PlaceLeases::new();
        let other = leases.clone();
        let _lease = leases.try_acquire(9).unwrap();
        assert!(other.try_acquire(9).is_none());
    }
}
