//! At-most-one in-flight workflow per instance.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Registry of instance ids with a workflow currently running.
///
/// Workflows for different ids never contend; a second workflow for the
/// same id is refused until the first one's guard is dropped.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `id`. `None` if a workflow for it is already running.
    pub fn try_acquire(&self, id: &str) -> Option<InFlightGuard> {
        if self.lock().insert(id.to_string()) {
            Some(InFlightGuard {
                ids: Arc::clone(&self.ids),
                id: id.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.lock().contains(id)
    }
}

/// Releases its instance id when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut ids = self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_on_same_id_is_refused_until_release() {
        let in_flight = InFlight::new();
        let guard = in_flight.try_acquire("i1").unwrap();
        assert!(in_flight.try_acquire("i1").is_none());
        assert!(in_flight.try_acquire("i2").is_some());
        drop(guard);
        assert!(!in_flight.is_busy("i1"));
        assert!(in_flight.try_acquire("i1").is_some());
    }
}
