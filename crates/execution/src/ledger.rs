//! Resource admission control.

use devflow_core::{ConsumerId, Resources};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Tracks system capacity and per-consumer allocations.
///
/// Every operation takes the internal lock once, so a check-and-commit in
/// [`try_allocate`](Self::try_allocate) is atomic even when stage
/// completions arrive from other threads.
#[derive(Debug)]
pub struct ResourceLedger {
    capacity: Resources,
    allocations: Mutex<HashMap<ConsumerId, Resources>>,
}

impl ResourceLedger {
    /// Create a ledger with fixed capacity.
    pub fn new(capacity: Resources) -> Self {
        Self {
            capacity,
            allocations: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConsumerId, Resources>> {
        // Every critical section is a single insert or remove; a poisoned
        // map is still consistent.
        self.allocations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Total capacity.
    pub fn capacity(&self) -> Resources {
        self.capacity
    }

    /// Sum of all live allocations.
    pub fn used(&self) -> Resources {
        self.lock().values().sum()
    }

    /// Capacity minus live allocations.
    pub fn available(&self) -> Resources {
        self.capacity.saturating_sub(&self.used())
    }

    /// Admit `requirements` for `consumer` if every amount fits.
    ///
    /// Returns false without changing anything when something does not fit
    /// or the consumer already holds an allocation.
    pub fn try_allocate(&self, consumer: &ConsumerId, requirements: Resources) -> bool {
        let mut allocations = self.lock();

        if allocations.contains_key(consumer) {
            warn!("Consumer {} already holds an allocation", consumer);
            return false;
        }

        let used: Resources = allocations.values().sum();
        let available = self.capacity.saturating_sub(&used);
        if !requirements.fits_within(&available) {
            debug!("Denied {} (needs {:?}, available {:?})", consumer, requirements, available);
            return false;
        }

        allocations.insert(consumer.clone(), requirements);
        debug!("Allocated {:?} to {}", requirements, consumer);
        true
    }

    /// Release whatever `consumer` holds. Releasing twice is a no-op.
    ///
    /// Returns whether anything was held.
    pub fn release(&self, consumer: &ConsumerId) -> bool {
        let released = self.lock().remove(consumer);
        if let Some(r) = released {
            debug!("Released {:?} from {}", r, consumer);
        }
        released.is_some()
    }

    /// What `consumer` currently holds.
    pub fn allocation(&self, consumer: &ConsumerId) -> Option<Resources> {
        self.lock().get(consumer).copied()
    }

    /// Whether `consumer` currently holds anything.
    pub fn holds(&self, consumer: &ConsumerId) -> bool {
        self.lock().contains_key(consumer)
    }

    /// Number of live allocations.
    pub fn consumer_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn capacity() -> Resources {
        Resources {
            cpu: 100,
            memory: 100,
            developers: 5,
            build_servers: 2,
            test_environments: 2,
        }
    }

    fn build() -> Resources {
        Resources {
            cpu: 20,
            memory: 30,
            build_servers: 1,
            ..Resources::none()
        }
    }

    #[test]
    fn test_allocate_until_exhausted() {
        let ledger = ResourceLedger::new(capacity());
        assert!(ledger.try_allocate(&"a-build".into(), build()));
        assert!(ledger.try_allocate(&"b-build".into(), build()));
        assert!(!ledger.try_allocate(&"c-build".into(), build()));
        assert!(!ledger.holds(&"c-build".into()));
        assert_eq!(ledger.used().build_servers, 2);
        assert_eq!(ledger.available().build_servers, 0);

        ledger.release(&"a-build".into());
        assert!(ledger.try_allocate(&"c-build".into(), build()));
    }

    #[test]
    fn test_denial_does_not_mutate() {
        let ledger = ResourceLedger::new(capacity());
        assert!(!ledger.try_allocate(&"big".into(), Resources::developers(6)));
        assert_eq!(ledger.consumer_count(), 0);
        assert_eq!(ledger.used(), Resources::none());
    }

    #[test]
    fn test_release_is_idempotent() {
        let ledger = ResourceLedger::new(capacity());
        let id: ConsumerId = "task".into();
        ledger.try_allocate(&id, Resources::developers(3));

        assert!(ledger.release(&id));
        let after_once = ledger.available();
        assert!(!ledger.release(&id));
        assert_eq!(ledger.available(), after_once);
        assert_eq!(ledger.available(), capacity());
        assert!(!ledger.release(&"never-held".into()));
    }

    #[test]
    fn test_same_consumer_cannot_allocate_twice() {
        let ledger = ResourceLedger::new(capacity());
        let id: ConsumerId = "task".into();
        assert!(ledger.try_allocate(&id, Resources::developers(1)));
        assert!(!ledger.try_allocate(&id, Resources::developers(1)));
        assert_eq!(ledger.allocation(&id), Some(Resources::developers(1)));
    }

    #[test]
    fn test_concurrent_allocations_respect_capacity() {
        let ledger = Arc::new(ResourceLedger::new(capacity()));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger.try_allocate(&ConsumerId::new(format!("c{}", i)), build())
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 2);
        for (kind, used) in ledger.used().iter() {
            assert!(used <= ledger.capacity().get(kind));
        }
    }
}
