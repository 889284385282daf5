//! Push-delivery subscriber registry
//!
//! Shared between the command-accept loop (which inserts) and the broadcast
//! loops (which iterate). Readers take an owned snapshot, so a broadcast in
//! progress never observes a concurrent insert. Entries live for the life of
//! the process; there is no removal path.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared handle to a registry
pub type SharedRegistry = Arc<SubscriberRegistry>;

/// Set of push destinations, each registered at most once
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<BTreeSet<SocketAddr>>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry behind an `Arc`
    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    /// Insert `addr`; returns false if it was already registered
    pub fn register(&self, addr: SocketAddr) -> bool {
        let inserted = self.subscribers.write().insert(addr);
        if inserted {
            log::info!("Registered subscriber {}", addr);
        } else {
            log::debug!("Subscriber {} already registered", addr);
        }
        inserted
    }

    /// Copy of the current membership, in address order
    pub fn snapshot(&self) -> Vec<SocketAddr> {
        self.subscribers.read().iter().copied().collect()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.subscribers.read().contains(addr)
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_register_once() {
        let registry = SubscriberRegistry::new();
        let a = addr("10.8.0.8:6970");

        assert!(registry.register(a));
        assert!(!registry.register(a));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&a));
    }

    #[test]
    fn test_snapshot_contains_distinct_addresses() {
        let registry = SubscriberRegistry::new();
        let a = addr("10.8.0.8:6970");
        let b = addr("10.8.0.9:6970");

        assert!(registry.register(b));
        assert!(registry.register(a));

        assert_eq!(registry.snapshot(), vec![a, b]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = SubscriberRegistry::new();
        registry.register(addr("10.0.0.1:1"));

        let snapshot = registry.snapshot();
        registry.register(addr("10.0.0.2:1"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_register_and_snapshot() {
        let registry = SubscriberRegistry::shared();

        let writers: Vec<_> = (0..4u8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..50u8 {
                        registry.register(SocketAddr::from(([10, t, 0, i], 6970)));
                    }
                })
            })
            .collect();

        let reader = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = registry.snapshot();
                    assert!(snapshot.windows(2).all(|w| w[0] < w[1]));
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(registry.len(), 200);
    }
}
