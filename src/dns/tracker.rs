//! bookkeeping of which client a pending reply belongs to

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientEntry {
    pub addr: SocketAddr,
    pub id: u16,
    pub received: DateTime<Local>,
}

/// Maps a ticket, handed out per received datagram, to the client that
/// sent it. Shared between the receiving thread and the workers.
#[derive(Debug, Default)]
pub struct ClientTracker {
    next_ticket: AtomicU64,
    clients: Mutex<BTreeMap<u64, ClientEntry>>,
}

impl ClientTracker {
    pub fn new() -> ClientTracker {
        ClientTracker::default()
    }

    fn clients(&self) -> MutexGuard<'_, BTreeMap<u64, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, addr: SocketAddr, id: u16) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let entry = ClientEntry {
            addr,
            id,
            received: Local::now(),
        };
        self.clients().insert(ticket, entry);

        ticket
    }

    pub fn address(&self, ticket: u64) -> Option<SocketAddr> {
        self.clients().get(&ticket).map(|x| x.addr)
    }

    pub fn finish(&self, ticket: u64) -> Option<ClientEntry> {
        self.clients().remove(&ticket)
    }

    /// Drops entries received more than `max_age` ago and returns how many
    /// were dropped.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let max_age = match chrono::Duration::from_std(max_age) {
            Ok(x) => x,
            Err(_) => return 0,
        };
        let cutoff = match Local::now().checked_sub_signed(max_age) {
            Some(x) => x,
            None => return 0,
        };

        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, entry| entry.received >= cutoff);

        before - clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients().is_empty()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use std::sync::Arc;
    use std::thread;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_and_finish() {
        let tracker = ClientTracker::new();

        let first = tracker.register(addr(1000), 0x1234);
        let second = tracker.register(addr(1001), 0x1234);
        assert_ne!(first, second);
        assert_eq!(2, tracker.len());

        assert_eq!(Some(addr(1001)), tracker.address(second));

        let entry = tracker.finish(first).unwrap();
        assert_eq!(addr(1000), entry.addr);
        assert_eq!(0x1234, entry.id);

        assert!(tracker.finish(first).is_none());
        assert!(tracker.address(first).is_none());
        assert_eq!(1, tracker.len());
    }

    #[test]
    fn test_evict_older_than() {
        let tracker = ClientTracker::new();
        let stale = tracker.register(addr(1000), 1);
        tracker.clients().get_mut(&stale).unwrap().received =
            Local::now() - chrono::Duration::from_std(Duration::from_secs(30)).unwrap();
        let fresh = tracker.register(addr(1001), 2);

        assert_eq!(1, tracker.evict_older_than(Duration::from_secs(5)));
        assert!(tracker.address(stale).is_none());
        assert!(tracker.address(fresh).is_some());

        assert_eq!(0, tracker.evict_older_than(Duration::from_secs(u64::MAX)));
        assert_eq!(1, tracker.len());
    }

    #[test]
    fn test_concurrent_registration() {
        let tracker = Arc::new(ClientTracker::new());

        let handles = (0..4u16)
            .map(|t| {
                let tracker = tracker.clone();
                thread::spawn(move || {
                    for i in 0..100u16 {
                        let ticket = tracker.register(addr(2000 + t), i);
                        if i % 2 == 0 {
                            tracker.finish(ticket);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(200, tracker.len());
    }
}
