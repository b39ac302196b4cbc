//! The server's append-only chat log.
//!
//! All reads and writes go through one mutex. A submission holds it for a single critical section
//! that decides append-or-fetch, appends if needed, and snapshots the whole log.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::FETCH_SENTINEL;

/// Shared handle to the history. Cloning shares the same log.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    inner: Arc<Mutex<Vec<String>>>,
}

/// `[sender]: content`
pub fn format_message(sender: &str, content: &str) -> String {
    format!("[{}]: {}", sender, content)
}

/// True when `text` asks for the history instead of posting a message.
pub fn is_fetch(text: &str) -> bool {
    text.get(..FETCH_SENTINEL.len())
        .map(|prefix| prefix.eq_ignore_ascii_case(FETCH_SENTINEL))
        .unwrap_or(false)
}

impl HistoryStore {
    pub fn new() -> HistoryStore {
        HistoryStore::default()
    }

    // A panic while holding the lock cannot leave a half-written entry, so a poisoned log is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `[sender]: text` unless `text` is the fetch sentinel, then return the whole log.
    pub fn submit(&self, sender: &str, text: &str) -> Vec<String> {
        let mut history = self.lock();
        if !is_fetch(text) {
            let formatted = format_message(sender, text);
            log::info!("New message received: {}", formatted);
            history.push(formatted);
        }
        history.clone()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    #[test]
    fn fetch_on_empty_store() {
        let store = HistoryStore::new();
        assert!(store.submit("alice", FETCH_SENTINEL).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn submit_then_fetch() {
        let store = HistoryStore::new();
        assert_eq!(store.submit("alice", "hi"), vec!["[alice]: hi"]);
        assert_eq!(store.submit("bob", FETCH_SENTINEL), vec!["[alice]: hi"]);
    }

    #[test]
    fn order_is_append_order() {
        let store = HistoryStore::new();
        store.submit("alice", "hi");
        store.submit("bob", "yo");
        assert_eq!(store.snapshot(), vec!["[alice]: hi", "[bob]: yo"]);
    }

    #[test]
    fn sentinel_is_never_appended() {
        let store = HistoryStore::new();
        store.submit("alice", "hi");
        for text in ["/FETCH_HISTORY", "/fetch_history", "/FETCH_HISTORY please"] {
            assert_eq!(store.submit("mallory", text).len(), 1);
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn repeated_fetches_are_identical() {
        let store = HistoryStore::new();
        store.submit("alice", "one");
        store.submit("alice", "two");
        let first = store.submit("bob", FETCH_SENTINEL);
        let second = store.submit("bob", FETCH_SENTINEL);
        assert_eq!(first, second);
    }

    #[test]
    fn sentinel_lookalikes_are_messages() {
        assert!(!is_fetch("FETCH_HISTORY"));
        assert!(!is_fetch("/FETCH"));
        assert!(!is_fetch(""));
        assert!(!is_fetch("/histórico"));
        assert!(is_fetch("/Fetch_History"));
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let store = HistoryStore::new();
        let writers: Vec<_> = (0..8)
            .map(|writer| {
                let store = store.clone();
                thread::spawn(move || {
                    for n in 0..50 {
                        store.submit(&format!("w{}", writer), &n.to_string());
                    }
                })
            })
            .collect();
        for handle in writers {
            handle.join().unwrap();
        }

        let history = store.submit("reader", FETCH_SENTINEL);
        assert_eq!(history.len(), 8 * 50);
        let unique: HashSet<_> = history.iter().collect();
        assert_eq!(unique.len(), history.len());

        // each writer's own entries keep their submission order
        for writer in 0..8 {
            let prefix = format!("[w{}]: ", writer);
            let mine: Vec<usize> = history
                .iter()
                .filter_map(|entry| entry.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(mine, (0..50).collect::<Vec<_>>());
        }
    }
}
