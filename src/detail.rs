use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::async_task::Task;
use crate::error::FetchError;
use crate::observer::Notifier;
use crate::source::DetailRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum DetailEntry {
    Absent,
    Pending,
    Resolved(DetailRecord),
    Failed(FetchError),
}

static ABSENT: DetailEntry = DetailEntry::Absent;

#[derive(Debug)]
struct Slot {
    entry: DetailEntry,
    /// Request id of the fetch that may still resolve this slot
    request: u64,
}

/// Session-wide cache of detail records keyed by node id.
///
/// At most one fetch per key is in flight: every `get` before the response
/// arrives sees the same `Pending` entry. Entries never expire; only
/// `invalidate` drops one. Failures are kept, not retried, until `retry`.
#[derive(Debug)]
pub struct DetailCache {
    entries: HashMap<String, Slot>,
    next_request: u64,
    tasks: mpsc::Sender<Task>,
    notifier: Notifier,
}

impl DetailCache {
    pub fn new(tasks: mpsc::Sender<Task>) -> Self {
        Self {
            entries: HashMap::new(),
            next_request: 0,
            tasks,
            notifier: Notifier::new(),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Current entry for `id`, issuing the fetch if there is none yet.
    pub fn get(&mut self, id: &str) -> &DetailEntry {
        if !self.entries.contains_key(id) {
            self.fetch(id);
        }
        self.peek(id)
    }

    /// Current entry for `id` without side effects.
    pub fn peek(&self, id: &str) -> &DetailEntry {
        self.entries.get(id).map(|slot| &slot.entry).unwrap_or(&ABSENT)
    }

    /// Re-attempt a failed entry. Anything else is left alone.
    pub fn retry(&mut self, id: &str) -> bool {
        if matches!(self.peek(id), DetailEntry::Failed(_)) {
            log::debug!("detail: retrying {}", id);
            self.fetch(id);
            return true;
        }
        false
    }

    /// Drop the entry for `id`. A response still in flight for it is ignored.
    pub fn invalidate(&mut self, id: &str) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            self.notifier.notify();
        }
        removed
    }

    /// Apply a fetch outcome. Responses for requests that no longer own the
    /// entry (invalidated or superseded by a retry) are discarded.
    pub fn resolve(&mut self, id: &str, request: u64, result: Result<DetailRecord, FetchError>) -> bool {
        let Some(slot) = self.entries.get_mut(id) else {
            log::debug!("detail: ignoring response for evicted {}", id);
            return false;
        };
        if slot.request != request || slot.entry != DetailEntry::Pending {
            log::debug!("detail: ignoring stale response #{} for {}", request, id);
            return false;
        }

        slot.entry = match result {
            Ok(record) => DetailEntry::Resolved(record),
            Err(e) => {
                log::warn!("detail: fetch for {} failed: {}", id, e);
                DetailEntry::Failed(e)
            }
        };
        self.notifier.notify();
        true
    }

    pub fn in_flight(&self) -> usize {
        self.entries
            .values()
            .filter(|slot| slot.entry == DetailEntry::Pending)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fetch(&mut self, id: &str) {
        self.next_request += 1;
        let request = self.next_request;
        let task = Task::FetchDetail {
            id: id.to_string(),
            request,
        };

        let entry = match self.tasks.try_send(task) {
            Ok(()) => {
                log::debug!("detail: fetching {} (#{})", id, request);
                DetailEntry::Pending
            }
            Err(e) => {
                log::error!("detail: failed to queue fetch for {}: {}", id, e);
                DetailEntry::Failed(FetchError::transport(format!("request queue unavailable: {}", e)))
            }
        };
        self.entries.insert(id.to_string(), Slot { entry, request });
        self.notifier.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::tree::Node;

    fn record(id: &str) -> DetailRecord {
        DetailRecord::from_node(&Node::new(id, id.to_uppercase()))
    }

    fn drain(rx: &mut mpsc::Receiver<Task>) -> Vec<Task> {
        let mut tasks = Vec::new();
        while let Ok(task) = rx.try_recv() {
            tasks.push(task);
        }
        tasks
    }

    fn request_of(task: &Task) -> u64 {
        match task {
            Task::FetchDetail { request, .. } => *request,
            other => panic!("unexpected task {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_gets_share_one_fetch() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut cache = DetailCache::new(tx);

        assert_eq!(cache.get("X"), &DetailEntry::Pending);
        assert_eq!(cache.get("X"), &DetailEntry::Pending);

        let tasks = drain(&mut rx);
        assert_eq!(tasks.len(), 1);
        assert_matches!(&tasks[0], Task::FetchDetail { id, .. } if id == "X");

        assert!(cache.resolve("X", request_of(&tasks[0]), Ok(record("X"))));
        let first = cache.get("X").clone();
        let second = cache.get("X").clone();
        assert_eq!(first, DetailEntry::Resolved(record("X")));
        assert_eq!(first, second);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_cached_value_served_without_fetch() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut cache = DetailCache::new(tx);
        cache.get("a");
        let request = request_of(&drain(&mut rx)[0]);
        cache.resolve("a", request, Ok(record("a")));

        cache.get("b");
        drain(&mut rx);
        assert_matches!(cache.get("a"), DetailEntry::Resolved(r) if r.id == "a");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_failure_is_not_retried_until_asked() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut cache = DetailCache::new(tx);
        cache.get("a");
        let request = request_of(&drain(&mut rx)[0]);
        cache.resolve("a", request, Err(FetchError::transport("timeout")));

        assert_matches!(cache.get("a"), DetailEntry::Failed(FetchError::TransportFailure(_)));
        assert!(drain(&mut rx).is_empty());

        assert!(cache.retry("a"));
        assert_eq!(cache.peek("a"), &DetailEntry::Pending);
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(!cache.retry("a"));
    }

    #[test]
    fn test_stale_response_after_retry_ignored() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut cache = DetailCache::new(tx);
        cache.get("a");
        let first = request_of(&drain(&mut rx)[0]);
        cache.resolve("a", first, Err(FetchError::NotFound));
        cache.retry("a");
        let second = request_of(&drain(&mut rx)[0]);

        assert!(!cache.resolve("a", first, Ok(record("old"))));
        assert_eq!(cache.peek("a"), &DetailEntry::Pending);
        assert!(cache.resolve("a", second, Ok(record("a"))));
    }

    #[test]
    fn test_invalidate_drops_entry_and_late_response() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut cache = DetailCache::new(tx);
        cache.get("a");
        let request = request_of(&drain(&mut rx)[0]);

        assert!(cache.invalidate("a"));
        assert_eq!(cache.peek("a"), &DetailEntry::Absent);
        assert!(!cache.resolve("a", request, Ok(record("a"))));
        assert!(!cache.invalidate("a"));

        // next get refetches
        cache.get("a");
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_full_queue_fails_entry() {
        let (tx, _rx) = mpsc::channel(1);
        let mut cache = DetailCache::new(tx);
        cache.get("a");
        assert_matches!(cache.get("b"), DetailEntry::Failed(FetchError::TransportFailure(_)));
        assert_eq!(cache.in_flight(), 1);
    }
}
