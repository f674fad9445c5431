// In-memory registry for mounted sessions (players, showcases, recordings).
// Entries live until the client unmounts them or they go idle and get reaped.
// A watched entry (an open event stream) is never idle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry<T> {
    value: Arc<T>,
    last_activity: Instant,
    watchers: Arc<AtomicUsize>,
}

/// Keeps a session alive while held
pub struct WatchGuard(Arc<AtomicUsize>);

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SessionRegistry<T> {
    name: &'static str,
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T> SessionRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session under a fresh id
    pub async fn insert(&self, value: T) -> (String, Arc<T>) {
        let id = uuid::Uuid::new_v4().to_string();
        let value = Arc::new(value);
        self.entries.write().await.insert(
            id.clone(),
            Entry {
                value: value.clone(),
                last_activity: Instant::now(),
                watchers: Arc::new(AtomicUsize::new(0)),
            },
        );
        tracing::debug!("Mounted {} session {}", self.name, id);
        (id, value)
    }

    /// Look up a session and mark it active
    pub async fn get(&self, id: &str) -> Option<Arc<T>> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(id)?;
        entry.last_activity = Instant::now();
        Some(entry.value.clone())
    }

    /// Look up a session and hold it open until the guard is dropped
    pub async fn watch(&self, id: &str) -> Option<(Arc<T>, WatchGuard)> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(id)?;
        entry.last_activity = Instant::now();
        entry.watchers.fetch_add(1, Ordering::SeqCst);
        Some((entry.value.clone(), WatchGuard(entry.watchers.clone())))
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<T>> {
        let removed = self.entries.write().await.remove(id).map(|e| e.value);
        if removed.is_some() {
            tracing::debug!("Unmounted {} session {}", self.name, id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop sessions idle for longer than `max_idle`. Returns the removed
    /// values so the caller can tear them down.
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<Arc<T>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        // Idle time restarts when the last watcher leaves
        for entry in entries.values_mut() {
            if entry.watchers.load(Ordering::SeqCst) > 0 {
                entry.last_activity = now;
            }
        }

        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_activity) > max_idle)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|e| e.value))
            .collect()
    }
}
