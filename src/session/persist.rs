//! Scope persistence with in-memory backup and retry
//!
//! The store saves after every mutation of a durable scope. A failed save is
//! never surfaced to the user: the state is kept in a pending backup, served
//! back on load, and retried on the next save or an explicit flush.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::console;
use crate::session::ConversationPiiState;

// =============================================================================
// Backend trait
// =============================================================================

/// Where durable scope state lives (database, local storage, host callback)
pub trait ScopePersistence {
    fn load_scope_state(&self, key: &str) -> Result<Option<ConversationPiiState>, String>;
    fn save_scope_state(&mut self, key: &str, state: &ConversationPiiState) -> Result<(), String>;
}

/// Keeps scopes as JSON documents in a map; the default backend
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    documents: HashMap<String, String>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Raw stored JSON for a key
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.documents.get(key).map(String::as_str)
    }
}

impl ScopePersistence for MemoryPersistence {
    fn load_scope_state(&self, key: &str) -> Result<Option<ConversationPiiState>, String> {
        match self.documents.get(key) {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| format!("Corrupt scope state for '{}': {}", key, e)),
            None => Ok(None),
        }
    }

    fn save_scope_state(&mut self, key: &str, state: &ConversationPiiState) -> Result<(), String> {
        let json = serde_json::to_string(state)
            .map_err(|e| format!("Failed to serialize scope '{}': {}", key, e))?;
        self.documents.insert(key.to_string(), json);
        Ok(())
    }
}

// =============================================================================
// PersistQueue
// =============================================================================

#[derive(Debug, Clone)]
struct PendingSave {
    state: ConversationPiiState,
    attempts: u32,
}

/// Save counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistStats {
    pub saved: u64,
    pub failed: u64,
    pub retried: u64,
    pub pending: usize,
}

/// Wraps a backend with backup-and-retry semantics
pub struct PersistQueue {
    backend: Box<dyn ScopePersistence>,
    pending: HashMap<String, PendingSave>,
    max_retries: u32,
    stats: PersistStats,
}

impl PersistQueue {
    pub fn new(backend: Box<dyn ScopePersistence>, max_retries: u32) -> Self {
        Self {
            backend,
            pending: HashMap::new(),
            max_retries,
            stats: PersistStats::default(),
        }
    }

    /// Load a scope. A pending backup is newer than anything the backend has.
    pub fn load(&self, key: &str) -> Result<Option<ConversationPiiState>, String> {
        if let Some(pending) = self.pending.get(key) {
            return Ok(Some(pending.state.clone()));
        }
        self.backend.load_scope_state(key)
    }

    /// Save a scope; on failure keep a backup for later retries
    pub fn save(&mut self, key: &str, state: &ConversationPiiState) {
        self.flush_pending();

        // A fresh state replaces any older backup for the same key
        self.pending.remove(key);

        match self.backend.save_scope_state(key, state) {
            Ok(()) => self.stats.saved += 1,
            Err(e) => {
                self.stats.failed += 1;
                console::warn(&format!("[PersistQueue] Save failed for '{}', keeping backup: {}", key, e));
                self.pending.insert(key.to_string(), PendingSave { state: state.clone(), attempts: 1 });
            }
        }
        self.stats.pending = self.pending.len();
    }

    /// Retry every backed-up scope that still has attempts left.
    /// Returns how many scopes remain unsaved.
    pub fn flush_pending(&mut self) -> usize {
        let keys: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.attempts < self.max_retries)
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys {
            let Some(pending) = self.pending.get_mut(&key) else { continue };
            self.stats.retried += 1;
            match self.backend.save_scope_state(&key, &pending.state) {
                Ok(()) => {
                    self.stats.saved += 1;
                    self.pending.remove(&key);
                }
                Err(e) => {
                    self.stats.failed += 1;
                    pending.attempts += 1;
                    if pending.attempts >= self.max_retries {
                        console::error(&format!(
                            "[PersistQueue] Giving up on '{}' after {} attempts, state stays in memory: {}",
                            key, pending.attempts, e
                        ));
                    }
                }
            }
        }
        self.stats.pending = self.pending.len();
        self.pending.len()
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn stats(&self) -> &PersistStats {
        &self.stats
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Fails the first `failures` saves, then delegates to memory
    struct FlakyPersistence {
        failures: Rc<Cell<u32>>,
        inner: MemoryPersistence,
    }

    impl ScopePersistence for FlakyPersistence {
        fn load_scope_state(&self, key: &str) -> Result<Option<ConversationPiiState>, String> {
            self.inner.load_scope_state(key)
        }

        fn save_scope_state(&mut self, key: &str, state: &ConversationPiiState) -> Result<(), String> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err("backend offline".to_string());
            }
            self.inner.save_scope_state(key, state)
        }
    }

    fn state_with_session(id: &str) -> ConversationPiiState {
        ConversationPiiState { session_id: Some(id.to_string()), ..Default::default() }
    }

    #[test]
    fn test_memory_round_trip() {
        let mut memory = MemoryPersistence::new();
        memory.save_scope_state("chat-1", &state_with_session("s1")).unwrap();

        let loaded = memory.load_scope_state("chat-1").unwrap().unwrap();
        assert_eq!(loaded.session_id.as_deref(), Some("s1"));
        assert!(memory.raw("chat-1").unwrap().contains("sessionId"));
        assert!(memory.load_scope_state("missing").unwrap().is_none());
    }

    #[test]
    fn test_failed_save_is_backed_up_and_served_on_load() {
        let failures = Rc::new(Cell::new(1));
        let backend = FlakyPersistence { failures: failures.clone(), inner: MemoryPersistence::new() };
        let mut queue = PersistQueue::new(Box::new(backend), 3);

        queue.save("chat-1", &state_with_session("s1"));

        assert!(queue.has_pending("chat-1"));
        assert_eq!(queue.stats().failed, 1);
        let loaded = queue.load("chat-1").unwrap().unwrap();
        assert_eq!(loaded.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_backup_is_retried_on_flush() {
        let failures = Rc::new(Cell::new(1));
        let backend = FlakyPersistence { failures: failures.clone(), inner: MemoryPersistence::new() };
        let mut queue = PersistQueue::new(Box::new(backend), 3);

        queue.save("chat-1", &state_with_session("s1"));
        assert_eq!(queue.flush_pending(), 0);
        assert!(!queue.has_pending("chat-1"));
        assert_eq!(queue.stats().retried, 1);
        assert_eq!(queue.stats().saved, 1);
    }

    #[test]
    fn test_retries_stop_after_limit_but_backup_survives() {
        let failures = Rc::new(Cell::new(100));
        let backend = FlakyPersistence { failures: failures.clone(), inner: MemoryPersistence::new() };
        let mut queue = PersistQueue::new(Box::new(backend), 2);

        queue.save("chat-1", &state_with_session("s1"));
        queue.flush_pending();
        queue.flush_pending();
        queue.flush_pending();

        // One initial attempt + one retry, then left alone
        assert_eq!(queue.stats().retried, 1);
        assert!(queue.has_pending("chat-1"));
        assert!(queue.load("chat-1").unwrap().is_some());
    }

    #[test]
    fn test_new_save_replaces_backup() {
        let failures = Rc::new(Cell::new(1));
        let backend = FlakyPersistence { failures: failures.clone(), inner: MemoryPersistence::new() };
        let mut queue = PersistQueue::new(Box::new(backend), 3);

        queue.save("chat-1", &state_with_session("old"));
        queue.save("chat-1", &state_with_session("new"));

        assert!(!queue.has_pending("chat-1"));
        let loaded = queue.load("chat-1").unwrap().unwrap();
        assert_eq!(loaded.session_id.as_deref(), Some("new"));
    }
}
