use crate::models::Note;
use futures::lock::Mutex as AsyncMutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    /// One lock per note; remote writes for a note run one at a time, in issue order.
    locks: HashMap<String, Arc<AsyncMutex<()>>>,
    /// Temporary id -> id assigned by the backend.
    aliases: HashMap<String, String>,
    /// Last generation stamped on each note. Stamps come from one counter, so they never repeat.
    generations: HashMap<String, u64>,
    next_generation: u64,
    /// Last state of a note before its unconfirmed local edits.
    baselines: HashMap<String, Note>,
    /// Temporary ids whose create was rolled back or never sent.
    discarded: HashSet<String>,
    /// Temporary ids whose create has not been answered yet.
    pending_creates: HashSet<String>,
}

impl Inner {
    fn canonical(&self, id: &str) -> String {
        let mut current = id;
        // Aliases are one hop in practice; the bound guards against cycles.
        for _ in 0..8 {
            match self.aliases.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.to_string()
    }

    /// No write holds or waits on the note's lock.
    fn is_idle(&self, key: &str) -> bool {
        self.locks.get(key).map_or(true, |l| Arc::strong_count(l) == 1)
    }

    fn drop_key(&mut self, key: &str) {
        self.locks.remove(key);
        self.generations.remove(key);
        self.baselines.remove(key);
        self.discarded.remove(key);
        self.aliases.retain(|_, real| real != key);
    }
}

/// Bookkeeping for in-flight remote writes, keyed by canonical note id.
#[derive(Clone, Default)]
pub(crate) struct SyncLedger {
    inner: Arc<Mutex<Inner>>,
}

impl SyncLedger {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a temporary id to the backend id once its create has landed.
    pub fn canonical(&self, id: &str) -> String {
        self.inner().canonical(id)
    }

    pub fn lock_for(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut inner = self.inner();
        let key = inner.canonical(id);
        inner.locks.entry(key).or_default().clone()
    }

    /// Record a local mutation and return its generation.
    pub fn touch(&self, id: &str) -> u64 {
        let mut inner = self.inner();
        let key = inner.canonical(id);
        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.generations.insert(key, generation);
        generation
    }

    pub fn generation(&self, id: &str) -> u64 {
        let inner = self.inner();
        let key = inner.canonical(id);
        inner.generations.get(&key).copied().unwrap_or(0)
    }

    /// Point `temp_id` at `real_id`, carrying its lock, generation and baseline along.
    pub fn rebind(&self, temp_id: &str, real_id: &str) {
        if temp_id == real_id {
            return;
        }
        let mut inner = self.inner();
        inner.aliases.insert(temp_id.to_string(), real_id.to_string());

        if let Some(lock) = inner.locks.remove(temp_id) {
            inner.locks.insert(real_id.to_string(), lock);
        }
        if let Some(generation) = inner.generations.remove(temp_id) {
            let entry = inner.generations.entry(real_id.to_string()).or_insert(0);
            *entry = (*entry).max(generation);
        }
        if let Some(mut baseline) = inner.baselines.remove(temp_id) {
            baseline.id = real_id.to_string();
            inner.baselines.insert(real_id.to_string(), baseline);
        }
    }

    pub fn discard(&self, temp_id: &str) {
        self.inner().discarded.insert(temp_id.to_string());
    }

    pub fn is_discarded(&self, id: &str) -> bool {
        self.inner().discarded.contains(id)
    }

    pub fn begin_create(&self, temp_id: &str) {
        self.inner().pending_creates.insert(temp_id.to_string());
    }

    pub fn end_create(&self, temp_id: &str) {
        self.inner().pending_creates.remove(temp_id);
    }

    pub fn pending_creates(&self) -> HashSet<String> {
        self.inner().pending_creates.clone()
    }

    /// Remember `note` as the rollback point unless an older one is still pending.
    pub fn hold_baseline(&self, note: &Note) {
        let mut inner = self.inner();
        let key = inner.canonical(&note.id);
        inner.baselines.entry(key).or_insert_with(|| note.clone());
    }

    pub fn take_baseline(&self, id: &str) -> Option<Note> {
        let mut inner = self.inner();
        let key = inner.canonical(id);
        inner.baselines.remove(&key)
    }

    /// Hand a rollback point back, replacing any newer one.
    pub fn restore_baseline(&self, note: Note) {
        let mut inner = self.inner();
        let key = inner.canonical(&note.id);
        inner.baselines.insert(key, note);
    }

    /// Hand back a note's lock. Once nothing holds or awaits it, the note's entries go.
    pub fn release(&self, id: &str, turn: Arc<AsyncMutex<()>>) {
        drop(turn);
        let mut inner = self.inner();
        let key = inner.canonical(id);
        if inner.is_idle(&key) {
            inner.drop_key(&key);
        }
    }

    /// Drop the entries of every note with no write in flight or queued.
    pub fn prune_idle(&self) {
        let mut inner = self.inner();
        let idle: Vec<String> = inner
            .locks
            .iter()
            .filter(|(_, l)| Arc::strong_count(l) == 1)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &idle {
            inner.drop_key(key);
        }

        // Every queued write holds its note's lock, so unlocked entries are leftovers.
        let Inner {
            locks,
            aliases,
            generations,
            baselines,
            discarded,
            ..
        } = &mut *inner;
        generations.retain(|k, _| locks.contains_key(k));
        baselines.retain(|k, _| locks.contains_key(k));
        discarded.retain(|k| locks.contains_key(k));
        aliases.retain(|_, real| locks.contains_key(real));
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner();
        inner.locks.is_empty()
            && inner.aliases.is_empty()
            && inner.generations.is_empty()
            && inner.baselines.is_empty()
            && inner.discarded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, title: &str) -> Note {
        Note {
            id: id.to_string(),
            title: title.to_string(),
            content: String::new(),
            updated_at: 1,
        }
    }

    #[test]
    fn test_touch_counts_per_note() {
        let ledger = SyncLedger::default();
        assert_eq!(ledger.generation("a"), 0);
        assert_eq!(ledger.touch("a"), 1);
        assert_eq!(ledger.touch("a"), 2);
        assert_eq!(ledger.touch("b"), 3);
        assert_eq!(ledger.generation("a"), 2);
        assert_eq!(ledger.generation("b"), 3);
    }

    #[test]
    fn test_rebind_carries_state_to_real_id() {
        let ledger = SyncLedger::default();
        let lock = ledger.lock_for("local-1");
        ledger.touch("local-1");
        ledger.touch("local-1");
        ledger.hold_baseline(&note("local-1", "before"));

        ledger.rebind("local-1", "server_1");

        assert_eq!(ledger.canonical("local-1"), "server_1");
        assert_eq!(ledger.canonical("server_1"), "server_1");
        assert!(Arc::ptr_eq(&lock, &ledger.lock_for("server_1")));
        assert!(Arc::ptr_eq(&lock, &ledger.lock_for("local-1")));
        assert_eq!(ledger.generation("server_1"), 2);
        assert_eq!(ledger.touch("local-1"), 3);
        assert_eq!(ledger.generation("server_1"), 3);

        let baseline = ledger.take_baseline("server_1").expect("baseline moved");
        assert_eq!(baseline.id, "server_1");
        assert_eq!(baseline.title, "before");
    }

    #[test]
    fn test_baseline_keeps_oldest_until_taken() {
        let ledger = SyncLedger::default();
        ledger.hold_baseline(&note("n1", "v0"));
        ledger.hold_baseline(&note("n1", "v1"));
        assert_eq!(ledger.take_baseline("n1").map(|n| n.title), Some("v0".to_string()));
        assert_eq!(ledger.take_baseline("n1"), None);

        ledger.hold_baseline(&note("n1", "v2"));
        ledger.restore_baseline(note("n1", "v0"));
        assert_eq!(ledger.take_baseline("n1").map(|n| n.title), Some("v0".to_string()));
    }

    #[test]
    fn test_release_keeps_entries_while_writes_are_queued() {
        let ledger = SyncLedger::default();
        let first = ledger.lock_for("n1");
        let queued = ledger.lock_for("n1");
        ledger.touch("n1");

        ledger.release("n1", first);
        assert_eq!(ledger.generation("n1"), 1);

        ledger.release("n1", queued);
        assert_eq!(ledger.generation("n1"), 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_release_after_rebind_drops_alias() {
        let ledger = SyncLedger::default();
        let turn = ledger.lock_for("local-1");
        ledger.touch("local-1");
        ledger.rebind("local-1", "server_1");

        ledger.release("local-1", turn);
        assert_eq!(ledger.canonical("local-1"), "local-1");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_discarded_create_is_released() {
        let ledger = SyncLedger::default();
        let create = ledger.lock_for("local-2");
        let delete = ledger.lock_for("local-2");
        ledger.discard("local-2");

        ledger.release("local-2", create);
        assert!(ledger.is_discarded("local-2"));
        ledger.release("local-2", delete);
        assert!(!ledger.is_discarded("local-2"));
    }

    #[test]
    fn test_prune_idle_spares_busy_notes() {
        let ledger = SyncLedger::default();
        let busy = ledger.lock_for("busy");
        ledger.touch("busy");
        drop(ledger.lock_for("idle"));
        ledger.touch("idle");
        ledger.touch("never-locked");
        ledger.hold_baseline(&note("never-locked", "v0"));

        ledger.prune_idle();
        assert_eq!(ledger.generation("idle"), 0);
        assert_eq!(ledger.generation("never-locked"), 0);
        assert_eq!(ledger.take_baseline("never-locked"), None);
        assert_eq!(ledger.generation("busy"), 1);

        ledger.release("busy", busy);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_pending_creates_track_begin_and_end() {
        let ledger = SyncLedger::default();
        ledger.begin_create("local-1");
        ledger.begin_create("local-2");
        ledger.end_create("local-1");
        assert_eq!(ledger.pending_creates(), HashSet::from(["local-2".to_string()]));
    }
}
