use crate::api::{ApiClient, ApiError, ApiErrorKind, CancelToken};
use crate::config::{DEFAULT_AUTOSAVE_MS, DEFAULT_NOTICE_MS};
use crate::models::{seed_notes, Note, NotePatch};
use crate::runtime::Runtime;
use crate::state::ledger::SyncLedger;
use crate::state::{Notice, Phase, SyncState};
use futures::future::{AbortHandle, Abortable};
use futures::lock::Mutex as AsyncMutex;
use futures::FutureExt;
use leptos::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) const LOAD_OFFLINE_NOTICE: &str = "Backend unavailable. Working in local mode.";
pub(crate) const STILL_OFFLINE_NOTICE: &str = "Backend still unavailable. Changes stay local.";
pub(crate) const WENT_OFFLINE_NOTICE: &str = "Backend unavailable. Switched to local mode.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
enum LoadKind {
    Initial,
    Retry,
}

type NoteLock = Arc<AsyncMutex<()>>;

/// Delays used by [`NotesController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SyncTiming {
    /// How long a notice stays up.
    pub notice_ms: u32,
    /// Quiet period after the last edit of a note before it is pushed.
    pub autosave_ms: u32,
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            notice_ms: DEFAULT_NOTICE_MS,
            autosave_ms: DEFAULT_AUTOSAVE_MS,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Optimistic sync controller for the notes working set.
///
/// Every command mutates local state first (one signal update), then pushes the change to the
/// backend in a spawned task:
/// - success reconciles the note with the backend's copy
/// - an unreachable backend switches to local mode (sticky until a list succeeds)
/// - any other failure rolls the change back and raises a notice
///
/// Remote writes for one note are serialized through [`SyncLedger`]; writes for different
/// notes overlap freely.
#[derive(Clone)]
pub(crate) struct NotesController {
    state: RwSignal<SyncState>,
    client: ApiClient,
    runtime: Arc<dyn Runtime>,
    ledger: SyncLedger,

    notice_ms: u32,
    notice_seq: Arc<AtomicU64>,
    notice_timer: Arc<Mutex<Option<AbortHandle>>>,

    /// Per-note debounce timers, tagged with the generation they will push.
    autosave_ms: u32,
    autosave_timers: Arc<Mutex<HashMap<String, (u64, AbortHandle)>>>,

    /// Cancels the list request in flight (initial load or retry).
    load_token: Arc<Mutex<Option<CancelToken>>>,
}

impl NotesController {
    pub fn new(client: ApiClient, runtime: Arc<dyn Runtime>, timing: SyncTiming) -> Self {
        Self {
            state: RwSignal::new(SyncState::default()),
            client,
            runtime,
            ledger: SyncLedger::default(),
            notice_ms: timing.notice_ms,
            notice_seq: Arc::new(AtomicU64::new(0)),
            notice_timer: Arc::new(Mutex::new(None)),
            autosave_ms: timing.autosave_ms,
            autosave_timers: Arc::new(Mutex::new(HashMap::new())),
            load_token: Arc::new(Mutex::new(None)),
        }
    }

    /// Reactive handle for views.
    pub fn state(&self) -> RwSignal<SyncState> {
        self.state
    }

    pub fn snapshot(&self) -> SyncState {
        self.read(SyncState::clone).unwrap_or_default()
    }

    // Signal access tolerates a disposed owner: tasks may resolve after unmount.
    fn read<R>(&self, f: impl FnOnce(&SyncState) -> R) -> Option<R> {
        self.state.try_with_untracked(f)
    }

    fn write<R>(&self, f: impl FnOnce(&mut SyncState) -> R) -> Option<R> {
        self.state.try_update(f)
    }

    fn is_offline(&self) -> bool {
        self.read(|s| s.is_offline_mode).unwrap_or(true)
    }

    fn spawn(&self, task: impl std::future::Future<Output = ()> + 'static) {
        self.runtime.spawn(task.boxed_local());
    }

    /// Initial load.
    pub fn start(&self) {
        self.write(|s| {
            s.phase = Phase::Loading;
            s.error_message = None;
        });
        self.load(LoadKind::Initial);
    }

    /// Re-run the list: recovers from the error phase, or re-probes while offline.
    pub fn retry(&self) {
        let Some(phase) = self.read(|s| s.phase) else {
            return;
        };
        match phase {
            Phase::Loading => return,
            Phase::Error => {
                self.write(|s| {
                    s.phase = Phase::Loading;
                    s.error_message = None;
                });
            }
            Phase::Ready => {}
        }
        self.load(LoadKind::Retry);
    }

    fn load(&self, kind: LoadKind) {
        let token = CancelToken::new();
        if let Some(previous) = lock(&self.load_token).replace(token.clone()) {
            previous.cancel();
        }

        log::debug!("event=notes_load module=note_sync status=start kind={kind}");
        let this = self.clone();
        self.spawn(async move { this.run_load(kind, token).await });
    }

    async fn run_load(self, kind: LoadKind, token: CancelToken) {
        let result = self.client.list_notes(Some(&token)).await;
        if token.is_cancelled() {
            log::debug!("event=notes_load module=note_sync status=cancelled kind={kind}");
            return;
        }

        match result {
            Ok(notes) => {
                let notes = dedupe_by_id(notes);
                let count = notes.len();
                // Creates still in flight are not in the list yet; keep them so they reconcile.
                let pending = self.ledger.pending_creates();
                self.write(|s| {
                    let in_flight: Vec<Note> = std::mem::take(&mut s.notes)
                        .into_iter()
                        .filter(|n| pending.contains(&n.id))
                        .collect();
                    s.notes = notes;
                    s.notes.extend(in_flight);
                    s.phase = Phase::Ready;
                    s.error_message = None;
                    s.is_offline_mode = false;
                    s.ensure_selection();
                });
                self.ledger.prune_idle();
                log::info!("event=notes_load module=note_sync status=ready kind={kind} count={count}");
            }
            Err(e) if e.is_cancelled() => {
                log::debug!("event=notes_load module=note_sync status=cancelled kind={kind}");
            }
            Err(e) if e.kind == ApiErrorKind::Unavailable => {
                let now = self.runtime.now_ms();
                self.write(|s| {
                    s.phase = Phase::Ready;
                    s.error_message = None;
                    s.is_offline_mode = true;
                    if s.notes.is_empty() {
                        s.notes = seed_notes(now);
                    }
                    s.ensure_selection();
                });
                log::warn!("event=notes_load module=note_sync status=offline kind={kind}");
                self.show_notice(match kind {
                    LoadKind::Initial => LOAD_OFFLINE_NOTICE,
                    LoadKind::Retry => STILL_OFFLINE_NOTICE,
                });
            }
            Err(e) => {
                log::warn!(
                    "event=notes_load module=note_sync status=error kind={kind} http_status={:?}",
                    e.status
                );
                self.write(|s| {
                    s.phase = Phase::Error;
                    s.error_message = Some(e.message);
                });
            }
        }
    }

    pub fn select_note(&self, id: &str) {
        self.write(|s| {
            if s.note(id).is_some() {
                s.selected_id = Some(id.to_string());
            }
        });
    }

    /// Insert an empty note, select it and push it to the backend.
    /// Returns the note's client-side id, or `None` when not ready.
    pub fn create_note(&self) -> Option<String> {
        let note = Note::create(NotePatch::default(), self.runtime.now_ms());
        let temp_id = note.id.clone();

        let offline = self
            .write(|s| {
                if !s.is_ready() {
                    return None;
                }
                s.notes.push(note);
                s.selected_id = Some(temp_id.clone());
                Some(s.is_offline_mode)
            })
            .flatten()?;

        log::debug!("event=note_create module=note_sync status=local offline={offline}");
        if !offline {
            let turn = self.ledger.lock_for(&temp_id);
            let generation = self.ledger.touch(&temp_id);
            self.ledger.begin_create(&temp_id);
            let this = self.clone();
            let id = temp_id.clone();
            self.spawn(async move { this.push_create(id, generation, turn).await });
        }
        Some(temp_id)
    }

    async fn push_create(self, temp_id: String, generation: u64, turn: NoteLock) {
        let guard = turn.lock().await;
        self.send_create(&temp_id, generation).await;
        self.ledger.end_create(&temp_id);
        drop(guard);
        self.ledger.release(&temp_id, turn);
    }

    async fn send_create(&self, temp_id: &str, generation: u64) {
        let Some(payload) = self.read(|s| s.note(temp_id).map(Note::payload)).flatten() else {
            // Deleted before it was sent: nothing exists remotely.
            self.ledger.discard(temp_id);
            return;
        };
        if self.is_offline() {
            return;
        }

        match self.client.create_note(&payload, None).await {
            Ok(remote) => {
                self.ledger.rebind(temp_id, &remote.id);
                // Local edits made while the create was in flight win over the echo.
                let superseded = self.ledger.generation(&remote.id) != generation;
                self.write(|s| {
                    if remote.id != temp_id && s.note(&remote.id).is_some() {
                        s.notes.retain(|n| n.id != temp_id);
                    } else if let Some(local) = s.note_mut(temp_id) {
                        if superseded {
                            local.id = remote.id.clone();
                        } else {
                            *local = remote.clone();
                        }
                    }
                    if s.selected_id.as_deref() == Some(temp_id) {
                        s.selected_id = Some(remote.id.clone());
                    }
                    s.ensure_selection();
                });
                log::info!("event=note_create module=note_sync status=synced superseded={superseded}");
            }
            Err(e) => {
                if self.should_roll_back("create", &e) {
                    self.ledger.discard(temp_id);
                    self.write(|s| {
                        s.notes.retain(|n| n.id != temp_id);
                        s.ensure_selection();
                    });
                    self.show_notice(format!("Could not create note: {e}"));
                }
            }
        }
    }

    /// Apply `patch` locally right away; the remote write follows once edits pause.
    pub fn update_note(&self, id: &str, patch: NotePatch) {
        if patch.is_empty() {
            return;
        }
        let now = self.runtime.now_ms();

        let Some((prior, offline)) = self
            .write(|s| {
                if !s.is_ready() {
                    return None;
                }
                let offline = s.is_offline_mode;
                let note = s.note_mut(id)?;
                let prior = note.clone();
                note.apply(&patch, now);
                Some((prior, offline))
            })
            .flatten()
        else {
            return;
        };

        if offline {
            return;
        }
        self.ledger.hold_baseline(&prior);
        let generation = self.ledger.touch(id);
        self.schedule_autosave(id, generation);
    }

    /// (Re)arm the note's autosave timer. Only the last edit of a burst reaches the backend.
    fn schedule_autosave(&self, id: &str, generation: u64) {
        let key = self.ledger.canonical(id);
        let (handle, registration) = AbortHandle::new_pair();
        if let Some((_, previous)) = lock(&self.autosave_timers).insert(key.clone(), (generation, handle)) {
            previous.abort();
        }

        // Taken now so the ledger sees the pending write while the timer runs.
        let turn = self.ledger.lock_for(id);
        let delay = Abortable::new(self.runtime.sleep(self.autosave_ms), registration);
        let this = self.clone();
        let id = id.to_string();
        self.spawn(async move {
            let fired = delay.await.is_ok();
            {
                let mut timers = lock(&this.autosave_timers);
                if timers.get(&key).is_some_and(|(g, _)| *g == generation) {
                    timers.remove(&key);
                }
            }
            if fired {
                this.push_update(id, generation, turn).await;
            } else {
                this.ledger.release(&id, turn);
            }
        });
    }

    fn cancel_autosave(&self, id: &str) {
        let key = self.ledger.canonical(id);
        if let Some((_, timer)) = lock(&self.autosave_timers).remove(&key) {
            timer.abort();
        }
    }

    async fn push_update(self, id: String, generation: u64, turn: NoteLock) {
        let guard = turn.lock().await;
        self.send_update(&id, generation).await;
        drop(guard);
        self.ledger.release(&id, turn);
    }

    async fn send_update(&self, id: &str, generation: u64) {
        if self.ledger.generation(id) != generation {
            // A newer write for this note is queued and will send the latest fields.
            log::debug!("event=note_update module=note_sync status=coalesced");
            return;
        }

        let remote_id = self.ledger.canonical(id);
        let baseline = self.ledger.take_baseline(&remote_id);
        if self.ledger.is_discarded(&remote_id) || self.is_offline() {
            return;
        }
        let Some(payload) = self.read(|s| s.note(&remote_id).map(Note::payload)).flatten() else {
            return;
        };

        match self.client.update_note(&remote_id, &payload, None).await {
            Ok(remote) => {
                if self.ledger.generation(&remote_id) == generation {
                    self.write(|s| {
                        if let Some(local) = s.note_mut(&remote_id) {
                            local.title = remote.title;
                            local.content = remote.content;
                            local.updated_at = remote.updated_at;
                        }
                    });
                }
                log::debug!("event=note_update module=note_sync status=synced");
            }
            Err(e) => {
                if !self.should_roll_back("update", &e) {
                    return;
                }
                if let Some(baseline) = baseline {
                    if self.ledger.generation(&remote_id) == generation {
                        self.write(|s| {
                            if let Some(local) = s.note_mut(&remote_id) {
                                local.title = baseline.title;
                                local.content = baseline.content;
                                local.updated_at = baseline.updated_at;
                            }
                        });
                    } else {
                        // Newer edits stay visible; the next write rolls back this far.
                        self.ledger.restore_baseline(baseline);
                    }
                }
                self.show_notice(format!("Could not save note: {e}"));
            }
        }
    }

    pub fn delete_note(&self, id: &str) {
        let Some((removed, index, offline)) = self
            .write(|s| {
                if !s.is_ready() {
                    return None;
                }
                let index = s.notes.iter().position(|n| n.id == id)?;
                let removed = s.notes.remove(index);
                s.ensure_selection();
                Some((removed, index, s.is_offline_mode))
            })
            .flatten()
        else {
            return;
        };

        log::debug!("event=note_delete module=note_sync status=local offline={offline}");
        self.cancel_autosave(id);
        if offline {
            return;
        }
        let turn = self.ledger.lock_for(id);
        self.ledger.touch(id);
        let this = self.clone();
        self.spawn(async move { this.push_delete(removed, index, turn).await });
    }

    async fn push_delete(self, removed: Note, index: usize, turn: NoteLock) {
        let guard = turn.lock().await;
        let id = removed.id.clone();
        self.send_delete(removed, index).await;
        drop(guard);
        self.ledger.release(&id, turn);
    }

    async fn send_delete(&self, removed: Note, index: usize) {
        if self.ledger.is_discarded(&removed.id) || self.is_offline() {
            return;
        }
        let remote_id = self.ledger.canonical(&removed.id);

        match self.client.delete_note(&remote_id, None).await {
            Ok(()) => {
                log::debug!("event=note_delete module=note_sync status=synced");
            }
            Err(e) => {
                if !self.should_roll_back("delete", &e) {
                    return;
                }
                let restored = Note {
                    id: remote_id,
                    ..removed
                };
                self.write(|s| {
                    if s.note(&restored.id).is_none() {
                        let at = index.min(s.notes.len());
                        s.notes.insert(at, restored);
                    }
                    s.ensure_selection();
                });
                self.show_notice(format!("Could not delete note: {e}"));
            }
        }
    }

    /// Failure policy shared by create/update/delete. `true` means the caller rolls back.
    fn should_roll_back(&self, op: &str, e: &ApiError) -> bool {
        if e.is_cancelled() {
            log::debug!("event=note_{op} module=note_sync status=cancelled");
            return false;
        }
        if e.kind == ApiErrorKind::Unavailable {
            log::warn!("event=note_{op} module=note_sync status=offline");
            self.enter_offline();
            return false;
        }
        log::warn!(
            "event=note_{op} module=note_sync status=rolled_back kind={:?} http_status={:?}",
            e.kind,
            e.status
        );
        true
    }

    /// Flip to local mode; the notice is raised once per transition.
    fn enter_offline(&self) {
        let was_offline = self
            .write(|s| std::mem::replace(&mut s.is_offline_mode, true))
            .unwrap_or(true);
        if !was_offline {
            self.show_notice(WENT_OFFLINE_NOTICE);
        }
    }

    /// Show `message` and (re)arm its expiry timer. An expiry only clears its own notice.
    fn show_notice(&self, message: impl Into<String>) {
        let id = self.notice_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let message = message.into();
        self.write(|s| s.notice = Some(Notice { id, message }));

        let (handle, registration) = AbortHandle::new_pair();
        if let Some(previous) = lock(&self.notice_timer).replace(handle) {
            previous.abort();
        }

        let expiry = Abortable::new(self.runtime.sleep(self.notice_ms), registration);
        let this = self.clone();
        self.spawn(async move {
            if expiry.await.is_ok() {
                this.write(|s| {
                    if s.notice.as_ref().is_some_and(|n| n.id == id) {
                        s.notice = None;
                    }
                });
            }
        });
    }

    pub fn dismiss_notice(&self) {
        if let Some(timer) = lock(&self.notice_timer).take() {
            timer.abort();
        }
        self.write(|s| s.notice = None);
    }

    /// Teardown: cancels the list in flight, the notice timer and pending autosaves.
    pub fn dispose(&self) {
        if let Some(token) = lock(&self.load_token).take() {
            token.cancel();
        }
        if let Some(timer) = lock(&self.notice_timer).take() {
            timer.abort();
        }
        for (_, (_, timer)) in lock(&self.autosave_timers).drain() {
            timer.abort();
        }
        log::debug!("event=controller_dispose module=note_sync status=ok");
    }
}

/// Keep the first occurrence of each id.
fn dedupe_by_id(notes: Vec<Note>) -> Vec<Note> {
    let mut seen = HashSet::new();
    notes
        .into_iter()
        .filter(|n| seen.insert(n.id.clone()))
        .collect()
}
