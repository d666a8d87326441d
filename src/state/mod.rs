pub(crate) mod ledger;
pub(crate) mod note_sync;

use crate::config::EnvConfig;
use crate::models::{most_recent, sort_recent_first, Note};

pub(crate) use note_sync::{NotesController, SyncTiming};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Phase {
    #[default]
    Loading,
    Ready,
    Error,
}

/// Short-lived message. `id` lets an expiry timer tell its own notice from a newer one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Notice {
    pub id: u64,
    pub message: String,
}

/// Everything the view reads. Replaced in one `update` per controller mutation.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct SyncState {
    pub phase: Phase,
    /// Only set while `phase` is `Error`.
    pub error_message: Option<String>,
    /// Working set; order is not meaningful.
    pub notes: Vec<Note>,
    pub selected_id: Option<String>,
    pub is_offline_mode: bool,
    pub notice: Option<Notice>,
}

impl SyncState {
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn note_mut(&mut self, id: &str) -> Option<&mut Note> {
        self.notes.iter_mut().find(|n| n.id == id)
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.selected_id.as_deref().and_then(|id| self.note(id))
    }

    /// Notes for display, most recently updated first.
    pub fn sorted_notes(&self) -> Vec<Note> {
        let mut notes = self.notes.clone();
        sort_recent_first(&mut notes);
        notes
    }

    /// Keep the selection pointing at an existing note while ready: a missing selection
    /// moves to the most recent note, or to none when the set is empty.
    pub fn ensure_selection(&mut self) {
        if !self.is_ready() {
            return;
        }
        if self.selected_note().is_some() {
            return;
        }
        self.selected_id = most_recent(&self.notes).map(|n| n.id.clone());
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub notes: NotesController,
    pub config: EnvConfig,
}

#[derive(Clone)]
pub(crate) struct AppContext(pub AppState);
