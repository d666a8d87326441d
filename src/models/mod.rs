use crate::util::new_local_id;
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

pub(crate) const UNTITLED_NOTE: &str = "Untitled note";

const DISPLAY_TITLE_MAX_CHARS: usize = 40;

/// A short text note.
///
/// Wire form is camelCase JSON (`{id, title, content, updatedAt}`). Only `id` is required;
/// the backend may omit empty fields.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Note {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Epoch milliseconds of the last mutation.
    #[serde(default)]
    pub updated_at: i64,
}

/// Partial note fields, used both for creating and for patching.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NotePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(content.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// Request body for create/update.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct NotePayload {
    pub title: String,
    pub content: String,
}

impl Note {
    /// New note with a fresh client-side id.
    pub fn create(partial: NotePatch, now_ms: i64) -> Self {
        Self {
            id: new_local_id(now_ms),
            title: partial.title.unwrap_or_default(),
            content: partial.content.unwrap_or_default(),
            updated_at: now_ms,
        }
    }

    /// Apply a patch in place. `updated_at` never moves backwards.
    pub fn apply(&mut self, patch: &NotePatch, now_ms: i64) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        self.updated_at = now_ms.max(self.updated_at);
    }

    pub fn payload(&self) -> NotePayload {
        NotePayload {
            title: self.title.clone(),
            content: self.content.clone(),
        }
    }

    /// Title for lists: trimmed title, else the first non-empty content line (40 chars max),
    /// else a placeholder. Never empty.
    pub fn display_title(&self) -> String {
        let title = self.title.trim();
        if !title.is_empty() {
            return title.to_string();
        }

        self.content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| line.chars().take(DISPLAY_TITLE_MAX_CHARS).collect())
            .unwrap_or_else(|| UNTITLED_NOTE.to_string())
    }
}

/// Human-readable local time for an epoch-ms timestamp. Empty string when out of range.
pub(crate) fn format_timestamp(updated_at: i64) -> String {
    match Local.timestamp_millis_opt(updated_at).single() {
        Some(dt) => dt.format("%b %-d, %Y %H:%M").to_string(),
        None => String::new(),
    }
}

/// Stable sort, most recently updated first.
pub(crate) fn sort_recent_first(notes: &mut [Note]) {
    notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// The note with the greatest `updated_at`; the earliest in slice order wins ties.
pub(crate) fn most_recent(notes: &[Note]) -> Option<&Note> {
    notes.iter().fold(None, |best: Option<&Note>, n| match best {
        Some(b) if b.updated_at >= n.updated_at => Some(b),
        _ => Some(n),
    })
}

/// Content shown when the backend cannot be reached on first load.
pub(crate) fn seed_notes(now_ms: i64) -> Vec<Note> {
    vec![
        Note {
            id: "local-welcome".to_string(),
            title: "Welcome".to_string(),
            content: "The notes backend is unreachable, so you are in local mode.\n\
                      Edits stay in memory until the page is closed."
                .to_string(),
            updated_at: now_ms,
        },
        Note {
            id: "local-tip".to_string(),
            title: "Tip".to_string(),
            content: "Notes are listed most recent first. Leave the title empty and the \
                      first line of the content is shown instead."
                .to_string(),
            updated_at: now_ms - 1,
        },
    ]
}
