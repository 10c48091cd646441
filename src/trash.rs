use crate::model::{Note, NoteError};
use crate::storage::NoteStore;
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMode {
    #[default]
    Trashed,
    All,
}

impl ListMode {
    pub fn label(&self) -> &'static str {
        match self {
            ListMode::Trashed => "Deleted Notes",
            ListMode::All => "All Notes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyState {
    pub title: &'static str,
    pub message: &'static str,
}

/// Filtered views over the store plus the restore/delete commands.
#[derive(Debug, Default)]
pub struct NoteList {
    mode: ListMode,
}

impl NoteList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ListMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ListMode) {
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            ListMode::Trashed => ListMode::All,
            ListMode::All => ListMode::Trashed,
        };
    }

    /// Notes for the current mode in store insertion order.
    pub fn entries<'a>(&self, store: &'a NoteStore) -> Vec<&'a Note> {
        match self.mode {
            ListMode::Trashed => store.trashed().collect(),
            ListMode::All => store.all().iter().collect(),
        }
    }

    pub fn empty_state(&self) -> EmptyState {
        match self.mode {
            ListMode::Trashed => EmptyState {
                title: "No Deleted Notes",
                message: "Drag notes to the trash to see them here.",
            },
            ListMode::All => EmptyState {
                title: "No Notes",
                message: "Create a new note to get started.",
            },
        }
    }

    /// Brings a note back to the board at its last position.
    pub fn restore(&self, store: &mut NoteStore, note_id: &str) -> Result<(), NoteError> {
        if store.restore(note_id)? {
            info!("event=note_restored id={}", note_id);
            store.save_best_effort();
        }
        Ok(())
    }

    pub fn permanently_delete(&self, store: &mut NoteStore, note_id: &str) -> Result<(), NoteError> {
        store.remove(note_id)?;
        info!("event=note_deleted id={}", note_id);
        store.save_best_effort();
        Ok(())
    }

    pub fn clear_trash_enabled(&self, store: &NoteStore) -> bool {
        store.has_trash()
    }

    /// Deletes every trashed note. Returns how many were removed.
    pub fn clear_trash(&self, store: &mut NoteStore) -> usize {
        if !self.clear_trash_enabled(store) {
            return 0;
        }
        let removed = store.remove_trashed();
        info!("event=trash_cleared count={}", removed.len());
        store.save_best_effort();
        removed.len()
    }
}
