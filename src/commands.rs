use crate::board::NoteBoard;
use crate::cli::SettingsAction;
use crate::logging;
use crate::model::{Note, NoteColor, Viewport};
use crate::palette;
use crate::settings::SettingsProvider;
use crate::storage::{init_project_store, locate_store, NoteStore, StoreLocation};
use crate::trash::{ListMode, NoteList};
use crate::ui;
use anyhow::{Context, Result};
use flexi_logger::LoggerHandle;
use std::env;
use std::path::Path;

/// Everything a command needs, opened once at startup.
pub struct Workspace {
    pub location: StoreLocation,
    pub store: NoteStore,
    pub settings: SettingsProvider,
    _logger: Option<LoggerHandle>,
}

impl Workspace {
    pub fn open(log_level: Option<&str>) -> Result<Self> {
        let cwd = env::current_dir()?;
        Workspace::open_at(&cwd, log_level)
    }

    /// Only a store that cannot be opened stops the command; logging and
    /// settings problems degrade to defaults.
    pub fn open_at(dir: &Path, log_level: Option<&str>) -> Result<Self> {
        let location = locate_store(dir)?;
        let level = log_level.unwrap_or(logging::default_log_level());
        let logger = match logging::init(level, &location.log_dir()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                eprintln!("stickies: logging disabled: {:#}", err);
                None
            }
        };
        let settings = SettingsProvider::load(location.settings_path());
        let store = NoteStore::open_file(&location.path)?;
        Ok(Workspace {
            location,
            store,
            settings,
            _logger: logger,
        })
    }

    /// Writes outstanding changes, reporting failure to the shell.
    fn finish(mut self) -> Result<()> {
        if self.store.is_dirty() {
            self.store.persist()?;
        }
        Ok(())
    }
}

pub fn init() -> Result<()> {
    let cwd = env::current_dir()?;
    let location = init_project_store(&cwd)?;
    println!("Initialized note store at {}", location.path.display());
    Ok(())
}

pub fn list(workspace: Workspace, all: bool) -> Result<()> {
    let mut list = NoteList::new();
    if all {
        list.set_mode(ListMode::All);
    }
    println!(
        "{} ({}: {})",
        list.mode().label(),
        workspace.location.scope_label(),
        workspace.location.path.display()
    );
    let entries = list.entries(&workspace.store);
    if entries.is_empty() {
        let empty = list.empty_state();
        println!("  {}", empty.title);
        println!("  {}", empty.message);
        return Ok(());
    }
    for note in entries {
        print_note(note, workspace.settings.resolve_color(note));
    }
    Ok(())
}

pub fn add(
    mut workspace: Workspace,
    title: String,
    body: Option<String>,
    color: Option<String>,
) -> Result<()> {
    let mut board = NoteBoard::new(Viewport::default());
    let store = &mut workspace.store;
    let id = board.create_note(store);
    board.set_content(store, &id, &title, body.as_deref().unwrap_or_default());
    if let Some(raw) = color {
        board.set_color(store, &id, NoteColor::normalize(&raw));
    }
    board.confirm_edit(store, &id, workspace.settings.note_size());
    workspace.finish()?;
    println!("Added note {}", id);
    Ok(())
}

pub fn trash(mut workspace: Workspace, note_id: String) -> Result<()> {
    workspace
        .store
        .soft_delete(&note_id)
        .with_context(|| format!("trashing note {}", note_id))?;
    workspace.finish()?;
    println!("Moved note {} to the trash", note_id);
    Ok(())
}

pub fn restore(mut workspace: Workspace, note_id: String) -> Result<()> {
    NoteList::new()
        .restore(&mut workspace.store, &note_id)
        .with_context(|| format!("restoring note {}", note_id))?;
    workspace.finish()?;
    println!("Restored note {}", note_id);
    Ok(())
}

pub fn delete(mut workspace: Workspace, note_id: String) -> Result<()> {
    NoteList::new()
        .permanently_delete(&mut workspace.store, &note_id)
        .with_context(|| format!("deleting note {}", note_id))?;
    workspace.finish()?;
    println!("Deleted note {}", note_id);
    Ok(())
}

pub fn clear_trash(mut workspace: Workspace) -> Result<()> {
    let removed = NoteList::new().clear_trash(&mut workspace.store);
    workspace.finish()?;
    if removed == 0 {
        println!("Trash is already empty");
    } else {
        println!("Deleted {} note(s) from the trash", removed);
    }
    Ok(())
}

pub fn settings(mut workspace: Workspace, action: Option<SettingsAction>) -> Result<()> {
    if let Some(SettingsAction::Set { key, value }) = action {
        workspace.settings.set_by_key(&key, &value)?;
    }
    println!("Settings ({})", workspace.settings.path().display());
    for (key, value) in workspace.settings.entries() {
        println!("  {}: {}", key, value);
    }
    let color = workspace.settings.note_color().key();
    println!("Assets");
    println!("  note: {}", palette::note_asset(color));
    println!("  notepad: {}", palette::notepad_asset(color));
    println!("  swatch: {}", palette::circle_asset(color));
    println!(
        "  trash: {}",
        palette::trash_asset(workspace.store.has_trash())
    );
    Ok(())
}

pub fn tui(workspace: Workspace) -> Result<()> {
    let Workspace {
        location,
        mut store,
        mut settings,
        _logger,
    } = workspace;
    ui::run(&location, &mut store, &mut settings)
}

fn print_note(note: &Note, color: NoteColor) {
    let marker = if note.trashed { " [trashed]" } else { "" };
    println!("  - {}: {}{}", note.id, note.display_title(), marker);
    if !note.body.is_empty() {
        println!("    {}", note.body.replace('\n', "\n    "));
    }
    println!(
        "    {} · added {} · at ({:.0}, {:.0})",
        color,
        note.created_at.format("%b %-d, %Y"),
        note.x,
        note.y
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn unusable_log_dir_does_not_block_the_store() {
        let dir = TempDir::new().unwrap();
        let location = init_project_store(dir.path()).unwrap();
        fs::write(location.log_dir(), "not a directory").unwrap();

        let workspace = Workspace::open_at(dir.path(), Some("info")).unwrap();
        assert!(workspace._logger.is_none());
        assert!(workspace.store.is_empty());
        assert_eq!(workspace.location.path, location.path);
    }

    #[test]
    fn unknown_log_level_does_not_block_the_store() {
        let dir = TempDir::new().unwrap();
        init_project_store(dir.path()).unwrap();

        let workspace = Workspace::open_at(dir.path(), Some("loud")).unwrap();
        assert!(workspace._logger.is_none());
    }

    #[test]
    fn unreadable_store_is_fatal() {
        let dir = TempDir::new().unwrap();
        let location = init_project_store(dir.path()).unwrap();
        fs::write(location.log_dir(), "").unwrap();
        fs::write(&location.path, "notes: [not, a, note").unwrap();

        assert!(Workspace::open_at(dir.path(), None).is_err());
    }
}
