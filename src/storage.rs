use crate::model::{generate_id, Note, NoteError, NoteId};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const STORE_DIR: &str = ".stickies";
const NOTES_FILE: &str = "notes.yml";
const SETTINGS_FILE: &str = "settings.yml";
const LOG_DIR: &str = "logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Project,
    Global,
}

#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub path: PathBuf,
    pub scope: StoreScope,
}

impl StoreLocation {
    pub fn settings_path(&self) -> PathBuf {
        self.path.with_file_name(SETTINGS_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.path.with_file_name(LOG_DIR)
    }

    pub fn scope_label(&self) -> &'static str {
        match self.scope {
            StoreScope::Project => "project",
            StoreScope::Global => "global",
        }
    }
}

pub fn init_project_store(dir: &Path) -> Result<StoreLocation> {
    let store_dir = dir.join(STORE_DIR);
    fs::create_dir_all(&store_dir).context("failed to create .stickies directory")?;
    let location = StoreLocation {
        path: store_dir.join(NOTES_FILE),
        scope: StoreScope::Project,
    };
    if !location.path.exists() {
        YamlFile::new(&location.path).save(&[])?;
    }
    Ok(location)
}

pub fn locate_store(start: &Path) -> Result<StoreLocation> {
    if let Some(project_path) = find_project_store(start) {
        return Ok(StoreLocation {
            path: project_path,
            scope: StoreScope::Project,
        });
    }
    Ok(StoreLocation {
        path: global_store_path()?,
        scope: StoreScope::Global,
    })
}

fn find_project_store(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(STORE_DIR).join(NOTES_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

fn global_store_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "stickies").context("locating data directory")?;
    Ok(dirs.data_dir().join(NOTES_FILE))
}

/// Raw persistence for the note collection.
pub trait NoteBackend {
    fn load(&self) -> Result<Vec<Note>>;
    fn save(&self, notes: &[Note]) -> Result<()>;
    fn describe(&self) -> String;
}

#[derive(Serialize, Deserialize, Default)]
struct NoteFile {
    #[serde(default)]
    notes: Vec<Note>,
}

pub struct YamlFile {
    path: PathBuf,
}

impl YamlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        YamlFile { path: path.into() }
    }
}

impl NoteBackend for YamlFile {
    fn load(&self) -> Result<Vec<Note>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data =
            fs::read_to_string(&self.path).with_context(|| format!("reading {:?}", self.path))?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: NoteFile = serde_yaml::from_str(&data).context("parsing notes file")?;
        Ok(file.notes)
    }

    fn save(&self, notes: &[Note]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
        }
        let file = NoteFile {
            notes: notes.to_vec(),
        };
        let serialized = serde_yaml::to_string(&file).context("serializing notes")?;
        // write-then-rename keeps the previous file intact if the write dies
        let tmp = self.path.with_extension("yml.tmp");
        fs::write(&tmp, serialized).with_context(|| format!("writing {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {:?}", self.path))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Created(NoteId),
    Updated(NoteId),
    Trashed(NoteId),
    Restored(NoteId),
    Deleted(NoteId),
}

type Listener = Box<dyn FnMut(&StoreEvent)>;

/// The durable note collection, kept in insertion order.
pub struct NoteStore {
    notes: Vec<Note>,
    backend: Box<dyn NoteBackend>,
    listeners: Vec<Listener>,
    dirty: bool,
    last_saved: Option<Instant>,
}

impl NoteStore {
    /// Loads every note from `backend`. A failure here is fatal to the caller.
    pub fn open(backend: Box<dyn NoteBackend>) -> Result<Self> {
        let notes = backend
            .load()
            .with_context(|| format!("opening note store {}", backend.describe()))?;
        info!(
            "event=store_open backend={} notes={}",
            backend.describe(),
            notes.len()
        );
        Ok(NoteStore {
            notes,
            backend,
            listeners: Vec::new(),
            dirty: false,
            last_saved: None,
        })
    }

    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self> {
        NoteStore::open(Box::new(YamlFile::new(path)))
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Registers a listener called once per committed mutation.
    pub fn subscribe(&mut self, listener: impl FnMut(&StoreEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: StoreEvent) {
        self.dirty = true;
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    pub fn all(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn visible(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| !n.trashed)
    }

    pub fn trashed(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| n.trashed)
    }

    pub fn has_trash(&self) -> bool {
        self.notes.iter().any(|n| n.trashed)
    }

    pub fn any_editing(&self) -> bool {
        self.notes.iter().any(|n| n.editing)
    }

    /// Highest stacking order and sequence currently held by any note.
    pub fn front_key(&self) -> (f64, u64) {
        self.notes.iter().fold((f64::MIN, 0), |(z, seq), n| {
            (z.max(n.z_order), seq.max(n.z_seq))
        })
    }

    pub fn insert(&mut self, mut note: Note) -> NoteId {
        while self.get(&note.id).is_some() {
            note.id = generate_id();
        }
        let id = note.id.clone();
        debug!("event=note_insert id={}", id);
        self.notes.push(note);
        self.emit(StoreEvent::Created(id.clone()));
        id
    }

    pub fn update<F>(&mut self, note_id: &str, f: F) -> Result<(), NoteError>
    where
        F: FnOnce(&mut Note),
    {
        let note = self
            .notes
            .iter_mut()
            .find(|n| n.id == note_id)
            .ok_or_else(|| NoteError::NotFound(note_id.to_string()))?;
        let id = note.id.clone();
        let created_at = note.created_at;
        f(note);
        // identity and creation time are immutable
        note.id = id.clone();
        note.created_at = created_at;
        self.emit(StoreEvent::Updated(id));
        Ok(())
    }

    /// Marks a note as trashed. Returns whether anything changed.
    pub fn soft_delete(&mut self, note_id: &str) -> Result<bool, NoteError> {
        self.set_trashed(note_id, true)
    }

    /// Clears the trashed flag, leaving position and size untouched.
    pub fn restore(&mut self, note_id: &str) -> Result<bool, NoteError> {
        self.set_trashed(note_id, false)
    }

    fn set_trashed(&mut self, note_id: &str, trashed: bool) -> Result<bool, NoteError> {
        let note = self
            .notes
            .iter_mut()
            .find(|n| n.id == note_id)
            .ok_or_else(|| NoteError::NotFound(note_id.to_string()))?;
        if note.trashed == trashed {
            return Ok(false);
        }
        note.trashed = trashed;
        let id = note.id.clone();
        self.emit(if trashed {
            StoreEvent::Trashed(id)
        } else {
            StoreEvent::Restored(id)
        });
        Ok(true)
    }

    pub fn remove(&mut self, note_id: &str) -> Result<Note, NoteError> {
        let idx = self
            .notes
            .iter()
            .position(|n| n.id == note_id)
            .ok_or_else(|| NoteError::NotFound(note_id.to_string()))?;
        let note = self.notes.remove(idx);
        self.emit(StoreEvent::Deleted(note.id.clone()));
        Ok(note)
    }

    /// Permanently removes every trashed note and returns their ids.
    pub fn remove_trashed(&mut self) -> Vec<NoteId> {
        let ids: Vec<NoteId> = self.trashed().map(|n| n.id.clone()).collect();
        for id in &ids {
            if let Err(err) = self.remove(id) {
                debug!("event=remove_trashed_skip error={}", err);
            }
        }
        ids
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_saved(&self) -> Option<Instant> {
        self.last_saved
    }

    pub fn persist(&mut self) -> Result<()> {
        self.backend
            .save(&self.notes)
            .with_context(|| format!("saving notes to {}", self.backend.describe()))?;
        self.dirty = false;
        self.last_saved = Some(Instant::now());
        Ok(())
    }

    /// Saves without surfacing failures. Unsaved changes stay in memory and
    /// go out with the next successful save.
    pub fn save_best_effort(&mut self) -> bool {
        match self.persist() {
            Ok(()) => true,
            Err(err) => {
                warn!("event=save_failed notes={} error={:#}", self.notes.len(), err);
                false
            }
        }
    }
}

#[cfg(test)]
pub use memory::MemoryBackend;


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Point, Size};
    use chrono::Utc;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn note(id: &str) -> Note {
        Note::new(
            id.into(),
            Point::new(10.0, 20.0),
            format!("note {}", id),
            "body",
            Size::square(120.0),
            Utc::now(),
        )
    }

    fn store_with(ids: &[&str]) -> (NoteStore, MemoryBackend) {
        let backend = MemoryBackend::with_notes(ids.iter().map(|id| note(id)).collect());
        let store = NoteStore::open(Box::new(backend.clone())).unwrap();
        (store, backend)
    }

    #[test]
    fn yaml_file_persists_notes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.yml");
        let mut store = NoteStore::open_file(&path).unwrap();
        assert!(store.is_empty());
        store.insert(note("b"));
        store.insert(note("a"));
        store.soft_delete("a").unwrap();
        store.persist().unwrap();
        assert!(!path.with_extension("yml.tmp").exists());

        let reopened = NoteStore::open_file(&path).unwrap();
        let ids: Vec<&str> = reopened.all().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(reopened.get("a").unwrap().trashed);
    }

    #[test]
    fn corrupt_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.yml");
        fs::write(&path, "notes: [this is: not a note").unwrap();
        assert!(NoteStore::open_file(&path).is_err());
    }

    #[test]
    fn init_creates_project_store_found_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let location = init_project_store(dir.path()).unwrap();
        assert!(location.path.exists());
        assert_eq!(location.settings_path(), dir.path().join(".stickies/settings.yml"));

        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let found = locate_store(&nested).unwrap();
        assert_eq!(found.scope, StoreScope::Project);
        assert_eq!(found.path, location.path);
    }

    #[test]
    fn insert_regenerates_colliding_ids() {
        let (mut store, _) = store_with(&["a"]);
        let id = store.insert(note("a"));
        assert_ne!(id, "a");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn update_keeps_identity() {
        let (mut store, _) = store_with(&["a"]);
        let created = store.get("a").unwrap().created_at;
        store
            .update("a", |n| {
                n.id = "hijacked".into();
                n.created_at = Utc::now() + chrono::Duration::days(1);
                n.title = "renamed".into();
            })
            .unwrap();
        let n = store.get("a").unwrap();
        assert_eq!(n.title, "renamed");
        assert_eq!(n.created_at, created);
        assert_eq!(
            store.update("missing", |_| {}),
            Err(NoteError::NotFound("missing".into()))
        );
    }

    #[test]
    fn restore_on_active_note_is_a_noop() {
        let (mut store, _) = store_with(&["a"]);
        let before = store.get("a").unwrap().clone();
        assert_eq!(store.restore("a"), Ok(false));
        assert_eq!(store.get("a").unwrap(), &before);
        assert!(!store.is_dirty());
    }

    #[test]
    fn remove_trashed_keeps_active_notes() {
        let (mut store, _) = store_with(&["a", "b", "c", "d", "e"]);
        for id in ["a", "c", "e"] {
            store.soft_delete(id).unwrap();
        }
        let removed = store.remove_trashed();
        assert_eq!(removed, vec!["a", "c", "e"]);
        let ids: Vec<&str> = store.all().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
        assert!(!store.has_trash());
    }

    #[test]
    fn listeners_see_one_event_per_mutation() {
        let (mut store, _) = store_with(&["a"]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        store.update("a", |n| n.x = 5.0).unwrap();
        store.soft_delete("a").unwrap();
        store.soft_delete("a").unwrap();
        store.restore("a").unwrap();
        store.remove("a").unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                StoreEvent::Updated("a".into()),
                StoreEvent::Trashed("a".into()),
                StoreEvent::Restored("a".into()),
                StoreEvent::Deleted("a".into()),
            ]
        );
    }

    #[test]
    fn failed_save_is_retried_by_the_next_one() {
        let (mut store, backend) = store_with(&["a"]);
        backend.set_fail_writes(true);
        store.update("a", |n| n.title = "kept".into()).unwrap();
        assert!(!store.save_best_effort());
        assert!(store.is_dirty());
        assert_eq!(backend.saved()[0].title, "note a");

        backend.set_fail_writes(false);
        store.update("a", |n| n.body = "later".into()).unwrap();
        assert!(store.save_best_effort());
        assert!(!store.is_dirty());
        let saved = &backend.saved()[0];
        assert_eq!(saved.title, "kept");
        assert_eq!(saved.body, "later");
        assert!(store.last_saved().is_some());
    }

    #[test]
    fn front_key_covers_all_notes() {
        let (mut store, _) = store_with(&["a", "b"]);
        store
            .update("a", |n| {
                n.z_order = 3.0;
                n.z_seq = 1;
            })
            .unwrap();
        store
            .update("b", |n| {
                n.z_order = 2.0;
                n.z_seq = 7;
            })
            .unwrap();
        assert_eq!(store.front_key(), (3.0, 7));
    }
}
