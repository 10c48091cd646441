//! Interaction core of the note board.
//!
//! Turns pointer gestures and taps into committed note changes. A drag keeps
//! only transient state (origin, candidate position, hover) until it ends;
//! the end of a drag commits position, stacking order and the trashed flag in
//! a single save. Saves are best-effort and never interrupt interaction.

use crate::model::{
    generate_id, Note, NoteColor, NoteId, Point, Size, SizeTier, Translation, Viewport, DEFAULT_BODY,
    DEFAULT_TITLE, EDITING_SIZE,
};
use crate::storage::NoteStore;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

const HOVER_OPACITY: f32 = 0.80;
const HOVER_SCALE: f32 = 0.95;
const LIFTED_SCALE: f32 = 1.05;
const TRASH_HOVER_SCALE: f32 = 1.25;
const MAX_TILT_DEGREES: f32 = 5.0;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

fn stacking_value(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Shared "a note is hovering over the trash" flag, written by the dragging
/// note and read by the trash indicator.
#[derive(Clone, Default)]
pub struct TrashHover(Rc<Cell<bool>>);

impl TrashHover {
    pub fn get(&self) -> bool {
        self.0.get()
    }

    fn set(&self, hovering: bool) {
        self.0.set(hovering);
    }

    /// Scale applied to the trash indicator.
    pub fn indicator_scale(&self) -> f32 {
        if self.get() {
            TRASH_HOVER_SCALE
        } else {
            1.0
        }
    }
}

/// Transient visual parameters for a note under the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragFeedback {
    pub candidate: Point,
    pub over_trash: bool,
    pub opacity: f32,
    pub scale: f32,
}

impl DragFeedback {
    fn at(candidate: Point, over_trash: bool) -> Self {
        DragFeedback {
            candidate,
            over_trash,
            opacity: if over_trash { HOVER_OPACITY } else { 1.0 },
            scale: if over_trash { HOVER_SCALE } else { LIFTED_SCALE },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropOutcome {
    pub position: Point,
    pub trashed: bool,
}

struct DragSession {
    origin: Point,
    feedback: DragFeedback,
}

pub struct NoteBoard {
    viewport: Viewport,
    drags: HashMap<NoteId, DragSession>,
    tilts: HashMap<NoteId, f32>,
    hover: TrashHover,
    clock: Box<dyn Clock>,
}

impl NoteBoard {
    pub fn new(viewport: Viewport) -> Self {
        NoteBoard::with_clock(viewport, Box::new(SystemClock))
    }

    pub fn with_clock(viewport: Viewport, clock: Box<dyn Clock>) -> Self {
        NoteBoard {
            viewport,
            drags: HashMap::new(),
            tilts: HashMap::new(),
            hover: TrashHover::default(),
            clock,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn trash_hover(&self) -> TrashHover {
        self.hover.clone()
    }

    /// Creates a note that opens straight into its editor.
    pub fn create_note(&mut self, store: &mut NoteStore) -> NoteId {
        let now = self.clock.now();
        let mut note = Note::new(
            generate_id(),
            self.viewport.new_note_position(),
            DEFAULT_TITLE,
            DEFAULT_BODY,
            EDITING_SIZE,
            now,
        );
        note.editing = true;
        (note.z_order, note.z_seq) = self.front_slot(store);
        let id = store.insert(note);
        info!("event=note_created id={}", id);
        store.save_best_effort();
        id
    }

    /// Raises a note above every other note.
    pub fn bring_to_front(&self, store: &mut NoteStore, note_id: &str) {
        let (z_order, z_seq) = self.front_slot(store);
        let result = store.update(note_id, |note| {
            note.z_order = z_order;
            note.z_seq = z_seq;
        });
        if let Err(err) = result {
            debug!("event=bring_to_front_skipped error={}", err);
        }
    }

    /// Stacking key strictly in front of every stored note.
    fn front_slot(&self, store: &NoteStore) -> (f64, u64) {
        let (front, seq) = store.front_key();
        let now = stacking_value(self.clock.now());
        (now.max(front), seq.saturating_add(1))
    }

    /// Handles a movement update. `translation` is cumulative since the
    /// gesture started. Returns `None` for notes that cannot be dragged.
    pub fn drag_changed(
        &mut self,
        store: &mut NoteStore,
        note_id: &str,
        translation: Translation,
    ) -> Option<DragFeedback> {
        if !self.drags.contains_key(note_id) {
            let origin = draggable(store, note_id)?.position();
            self.bring_to_front(store, note_id);
            debug!("event=drag_start id={} x={} y={}", note_id, origin.x, origin.y);
            self.drags.insert(
                note_id.to_string(),
                DragSession {
                    origin,
                    feedback: DragFeedback::at(origin, false),
                },
            );
        }
        let viewport = self.viewport;
        let session = self.drags.get_mut(note_id)?;
        let candidate = session.origin.translated(translation);
        session.feedback = DragFeedback::at(candidate, viewport.trash_zone_contains(candidate));
        let feedback = session.feedback;
        self.hover.set(feedback.over_trash);
        Some(feedback)
    }

    /// Commits a finished drag. The trash test is re-evaluated against the
    /// final translation rather than the last update.
    pub fn drag_ended(
        &mut self,
        store: &mut NoteStore,
        note_id: &str,
        translation: Translation,
    ) -> Option<DropOutcome> {
        let origin = match self.drags.remove(note_id) {
            Some(session) => session.origin,
            None => draggable(store, note_id)?.position(),
        };
        self.hover.set(false);

        let position = origin.translated(translation);
        let trashed = self.viewport.trash_zone_contains(position);
        let (z_order, z_seq) = self.front_slot(store);
        store
            .update(note_id, |note| {
                note.set_position(position);
                note.z_order = z_order;
                note.z_seq = z_seq;
            })
            .ok()?;
        if trashed {
            store.soft_delete(note_id).ok()?;
            self.tilts.remove(note_id);
            info!("event=note_trashed id={}", note_id);
        }
        debug!(
            "event=drag_end id={} x={} y={} trashed={}",
            note_id, position.x, position.y, trashed
        );
        store.save_best_effort();
        Some(DropOutcome { position, trashed })
    }

    pub fn is_dragging(&self, note_id: &str) -> bool {
        self.drags.contains_key(note_id)
    }

    pub fn drag_feedback(&self, note_id: &str) -> Option<DragFeedback> {
        self.drags.get(note_id).map(|s| s.feedback)
    }

    /// Drops an in-flight drag without committing anything.
    pub fn cancel_drag(&mut self, note_id: &str) {
        if self.drags.remove(note_id).is_some() {
            self.hover.set(false);
        }
    }

    /// Opens the editor on a resting note. Returns whether it did.
    pub fn tap(&mut self, store: &mut NoteStore, note_id: &str) -> bool {
        if draggable(store, note_id).is_none() {
            return false;
        }
        let (z_order, z_seq) = self.front_slot(store);
        let result = store.update(note_id, |note| {
            note.editing = true;
            note.set_size(EDITING_SIZE);
            note.z_order = z_order;
            note.z_seq = z_seq;
        });
        if result.is_err() {
            return false;
        }
        debug!("event=edit_open id={}", note_id);
        store.save_best_effort();
        true
    }

    /// Writes editor text into the note; it goes out with the next save.
    pub fn set_content(&self, store: &mut NoteStore, note_id: &str, title: &str, body: &str) {
        let result = store.update(note_id, |note| {
            note.title = title.to_string();
            note.body = body.to_string();
        });
        if let Err(err) = result {
            debug!("event=set_content_skipped error={}", err);
        }
    }

    pub fn set_color(&self, store: &mut NoteStore, note_id: &str, color: NoteColor) {
        if store.update(note_id, |note| note.color = Some(color)).is_ok() {
            store.save_best_effort();
        }
    }

    /// Closes one editor and shrinks the note to the tier's display size.
    pub fn confirm_edit(&mut self, store: &mut NoteStore, note_id: &str, tier: SizeTier) -> bool {
        let result = store.update(note_id, |note| {
            note.editing = false;
            note.set_size(tier.display_size());
        });
        if result.is_err() {
            return false;
        }
        debug!("event=edit_confirm id={}", note_id);
        store.save_best_effort();
        true
    }

    /// Closes every open editor. Returns the ids that were editing.
    pub fn dismiss_editing(&mut self, store: &mut NoteStore, tier: SizeTier) -> Vec<NoteId> {
        let editing: Vec<NoteId> = store
            .all()
            .iter()
            .filter(|n| n.editing)
            .map(|n| n.id.clone())
            .collect();
        if editing.is_empty() {
            return editing;
        }
        for id in &editing {
            let result = store.update(id, |note| {
                note.editing = false;
                note.set_size(tier.display_size());
            });
            if let Err(err) = result {
                debug!("event=edit_dismiss_skipped error={}", err);
            }
        }
        debug!("event=edit_dismiss count={}", editing.len());
        store.save_best_effort();
        editing
    }

    /// Non-trashed notes ordered back to front. Equal stacking keys keep
    /// insertion order.
    pub fn visible_notes<'a>(&self, store: &'a NoteStore) -> Vec<&'a Note> {
        let mut notes: Vec<&Note> = store.visible().collect();
        notes.sort_by(|a, b| a.stacking_cmp(b));
        notes
    }

    /// Front-most resting note whose footprint contains `point`.
    pub fn note_at<'a>(
        &self,
        store: &'a NoteStore,
        point: Point,
        footprint: Size,
    ) -> Option<&'a Note> {
        self.visible_notes(store)
            .into_iter()
            .rev()
            .filter(|n| !n.editing)
            .find(|n| {
                (point.x - n.x).abs() <= footprint.width / 2.0
                    && (point.y - n.y).abs() <= footprint.height / 2.0
            })
    }

    /// Resting tilt in degrees. Zero while dragging or when rotation is off.
    pub fn tilt(&mut self, note_id: &str, allow_rotation: bool) -> f32 {
        if !allow_rotation || self.is_dragging(note_id) {
            return 0.0;
        }
        *self
            .tilts
            .entry(note_id.to_string())
            .or_insert_with(|| rand::thread_rng().gen_range(-MAX_TILT_DEGREES..=MAX_TILT_DEGREES))
    }

    /// Forgets a note's tilt so the next call rolls a new one.
    pub fn settle(&mut self, note_id: &str) {
        self.tilts.remove(note_id);
    }
}

fn draggable<'a>(store: &'a NoteStore, note_id: &str) -> Option<&'a Note> {
    store
        .get(note_id)
        .filter(|note| !note.trashed && !note.editing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use chrono::TimeZone;

    struct FixedClock(Rc<Cell<i64>>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(self.0.get(), 0).unwrap()
        }
    }

    fn phone() -> Viewport {
        Viewport::new(390.0, 844.0)
    }

    fn board_with_clock(seconds: i64) -> (NoteBoard, Rc<Cell<i64>>) {
        let time = Rc::new(Cell::new(seconds));
        let board = NoteBoard::with_clock(phone(), Box::new(FixedClock(Rc::clone(&time))));
        (board, time)
    }

    fn resting_note(store: &mut NoteStore, id: &str, x: f64, y: f64) -> NoteId {
        store.insert(Note::new(
            id.into(),
            Point::new(x, y),
            id,
            "",
            Size::square(120.0),
            Utc::now(),
        ))
    }

    fn empty_store() -> (NoteStore, MemoryBackend) {
        let backend = MemoryBackend::new();
        let store = NoteStore::open(Box::new(backend.clone())).unwrap();
        (store, backend)
    }

    #[test]
    fn new_note_opens_in_editor_at_top_quarter() {
        let (mut board, _) = board_with_clock(1_000);
        let (mut store, backend) = empty_store();
        let id = board.create_note(&mut store);

        let note = store.get(&id).unwrap();
        assert_eq!(note.position(), Point::new(195.0, 211.0));
        assert!(note.editing);
        assert_eq!(note.size(), EDITING_SIZE);
        assert_eq!(note.title, DEFAULT_TITLE);
        assert_eq!(note.body, DEFAULT_BODY);
        assert_eq!(note.z_order, 1_000.0);
        assert_eq!(backend.save_count(), 1);

        assert!(board.confirm_edit(&mut store, &id, SizeTier::Normal));
        let note = store.get(&id).unwrap();
        assert!(!note.editing);
        assert_eq!(note.size(), Size::square(120.0));
    }

    #[test]
    fn drag_outside_trash_commits_position() {
        let (mut board, _) = board_with_clock(1_000);
        let (mut store, backend) = empty_store();
        let id = resting_note(&mut store, "a", 200.0, 200.0);

        let feedback = board
            .drag_changed(&mut store, &id, Translation::new(-100.0, 300.0))
            .unwrap();
        assert_eq!(feedback.candidate, Point::new(100.0, 500.0));
        assert!(!feedback.over_trash);
        assert_eq!(feedback.scale, 1.05);
        // nothing is committed mid-gesture
        assert_eq!(store.get(&id).unwrap().position(), Point::new(200.0, 200.0));
        assert_eq!(backend.save_count(), 0);

        let outcome = board
            .drag_ended(&mut store, &id, Translation::new(-150.0, 500.0))
            .unwrap();
        assert_eq!(outcome.position, Point::new(50.0, 700.0));
        assert!(!outcome.trashed);
        let note = store.get(&id).unwrap();
        assert_eq!(note.position(), Point::new(50.0, 700.0));
        assert!(!note.trashed);
        assert_eq!(backend.save_count(), 1);
        assert!(!board.is_dragging(&id));
    }

    #[test]
    fn drop_in_hot_zone_trashes_note() {
        let (mut board, _) = board_with_clock(1_000);
        let (mut store, backend) = empty_store();
        let id = resting_note(&mut store, "a", 200.0, 200.0);
        let hover = board.trash_hover();

        let feedback = board
            .drag_changed(&mut store, &id, Translation::new(-160.0, 550.0))
            .unwrap();
        assert!(feedback.over_trash);
        assert_eq!(feedback.opacity, 0.80);
        assert_eq!(feedback.scale, 0.95);
        assert!(hover.get());
        assert_eq!(hover.indicator_scale(), 1.25);

        let outcome = board
            .drag_ended(&mut store, &id, Translation::new(-160.0, 550.0))
            .unwrap();
        assert!(outcome.trashed);
        assert!(!hover.get());
        let note = store.get(&id).unwrap();
        assert!(note.trashed);
        assert_eq!(note.position(), Point::new(40.0, 750.0));
        assert!(board.visible_notes(&store).is_empty());
        assert!(backend.saved()[0].trashed);
    }

    #[test]
    fn drop_rechecks_trash_zone_at_final_translation() {
        let (mut board, _) = board_with_clock(1_000);
        let (mut store, _) = empty_store();
        let id = resting_note(&mut store, "a", 200.0, 200.0);

        board.drag_changed(&mut store, &id, Translation::new(-160.0, 550.0));
        let outcome = board
            .drag_ended(&mut store, &id, Translation::new(-150.0, 500.0))
            .unwrap();
        assert!(!outcome.trashed);
        assert!(!store.get(&id).unwrap().trashed);

        board.drag_changed(&mut store, &id, Translation::new(0.0, 10.0));
        let outcome = board
            .drag_ended(&mut store, &id, Translation::new(-10.0, 50.0))
            .unwrap();
        assert!(outcome.trashed);
    }

    #[test]
    fn drag_start_raises_note_before_drop() {
        let (mut board, time) = board_with_clock(1_000);
        let (mut store, _) = empty_store();
        let a = resting_note(&mut store, "a", 100.0, 100.0);
        let b = resting_note(&mut store, "b", 100.0, 100.0);
        store.update(&b, |n| n.z_order = 500.0).unwrap();

        time.set(2_000);
        board.drag_changed(&mut store, &a, Translation::new(1.0, 1.0));
        let top = board.visible_notes(&store).last().map(|n| n.id.clone());
        assert_eq!(top, Some(a.clone()));
        assert_eq!(store.get(&a).unwrap().z_order, 2_000.0);

        time.set(3_000);
        board.drag_ended(&mut store, &a, Translation::new(2.0, 2.0));
        assert_eq!(store.get(&a).unwrap().z_order, 3_000.0);
    }

    #[test]
    fn equal_timestamps_still_put_touched_note_in_front() {
        let (mut board, _) = board_with_clock(1_000);
        let (mut store, _) = empty_store();
        let a = resting_note(&mut store, "a", 100.0, 100.0);
        let b = resting_note(&mut store, "b", 300.0, 300.0);

        for id in [&b, &a, &b, &a] {
            let before = store.get(id).unwrap().clone();
            board.drag_changed(&mut store, id, Translation::new(0.0, 0.0));
            board.drag_ended(&mut store, id, Translation::new(0.0, 0.0));
            let after = store.get(id).unwrap();
            assert!(after.stacking_cmp(&before).is_ge());
            let front = board.visible_notes(&store).last().unwrap().id.clone();
            assert_eq!(&front, id);
        }
    }

    #[test]
    fn stacking_never_moves_backwards_when_clock_does() {
        let (board, time) = board_with_clock(5_000);
        let (mut store, _) = empty_store();
        let a = resting_note(&mut store, "a", 100.0, 100.0);
        let b = resting_note(&mut store, "b", 100.0, 100.0);
        board.bring_to_front(&mut store, &a);

        time.set(10);
        board.bring_to_front(&mut store, &b);
        let ordered: Vec<&str> = board
            .visible_notes(&store)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["a", "b"]);
        assert_eq!(store.get(&b).unwrap().z_order, 5_000.0);
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let (board, _) = board_with_clock(0);
        let (mut store, _) = empty_store();
        for id in ["c", "a", "b"] {
            resting_note(&mut store, id, 0.0, 0.0);
        }
        let ordered: Vec<&str> = board
            .visible_notes(&store)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["c", "a", "b"]);
    }

    #[test]
    fn trashed_and_editing_notes_ignore_gestures() {
        let (mut board, _) = board_with_clock(1_000);
        let (mut store, _) = empty_store();
        let trashed = resting_note(&mut store, "t", 100.0, 100.0);
        store.soft_delete(&trashed).unwrap();
        let editing = board.create_note(&mut store);

        assert!(board
            .drag_changed(&mut store, &trashed, Translation::new(5.0, 5.0))
            .is_none());
        assert!(board
            .drag_ended(&mut store, &editing, Translation::new(5.0, 5.0))
            .is_none());
        assert!(!board.tap(&mut store, &trashed));
        assert!(!board.tap(&mut store, &editing));
        assert!(!board.trash_hover().get());
    }

    #[test]
    fn tap_opens_editor_and_confirm_uses_tier_size() {
        let (mut board, time) = board_with_clock(1_000);
        let (mut store, _) = empty_store();
        let a = resting_note(&mut store, "a", 100.0, 100.0);
        let b = resting_note(&mut store, "b", 100.0, 100.0);
        store.update(&b, |n| n.z_order = 1_500.0).unwrap();

        time.set(1_200);
        assert!(board.tap(&mut store, &a));
        let note = store.get(&a).unwrap();
        assert!(note.editing);
        assert_eq!(note.size(), EDITING_SIZE);
        assert_eq!(board.visible_notes(&store).last().unwrap().id, a);

        board.set_content(&mut store, &a, "Groceries", "milk");
        board.set_color(&mut store, &a, NoteColor::Blue);
        assert!(board.confirm_edit(&mut store, &a, SizeTier::Large));
        let note = store.get(&a).unwrap();
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.body, "milk");
        assert_eq!(note.color, Some(NoteColor::Blue));
        assert!(!note.editing);
        assert_eq!(note.size(), Size::square(140.0));
    }

    #[test]
    fn dismiss_closes_every_editor() {
        let (mut board, _) = board_with_clock(1_000);
        let (mut store, backend) = empty_store();
        let first = board.create_note(&mut store);
        let second = board.create_note(&mut store);
        let resting = resting_note(&mut store, "r", 10.0, 10.0);
        assert!(store.any_editing());

        let closed = board.dismiss_editing(&mut store, SizeTier::Small);
        assert_eq!(closed, vec![first.clone(), second.clone()]);
        assert!(!store.any_editing());
        for id in [&first, &second] {
            assert_eq!(store.get(id).unwrap().size(), Size::square(110.0));
        }
        assert_eq!(store.get(&resting).unwrap().size(), Size::square(120.0));
        let saves = backend.save_count();
        assert!(board.dismiss_editing(&mut store, SizeTier::Small).is_empty());
        assert_eq!(backend.save_count(), saves);
    }

    #[test]
    fn failed_saves_do_not_block_interaction() {
        let (mut board, _) = board_with_clock(1_000);
        let (mut store, backend) = empty_store();
        let id = resting_note(&mut store, "a", 200.0, 200.0);
        backend.set_fail_writes(true);

        board.drag_changed(&mut store, &id, Translation::new(10.0, 0.0));
        let outcome = board.drag_ended(&mut store, &id, Translation::new(10.0, 0.0));
        assert!(outcome.is_some());
        assert_eq!(store.get(&id).unwrap().position(), Point::new(210.0, 200.0));
        assert!(store.is_dirty());

        backend.set_fail_writes(false);
        assert!(board.tap(&mut store, &id));
        assert_eq!(backend.saved()[0].x, 210.0);
    }

    #[test]
    fn stacking_counter_saturates_on_stored_maximum() {
        let (board, _) = board_with_clock(1_000);
        let (mut store, _) = empty_store();
        let a = resting_note(&mut store, "a", 100.0, 100.0);
        let b = resting_note(&mut store, "b", 100.0, 100.0);
        store.update(&a, |note| note.z_seq = u64::MAX).unwrap();

        board.bring_to_front(&mut store, &b);
        let note = store.get(&b).unwrap();
        assert_eq!(note.z_seq, u64::MAX);
        assert_eq!(note.z_order, 1_000.0);
    }

    #[test]
    fn note_at_picks_front_most_resting_note() {
        let (board, _) = board_with_clock(1_000);
        let (mut store, _) = empty_store();
        let a = resting_note(&mut store, "a", 100.0, 100.0);
        let b = resting_note(&mut store, "b", 150.0, 150.0);
        board.bring_to_front(&mut store, &a);

        let side = Size::square(120.0);
        let hit = board.note_at(&store, Point::new(130.0, 130.0), side).unwrap();
        assert_eq!(hit.id, a);
        let hit = board.note_at(&store, Point::new(200.0, 200.0), side).unwrap();
        assert_eq!(hit.id, b);
        assert!(board.note_at(&store, Point::new(380.0, 10.0), side).is_none());
        assert!(board
            .note_at(&store, Point::new(200.0, 200.0), Size::square(20.0))
            .is_none());
    }

    #[test]
    fn tilt_is_stable_until_settled_and_zero_while_dragging() {
        let (mut board, _) = board_with_clock(1_000);
        let (mut store, _) = empty_store();
        let id = resting_note(&mut store, "a", 200.0, 200.0);

        let tilt = board.tilt(&id, true);
        assert!((-5.0..=5.0).contains(&tilt));
        assert_eq!(board.tilt(&id, true), tilt);
        assert_eq!(board.tilt(&id, false), 0.0);

        board.drag_changed(&mut store, &id, Translation::new(1.0, 1.0));
        assert_eq!(board.tilt(&id, true), 0.0);
        board.cancel_drag(&id);
        assert!(!board.is_dragging(&id));
    }
}
