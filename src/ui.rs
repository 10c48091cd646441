use crate::board::{NoteBoard, TrashHover};
use crate::model::{Note, NoteColor, NoteId, Point, Size, Translation, Viewport};
use crate::palette::{self, Theme};
use crate::settings::SettingsProvider;
use crate::storage::{NoteStore, StoreEvent, StoreLocation};
use crate::trash::{ListMode, NoteList};
use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use log::debug;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap,
};
use ratatui::Terminal;
use std::cell::RefCell;
use std::io::{stdout, Stdout};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Board units covered by one terminal cell.
const CELL_WIDTH: f64 = 8.0;
const CELL_HEIGHT: f64 = 16.0;
const PAD_WIDTH: f64 = 100.0;
const CONFIRM_LABEL: &str = "[ Done ]";
const MAX_CELL_SPAN: i32 = 1 << 20;

pub fn run(
    location: &StoreLocation,
    store: &mut NoteStore,
    settings: &mut SettingsProvider,
) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(location, store, settings);
    let result = app.event_loop(&mut terminal);
    teardown_terminal(&mut terminal)?;
    app.shutdown();
    result
}

struct App<'a> {
    location: &'a StoreLocation,
    store: &'a mut NoteStore,
    settings: &'a mut SettingsProvider,
    board: NoteBoard,
    hover: TrashHover,
    list: NoteList,
    events: Rc<RefCell<Vec<StoreEvent>>>,
    view: View,
    board_area: Rect,
    hits: Hits,
    pointer: Option<Pointer>,
    editor: Option<Editor>,
    confirm: Option<Confirm>,
    list_selected: usize,
    settings_selected: usize,
    welcome: bool,
    status: String,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum View {
    Board,
    List,
    Settings,
}

impl View {
    fn label(&self) -> &'static str {
        match self {
            View::Board => "board",
            View::List => "notes",
            View::Settings => "settings",
        }
    }
}

/// Clickable regions recorded during the last draw.
#[derive(Default)]
struct Hits {
    trash: Rect,
    pad: Rect,
    editor: Rect,
    confirm: Rect,
    title: Rect,
    body: Rect,
    swatches: Vec<(Rect, NoteColor)>,
}

struct Pointer {
    note_id: Option<NoteId>,
    origin: (u16, u16),
    moved: bool,
}

enum Confirm {
    Delete(NoteId),
    ClearTrash,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum EditorField {
    Title,
    Body,
}

struct Editor {
    note_id: NoteId,
    title: FieldValue,
    body: FieldValue,
    field: EditorField,
}

impl Editor {
    fn from_note(note: &Note) -> Self {
        Editor {
            note_id: note.id.clone(),
            title: FieldValue::new(&note.title),
            body: FieldValue::new(&note.body),
            field: EditorField::Title,
        }
    }

    fn active_field_mut(&mut self) -> &mut FieldValue {
        match self.field {
            EditorField::Title => &mut self.title,
            EditorField::Body => &mut self.body,
        }
    }

    fn toggle_field(&mut self) {
        self.field = match self.field {
            EditorField::Title => EditorField::Body,
            EditorField::Body => EditorField::Title,
        };
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum SettingRow {
    Color,
    Size,
    Appearance,
    Rotation,
    Welcome,
}

const SETTING_ROWS: [SettingRow; 5] = [
    SettingRow::Color,
    SettingRow::Size,
    SettingRow::Appearance,
    SettingRow::Rotation,
    SettingRow::Welcome,
];

/// Snapshot of a resting note for drawing.
struct Sprite {
    id: NoteId,
    title: String,
    body: String,
    created_at: DateTime<Utc>,
    position: Point,
    color: NoteColor,
}

#[derive(Clone)]
struct FieldValue {
    value: String,
    cursor: usize,
}

impl FieldValue {
    fn new(value: &str) -> Self {
        FieldValue {
            value: value.to_string(),
            cursor: value.len(),
        }
    }

    fn move_left(&mut self) {
        if self.cursor > 0 {
            self.cursor = prev_char_boundary(self.cursor, &self.value);
        }
    }

    fn move_right(&mut self) {
        if self.cursor < self.value.len() {
            self.cursor = next_char_boundary(self.cursor, &self.value);
        }
    }

    fn move_up(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx == 0 {
            return;
        }
        self.cursor = index_at_col(&self.value, line_starts[line_idx - 1], col);
    }

    fn move_down(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx + 1 >= line_starts.len() {
            return;
        }
        self.cursor = index_at_col(&self.value, line_starts[line_idx + 1], col);
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = prev_char_boundary(self.cursor, &self.value);
        self.value.drain(prev..self.cursor);
        self.cursor = prev;
    }

    fn insert_char(&mut self, ch: char) {
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn with_caret(&self) -> String {
        let mut text = self.value.clone();
        text.insert_str(self.cursor, "▌");
        text
    }
}

impl<'a> App<'a> {
    fn new(
        location: &'a StoreLocation,
        store: &'a mut NoteStore,
        settings: &'a mut SettingsProvider,
    ) -> Self {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        store.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        let board = NoteBoard::new(Viewport::default());
        let hover = board.trash_hover();
        let status = format!(
            "Loaded {} note(s) from {}",
            store.len(),
            location.path.display()
        );
        let welcome = !settings.onboarding_seen();
        App {
            location,
            store,
            settings,
            board,
            hover,
            list: NoteList::new(),
            events,
            view: View::Board,
            board_area: Rect::default(),
            hits: Hits::default(),
            pointer: None,
            editor: None,
            confirm: None,
            list_selected: 0,
            settings_selected: 0,
            welcome,
            status,
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            self.sync_editor();
            self.drain_events();
            terminal.draw(|f| self.draw(f))?;
            if event::poll(Duration::from_millis(200))? {
                match event::read()? {
                    Event::Key(key) => {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if self.handle_key(key) {
                            break;
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.commit_editor_text();
        if self.store.is_dirty() {
            self.store.save_best_effort();
        }
    }

    /// Keeps the open editor pointed at the front-most note in edit mode.
    fn sync_editor(&mut self) {
        if !self.store.any_editing() {
            self.editor = None;
            return;
        }
        let still_editing = self.editor.as_ref().is_some_and(|e| {
            self.store
                .get(&e.note_id)
                .is_some_and(|n| n.editing && !n.trashed)
        });
        if still_editing {
            return;
        }
        self.editor = self
            .board
            .visible_notes(self.store)
            .into_iter()
            .rev()
            .find(|n| n.editing)
            .map(Editor::from_note);
    }

    fn drain_events(&mut self) {
        let events: Vec<StoreEvent> = self.events.borrow_mut().drain(..).collect();
        for event in events {
            match event {
                StoreEvent::Created(id) => self.status = format!("Created note {}", id),
                StoreEvent::Trashed(id) => {
                    self.status = format!("Moved {} to the trash", self.note_label(&id))
                }
                StoreEvent::Restored(id) => {
                    self.status = format!("Restored {}", self.note_label(&id))
                }
                StoreEvent::Deleted(id) => self.status = format!("Deleted note {}", id),
                StoreEvent::Updated(_) => {}
            }
        }
    }

    fn note_label(&self, id: &str) -> String {
        self.store
            .get(id)
            .map(|n| format!("\"{}\"", n.display_title()))
            .unwrap_or_else(|| id.to_string())
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }
        if self.welcome {
            self.close_welcome();
            return false;
        }
        if self.confirm.is_some() {
            self.handle_confirm_key(key);
            return false;
        }
        match self.view {
            View::Board if self.editor.is_some() => {
                self.handle_editor_key(key);
                false
            }
            View::Board => self.handle_board_key(key),
            View::List => self.handle_list_key(key),
            View::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_board_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('n') => self.create_note(),
            KeyCode::Char('t') => self.open_list(),
            KeyCode::Char('s') => self.view = View::Settings,
            KeyCode::Char('?') => self.welcome = true,
            KeyCode::Esc => {
                if let Some(Pointer {
                    note_id: Some(id), ..
                }) = self.pointer.take()
                {
                    self.board.cancel_drag(&id);
                    self.status = "Drag canceled".into();
                }
            }
            _ => {}
        }
        false
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return self.dismiss_editors(),
            KeyCode::Char('s') if control => return self.confirm_editor(),
            KeyCode::Enter if control => return self.confirm_editor(),
            KeyCode::Left if control => return self.cycle_editor_color(false),
            KeyCode::Right if control => return self.cycle_editor_color(true),
            _ => {}
        }
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Tab | KeyCode::BackTab => editor.toggle_field(),
            KeyCode::Enter => match editor.field {
                EditorField::Title => editor.field = EditorField::Body,
                EditorField::Body => editor.body.insert_char('\n'),
            },
            KeyCode::Left => editor.active_field_mut().move_left(),
            KeyCode::Right => editor.active_field_mut().move_right(),
            KeyCode::Up => editor.active_field_mut().move_up(),
            KeyCode::Down => editor.active_field_mut().move_down(),
            KeyCode::Backspace => editor.active_field_mut().backspace(),
            KeyCode::Char(c) => {
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                {
                    editor.active_field_mut().insert_char(c);
                }
            }
            _ => {}
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> bool {
        let count = self.list.entries(self.store).len();
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc | KeyCode::Char('b') | KeyCode::Char('t') => self.view = View::Board,
            KeyCode::Char('s') => self.view = View::Settings,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Left | KeyCode::Right => {
                self.list.toggle_mode();
                self.list_selected = 0;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.list_selected = self.list_selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.list_selected + 1 < count {
                    self.list_selected += 1;
                }
            }
            KeyCode::Char('r') => {
                if let Some(id) = self.selected_list_note() {
                    if let Err(err) = self.list.restore(self.store, &id) {
                        self.status = format!("Restore failed: {}", err);
                    } else if self.list.mode() == ListMode::All {
                        self.status = format!("{} is on the board", self.note_label(&id));
                    }
                }
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.selected_list_note() {
                    self.confirm = Some(Confirm::Delete(id));
                }
            }
            KeyCode::Char('c') => {
                if self.list.clear_trash_enabled(self.store) {
                    self.confirm = Some(Confirm::ClearTrash);
                } else {
                    self.status = "Trash is already empty".into();
                }
            }
            _ => {}
        }
        self.clamp_list_selection();
        false
    }

    fn handle_settings_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc | KeyCode::Char('b') => self.view = View::Board,
            KeyCode::Char('t') => self.open_list(),
            KeyCode::Up | KeyCode::Char('k') => {
                self.settings_selected = self.settings_selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.settings_selected = (self.settings_selected + 1).min(SETTING_ROWS.len() - 1);
            }
            KeyCode::Left | KeyCode::Char('h') => self.change_setting(false),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Enter | KeyCode::Char(' ') => {
                self.change_setting(true)
            }
            _ => {}
        }
        false
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        let Some(confirm) = self.confirm.take() else {
            return;
        };
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => match confirm {
                Confirm::Delete(id) => {
                    if let Err(err) = self.list.permanently_delete(self.store, &id) {
                        self.status = format!("Delete failed: {}", err);
                    }
                }
                Confirm::ClearTrash => {
                    let removed = self.list.clear_trash(self.store);
                    self.status = format!("Deleted {} note(s) from the trash", removed);
                }
            },
            KeyCode::Char('n') | KeyCode::Esc => self.status = "Delete canceled".into(),
            _ => self.confirm = Some(confirm),
        }
        self.clamp_list_selection();
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.welcome {
            if let MouseEventKind::Down(_) = mouse.kind {
                self.close_welcome();
            }
            return;
        }
        if self.view != View::Board || self.confirm.is_some() {
            return;
        }
        let cell = (mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if self.editor.is_some() {
                    self.editor_click(cell);
                } else {
                    self.pointer_down(cell);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => self.pointer_drag(cell),
            MouseEventKind::Up(MouseButton::Left) => self.pointer_up(cell),
            _ => {}
        }
    }

    fn pointer_down(&mut self, cell: (u16, u16)) {
        if !contains(self.board_area, cell) {
            return;
        }
        let point = self.cell_point(cell);
        let footprint = self.settings.display_size();
        let note_id = self
            .board
            .note_at(self.store, point, footprint)
            .map(|n| n.id.clone());
        self.pointer = Some(Pointer {
            note_id,
            origin: cell,
            moved: false,
        });
    }

    fn pointer_drag(&mut self, cell: (u16, u16)) {
        let (id, origin) = match &mut self.pointer {
            Some(Pointer {
                note_id: Some(id),
                origin,
                moved,
            }) => {
                if cell != *origin {
                    *moved = true;
                }
                if !*moved {
                    return;
                }
                (id.clone(), *origin)
            }
            _ => return,
        };
        let translation = cell_translation(origin, cell);
        if self
            .board
            .drag_changed(self.store, &id, translation)
            .is_none()
        {
            self.pointer = None;
        }
    }

    fn pointer_up(&mut self, cell: (u16, u16)) {
        let Some(pointer) = self.pointer.take() else {
            return;
        };
        match pointer.note_id {
            Some(id) if pointer.moved => {
                let translation = cell_translation(pointer.origin, cell);
                if let Some(outcome) = self.board.drag_ended(self.store, &id, translation) {
                    self.board.settle(&id);
                    debug!(
                        "event=ui_drop id={} x={} y={}",
                        id, outcome.position.x, outcome.position.y
                    );
                }
            }
            Some(id) => {
                if self.board.tap(self.store, &id) {
                    self.status =
                        "Editing (Tab switch field, Ctrl+S or Done to finish, Esc to close)".into();
                }
            }
            None => {
                if contains(self.hits.trash, cell) && contains(self.hits.trash, pointer.origin) {
                    self.open_list();
                } else if contains(self.hits.pad, cell) && contains(self.hits.pad, pointer.origin)
                {
                    self.create_note();
                }
            }
        }
    }

    fn editor_click(&mut self, cell: (u16, u16)) {
        if contains(self.hits.confirm, cell) {
            return self.confirm_editor();
        }
        let swatch = self
            .hits
            .swatches
            .iter()
            .find(|(rect, _)| contains(*rect, cell))
            .map(|(_, color)| *color);
        if let Some(color) = swatch {
            if let Some(editor) = &self.editor {
                self.board.set_color(self.store, &editor.note_id, color);
            }
            return;
        }
        let in_title = contains(self.hits.title, cell);
        let in_body = contains(self.hits.body, cell);
        let in_editor = contains(self.hits.editor, cell);
        if let Some(editor) = self.editor.as_mut() {
            if in_title {
                editor.field = EditorField::Title;
            } else if in_body {
                editor.field = EditorField::Body;
            }
        }
        if !in_editor {
            self.dismiss_editors();
        }
    }

    fn create_note(&mut self) {
        self.commit_editor_text();
        let id = self.board.create_note(self.store);
        self.editor = self.store.get(&id).map(Editor::from_note);
    }

    fn commit_editor_text(&mut self) {
        if let Some(editor) = &self.editor {
            self.board.set_content(
                self.store,
                &editor.note_id,
                &editor.title.value,
                &editor.body.value,
            );
        }
    }

    fn confirm_editor(&mut self) {
        self.commit_editor_text();
        let Some(editor) = self.editor.take() else {
            return;
        };
        let tier = self.settings.note_size();
        if self.board.confirm_edit(self.store, &editor.note_id, tier) {
            self.board.settle(&editor.note_id);
            self.status = format!("Saved {}", self.note_label(&editor.note_id));
        }
    }

    fn dismiss_editors(&mut self) {
        self.commit_editor_text();
        self.editor = None;
        let tier = self.settings.note_size();
        let closed = self.board.dismiss_editing(self.store, tier);
        if !closed.is_empty() {
            self.status = format!("Closed {} editor(s)", closed.len());
        }
    }

    fn cycle_editor_color(&mut self, forward: bool) {
        let Some(editor) = &self.editor else {
            return;
        };
        let Some(note) = self.store.get(&editor.note_id) else {
            return;
        };
        let current = self.settings.resolve_color(note);
        let next = if forward {
            current.next()
        } else {
            current.prev()
        };
        self.board.set_color(self.store, &editor.note_id, next);
    }

    fn open_list(&mut self) {
        self.view = View::List;
        self.list_selected = 0;
    }

    fn close_welcome(&mut self) {
        self.welcome = false;
        if !self.settings.onboarding_seen() {
            self.settings.set_onboarding_seen(true);
        }
    }

    fn selected_list_note(&self) -> Option<NoteId> {
        self.list
            .entries(self.store)
            .get(self.list_selected)
            .map(|n| n.id.clone())
    }

    fn clamp_list_selection(&mut self) {
        let count = self.list.entries(self.store).len();
        self.list_selected = self.list_selected.min(count.saturating_sub(1));
    }

    fn change_setting(&mut self, forward: bool) {
        match SETTING_ROWS[self.settings_selected] {
            SettingRow::Color => {
                let color = self.settings.note_color();
                self.settings
                    .set_note_color(if forward { color.next() } else { color.prev() });
            }
            SettingRow::Size => {
                let tier = self.settings.note_size();
                self.settings
                    .set_note_size(if forward { tier.next() } else { tier.prev() });
            }
            SettingRow::Appearance => {
                let next = self.settings.appearance().next();
                self.settings.set_appearance(next);
            }
            SettingRow::Rotation => {
                let allow = !self.settings.allow_rotation();
                self.settings.set_allow_rotation(allow);
            }
            SettingRow::Welcome => self.welcome = true,
        }
    }

    fn cell_point(&self, cell: (u16, u16)) -> Point {
        let dx = cell.0.saturating_sub(self.board_area.x) as f64;
        let dy = cell.1.saturating_sub(self.board_area.y) as f64;
        Point::new((dx + 0.5) * CELL_WIDTH, (dy + 0.5) * CELL_HEIGHT)
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let theme = palette::theme(self.settings.appearance());
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(6),
                Constraint::Length(2),
            ])
            .split(f.size());

        self.draw_header(f, layout[0], &theme);
        match self.view {
            View::Board => self.draw_board(f, layout[1], &theme),
            View::List => self.draw_list(f, layout[1], &theme),
            View::Settings => self.draw_settings(f, layout[1], &theme),
        }
        self.draw_footer(f, layout[2], &theme);

        match &self.confirm {
            Some(Confirm::Delete(id)) => {
                let label = self.note_label(id);
                draw_confirm(f, &format!("Permanently delete {}?", label));
            }
            Some(Confirm::ClearTrash) => {
                let count = self.store.trashed().count();
                draw_confirm(f, &format!("Permanently delete {} trashed note(s)?", count));
            }
            None => {}
        }
        if self.welcome {
            draw_welcome(f, &theme);
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect, theme: &Theme) {
        let saved = if self.store.is_dirty() {
            "unsaved changes".to_string()
        } else {
            match self.store.last_saved() {
                Some(at) => format!("saved {}", format_elapsed(at)),
                None => "no changes".to_string(),
            }
        };
        let title = Line::from(vec![
            Span::styled(
                "stickies ",
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                self.location.scope_label(),
                Style::default().fg(Color::Green),
            ),
            Span::raw("  •  "),
            Span::styled(
                format!("{}", self.location.path.display()),
                Style::default().fg(theme.muted),
            ),
            Span::raw("  •  "),
            Span::styled(saved, Style::default().fg(Color::Gray)),
            Span::raw("  •  "),
            Span::styled(
                format!("view {}", self.view.label()),
                Style::default().fg(Color::Magenta),
            ),
        ]);
        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(theme.muted));
        let paragraph = Paragraph::new(title)
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(paragraph, area);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect, theme: &Theme) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .split(area);
        let help = Paragraph::new(self.footer_help_line()).alignment(Alignment::Center);
        f.render_widget(help, rows[0]);
        let status = Paragraph::new(Span::styled(
            self.status.clone(),
            Style::default().fg(theme.foreground),
        ));
        f.render_widget(status, rows[1]);
    }

    fn footer_help_line(&self) -> Line<'static> {
        let key = |k: &'static str, color: Color| Span::styled(k, Style::default().fg(color));
        match self.view {
            View::Board if self.editor.is_some() => Line::from(vec![
                key("Tab", Color::LightCyan),
                Span::raw(" field  "),
                key("Ctrl+←/→", Color::LightMagenta),
                Span::raw(" colour  "),
                key("Ctrl+S", Color::LightGreen),
                Span::raw(" done  "),
                key("Esc", Color::LightRed),
                Span::raw(" close all"),
            ]),
            View::Board => Line::from(vec![
                key("drag", Color::LightCyan),
                Span::raw(" move  "),
                key("click", Color::LightYellow),
                Span::raw(" edit  "),
                key("n", Color::LightMagenta),
                Span::raw(" new  "),
                key("t", Color::LightRed),
                Span::raw(" trash  "),
                key("s", Color::LightGreen),
                Span::raw(" settings  "),
                key("?", Color::LightCyan),
                Span::raw(" help  "),
                key("q", Color::LightRed),
                Span::raw(" quit"),
            ]),
            View::List => Line::from(vec![
                key("Tab", Color::LightCyan),
                Span::raw(" deleted/all  "),
                key("↑↓", Color::LightCyan),
                Span::raw(" browse  "),
                key("r", Color::LightGreen),
                Span::raw(" recover  "),
                key("d", Color::LightRed),
                Span::raw(" delete  "),
                key("c", Color::LightRed),
                Span::raw(" clear trash  "),
                key("Esc", Color::LightYellow),
                Span::raw(" board"),
            ]),
            View::Settings => Line::from(vec![
                key("↑↓", Color::LightCyan),
                Span::raw(" choose  "),
                key("←→", Color::LightCyan),
                Span::raw(" change  "),
                key("Esc", Color::LightYellow),
                Span::raw(" board"),
            ]),
        }
    }

    fn draw_board(&mut self, f: &mut ratatui::Frame<'_>, area: Rect, theme: &Theme) {
        self.board_area = area;
        self.board.resize(Viewport::new(
            area.width as f64 * CELL_WIDTH,
            area.height as f64 * CELL_HEIGHT,
        ));
        let editing = self.editor.is_some();
        let background = if editing {
            theme.scrim
        } else {
            theme.background
        };
        f.render_widget(
            Block::default().style(Style::default().bg(background)),
            area,
        );

        let footprint = self.settings.display_size();
        let allow_rotation = self.settings.allow_rotation();
        let sprites: Vec<Sprite> = self
            .board
            .visible_notes(self.store)
            .into_iter()
            .filter(|n| !n.editing)
            .map(|n| Sprite {
                id: n.id.clone(),
                title: n.display_title().to_string(),
                body: n.body.clone(),
                created_at: n.created_at,
                position: n.position(),
                color: self.settings.resolve_color(n),
            })
            .collect();
        for sprite in &sprites {
            let feedback = self.board.drag_feedback(&sprite.id);
            let tilt = self.board.tilt(&sprite.id, allow_rotation);
            let (center, scale, over_trash) = match feedback {
                Some(fb) => (fb.candidate, fb.scale as f64, fb.over_trash),
                None => (sprite.position, 1.0, false),
            };
            let size = Size::new(footprint.width * scale, footprint.height * scale);
            if let Some(rect) = cell_rect(area, center, size) {
                draw_note(f, rect, sprite, tilt, feedback.is_some(), over_trash || editing);
            }
        }

        self.hits = Hits::default();
        self.draw_controls(f, area, theme);
        if editing {
            self.draw_editor(f, area);
        }
    }

    fn draw_controls(&mut self, f: &mut ratatui::Frame<'_>, area: Rect, theme: &Theme) {
        let hovering = self.hover.get();
        let scale = self.hover.indicator_scale() as f64;
        let side = self.settings.note_size().display_side() * scale;
        let width = ((side / CELL_WIDTH).round() as u16).min(area.width);
        let height = (if hovering { 4u16 } else { 3 }).min(area.height);
        let trash = Rect::new(area.x, area.y + area.height - height, width, height);
        let trashed = self.store.trashed().count();
        let label = if trashed > 0 {
            format!("Trash ({})", trashed)
        } else {
            "Trash".to_string()
        };
        let border = if hovering { Color::LightRed } else { theme.muted };
        let trash_widget = Paragraph::new(Span::styled(
            label,
            Style::default().add_modifier(if hovering {
                Modifier::BOLD
            } else {
                Modifier::empty()
            }),
        ))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(if hovering {
                    BorderType::Thick
                } else {
                    BorderType::Plain
                })
                .border_style(Style::default().fg(border)),
        );
        f.render_widget(Clear, trash);
        f.render_widget(trash_widget, trash);
        self.hits.trash = trash;

        let pad_width = ((PAD_WIDTH / CELL_WIDTH).round() as u16).min(area.width);
        let pad_height = 3u16.min(area.height);
        let pad = Rect::new(
            area.x + area.width - pad_width,
            area.y + area.height - pad_height,
            pad_width,
            pad_height,
        );
        let pad_widget = Paragraph::new(Span::styled(
            "+ New note",
            Style::default()
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Black))
                .style(Style::default().bg(palette::note_background(self.settings.note_color()))),
        );
        f.render_widget(Clear, pad);
        f.render_widget(pad_widget, pad);
        self.hits.pad = pad;
    }

    fn draw_editor(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let Some(editor) = &self.editor else {
            return;
        };
        let Some(note) = self.store.get(&editor.note_id) else {
            return;
        };
        let color = self.settings.resolve_color(note);
        let center = self.board.viewport().editor_position();
        let Some(rect) = cell_rect(area, center, note.size()) else {
            return;
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(Span::styled(
                " Edit note ",
                Style::default().add_modifier(Modifier::BOLD),
            ))
            .style(
                Style::default()
                    .bg(palette::note_background(color))
                    .fg(Color::Black),
            );
        let inner = block.inner(rect);
        f.render_widget(Clear, rect);
        f.render_widget(block, rect);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(1),
            ])
            .split(inner);
        let title_row = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(CONFIRM_LABEL.len() as u16),
            ])
            .split(rows[0]);

        let title_active = editor.field == EditorField::Title;
        let title_text = if title_active {
            editor.title.with_caret()
        } else {
            editor.title.value.clone()
        };
        f.render_widget(
            Paragraph::new(Span::styled(
                title_text,
                Style::default().add_modifier(Modifier::BOLD),
            )),
            title_row[0],
        );
        f.render_widget(
            Paragraph::new(Span::styled(
                CONFIRM_LABEL,
                Style::default()
                    .fg(Color::Rgb(20, 110, 40))
                    .add_modifier(Modifier::BOLD),
            )),
            title_row[1],
        );
        let body_text = if editor.field == EditorField::Body {
            editor.body.with_caret()
        } else {
            editor.body.value.clone()
        };
        let body_lines: Vec<Line<'static>> =
            body_text.split('\n').map(|l| Line::raw(l.to_string())).collect();
        f.render_widget(
            Paragraph::new(body_lines).wrap(Wrap { trim: false }),
            rows[2],
        );

        self.hits.editor = rect;
        self.hits.confirm = title_row[1];
        self.hits.title = title_row[0];
        self.hits.body = rows[2];

        let swatch_x = rect.x + rect.width + 1;
        if swatch_x + 4 > area.x + area.width {
            return;
        }
        for (idx, swatch_color) in NoteColor::ALL.into_iter().enumerate() {
            let y = rect.y + 1 + idx as u16 * 2;
            if y >= area.y + area.height {
                break;
            }
            let swatch = Rect::new(swatch_x, y, 4, 1);
            let text = if swatch_color == color { "[██]" } else { " ██ " };
            f.render_widget(
                Paragraph::new(Span::styled(
                    text,
                    Style::default().fg(palette::note_background(swatch_color)),
                )),
                swatch,
            );
            self.hits.swatches.push((swatch, swatch_color));
        }
    }

    fn draw_list(&mut self, f: &mut ratatui::Frame<'_>, area: Rect, theme: &Theme) {
        self.clamp_list_selection();
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(area);
        let entries = self.list.entries(self.store);
        let mode = self.list.mode();
        let block = Block::default()
            .title(Span::styled(
                format!("{} ({})", mode.label(), entries.len()),
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.accent))
            .style(Style::default().bg(theme.background));

        if entries.is_empty() {
            let empty = self.list.empty_state();
            let lines = vec![
                Line::from(""),
                Line::from(Span::styled(
                    empty.title,
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(empty.message, Style::default().fg(theme.muted))),
            ];
            f.render_widget(
                Paragraph::new(lines)
                    .alignment(Alignment::Center)
                    .block(block),
                sections[0],
            );
        } else {
            let width = sections[0].width.saturating_sub(4) as usize;
            let items: Vec<ListItem> = entries
                .iter()
                .map(|note| list_item(note, self.settings.resolve_color(note), mode, width))
                .collect();
            let mut state = ListState::default();
            state.select(Some(self.list_selected));
            let list = List::new(items).block(block).highlight_style(
                Style::default()
                    .bg(Color::LightCyan)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            );
            f.render_stateful_widget(list, sections[0], &mut state);
        }

        let clear_style = if self.list.clear_trash_enabled(self.store) {
            Style::default().fg(Color::LightRed)
        } else {
            Style::default().fg(theme.muted).add_modifier(Modifier::DIM)
        };
        f.render_widget(
            Paragraph::new(Span::styled("c  Clear Trash", clear_style)).alignment(Alignment::Center),
            sections[1],
        );
    }

    fn draw_settings(&self, f: &mut ratatui::Frame<'_>, area: Rect, theme: &Theme) {
        let current = self.settings.get();
        let lines: Vec<Line<'static>> = SETTING_ROWS
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let (label, value) = match row {
                    SettingRow::Color => ("Note color", current.note_color.key().to_string()),
                    SettingRow::Size => (
                        "Note size",
                        format!(
                            "{} ({:.0}pt text)",
                            current.note_size.label(),
                            current.note_size.font_size()
                        ),
                    ),
                    SettingRow::Appearance => ("Appearance", current.appearance.key().to_string()),
                    SettingRow::Rotation => (
                        "Tilt resting notes",
                        if current.allow_rotation { "on" } else { "off" }.to_string(),
                    ),
                    SettingRow::Welcome => ("Show welcome", "press Enter".to_string()),
                };
                let selected = idx == self.settings_selected;
                let mut spans = vec![
                    Span::styled(
                        format!("{} {:<20}", if selected { "›" } else { " " }, label),
                        Style::default().add_modifier(if selected {
                            Modifier::BOLD
                        } else {
                            Modifier::empty()
                        }),
                    ),
                    Span::styled(
                        format!("‹ {} ›", value),
                        Style::default().fg(if selected { theme.accent } else { theme.foreground }),
                    ),
                ];
                if *row == SettingRow::Color {
                    spans.push(Span::raw("  "));
                    spans.push(Span::styled(
                        "██",
                        Style::default().fg(palette::note_background(current.note_color)),
                    ));
                }
                Line::from(spans)
            })
            .collect();
        let block = Block::default()
            .title(Span::styled(
                "Settings",
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.accent))
            .style(Style::default().bg(theme.background));
        f.render_widget(Paragraph::new(lines).block(block), area);
    }
}

fn draw_note(
    f: &mut ratatui::Frame<'_>,
    rect: Rect,
    sprite: &Sprite,
    tilt: f32,
    lifted: bool,
    faded: bool,
) {
    let mut style = Style::default()
        .bg(palette::note_background(sprite.color))
        .fg(Color::Black);
    if faded {
        style = style.add_modifier(Modifier::DIM);
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(if lifted {
            BorderType::Thick
        } else {
            BorderType::Plain
        })
        .style(style);
    let inner = block.inner(rect);
    f.render_widget(Clear, rect);
    f.render_widget(block, rect);
    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(inner);
    let alignment = tilt_alignment(tilt);
    f.render_widget(
        Paragraph::new(Span::styled(
            truncate_text(&sprite.title, inner.width as usize),
            Style::default().add_modifier(Modifier::BOLD),
        ))
        .alignment(alignment),
        rows[0],
    );
    f.render_widget(
        Paragraph::new(sprite.body.clone())
            .alignment(alignment)
            .wrap(Wrap { trim: true }),
        rows[1],
    );
    f.render_widget(
        Paragraph::new(Span::styled(
            sprite.created_at.format("%b %-d, %Y").to_string(),
            Style::default().fg(Color::DarkGray),
        ))
        .alignment(alignment),
        rows[2],
    );
}

fn draw_confirm(f: &mut ratatui::Frame<'_>, question: &str) {
    let area = centered_rect(50, 30, f.size());
    let body = vec![
        Line::from(Span::styled(
            question.to_string(),
            Style::default()
                .fg(Color::LightRed)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("This cannot be undone. Press y to confirm, n or Esc to cancel"),
    ];
    let dialog = Paragraph::new(body)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(Span::styled(
                    "Confirm Delete",
                    Style::default()
                        .fg(Color::LightRed)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::LightRed)),
        );
    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

fn draw_welcome(f: &mut ratatui::Frame<'_>, theme: &Theme) {
    let area = centered_rect(60, 50, f.size());
    let key = |k: &'static str| {
        Span::styled(
            format!("{:>8}  ", k),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )
    };
    let lines = vec![
        Line::from(Span::styled(
            "Welcome to stickies",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![key("n"), Span::raw("pull a new note off the pad")]),
        Line::from(vec![key("drag"), Span::raw("move a note around the board")]),
        Line::from(vec![key("click"), Span::raw("open a note to edit it")]),
        Line::from(vec![key("trash"), Span::raw("drop a note bottom-left to delete it")]),
        Line::from(vec![key("t"), Span::raw("recover or purge deleted notes")]),
        Line::from(vec![key("s"), Span::raw("colours, sizes and appearance")]),
        Line::from(""),
        Line::from(Span::styled(
            "Press any key to start",
            Style::default().fg(theme.muted),
        )),
    ];
    let dialog = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.accent)),
    );
    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

fn list_item(note: &Note, color: NoteColor, mode: ListMode, width: usize) -> ListItem<'static> {
    let mut title = vec![
        Span::styled("██ ", Style::default().fg(palette::note_background(color))),
        Span::styled(
            truncate_text(note.display_title(), width.saturating_sub(14)),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];
    if mode == ListMode::All && note.trashed {
        title.push(Span::styled(
            "  [trashed]",
            Style::default().fg(Color::LightRed),
        ));
    }
    let mut lines = vec![Line::from(title)];
    if let Some(first) = note.body.lines().find(|l| !l.trim().is_empty()) {
        lines.push(Line::from(Span::styled(
            format!("   {}", truncate_text(first, width.saturating_sub(3))),
            Style::default().fg(Color::Gray),
        )));
    }
    lines.push(Line::from(Span::styled(
        format!("   {}", note.created_at.format("%b %-d, %Y")),
        Style::default().fg(Color::DarkGray),
    )));
    ListItem::new(lines)
}

/// Cells covered by a box of `size` centred on `center`, clipped to `area`.
fn cell_rect(area: Rect, center: Point, size: Size) -> Option<Rect> {
    let width = cells(size.width / CELL_WIDTH).max(3);
    let height = cells(size.height / CELL_HEIGHT).max(3);
    let left = cells((center.x / CELL_WIDTH).floor()) - width / 2;
    let top = cells((center.y / CELL_HEIGHT).floor()) - height / 2;
    let l = left.max(0);
    let t = top.max(0);
    let r = (left + width).min(area.width as i32);
    let b = (top + height).min(area.height as i32);
    if r <= l || b <= t {
        return None;
    }
    Some(Rect::new(
        area.x + l as u16,
        area.y + t as u16,
        (r - l) as u16,
        (b - t) as u16,
    ))
}

/// Stored positions are arbitrary; keep cell arithmetic far from `i32` limits.
fn cells(units: f64) -> i32 {
    units.round().clamp(-(MAX_CELL_SPAN as f64), MAX_CELL_SPAN as f64) as i32
}

fn cell_translation(from: (u16, u16), to: (u16, u16)) -> Translation {
    Translation::new(
        (to.0 as f64 - from.0 as f64) * CELL_WIDTH,
        (to.1 as f64 - from.1 as f64) * CELL_HEIGHT,
    )
}

fn contains(rect: Rect, cell: (u16, u16)) -> bool {
    cell.0 >= rect.x
        && cell.0 < rect.x.saturating_add(rect.width)
        && cell.1 >= rect.y
        && cell.1 < rect.y.saturating_add(rect.height)
}

/// Terminals cannot rotate text, so a tilt leans the text instead.
fn tilt_alignment(tilt: f32) -> Alignment {
    if tilt < -2.0 {
        Alignment::Left
    } else if tilt > 2.0 {
        Alignment::Right
    } else {
        Alignment::Center
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn prev_char_boundary(cursor: usize, text: &str) -> usize {
    text[..cursor]
        .char_indices()
        .next_back()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn next_char_boundary(cursor: usize, text: &str) -> usize {
    text[cursor..]
        .chars()
        .next()
        .map(|ch| cursor + ch.len_utf8())
        .unwrap_or(text.len())
}

fn line_state(text: &str, cursor: usize) -> (Vec<usize>, usize, usize) {
    let mut starts = vec![0];
    for (idx, ch) in text.char_indices() {
        if ch == '\n' {
            starts.push(idx + 1);
        }
    }
    let line_idx = starts
        .iter()
        .rposition(|start| *start <= cursor)
        .unwrap_or(0);
    let col = text[starts[line_idx]..cursor].chars().count();
    (starts, line_idx, col)
}

fn index_at_col(text: &str, start: usize, target_col: usize) -> usize {
    let slice = &text[start..];
    let limit = slice.find('\n').unwrap_or(slice.len());
    slice[..limit]
        .char_indices()
        .nth(target_col)
        .map(|(idx, _)| start + idx)
        .unwrap_or(start + limit)
}

fn truncate_text(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(&"...".chars().take(max - keep).collect::<String>());
    out
}

fn format_elapsed(last: Instant) -> String {
    let secs = last.elapsed().as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
