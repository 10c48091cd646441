use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub type NoteId = String;

/// Footprint of a note while its editor is open, independent of the size tier.
pub const EDITING_SIZE: Size = Size {
    width: 280.0,
    height: 260.0,
};

pub const DEFAULT_TITLE: &str = "Title";
pub const DEFAULT_BODY: &str = "Your note goes here...";

const ID_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn translated(self, by: Translation) -> Point {
        Point::new(self.x + by.dx, self.y + by.dy)
    }
}

/// Cumulative movement of a gesture since it started.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Translation {
    pub dx: f64,
    pub dy: f64,
}

impl Translation {
    pub const fn new(dx: f64, dy: f64) -> Self {
        Translation { dx, dy }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Size { width, height }
    }

    pub const fn square(side: f64) -> Self {
        Size {
            width: side,
            height: side,
        }
    }
}

/// Visible board area in board-space units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub const fn new(width: f64, height: f64) -> Self {
        Viewport { width, height }
    }

    /// Bottom-left hot-zone where a dropped note is moved to the trash.
    pub fn trash_zone_contains(&self, point: Point) -> bool {
        point.x <= self.width / 3.4 && point.y >= self.height * 0.85
    }

    pub fn new_note_position(&self) -> Point {
        Point::new(self.width / 2.0, self.height * 0.25)
    }

    pub fn editor_position(&self) -> Point {
        Point::new(self.width / 2.0, self.height * 0.35)
    }
}

impl Default for Viewport {
    /// An 80x24 terminal at the board's cell scale.
    fn default() -> Self {
        Viewport::new(640.0, 384.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NoteColor {
    #[default]
    Yellow,
    Blue,
    Green,
    Pink,
    Orange,
}

impl NoteColor {
    pub const ALL: [NoteColor; 5] = [
        NoteColor::Yellow,
        NoteColor::Blue,
        NoteColor::Green,
        NoteColor::Pink,
        NoteColor::Orange,
    ];

    pub fn key(self) -> &'static str {
        match self {
            NoteColor::Yellow => "yellow",
            NoteColor::Blue => "blue",
            NoteColor::Green => "green",
            NoteColor::Pink => "pink",
            NoteColor::Orange => "orange",
        }
    }

    pub fn capitalized(self) -> &'static str {
        match self {
            NoteColor::Yellow => "Yellow",
            NoteColor::Blue => "Blue",
            NoteColor::Green => "Green",
            NoteColor::Pink => "Pink",
            NoteColor::Orange => "Orange",
        }
    }

    /// Trims and lowercases `raw`; anything outside the supported set is yellow.
    pub fn normalize(raw: &str) -> NoteColor {
        let key = raw.trim().to_lowercase();
        NoteColor::ALL
            .into_iter()
            .find(|c| c.key() == key)
            .unwrap_or_default()
    }

    pub fn next(self) -> NoteColor {
        let idx = NoteColor::ALL.iter().position(|c| *c == self).unwrap_or(0);
        NoteColor::ALL[(idx + 1) % NoteColor::ALL.len()]
    }

    pub fn prev(self) -> NoteColor {
        let idx = NoteColor::ALL.iter().position(|c| *c == self).unwrap_or(0);
        NoteColor::ALL[(idx + NoteColor::ALL.len() - 1) % NoteColor::ALL.len()]
    }
}

impl From<String> for NoteColor {
    fn from(raw: String) -> Self {
        NoteColor::normalize(&raw)
    }
}

impl From<NoteColor> for String {
    fn from(color: NoteColor) -> Self {
        color.key().to_string()
    }
}

impl fmt::Display for NoteColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SizeTier {
    Small,
    #[default]
    Normal,
    Large,
}

impl SizeTier {
    pub const ALL: [SizeTier; 3] = [SizeTier::Small, SizeTier::Normal, SizeTier::Large];

    pub fn label(self) -> &'static str {
        match self {
            SizeTier::Small => "Small",
            SizeTier::Normal => "Normal",
            SizeTier::Large => "Large",
        }
    }

    pub fn display_side(self) -> f64 {
        match self {
            SizeTier::Small => 110.0,
            SizeTier::Normal => 120.0,
            SizeTier::Large => 140.0,
        }
    }

    pub fn font_size(self) -> f64 {
        match self {
            SizeTier::Small => 10.0,
            SizeTier::Normal => 14.0,
            SizeTier::Large => 20.0,
        }
    }

    pub fn display_size(self) -> Size {
        Size::square(self.display_side())
    }

    /// Stored labels match exactly; anything else is Normal.
    pub fn normalize(raw: &str) -> SizeTier {
        SizeTier::ALL
            .into_iter()
            .find(|t| t.label() == raw)
            .unwrap_or_default()
    }

    /// Lenient parse for typed input such as `settings set size large`.
    pub fn from_input(raw: &str) -> SizeTier {
        let raw = raw.trim();
        SizeTier::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(raw))
            .unwrap_or_default()
    }

    pub fn next(self) -> SizeTier {
        match self {
            SizeTier::Small => SizeTier::Normal,
            SizeTier::Normal => SizeTier::Large,
            SizeTier::Large => SizeTier::Small,
        }
    }

    pub fn prev(self) -> SizeTier {
        match self {
            SizeTier::Small => SizeTier::Large,
            SizeTier::Normal => SizeTier::Small,
            SizeTier::Large => SizeTier::Normal,
        }
    }
}

impl From<String> for SizeTier {
    fn from(raw: String) -> Self {
        SizeTier::normalize(&raw)
    }
}

impl From<SizeTier> for String {
    fn from(tier: SizeTier) -> Self {
        tier.label().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Appearance {
    #[default]
    System,
    Dark,
    Light,
}

impl Appearance {
    pub fn key(self) -> &'static str {
        match self {
            Appearance::System => "system",
            Appearance::Dark => "dark",
            Appearance::Light => "light",
        }
    }

    pub fn normalize(raw: &str) -> Appearance {
        match raw.trim().to_lowercase().as_str() {
            "dark" => Appearance::Dark,
            "light" => Appearance::Light,
            _ => Appearance::System,
        }
    }

    pub fn next(self) -> Appearance {
        match self {
            Appearance::System => Appearance::Dark,
            Appearance::Dark => Appearance::Light,
            Appearance::Light => Appearance::System,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Note {
    pub id: NoteId,
    pub x: f64,
    pub y: f64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub editing: bool,
    #[serde(default)]
    pub z_order: f64,
    #[serde(default)]
    pub z_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<NoteColor>,
    pub created_at: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum NoteError {
    #[error("note not found: {0}")]
    NotFound(NoteId),
}

impl Note {
    pub fn new(
        id: NoteId,
        position: Point,
        title: impl Into<String>,
        body: impl Into<String>,
        size: Size,
        created_at: DateTime<Utc>,
    ) -> Self {
        Note {
            id,
            x: position.x,
            y: position.y,
            title: title.into(),
            body: body.into(),
            width: size.width,
            height: size.height,
            trashed: false,
            editing: false,
            z_order: 0.0,
            z_seq: 0,
            color: None,
            created_at,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn set_position(&mut self, position: Point) {
        self.x = position.x;
        self.y = position.y;
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn set_size(&mut self, size: Size) {
        self.width = size.width;
        self.height = size.height;
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }

    /// Back-to-front comparison; `z_seq` separates equal timestamps.
    pub fn stacking_cmp(&self, other: &Note) -> Ordering {
        self.z_order
            .total_cmp(&other.z_order)
            .then(self.z_seq.cmp(&other.z_seq))
    }
}

pub fn generate_id() -> NoteId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trash_zone_is_anchored_bottom_left() {
        let viewport = Viewport::new(390.0, 844.0);
        assert!(!viewport.trash_zone_contains(Point::new(50.0, 700.0)));
        assert!(viewport.trash_zone_contains(Point::new(40.0, 750.0)));
        assert!(!viewport.trash_zone_contains(Point::new(200.0, 800.0)));
        assert!(viewport.trash_zone_contains(Point::new(390.0 / 3.4, 844.0 * 0.85)));
    }

    #[test]
    fn new_note_position_is_centered_at_quarter_height() {
        let viewport = Viewport::new(390.0, 844.0);
        assert_eq!(viewport.new_note_position(), Point::new(195.0, 211.0));
    }

    #[test]
    fn color_keys_normalize() {
        assert_eq!(NoteColor::normalize(" Blue "), NoteColor::Blue);
        assert_eq!(NoteColor::normalize("purple"), NoteColor::Yellow);
        assert_eq!(NoteColor::normalize(""), NoteColor::Yellow);
        assert_eq!(NoteColor::Orange.next(), NoteColor::Yellow);
        assert_eq!(NoteColor::Yellow.prev(), NoteColor::Orange);
    }

    #[test]
    fn size_tiers_map_to_sides_and_fonts() {
        assert_eq!(SizeTier::Small.display_side(), 110.0);
        assert_eq!(SizeTier::Normal.display_side(), 120.0);
        assert_eq!(SizeTier::Large.display_side(), 140.0);
        assert_eq!(SizeTier::Small.font_size(), 10.0);
        assert_eq!(SizeTier::Normal.font_size(), 14.0);
        assert_eq!(SizeTier::Large.font_size(), 20.0);
        assert_eq!(SizeTier::normalize("Huge"), SizeTier::Normal);
        assert_eq!(SizeTier::normalize("Large"), SizeTier::Large);
        assert_eq!(SizeTier::normalize("large"), SizeTier::Normal);
        assert_eq!(SizeTier::from_input(" large "), SizeTier::Large);
    }

    #[test]
    fn appearance_falls_back_to_system() {
        assert_eq!(Appearance::normalize("DARK"), Appearance::Dark);
        assert_eq!(Appearance::normalize("sepia"), Appearance::System);
    }

    #[test]
    fn note_yaml_tolerates_missing_and_unknown_fields() {
        let yaml = "id: abc\nx: 1.0\ny: 2.0\ntitle: t\nwidth: 120.0\nheight: 120.0\ncolor: purple\ncreated_at: 2025-11-01T10:00:00Z\n";
        let note: Note = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(note.color, Some(NoteColor::Yellow));
        assert!(!note.trashed);
        assert!(!note.editing);
        assert_eq!(note.z_seq, 0);
        assert_eq!(note.body, "");
    }

    #[test]
    fn stacking_uses_sequence_for_equal_timestamps() {
        let now = Utc::now();
        let mut a = Note::new("a".into(), Point::default(), "", "", Size::square(1.0), now);
        let mut b = a.clone();
        b.id = "b".into();
        a.z_order = 10.0;
        b.z_order = 10.0;
        a.z_seq = 2;
        b.z_seq = 1;
        assert_eq!(a.stacking_cmp(&b), Ordering::Greater);
        assert_eq!(a.display_title(), "Untitled");
    }

    #[test]
    fn generated_ids_are_alphanumeric() {
        let id = generate_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
