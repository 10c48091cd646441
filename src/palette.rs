//! Colour-key to asset-name mapping and the terminal colours used to draw
//! notes. Every function accepts raw keys; unsupported keys resolve as yellow.

use crate::model::{Appearance, NoteColor};
use ratatui::style::Color;

pub fn circle_asset(key: &str) -> String {
    format!("N{}", NoteColor::normalize(key).key())
}

pub fn note_asset(key: &str) -> String {
    format!("StickyNote{}", NoteColor::normalize(key).capitalized())
}

pub fn notepad_asset(key: &str) -> String {
    format!("Notepad{}", NoteColor::normalize(key).capitalized())
}

pub fn trash_asset(has_trash: bool) -> &'static str {
    if has_trash {
        "TrashFull"
    } else {
        "TrashEmpty"
    }
}

pub fn note_background(color: NoteColor) -> Color {
    match color {
        NoteColor::Yellow => Color::Rgb(252, 214, 112),
        NoteColor::Blue => Color::Rgb(142, 197, 245),
        NoteColor::Green => Color::Rgb(166, 222, 150),
        NoteColor::Pink => Color::Rgb(246, 168, 204),
        NoteColor::Orange => Color::Rgb(250, 182, 110),
    }
}

pub struct Theme {
    pub background: Color,
    pub foreground: Color,
    pub muted: Color,
    pub accent: Color,
    pub scrim: Color,
}

pub fn theme(appearance: Appearance) -> Theme {
    match appearance {
        Appearance::Dark => Theme {
            background: Color::Rgb(16, 18, 24),
            foreground: Color::Gray,
            muted: Color::DarkGray,
            accent: Color::Cyan,
            scrim: Color::Rgb(30, 32, 40),
        },
        Appearance::Light => Theme {
            background: Color::Rgb(238, 236, 228),
            foreground: Color::Black,
            muted: Color::Gray,
            accent: Color::Blue,
            scrim: Color::Rgb(210, 208, 200),
        },
        Appearance::System => Theme {
            background: Color::Reset,
            foreground: Color::Reset,
            muted: Color::DarkGray,
            accent: Color::Cyan,
            scrim: Color::Reset,
        },
    }
}
