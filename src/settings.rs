//! User preferences backed by a small YAML key-value file.
//!
//! Values are normalised on load: anything missing, mistyped or outside the
//! supported set reads back as its default. Each setter writes the file right
//! away; a failed write is logged and the new value stays in memory.

use crate::model::{Appearance, Note, NoteColor, Size, SizeTier};
use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const KEY_NOTE_COLOR: &str = "NoteColor";
const KEY_NOTE_SIZE: &str = "NoteSize";
const KEY_APPEARANCE: &str = "ColorScheme";
const KEY_ALLOW_ROTATION: &str = "AllowRotation";
const KEY_ONBOARDING_SEEN: &str = "OnboardingSeen";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub note_color: NoteColor,
    pub note_size: SizeTier,
    pub appearance: Appearance,
    pub allow_rotation: bool,
    pub onboarding_seen: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            note_color: NoteColor::Yellow,
            note_size: SizeTier::Normal,
            appearance: Appearance::System,
            allow_rotation: true,
            onboarding_seen: false,
        }
    }
}

impl Settings {
    fn from_values(values: &BTreeMap<String, Value>) -> Self {
        let defaults = Settings::default();
        Settings {
            note_color: text(values, KEY_NOTE_COLOR)
                .map(NoteColor::normalize)
                .unwrap_or(defaults.note_color),
            note_size: text(values, KEY_NOTE_SIZE)
                .map(SizeTier::normalize)
                .unwrap_or(defaults.note_size),
            appearance: text(values, KEY_APPEARANCE)
                .map(Appearance::normalize)
                .unwrap_or(defaults.appearance),
            allow_rotation: flag(values, KEY_ALLOW_ROTATION).unwrap_or(defaults.allow_rotation),
            onboarding_seen: flag(values, KEY_ONBOARDING_SEEN)
                .unwrap_or(defaults.onboarding_seen),
        }
    }

    fn write_values(&self, values: &mut BTreeMap<String, Value>) {
        values.insert(KEY_NOTE_COLOR.into(), self.note_color.key().into());
        values.insert(KEY_NOTE_SIZE.into(), self.note_size.label().into());
        values.insert(KEY_APPEARANCE.into(), self.appearance.key().into());
        values.insert(KEY_ALLOW_ROTATION.into(), self.allow_rotation.into());
        values.insert(KEY_ONBOARDING_SEEN.into(), self.onboarding_seen.into());
    }
}

/// Process-wide preferences, constructed once at startup and handed to the
/// components that read them.
pub struct SettingsProvider {
    path: PathBuf,
    values: BTreeMap<String, Value>,
    current: Settings,
}

impl SettingsProvider {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = read_values(&path).unwrap_or_else(|err| {
            warn!("event=settings_unreadable path={} error={:#}", path.display(), err);
            BTreeMap::new()
        });
        let current = Settings::from_values(&values);
        debug!("event=settings_loaded path={} settings={:?}", path.display(), current);
        SettingsProvider {
            path,
            values,
            current,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &Settings {
        &self.current
    }

    pub fn note_color(&self) -> NoteColor {
        self.current.note_color
    }

    pub fn note_size(&self) -> SizeTier {
        self.current.note_size
    }

    pub fn appearance(&self) -> Appearance {
        self.current.appearance
    }

    pub fn allow_rotation(&self) -> bool {
        self.current.allow_rotation
    }

    pub fn onboarding_seen(&self) -> bool {
        self.current.onboarding_seen
    }

    pub fn display_size(&self) -> Size {
        self.current.note_size.display_size()
    }

    /// The colour a note is drawn with: its own, else the preferred one.
    pub fn resolve_color(&self, note: &Note) -> NoteColor {
        note.color.unwrap_or(self.current.note_color)
    }

    pub fn set_note_color(&mut self, color: NoteColor) {
        self.current.note_color = color;
        self.write();
    }

    pub fn set_note_size(&mut self, tier: SizeTier) {
        self.current.note_size = tier;
        self.write();
    }

    pub fn set_appearance(&mut self, appearance: Appearance) {
        self.current.appearance = appearance;
        self.write();
    }

    pub fn set_allow_rotation(&mut self, allow: bool) {
        self.current.allow_rotation = allow;
        self.write();
    }

    pub fn set_onboarding_seen(&mut self, seen: bool) {
        self.current.onboarding_seen = seen;
        self.write();
    }

    /// Sets a preference by its stored key or a short alias.
    pub fn set_by_key(&mut self, key: &str, value: &str) -> Result<()> {
        match key.trim().to_ascii_lowercase().as_str() {
            "color" | "notecolor" => self.set_note_color(NoteColor::normalize(value)),
            "size" | "notesize" => self.set_note_size(SizeTier::from_input(value)),
            "appearance" | "colorscheme" => self.set_appearance(Appearance::normalize(value)),
            "rotation" | "allowrotation" => self.set_allow_rotation(parse_flag(value)?),
            "onboarding" | "onboardingseen" => self.set_onboarding_seen(parse_flag(value)?),
            other => bail!(
                "unknown setting `{}` (expected color, size, appearance, rotation or onboarding)",
                other
            ),
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (KEY_NOTE_COLOR, self.current.note_color.key().to_string()),
            (KEY_NOTE_SIZE, self.current.note_size.label().to_string()),
            (KEY_APPEARANCE, self.current.appearance.key().to_string()),
            (KEY_ALLOW_ROTATION, self.current.allow_rotation.to_string()),
            (KEY_ONBOARDING_SEEN, self.current.onboarding_seen.to_string()),
        ]
    }

    fn write(&mut self) {
        self.current.write_values(&mut self.values);
        if let Err(err) = write_values(&self.path, &self.values) {
            warn!(
                "event=settings_save_failed path={} error={:#}",
                self.path.display(),
                err
            );
        }
    }
}

fn text<'a>(values: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a str> {
    values.get(key).and_then(Value::as_str)
}

fn flag(values: &BTreeMap<String, Value>, key: &str) -> Option<bool> {
    values.get(key).and_then(Value::as_bool)
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => bail!("expected true or false, got `{}`", other),
    }
}

fn read_values(path: &Path) -> Result<BTreeMap<String, Value>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_yaml::from_str(&data).context("parsing settings file")
}

fn write_values(path: &Path, values: &BTreeMap<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(values).context("serializing settings")?;
    fs::write(path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SettingsProvider::load(dir.path().join("settings.yml"));
        assert_eq!(provider.get(), &Settings::default());
        assert_eq!(provider.display_size(), Size::square(120.0));
    }

    #[test]
    fn invalid_values_normalize_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        fs::write(
            &path,
            "NoteColor: purple\nNoteSize: Enormous\nColorScheme: Dark\nAllowRotation: maybe\n",
        )
        .unwrap();
        let provider = SettingsProvider::load(&path);
        assert_eq!(provider.note_color(), NoteColor::Yellow);
        assert_eq!(provider.note_size(), SizeTier::Normal);
        assert_eq!(provider.appearance(), Appearance::Dark);
        assert!(provider.allow_rotation());
        assert!(!provider.onboarding_seen());
    }

    #[test]
    fn unparseable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        fs::write(&path, "- not\n- a mapping\n").unwrap();
        assert_eq!(SettingsProvider::load(&path).get(), &Settings::default());
    }

    #[test]
    fn setters_persist_immediately_and_keep_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        fs::write(&path, "Extra: kept\n").unwrap();

        let mut provider = SettingsProvider::load(&path);
        provider.set_note_color(NoteColor::Blue);
        provider.set_note_size(SizeTier::Large);
        provider.set_by_key("rotation", "off").unwrap();

        let reloaded = SettingsProvider::load(&path);
        assert_eq!(reloaded.note_color(), NoteColor::Blue);
        assert_eq!(reloaded.note_size(), SizeTier::Large);
        assert!(!reloaded.allow_rotation());
        assert!(fs::read_to_string(&path).unwrap().contains("Extra: kept"));
    }

    #[test]
    fn set_by_key_rejects_unknown_keys_and_bad_flags() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = SettingsProvider::load(dir.path().join("settings.yml"));
        assert!(provider.set_by_key("font", "big").is_err());
        assert!(provider.set_by_key("rotation", "sometimes").is_err());
        provider.set_by_key("ColorScheme", "light").unwrap();
        assert_eq!(provider.appearance(), Appearance::Light);
    }

    #[test]
    fn stored_size_labels_are_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        fs::write(&path, "NoteSize: large\n").unwrap();
        let mut provider = SettingsProvider::load(&path);
        assert_eq!(provider.note_size(), SizeTier::Normal);

        provider.set_by_key("size", "large").unwrap();
        assert_eq!(provider.note_size(), SizeTier::Large);
        assert_eq!(SettingsProvider::load(&path).note_size(), SizeTier::Large);
    }

    #[test]
    fn note_color_falls_back_to_preference() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = SettingsProvider::load(dir.path().join("settings.yml"));
        provider.set_note_color(NoteColor::Green);
        let mut note = Note::new(
            "a".into(),
            Default::default(),
            "",
            "",
            Size::square(120.0),
            chrono::Utc::now(),
        );
        assert_eq!(provider.resolve_color(&note), NoteColor::Green);
        note.color = Some(NoteColor::Pink);
        assert_eq!(provider.resolve_color(&note), NoteColor::Pink);
    }
}
