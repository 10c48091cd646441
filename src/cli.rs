use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stickies", version, about = "Drag-and-drop sticky notes in the terminal")]
pub struct Cli {
    /// Log level written to the log file (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a project note store in the current directory
    Init,
    /// List notes (trashed notes unless --all is given)
    List {
        /// Show every note, trashed or not
        #[arg(long)]
        all: bool,
    },
    /// Add a note to the board
    Add {
        /// Title of the note
        title: String,
        /// Optional body text
        #[arg(long)]
        body: Option<String>,
        /// Note colour (yellow, blue, green, pink, orange)
        #[arg(long)]
        color: Option<String>,
    },
    /// Move a note to the trash
    Trash {
        /// Note id
        note_id: String,
    },
    /// Bring a trashed note back to the board
    Restore {
        /// Note id
        note_id: String,
    },
    /// Permanently delete a note
    Delete {
        /// Note id
        note_id: String,
    },
    /// Permanently delete every trashed note
    ClearTrash,
    /// Show or change preferences
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Launch the interactive board
    Tui,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print current preferences
    Show,
    /// Change a preference (color, size, appearance, rotation, onboarding)
    Set { key: String, value: String },
}
