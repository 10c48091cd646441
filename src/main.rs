mod board;
mod cli;
mod commands;
mod logging;
mod model;
mod palette;
mod settings;
mod storage;
mod trash;
mod ui;

use anyhow::Result;
use clap::Parser;
use commands::Workspace;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let log_level = args.log_level.as_deref();
    let command = args.command.unwrap_or(cli::Command::Tui);
    match command {
        cli::Command::Init => commands::init(),
        cli::Command::List { all } => commands::list(Workspace::open(log_level)?, all),
        cli::Command::Add { title, body, color } => {
            commands::add(Workspace::open(log_level)?, title, body, color)
        }
        cli::Command::Trash { note_id } => commands::trash(Workspace::open(log_level)?, note_id),
        cli::Command::Restore { note_id } => {
            commands::restore(Workspace::open(log_level)?, note_id)
        }
        cli::Command::Delete { note_id } => commands::delete(Workspace::open(log_level)?, note_id),
        cli::Command::ClearTrash => commands::clear_trash(Workspace::open(log_level)?),
        cli::Command::Settings { action } => {
            commands::settings(Workspace::open(log_level)?, action)
        }
        cli::Command::Tui => commands::tui(Workspace::open(log_level)?),
    }
}
