use crate::cli::Report;
use comfy_table::{
    Cell, CellAlignment, Color, ColumnConstraint, ContentArrangement, Table, Width,
};
use libhmv::flag::FlagVerdict;
use libhmv::machine::{Level, MachineListing, MachineQuery, MachineRecord};
use libhmv::writeup::{CacheState, LanguageFamily, WriteupRecord};
use libhmv::{HmvError, MessageKind};
use owo_colors::{OwoColorize, Stream};

/// Writeup links wrap past this many characters.
const LINK_COLUMN_WIDTH: u16 = 50;

fn success(line: &str) {
    println!(
        "{} {}",
        "[+]".if_supports_color(Stream::Stdout, |t| t.green()),
        line
    );
}

fn info(line: &str) {
    println!(
        "{} {}",
        "[*]".if_supports_color(Stream::Stdout, |t| t.blue()),
        line
    );
}

fn warning(line: &str) {
    println!(
        "{} {}",
        "[!]".if_supports_color(Stream::Stdout, |t| t.yellow()),
        line
    );
}

fn error(line: &str) {
    eprintln!(
        "{} {}",
        "[!]".if_supports_color(Stream::Stderr, |t| t.red()),
        line
    );
}

pub fn message(kind: MessageKind, content: &str) {
    match kind {
        MessageKind::Info => info(content),
        MessageKind::Success => success(content),
        MessageKind::Warning => warning(content),
        MessageKind::Error => error(content),
    }
}

pub fn failure(e: &HmvError) {
    error(&e.to_string());
}

pub fn download_progress(resource_name: &str, bytes_written: u64, file_size: u64) {
    if bytes_written >= file_size {
        info(&format!("Received {bytes_written} bytes for {resource_name}"));
    } else {
        info(&format!("{resource_name} : {bytes_written} / {file_size} bytes"));
    }
}

pub fn report(report: &Report) {
    match report {
        Report::Configured { session_cleared } => {
            if *session_cleared {
                success("Cleared previous session.");
            }
        }
        Report::Machines { listing, query } => machines(listing, query),
        Report::Writeups {
            machine_name,
            matches,
            state,
        } => writeups(machine_name, matches, state),
        Report::Downloaded(downloaded) => {
            let name = downloaded
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            println!(
                "{} {} downloaded successfully.",
                "[✓]".if_supports_color(Stream::Stdout, |t| t.green()),
                name
            );
        }
        Report::Flag(verdict) => match verdict {
            FlagVerdict::Incorrect => error("The flag is incorrect."),
            FlagVerdict::Correct => success("The flag is CORRECT!"),
            FlagVerdict::Unrecognized => error("Unknown response from server."),
        },
    }
}

fn level_color(level: Level) -> Option<Color> {
    match level {
        Level::Easy => Some(Color::Green),
        Level::Medium => Some(Color::Yellow),
        Level::Hard => Some(Color::Red),
        Level::Unknown => None,
    }
}

fn colored(content: &str, color: Option<Color>) -> Cell {
    let cell = Cell::new(content);
    match color {
        Some(c) => cell.fg(c),
        None => cell,
    }
}

fn machine_row(machine: &MachineRecord) -> Vec<Cell> {
    let status_color = if machine.is_pending() {
        Color::Yellow
    } else {
        Color::Green
    };
    vec![
        Cell::new(&machine.name),
        colored(machine.level.as_str(), level_color(machine.level)),
        Cell::new(&machine.status).fg(status_color),
        Cell::new(&machine.creator),
        Cell::new(&machine.link),
    ]
}

pub fn machines_table(machines: &[MachineRecord]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Machine Name", "Level", "Status", "Creator", "Link"]);
    for machine in machines.iter() {
        table.add_row(machine_row(machine));
    }
    table
}

fn machines(listing: &MachineListing, query: &MachineQuery) {
    println!("{}", machines_table(&listing.machines));
    if listing.is_paginated(query) {
        info(&format!("Page {} of {}", listing.page, listing.total_pages));
    }
}

fn language_color(language: &str) -> Option<Color> {
    match LanguageFamily::of(language) {
        LanguageFamily::English => Some(Color::Green),
        LanguageFamily::Spanish => Some(Color::Yellow),
        LanguageFamily::Chinese => Some(Color::Red),
        LanguageFamily::Other => None,
    }
}

pub fn writeups_table(records: &[WriteupRecord]) -> Table {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Machine", "Author", "Language", "Writeup Link"]);
    for record in records.iter() {
        table.add_row(vec![
            Cell::new(&record.machine_name),
            Cell::new(&record.author_name),
            colored(&record.language, language_color(&record.language)),
            Cell::new(&record.writeup_url),
        ]);
    }
    for column in table.column_iter_mut() {
        column.set_cell_alignment(CellAlignment::Left);
    }
    if let Some(link) = table.column_mut(3) {
        link.set_constraint(ColumnConstraint::UpperBoundary(Width::Fixed(
            LINK_COLUMN_WIDTH,
        )));
    }
    table
}

/// The line shown above the writeup table, or instead of it.
fn writeups_headline(
    machine_name: &str,
    matches: &[WriteupRecord],
    state: &CacheState,
) -> (MessageKind, String) {
    if *state == CacheState::Unavailable {
        return (MessageKind::Warning, "No writeup data available.".to_string());
    }
    if matches.is_empty() {
        return (
            MessageKind::Warning,
            format!("No writeups found for machine: {machine_name}"),
        );
    }
    (
        MessageKind::Info,
        format!("Found {} writeup(s) for '{}':", matches.len(), machine_name),
    )
}

fn writeups(machine_name: &str, matches: &[WriteupRecord], state: &CacheState) {
    let (kind, headline) = writeups_headline(machine_name, matches, state);
    message(kind, &headline);
    if !matches.is_empty() {
        println!("{}", writeups_table(matches));
    }
}
