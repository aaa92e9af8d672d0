use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use colored::Colorize;
use lazy_static::lazy_static;

use crate::utils::Res;

/// Process-global sink for engine communication and diagnostics. Progress
/// reporting goes through the output sinks instead; this logger exists so
/// that protocol traffic can be reconstructed after a run.
#[derive(Default)]
struct LogState {
    file: Option<BufWriter<File>>,
    realtime: bool,
}

lazy_static! {
    static ref LOG: Mutex<LogState> = Mutex::new(LogState::default());
}

pub fn init(path: &Path, realtime: bool) -> Res<()> {
    let file = File::create(path)
        .map_err(|err| anyhow::anyhow!("Couldn't open log file '{}': {err}", path.display()))?;
    let mut log = LOG.lock().unwrap();
    log.file = Some(BufWriter::new(file));
    log.realtime = realtime;
    Ok(())
}

/// True iff engine lines should be logged as they arrive rather than after
/// each read completes.
pub fn realtime_logging() -> bool {
    LOG.lock().unwrap().realtime
}

fn append(line: &str) {
    let mut log = LOG.lock().unwrap();
    if let Some(file) = log.file.as_mut() {
        let stamp = chrono::Utc::now().format("%H:%M:%S%.3f");
        if writeln!(file, "[{stamp}] {line}").and_then(|()| file.flush()).is_err() {
            // a broken log sink shouldn't take the tournament down
            log.file = None;
        }
    }
}

pub fn write_to_engine(name: &str, msg: &str) {
    append(&format!("({name}) < {msg}"));
}

pub fn read_from_engine(name: &str, msg: &str, stderr: bool) {
    if stderr {
        append(&format!("({name}) !> {msg}"));
    } else {
        append(&format!("({name}) > {msg}"));
    }
}

pub fn warn(msg: impl Display) {
    eprintln!("{} {msg}", "Warning:".yellow());
    append(&format!("Warning: {msg}"));
}

pub fn error(msg: impl Display) {
    eprintln!("{} {msg}", "Error:".red());
    append(&format!("Error: {msg}"));
}
