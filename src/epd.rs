use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::anyhow;

use crate::utils::Res;

/// The EPD of a position is its FEN without the move counters.
pub fn epd_from_fen(fen: &str) -> String {
    fen.split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

/// One line per finished game: the final position's EPD.
#[derive(Debug)]
pub struct EpdWriter {
    file: BufWriter<File>,
}

impl EpdWriter {
    pub fn create(path: &Path) -> Res<Self> {
        let file = File::options()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| anyhow!("Couldn't open EPD file '{}': {err}", path.display()))?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, final_fen: &str) -> Res<()> {
        writeln!(self.file, "{}", epd_from_fen(final_fen))
            .and_then(|()| self.file.flush())
            .map_err(|err| anyhow!("Couldn't append to the EPD file: {err}"))
    }
}
