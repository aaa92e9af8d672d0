use std::fs;

use anyhow::anyhow;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::{BookConfig, BookOrder};
use crate::utils::Res;

/// A starting position plus the move prefix both sides replay before play
/// begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opening {
    pub fen: String,
    pub moves: Vec<String>,
}

impl Default for Opening {
    fn default() -> Self {
        Self {
            fen: "startpos".to_string(),
            moves: vec![],
        }
    }
}

/// The opening book backing a tournament. Without a book file every game
/// starts from the initial position.
#[derive(Debug)]
pub struct OpeningBook {
    openings: Vec<Opening>,
    file_name: Option<String>,
}

impl OpeningBook {
    pub fn load(config: &BookConfig, seed: u64) -> Res<Self> {
        let Some(path) = &config.file else {
            return Ok(Self {
                openings: vec![Opening::default()],
                file_name: None,
            });
        };
        let mut openings = parse_epd(&fs::read_to_string(path).map_err(|err| {
            anyhow!("Couldn't read opening book '{}': {err}", path.display())
        })?)?;
        if openings.is_empty() {
            return Err(anyhow!("Opening book '{}' contains no positions", path.display()));
        }
        if config.order == BookOrder::Random {
            let mut rng = StdRng::seed_from_u64(seed);
            openings.shuffle(&mut rng);
        }
        Ok(Self {
            openings,
            file_name: path.file_name().map(|name| name.to_string_lossy().to_string()),
        })
    }

    /// The book file's name, for reports.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.openings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.openings.is_empty()
    }

    /// Indexing wraps around, so a long tournament cycles through the book.
    pub fn get(&self, idx: usize) -> &Opening {
        &self.openings[idx % self.openings.len()]
    }
}

/// One EPD record per line; `;`-separated operations and `#` comments are
/// dropped.
fn parse_epd(content: &str) -> Res<Vec<Opening>> {
    let mut openings = vec![];
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fen = line.split(';').next().unwrap().trim();
        if fen.is_empty() {
            continue;
        }
        crate::board::GameBoard::new(fen)
            .map_err(|err| anyhow!("Bad opening '{fen}': {err}"))?;
        openings.push(Opening {
            fen: fen.to_string(),
            moves: vec![],
        });
    }
    Ok(openings)
}
