use std::path::Path;

use anyhow::anyhow;
use shakmaty::{Chess, Position};
use shakmaty_syzygy::{Tablebase, Wdl};

use crate::utils::Res;

/// WDL verdict relative to the side to move.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TbOutcome {
    Win,
    Draw,
    Loss,
}

/// Thin wrapper around the Syzygy probe. Probing is only attempted for
/// positions the tables can answer exactly: no castling rights, a zeroed
/// halfmove clock, and few enough pieces.
pub struct SyzygyTb {
    tb: Tablebase<Chess>,
    max_pieces: usize,
    ignore_50: bool,
}

impl std::fmt::Debug for SyzygyTb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyzygyTb")
            .field("max_pieces", &self.max_pieces)
            .field("ignore_50", &self.ignore_50)
            .finish()
    }
}

impl SyzygyTb {
    pub fn load(path: &Path, pieces_limit: Option<u32>, ignore_50: bool) -> Res<Self> {
        let mut tb = Tablebase::new();
        tb.add_directory(path)
            .map_err(|err| anyhow!("Couldn't read tablebase directory '{}': {err}", path.display()))?;
        if tb.max_pieces() == 0 {
            return Err(anyhow!(
                "No tablebase files found in '{}'",
                path.display()
            ));
        }
        let max_pieces = match pieces_limit {
            Some(limit) => tb.max_pieces().min(limit as usize),
            None => tb.max_pieces(),
        };
        Ok(Self {
            tb,
            max_pieces,
            ignore_50,
        })
    }

    pub fn can_probe(&self, pos: &Chess) -> bool {
        pos.halfmoves() == 0
            && pos.castles().is_empty()
            && pos.board().occupied().count() <= self.max_pieces
    }

    /// WDL for the side to move, or `None` when the probe fails. Cursed wins
    /// and blessed losses count as draws unless the 50-move rule is ignored.
    pub fn probe(&self, pos: &Chess) -> Option<TbOutcome> {
        debug_assert!(self.can_probe(pos));
        let wdl = self.tb.probe_wdl_after_zeroing(pos).ok()?;
        Some(match wdl {
            Wdl::Win => TbOutcome::Win,
            Wdl::CursedWin => {
                if self.ignore_50 {
                    TbOutcome::Win
                } else {
                    TbOutcome::Draw
                }
            }
            Wdl::Draw => TbOutcome::Draw,
            Wdl::BlessedLoss => {
                if self.ignore_50 {
                    TbOutcome::Loss
                } else {
                    TbOutcome::Draw
                }
            }
            Wdl::Loss => TbOutcome::Loss,
        })
    }
}
