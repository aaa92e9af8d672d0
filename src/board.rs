use std::fmt::{self, Display, Formatter};

use anyhow::anyhow;
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};

use crate::utils::Res;

/// How the rules library ended the game, as opposed to adjudication.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GameEnd {
    /// The winner's colour.
    Checkmate(Color),
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    Repetition,
}

impl GameEnd {
    pub fn winner(self) -> Option<Color> {
        match self {
            GameEnd::Checkmate(winner) => Some(winner),
            _ => None,
        }
    }
}

impl Display for GameEnd {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GameEnd::Checkmate(winner) => {
                write!(f, "{} mates", if *winner == Color::White { "White" } else { "Black" })
            }
            GameEnd::Stalemate => write!(f, "Stalemate"),
            GameEnd::InsufficientMaterial => write!(f, "Draw by insufficient material"),
            GameEnd::FiftyMoveRule => write!(f, "Draw by 50-move rule"),
            GameEnd::Repetition => write!(f, "Draw by repetition"),
        }
    }
}

/// The arbiter's own board, fed with the same moves as the engines. The rules
/// library is a black box; this wrapper only adds the position-hash history
/// it needs for repetition detection.
#[derive(Debug, Clone)]
pub struct GameBoard {
    pos: Chess,
    hashes: Vec<Zobrist64>,
}

impl GameBoard {
    /// `"startpos"` or a FEN.
    pub fn new(fen: &str) -> Res<Self> {
        let pos: Chess = if fen == "startpos" {
            Chess::default()
        } else {
            Fen::from_ascii(fen.as_bytes())
                .map_err(|err| anyhow!("Invalid FEN '{fen}': {err}"))?
                .into_position(CastlingMode::Standard)
                .map_err(|err| anyhow!("Illegal position '{fen}': {err}"))?
        };
        let hashes = vec![hash(&pos)];
        Ok(Self { pos, hashes })
    }

    pub fn side_to_move(&self) -> Color {
        self.pos.turn()
    }

    /// Half-moves played on this board since the starting position.
    pub fn ply(&self) -> usize {
        self.hashes.len() - 1
    }

    pub fn position(&self) -> &Chess {
        &self.pos
    }

    /// Applies a move given in coordinate (USI/LAN) notation, failing on
    /// unparseable or illegal input.
    pub fn try_play(&mut self, mov: &str) -> Res<()> {
        let uci = UciMove::from_ascii(mov.as_bytes())
            .map_err(|err| anyhow!("Unparseable move '{mov}': {err}"))?;
        let mov = uci
            .to_move(&self.pos)
            .map_err(|err| anyhow!("Illegal move '{mov}': {err}"))?;
        self.pos.play_unchecked(&mov);
        self.hashes.push(hash(&self.pos));
        Ok(())
    }

    /// The rules library's own terminal conditions, plus repetition over the
    /// recorded hash history.
    pub fn terminal(&self) -> Option<GameEnd> {
        if self.pos.is_checkmate() {
            return Some(GameEnd::Checkmate(self.pos.turn().other()));
        }
        if self.pos.is_stalemate() {
            return Some(GameEnd::Stalemate);
        }
        if self.pos.is_insufficient_material() {
            return Some(GameEnd::InsufficientMaterial);
        }
        if self.pos.halfmoves() >= 100 {
            return Some(GameEnd::FiftyMoveRule);
        }
        let current = self.hashes.last().unwrap();
        if self.hashes.iter().filter(|h| *h == current).count() >= 3 {
            return Some(GameEnd::Repetition);
        }
        None
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.pos.clone(), EnPassantMode::Legal).to_string()
    }
}

fn hash(pos: &Chess) -> Zobrist64 {
    pos.zobrist_hash(EnPassantMode::Legal)
}
