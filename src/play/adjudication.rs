use shakmaty::Color;

use crate::board::GameBoard;
use crate::config::{DrawAdjudication, MaxMovesAdjudication, ResignAdjudication, TournamentConfig};
use crate::play::engine::ScoreKind;
use crate::play::run_match::{loss_for, GameOutcome, MoveRecord};
use crate::tablebase::{SyzygyTb, TbOutcome};

/// Centipawn stand-in for mate scores, beyond every sensible threshold.
const MATE_SCORE: i64 = 32_000;

fn effective_score(record: &MoveRecord) -> i64 {
    match record.score_kind {
        ScoreKind::Cp => record.score,
        ScoreKind::Mate => {
            if record.score >= 0 {
                MATE_SCORE - record.score
            } else {
                -MATE_SCORE - record.score
            }
        }
    }
}

fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}

/// Match-level adjudication on top of the game rules. Stateful because the
/// resign and draw rules count consecutive plies.
#[derive(Debug)]
pub struct Adjudicator<'a> {
    resign: ResignAdjudication,
    draw: DrawAdjudication,
    max_moves: MaxMovesAdjudication,
    tb: Option<&'a SyzygyTb>,
    /// Consecutive own plies each side has reported a lost score for.
    resign_counters: [u32; 2],
    draw_counter: u32,
}

impl<'a> Adjudicator<'a> {
    pub fn new(config: &TournamentConfig, tb: Option<&'a SyzygyTb>) -> Self {
        Self {
            resign: config.resign,
            draw: config.draw,
            max_moves: config.max_moves,
            tb,
            resign_counters: [0; 2],
            draw_counter: 0,
        }
    }

    /// Runs after every engine move. `mover` is the side that just moved;
    /// `moves` contains its record as the last element.
    pub fn adjudicate(
        &mut self,
        board: &GameBoard,
        moves: &[MoveRecord],
        mover: Color,
    ) -> Option<(GameOutcome, String)> {
        self.adjudicate_resign(moves, mover)
            .or_else(|| self.adjudicate_draw(board, moves))
            .or_else(|| self.adjudicate_max_moves(board))
            .or_else(|| self.adjudicate_tablebase(board))
    }

    fn adjudicate_resign(
        &mut self,
        moves: &[MoveRecord],
        mover: Color,
    ) -> Option<(GameOutcome, String)> {
        if !self.resign.enabled {
            return None;
        }
        let own = effective_score(moves.last().filter(|m| !m.book)?);
        let opponent_score = moves
            .len()
            .checked_sub(2)
            .and_then(|i| moves.get(i))
            .filter(|m| !m.book)
            .map(effective_score);
        let threshold = self.resign.score;
        let lost = own <= -threshold
            && (!self.resign.twosided || opponent_score.is_some_and(|s| s >= threshold));
        let counter = &mut self.resign_counters[mover as usize];
        *counter = if lost { *counter + 1 } else { 0 };
        if *counter >= self.resign.move_count {
            return Some((
                loss_for(mover),
                format!(
                    "{} resigns by adjudication (lost by at least {} cp for {} consecutive moves)",
                    color_name(mover),
                    threshold,
                    *counter
                ),
            ));
        }
        None
    }

    fn adjudicate_draw(
        &mut self,
        board: &GameBoard,
        moves: &[MoveRecord],
    ) -> Option<(GameOutcome, String)> {
        if !self.draw.enabled {
            return None;
        }
        if (board.ply() as u32) < self.draw.min_moves {
            return None;
        }
        let last = moves.last().filter(|m| !m.book)?;
        let previous = moves
            .len()
            .checked_sub(2)
            .and_then(|i| moves.get(i))
            .filter(|m| !m.book)?;
        let both_level = effective_score(last).abs() <= self.draw.score
            && effective_score(previous).abs() <= self.draw.score;
        self.draw_counter = if both_level { self.draw_counter + 1 } else { 0 };
        if self.draw_counter >= self.draw.move_count {
            return Some((
                GameOutcome::Draw,
                format!(
                    "Draw by adjudication (both scores within {} cp for {} consecutive plies)",
                    self.draw.score, self.draw_counter
                ),
            ));
        }
        None
    }

    fn adjudicate_max_moves(&self, board: &GameBoard) -> Option<(GameOutcome, String)> {
        if self.max_moves.enabled && board.ply() as u32 >= self.max_moves.move_count {
            return Some((
                GameOutcome::Draw,
                format!(
                    "Draw by adjudication (maximum of {} plies reached)",
                    self.max_moves.move_count
                ),
            ));
        }
        None
    }

    fn adjudicate_tablebase(&self, board: &GameBoard) -> Option<(GameOutcome, String)> {
        let tb = self.tb?;
        let pos = board.position();
        if !tb.can_probe(pos) {
            return None;
        }
        let stm = board.side_to_move();
        let (outcome, verdict) = match tb.probe(pos)? {
            TbOutcome::Win => (loss_for(stm.other()), format!("{} wins", color_name(stm))),
            TbOutcome::Draw => (GameOutcome::Draw, "draw".to_string()),
            TbOutcome::Loss => (loss_for(stm), format!("{} loses", color_name(stm))),
        };
        Some((outcome, format!("Tablebase adjudication: {verdict}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TournamentConfig;

    fn engine_move(score: i64) -> MoveRecord {
        MoveRecord {
            score,
            ..MoveRecord::played("0000".to_string())
        }
    }

    fn mate_move(score: i64) -> MoveRecord {
        MoveRecord {
            score,
            score_kind: ScoreKind::Mate,
            ..MoveRecord::played("0000".to_string())
        }
    }

    fn config_with_resign(score: i64, move_count: u32, twosided: bool) -> TournamentConfig {
        TournamentConfig {
            resign: ResignAdjudication {
                score,
                move_count,
                twosided,
                enabled: true,
            },
            ..TournamentConfig::default()
        }
    }

    #[test]
    fn resign_needs_consecutive_own_plies() {
        let config = config_with_resign(400, 3, false);
        let mut adj = Adjudicator::new(&config, None);
        let board = GameBoard::new("startpos").unwrap();
        let mut moves = vec![];
        // white keeps reporting a lost score, black a winning one; white's
        // third lost ply in a row triggers the resignation
        for i in 0..3 {
            moves.push(engine_move(-500));
            let verdict = adj.adjudicate(&board, &moves, Color::White);
            if i < 2 {
                assert!(verdict.is_none(), "triggered after {} plies", i + 1);
                moves.push(engine_move(480));
                assert!(adj.adjudicate(&board, &moves, Color::Black).is_none());
            } else {
                let (outcome, reason) = verdict.unwrap();
                assert!(matches!(outcome, GameOutcome::BlackWin));
                assert!(reason.contains("White resigns"));
            }
        }
    }

    #[test]
    fn resign_counter_resets_on_recovery() {
        let config = config_with_resign(400, 2, false);
        let mut adj = Adjudicator::new(&config, None);
        let board = GameBoard::new("startpos").unwrap();
        let mut moves = vec![engine_move(-500)];
        assert!(adj.adjudicate(&board, &moves, Color::White).is_none());
        moves.push(engine_move(450));
        assert!(adj.adjudicate(&board, &moves, Color::Black).is_none());
        // white recovered, so its streak starts over
        moves.push(engine_move(-20));
        assert!(adj.adjudicate(&board, &moves, Color::White).is_none());
        moves.push(engine_move(450));
        assert!(adj.adjudicate(&board, &moves, Color::Black).is_none());
        moves.push(engine_move(-500));
        assert!(adj.adjudicate(&board, &moves, Color::White).is_none());
    }

    #[test]
    fn twosided_resign_needs_the_opponent_to_agree() {
        let config = config_with_resign(400, 1, true);
        let board = GameBoard::new("startpos").unwrap();
        // white reports -500 but black only +100: no resignation
        let mut adj = Adjudicator::new(&config, None);
        let moves = vec![engine_move(100), engine_move(-500)];
        assert!(adj.adjudicate(&board, &moves, Color::White).is_none());

        let mut adj = Adjudicator::new(&config, None);
        let moves = vec![engine_move(450), engine_move(-500)];
        let (outcome, _) = adj.adjudicate(&board, &moves, Color::White).unwrap();
        assert!(matches!(outcome, GameOutcome::BlackWin));
    }

    #[test]
    fn mate_scores_exceed_any_threshold() {
        let config = config_with_resign(1000, 1, false);
        let mut adj = Adjudicator::new(&config, None);
        let board = GameBoard::new("startpos").unwrap();
        let moves = vec![mate_move(-4)];
        let (outcome, _) = adj.adjudicate(&board, &moves, Color::White).unwrap();
        assert!(matches!(outcome, GameOutcome::BlackWin));
    }

    #[test]
    fn draw_adjudication_waits_for_min_moves() {
        let config = TournamentConfig {
            draw: DrawAdjudication {
                score: 10,
                move_count: 2,
                min_moves: 4,
                enabled: true,
            },
            ..TournamentConfig::default()
        };
        let mut adj = Adjudicator::new(&config, None);
        let mut board = GameBoard::new("startpos").unwrap();
        let mut moves = vec![];
        let mut first_trigger = None;
        for mov in ["g1f3", "g8f6", "e2e3", "e7e6", "f1e2", "f8e7"] {
            board.try_play(mov).unwrap();
            let mover = board.side_to_move().other();
            moves.push(engine_move(5));
            if adj.adjudicate(&board, &moves, mover).is_some() && first_trigger.is_none() {
                first_trigger = Some(board.ply());
            }
        }
        // counting starts at ply 4 (min_moves), so the second level ply is 5
        assert_eq!(first_trigger, Some(5));
    }

    #[test]
    fn max_moves_draws_the_game() {
        let config = TournamentConfig {
            max_moves: MaxMovesAdjudication {
                move_count: 2,
                enabled: true,
            },
            ..TournamentConfig::default()
        };
        let mut adj = Adjudicator::new(&config, None);
        let mut board = GameBoard::new("startpos").unwrap();
        let mut moves = vec![];
        board.try_play("e2e4").unwrap();
        moves.push(engine_move(0));
        assert!(adj.adjudicate(&board, &moves, Color::White).is_none());
        board.try_play("e7e5").unwrap();
        moves.push(engine_move(0));
        let (outcome, _) = adj.adjudicate(&board, &moves, Color::Black).unwrap();
        assert!(matches!(outcome, GameOutcome::Draw));
    }

    #[test]
    fn book_moves_never_trigger_score_rules() {
        let config = config_with_resign(400, 1, false);
        let mut adj = Adjudicator::new(&config, None);
        let board = GameBoard::new("startpos").unwrap();
        let moves = vec![MoveRecord::book("e2e4".to_string())];
        assert!(adj.adjudicate(&board, &moves, Color::White).is_none());
    }
}
