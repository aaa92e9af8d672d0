use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use shakmaty::Color;
use strum_macros::Display;

use crate::board::GameBoard;
use crate::book::Opening;
use crate::config::{EngineConfig, TournamentConfig};
use crate::logger;
use crate::play::adjudication::Adjudicator;
use crate::play::engine::{ScoreKind, SearchInfo, SessionTimeouts, UsiEngine};
use crate::play::process::Status;
use crate::play::time_control::TimeControl;
use crate::tablebase::SyzygyTb;
use crate::utils::Res;

/// Final score of one game.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GameOutcome {
    WhiteWin,
    BlackWin,
    Draw,
}

pub fn loss_for(color: Color) -> GameOutcome {
    match color {
        Color::White => GameOutcome::BlackWin,
        Color::Black => GameOutcome::WhiteWin,
    }
}

fn win_for(color: Color) -> GameOutcome {
    loss_for(color.other())
}

/// Why the game ended.
#[derive(Debug, Display, Copy, Clone, Eq, PartialEq)]
pub enum Termination {
    Normal,
    Adjudication,
    Disconnect,
    Stall,
    Timeout,
    IllegalMove,
    Interrupt,
}

/// One half-move as played, with the engine's own search report attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub usi: String,
    pub legal: bool,
    /// Replayed from the opening book rather than searched.
    pub book: bool,
    pub score: i64,
    pub score_kind: ScoreKind,
    pub depth: u32,
    pub seldepth: u32,
    pub nodes: u64,
    pub nps: u64,
    pub hashfull: u32,
    pub elapsed_ms: i64,
    pub time_left_after: i64,
    pub pv: Vec<String>,
}

impl MoveRecord {
    pub fn played(usi: String) -> Self {
        Self {
            usi,
            legal: true,
            book: false,
            score: 0,
            score_kind: ScoreKind::Cp,
            depth: 0,
            seldepth: 0,
            nodes: 0,
            nps: 0,
            hashfull: 0,
            elapsed_ms: 0,
            time_left_after: 0,
            pv: vec![],
        }
    }

    pub fn book(usi: String) -> Self {
        Self {
            book: true,
            ..Self::played(usi)
        }
    }

    fn searched(usi: String, info: &SearchInfo, elapsed_ms: i64, time_left_after: i64) -> Self {
        Self {
            score: info.score,
            score_kind: info.score_kind,
            depth: info.depth,
            seldepth: info.seldepth,
            nodes: info.nodes,
            nps: info.nps,
            hashfull: info.hashfull,
            elapsed_ms,
            time_left_after,
            pv: info.pv.clone(),
            ..Self::played(usi)
        }
    }
}

/// Everything known about one finished (or aborted) game.
#[derive(Debug, Clone)]
pub struct MatchData {
    pub white: String,
    pub black: String,
    pub fen: String,
    /// `None` for interrupted games, which don't count toward statistics.
    pub outcome: Option<GameOutcome>,
    pub termination: Termination,
    pub reason: String,
    pub moves: Vec<MoveRecord>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub end_fen: String,
}

impl MatchData {
    pub fn result_str(&self) -> &'static str {
        match self.outcome {
            Some(GameOutcome::WhiteWin) => "1-0",
            Some(GameOutcome::BlackWin) => "0-1",
            Some(GameOutcome::Draw) => "1/2-1/2",
            None => "*",
        }
    }

    pub fn interrupted(&self) -> bool {
        self.termination == Termination::Interrupt
    }
}

/// Inputs for one game; the sessions themselves are created (and torn down)
/// inside [`run_game`].
pub struct GameArgs<'a> {
    pub white: &'a EngineConfig,
    pub black: &'a EngineConfig,
    pub opening: &'a Opening,
    pub config: &'a TournamentConfig,
    pub tb: Option<&'a SyzygyTb>,
    pub stop: &'a AtomicBool,
}

fn classify(status: Status) -> Termination {
    match status {
        Status::Timeout => Termination::Timeout,
        _ => Termination::Disconnect,
    }
}

/// Plays one game. Engine failures end the game against the failing side and
/// are reported in the result, never as an error; `Err` is reserved for a
/// broken opening (a tournament setup problem).
pub fn run_game(args: &GameArgs) -> Res<MatchData> {
    let start_time = Utc::now();
    let mut board = GameBoard::new(&args.opening.fen)?;
    let timeouts = SessionTimeouts::from(args.config);

    let mut moves: Vec<MoveRecord> = vec![];
    let mut played: Vec<String> = vec![];

    let finish = |outcome, termination, reason, moves, board: &GameBoard| MatchData {
        white: args.white.name.clone(),
        black: args.black.name.clone(),
        fen: args.opening.fen.clone(),
        outcome,
        termination,
        reason,
        moves,
        start_time,
        end_time: Utc::now(),
        end_fen: board.fen(),
    };

    // a side that fails to come up loses by disconnect; the tournament
    // carries on
    let mut white = match UsiEngine::start(args.white, timeouts) {
        Ok(engine) => engine,
        Err(err) => {
            logger::warn(format!("{err:#}"));
            return Ok(finish(
                Some(loss_for(Color::White)),
                Termination::Disconnect,
                format!("{} failed to start", args.white.name),
                moves,
                &board,
            ));
        }
    };
    let mut black = match UsiEngine::start(args.black, timeouts) {
        Ok(engine) => engine,
        Err(err) => {
            logger::warn(format!("{err:#}"));
            return Ok(finish(
                Some(loss_for(Color::Black)),
                Termination::Disconnect,
                format!("{} failed to start", args.black.name),
                moves,
                &board,
            ));
        }
    };

    for (engine, color) in [(&mut white, Color::White), (&mut black, Color::Black)] {
        match engine.new_game() {
            Status::Ok => {}
            status => {
                let reason = format!("{} failed usinewgame ({status})", engine.name());
                return Ok(finish(
                    Some(loss_for(color)),
                    classify(status),
                    reason,
                    moves,
                    &board,
                ));
            }
        }
    }
    white.apply_options();
    black.apply_options();

    // both sides replay the book prefix before the clocks start
    for mov in &args.opening.moves {
        board.try_play(mov)?;
        played.push(mov.clone());
        moves.push(MoveRecord::book(mov.clone()));
    }

    let mut tc_white = TimeControl::new(args.white.limits.tc);
    let mut tc_black = TimeControl::new(args.black.limits.tc);
    let mut adjudicator = Adjudicator::new(args.config, args.tb);

    if let Some(end) = board.terminal() {
        let outcome = end.winner().map_or(GameOutcome::Draw, win_for);
        return Ok(finish(
            Some(outcome),
            Termination::Normal,
            end.to_string(),
            moves,
            &board,
        ));
    }

    let (outcome, termination, reason) = loop {
        if args.stop.load(Ordering::Relaxed) {
            break (None, Termination::Interrupt, "tournament interrupted".to_string());
        }
        let stm = board.side_to_move();
        let (mover, our_tc, their_tc) = match stm {
            Color::White => (&mut white, &mut tc_white, &tc_black),
            Color::Black => (&mut black, &mut tc_black, &tc_white),
        };

        if mover.position(&args.opening.fen, &played) != Status::Ok {
            break (
                Some(loss_for(stm)),
                Termination::Disconnect,
                format!("{} disconnects", mover.name()),
            );
        }
        let deadline = our_tc.timeout_threshold();
        let move_start = Instant::now();
        if mover.go(our_tc, their_tc, stm) != Status::Ok {
            break (
                Some(loss_for(stm)),
                Termination::Disconnect,
                format!("{} disconnects", mover.name()),
            );
        }
        match mover.read_until("bestmove", deadline) {
            Status::Ok => {}
            Status::Timeout => {
                break (
                    Some(loss_for(stm)),
                    Termination::Timeout,
                    format!("{} loses on time", mover.name()),
                );
            }
            _ => {
                break (
                    Some(loss_for(stm)),
                    Termination::Disconnect,
                    format!("{} disconnects", mover.name()),
                );
            }
        }
        let elapsed = move_start.elapsed().as_millis() as i64;
        if !our_tc.update(elapsed) {
            break (
                Some(loss_for(stm)),
                Termination::Timeout,
                format!("{} loses on time", mover.name()),
            );
        }

        let Some(best) = mover.bestmove() else {
            break (
                Some(loss_for(stm)),
                Termination::Stall,
                format!("{}'s connection stalls", mover.name()),
            );
        };
        let info = mover.last_info();
        let time_left = our_tc.time_left();

        if let Err(err) = board.try_play(&best) {
            logger::warn(format!("Engine '{}': {err}", mover.name()));
            let mut record = MoveRecord::searched(best.clone(), &info, elapsed, time_left);
            record.legal = false;
            moves.push(record);
            break (
                Some(loss_for(stm)),
                Termination::IllegalMove,
                format!("{} makes an illegal move: {best}", mover.name()),
            );
        }
        played.push(best.clone());
        moves.push(MoveRecord::searched(best, &info, elapsed, time_left));

        if let Some((outcome, reason)) = adjudicator.adjudicate(&board, &moves, stm) {
            break (Some(outcome), Termination::Adjudication, reason);
        }
        if let Some(end) = board.terminal() {
            let outcome = end.winner().map_or(GameOutcome::Draw, win_for);
            break (Some(outcome), Termination::Normal, end.to_string());
        }
    };

    Ok(finish(outcome, termination, reason, moves, &board))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_strings() {
        let data = |outcome, termination| MatchData {
            white: "a".to_string(),
            black: "b".to_string(),
            fen: "startpos".to_string(),
            outcome,
            termination,
            reason: String::new(),
            moves: vec![],
            start_time: Utc::now(),
            end_time: Utc::now(),
            end_fen: String::new(),
        };
        assert_eq!(data(Some(GameOutcome::WhiteWin), Termination::Normal).result_str(), "1-0");
        assert_eq!(data(Some(GameOutcome::BlackWin), Termination::Timeout).result_str(), "0-1");
        assert_eq!(data(Some(GameOutcome::Draw), Termination::Adjudication).result_str(), "1/2-1/2");
        let interrupted = data(None, Termination::Interrupt);
        assert_eq!(interrupted.result_str(), "*");
        assert!(interrupted.interrupted());
    }

    #[test]
    fn loss_and_win_are_duals() {
        assert_eq!(loss_for(Color::White), GameOutcome::BlackWin);
        assert_eq!(loss_for(Color::Black), GameOutcome::WhiteWin);
        assert_eq!(win_for(Color::White), GameOutcome::WhiteWin);
        assert_eq!(win_for(Color::Black), GameOutcome::BlackWin);
    }

    #[test]
    fn book_records_are_marked() {
        let record = MoveRecord::book("e2e4".to_string());
        assert!(record.book);
        assert!(record.legal);
        assert_eq!(record.usi, "e2e4");
    }
}
