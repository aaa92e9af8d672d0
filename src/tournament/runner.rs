use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use crate::book::OpeningBook;
use crate::config::{EngineConfig, TournamentConfig};
use crate::epd::EpdWriter;
use crate::logger;
use crate::output::{create_output, OutputSink, ReportContext};
use crate::pgn::{build_pgn, PgnWriter};
use crate::play::run_match::{run_game, GameArgs, GameOutcome, MatchData};
use crate::stats::sprt::Sprt;
use crate::stats::{GameScore, Scoreboard};
use crate::tablebase::SyzygyTb;
use crate::tournament::schedule::{Pairing, Scheduler};
use crate::utils::Res;

/// The whole tournament: the pairing stream, the shared result state, and
/// the worker pool that drains one into the other.
pub struct Tournament {
    config: TournamentConfig,
    engines: Vec<EngineConfig>,
    book: OpeningBook,
    scheduler: Scheduler,
    scoreboard: Scoreboard,
    sprt: Sprt,
    output: Mutex<Box<dyn OutputSink>>,
    pgn: Option<Mutex<PgnWriter>>,
    epd: Option<Mutex<EpdWriter>>,
    tb: Option<SyzygyTb>,
    stop: Arc<AtomicBool>,
    games_started: AtomicU64,
    games_finished: AtomicU64,
    fatal: AtomicBool,
}

impl Tournament {
    pub fn new(
        config: TournamentConfig,
        engines: Vec<EngineConfig>,
        stop: Arc<AtomicBool>,
    ) -> Res<Self> {
        let book = OpeningBook::load(&config.book, config.seed)?;
        let scheduler = Scheduler::new(
            config.kind,
            engines.len(),
            config.rounds,
            config.games,
            book.len(),
            stop.clone(),
        );
        let output = Mutex::new(create_output(config.output, config.report_penta));
        let pgn = match &config.pgn.file {
            Some(path) => Some(Mutex::new(PgnWriter::create(path)?)),
            None => None,
        };
        let epd = match &config.epd_file {
            Some(path) => Some(Mutex::new(EpdWriter::create(path)?)),
            None => None,
        };
        let tb = match &config.tb.path {
            Some(path) => Some(SyzygyTb::load(path, config.tb.pieces, config.tb.ignore_50)?),
            None => None,
        };
        let sprt = Sprt::new(config.sprt);
        Ok(Self {
            config,
            engines,
            book,
            scheduler,
            scoreboard: Scoreboard::new(),
            sprt,
            output,
            pgn,
            epd,
            tb,
            stop,
            games_started: AtomicU64::new(0),
            games_finished: AtomicU64::new(0),
            fatal: AtomicBool::new(false),
        })
    }

    /// Runs the configured number of workers to completion.
    pub fn run(&self) -> Res<()> {
        crossbeam_utils::thread::scope(|scope| {
            for id in 0..self.config.concurrency {
                scope
                    .builder()
                    .name(format!("worker {id}"))
                    .spawn(|_| self.worker())
                    .unwrap();
            }
        })
        .map_err(|_| anyhow!("A tournament worker panicked"))?;

        let message = match self.sprt.decision() {
            Some(decision) => format!("SPRT finished: {decision}"),
            None => "Tournament finished".to_string(),
        };
        self.output.lock().unwrap().end_tournament(&message);
        Ok(())
    }

    /// True iff the run died on a PGN sink failure.
    pub fn fatal(&self) -> bool {
        self.fatal.load(Ordering::Relaxed)
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    fn report_context(&self) -> ReportContext {
        ReportContext {
            engines: &self.engines,
            scoreboard: &self.scoreboard,
            sprt: &self.sprt,
            book_name: self.book.file_name(),
            report_penta: self.config.report_penta,
        }
    }

    fn worker(&self) {
        while let Some(pairing) = self.scheduler.next_pairing() {
            let white = &self.engines[pairing.white()];
            let black = &self.engines[pairing.black()];

            let started = self.games_started.fetch_add(1, Ordering::Relaxed) + 1;
            {
                let mut output = self.output.lock().unwrap();
                output.start_game(
                    &white.name,
                    &black.name,
                    started,
                    self.scheduler.total_games(),
                );
            }

            let args = GameArgs {
                white,
                black,
                opening: self.book.get(pairing.opening_idx),
                config: &self.config,
                tb: self.tb.as_ref(),
                stop: &self.stop,
            };
            let game = match run_game(&args) {
                Ok(game) => game,
                Err(err) => {
                    // a broken opening poisons every game; shut the run down
                    logger::error(format!("{err:#}"));
                    self.stop.store(true, Ordering::Relaxed);
                    return;
                }
            };

            self.persist(&game, &pairing);

            if game.interrupted() {
                // not counted toward statistics
                let mut output = self.output.lock().unwrap();
                output.end_game(&game, started);
                continue;
            }

            self.merge_result(&pairing, &game);
            let finished = self.games_finished.fetch_add(1, Ordering::Relaxed) + 1;

            {
                let mut output = self.output.lock().unwrap();
                output.end_game(&game, started);
                let ctx = self.report_context();
                if self.config.score_interval > 0 && finished % self.config.score_interval == 0 {
                    output.print_score(&ctx);
                }
                if self.config.rating_interval > 0 && finished % self.config.rating_interval == 0 {
                    output.print_interval(&ctx);
                }
            }

            if self.sprt.enabled() {
                let stats = self
                    .scoreboard
                    .stats_between(&self.engines[0].name, &self.engines[1].name);
                if self.sprt.check(&stats).is_some() {
                    self.stop.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    fn merge_result(&self, pairing: &Pairing, game: &MatchData) {
        let Some(outcome) = game.outcome else { return };
        // translate the white-perspective outcome to engine A's perspective
        let a_is_white = !pairing.swap_colours;
        let a_score = match outcome {
            GameOutcome::Draw => GameScore::Draw,
            GameOutcome::WhiteWin => {
                if a_is_white {
                    GameScore::Win
                } else {
                    GameScore::Loss
                }
            }
            GameOutcome::BlackWin => {
                if a_is_white {
                    GameScore::Loss
                } else {
                    GameScore::Win
                }
            }
        };
        let pair_key = (self.config.games == 2).then(|| pairing.pair_key());
        self.scoreboard.record(
            &self.engines[pairing.engine_a].name,
            &self.engines[pairing.engine_b].name,
            a_score,
            pair_key,
        );
    }

    fn persist(&self, game: &MatchData, pairing: &Pairing) {
        if let Some(pgn) = &self.pgn {
            let text = build_pgn(
                game,
                &self.config.pgn,
                pairing.round_id + 1,
                &self.engines[pairing.white()].limits,
                &self.engines[pairing.black()].limits,
            );
            if let Err(err) = pgn.lock().unwrap().append(&text) {
                // the one tournament-fatal I/O error
                logger::error(format!("{err:#}"));
                self.fatal.store(true, Ordering::Relaxed);
                self.stop.store(true, Ordering::Relaxed);
            }
        }
        if let Some(epd) = &self.epd {
            if let Err(err) = epd.lock().unwrap().append(&game.end_fen) {
                logger::warn(format!("{err:#}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SprtConfig, SprtModel, TournamentKind};
    use crate::play::run_match::Termination;
    use chrono::Utc;

    fn two_engines() -> Vec<EngineConfig> {
        ["alpha", "beta"]
            .iter()
            .map(|name| EngineConfig {
                name: name.to_string(),
                cmd: name.to_string(),
                ..EngineConfig::default()
            })
            .collect()
    }

    fn match_data(outcome: Option<GameOutcome>) -> MatchData {
        MatchData {
            white: "alpha".to_string(),
            black: "beta".to_string(),
            fen: "startpos".to_string(),
            outcome,
            termination: if outcome.is_some() {
                Termination::Normal
            } else {
                Termination::Interrupt
            },
            reason: String::new(),
            moves: vec![],
            start_time: Utc::now(),
            end_time: Utc::now(),
            end_fen: String::new(),
        }
    }

    fn pairing(game_in_round: u64, swap: bool) -> Pairing {
        Pairing {
            round_id: 0,
            game_in_round,
            engine_a: 0,
            engine_b: 1,
            opening_idx: 0,
            swap_colours: swap,
        }
    }

    #[test]
    fn merges_results_from_engine_a_perspective() {
        let stop = Arc::new(AtomicBool::new(false));
        let tournament =
            Tournament::new(TournamentConfig::default(), two_engines(), stop).unwrap();

        // a white win as A-white, then a white win as B-white: one pair, WL
        tournament.merge_result(&pairing(0, false), &match_data(Some(GameOutcome::WhiteWin)));
        tournament.merge_result(&pairing(1, true), &match_data(Some(GameOutcome::WhiteWin)));
        let stats = tournament.scoreboard().stats_between("alpha", "beta");
        assert_eq!((stats.wins, stats.losses, stats.draws), (1, 1, 0));
        assert_eq!(stats.pairs(), 1);
        assert_eq!(stats.penta_wl, 1);
    }

    #[test]
    fn interrupted_games_are_not_counted() {
        let stop = Arc::new(AtomicBool::new(false));
        let tournament =
            Tournament::new(TournamentConfig::default(), two_engines(), stop).unwrap();
        tournament.merge_result(&pairing(0, false), &match_data(None));
        assert_eq!(
            tournament.scoreboard().stats_between("alpha", "beta").games(),
            0
        );
    }

    #[test]
    fn sprt_requires_games_and_latches_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let config = TournamentConfig {
            kind: TournamentKind::RoundRobin,
            sprt: SprtConfig {
                elo0: 0.0,
                elo1: 5.0,
                alpha: 0.05,
                beta: 0.05,
                model: SprtModel::Trinomial,
                enabled: true,
            },
            ..TournamentConfig::default()
        };
        let tournament = Tournament::new(config, two_engines(), stop.clone()).unwrap();
        for i in 0..1000 {
            let swap = i % 2 == 1;
            let outcome = if i % 50 == 0 {
                GameOutcome::Draw
            } else if swap {
                GameOutcome::BlackWin
            } else {
                GameOutcome::WhiteWin
            };
            tournament.merge_result(&pairing(i, swap), &match_data(Some(outcome)));
        }
        let stats = tournament.scoreboard().stats_between("alpha", "beta");
        assert!(tournament.sprt.check(&stats).is_some());
    }
}
