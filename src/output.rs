use std::fmt::Write as _;

use crate::config::{EngineConfig, OutputKind};
use crate::play::run_match::MatchData;
use crate::stats::elo::Elo;
use crate::stats::sprt::Sprt;
use crate::stats::{Scoreboard, Stats};

/// Everything a reporter may want to look at when printing.
pub struct ReportContext<'a> {
    pub engines: &'a [EngineConfig],
    pub scoreboard: &'a Scoreboard,
    pub sprt: &'a Sprt,
    pub book_name: Option<&'a str>,
    pub report_penta: bool,
}

impl ReportContext<'_> {
    fn h2h(&self) -> Stats {
        self.scoreboard
            .stats_between(&self.engines[0].name, &self.engines[1].name)
    }
}

/// A progress reporter. Every call happens under the tournament's output
/// mutex, so one report is one atomic line group.
pub trait OutputSink: Send {
    fn kind(&self) -> OutputKind;

    fn start_game(&mut self, white: &str, black: &str, current: u64, total: u64);

    fn end_game(&mut self, game: &MatchData, id: u64);

    /// Printed every `scoreinterval` games.
    fn print_score(&mut self, _ctx: &ReportContext) {}

    /// Printed every `ratinginterval` games.
    fn print_interval(&mut self, ctx: &ReportContext);

    fn end_tournament(&mut self, message: &str) {
        println!("{message}");
    }
}

pub fn create_output(kind: OutputKind, report_penta: bool) -> Box<dyn OutputSink> {
    match kind {
        OutputKind::Fastshogi => Box::new(FastshogiOutput { report_penta }),
        OutputKind::Cutechess => Box::new(CutechessOutput),
    }
}

fn option_summary(config: &EngineConfig, option: &str, suffix: &str) -> String {
    config
        .options
        .iter()
        .find(|(name, _)| name == option)
        .map_or_else(|| "NULL".to_string(), |(_, value)| format!("{value}{suffix}"))
}

fn merged<F: Fn(&EngineConfig) -> String>(first: &EngineConfig, second: &EngineConfig, f: F) -> String {
    let a = f(first);
    let b = f(second);
    if a == b {
        a
    } else {
        format!("{a} - {b}")
    }
}

/// The default, detailed report format.
struct FastshogiOutput {
    report_penta: bool,
}

impl FastshogiOutput {
    fn penta_counts(stats: &Stats) -> String {
        format!(
            "[{}, {}, {}, {}, {}]",
            stats.penta_ll,
            stats.penta_ld,
            stats.penta_wl + stats.penta_dd,
            stats.penta_wd,
            stats.penta_ww
        )
    }

    fn head_to_head(&self, ctx: &ReportContext) -> String {
        let first = &ctx.engines[0];
        let second = &ctx.engines[1];
        let stats = ctx.h2h();
        let elo = Elo::new(&stats, self.report_penta);

        let tc = merged(first, second, |e| e.limits.to_string());
        let threads = merged(first, second, |e| option_summary(e, "Threads", "t"));
        let hash = merged(first, second, |e| option_summary(e, "Hash", "MB"));
        let book = ctx
            .book_name
            .map(|name| format!(", {name}"))
            .unwrap_or_default();

        let mut out = String::new();
        _ = writeln!(
            out,
            "Results of {} vs {} ({tc}, {threads}, {hash}{book}):",
            first.name, second.name
        );
        _ = writeln!(out, "Elo: {}, nElo: {}", elo.format_elo(), elo.format_n_elo());
        _ = write!(
            out,
            "LOS: {:.2} %, DrawRatio: {:.2} %",
            elo.los(),
            if self.report_penta {
                stats.draw_ratio_penta()
            } else {
                stats.draw_ratio()
            }
        );
        if self.report_penta {
            _ = write!(out, ", PairsRatio: {:.2}", stats.pairs_ratio());
        }
        _ = writeln!(out);
        _ = writeln!(
            out,
            "Games: {}, Wins: {}, Losses: {}, Draws: {}, Points: {:.1} ({:.2} %)",
            stats.games(),
            stats.wins,
            stats.losses,
            stats.draws,
            stats.points(),
            stats.points_ratio()
        );
        if self.report_penta {
            _ = writeln!(
                out,
                "Ptnml(0-2): {}, WL/DD Ratio: {:.2}",
                Self::penta_counts(&stats),
                stats.wl_dd_ratio()
            );
        }
        out
    }

    fn ranking_table(&self, ctx: &ReportContext) -> String {
        let mut rows: Vec<(&EngineConfig, Elo, Stats)> = ctx
            .engines
            .iter()
            .map(|engine| {
                let stats = ctx.scoreboard.aggregated(&engine.name);
                (engine, Elo::new(&stats, self.report_penta), stats)
            })
            .collect();
        rows.sort_by(|a, b| b.1.diff().total_cmp(&a.1.diff()));

        let name_width = rows
            .iter()
            .map(|(engine, _, _)| engine.name.len())
            .max()
            .unwrap_or(0)
            .max(25);
        let mut out = String::new();
        _ = writeln!(
            out,
            "{:<4} {:<name_width$} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>20}",
            "Rank", "Name", "Elo", "+/-", "nElo", "+/-", "Games", "Score", "Draw", "Ptnml(0-2)"
        );
        for (rank, (engine, elo, stats)) in rows.iter().enumerate() {
            _ = writeln!(
                out,
                "{:>4} {:<name_width$} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10} {:>9.1}% {:>9.1}% {:>20}",
                rank + 1,
                engine.name,
                elo.diff(),
                elo.error(),
                elo.n_elo_diff(),
                elo.n_elo_error(),
                stats.games(),
                stats.points_ratio(),
                if self.report_penta {
                    stats.draw_ratio_penta()
                } else {
                    stats.draw_ratio()
                },
                if self.report_penta {
                    Self::penta_counts(stats)
                } else {
                    String::new()
                },
            );
        }
        out
    }

    fn sprt_line(&self, ctx: &ReportContext) -> String {
        if !ctx.sprt.enabled() {
            return String::new();
        }
        let llr = ctx.sprt.llr(&ctx.h2h());
        format!(
            "LLR: {llr:.2} ({:.1}%) {} {}\n",
            ctx.sprt.fraction(llr) * 100.0,
            ctx.sprt.bounds_str(),
            ctx.sprt.elo_str()
        )
    }
}

impl OutputSink for FastshogiOutput {
    fn kind(&self) -> OutputKind {
        OutputKind::Fastshogi
    }

    fn start_game(&mut self, white: &str, black: &str, current: u64, total: u64) {
        println!("Started game {current} of {total} ({white} vs {black})");
    }

    fn end_game(&mut self, game: &MatchData, id: u64) {
        println!(
            "Finished game {id} ({} vs {}): {} {{{}}}",
            game.white,
            game.black,
            game.result_str(),
            game.reason
        );
    }

    fn print_interval(&mut self, ctx: &ReportContext) {
        let body = if ctx.engines.len() == 2 {
            self.head_to_head(ctx)
        } else {
            self.ranking_table(ctx)
        };
        print!(
            "--------------------------------------------------\n{body}{}--------------------------------------------------\n",
            self.sprt_line(ctx)
        );
    }
}

/// Line-compatible with the venerable cutechess-cli, for tooling that scrapes
/// its output.
struct CutechessOutput;

impl CutechessOutput {
    fn score_lines(ctx: &ReportContext) -> String {
        let first = &ctx.engines[0].name;
        let second = &ctx.engines[1].name;
        let stats = ctx.h2h();
        let ratio = if stats.games() == 0 {
            0.5
        } else {
            stats.points() / stats.games() as f64
        };
        format!(
            "Score of {first} vs {second}: {} - {} - {}  [{ratio:.3}] {}\n",
            stats.wins,
            stats.losses,
            stats.draws,
            stats.games()
        )
    }
}

impl OutputSink for CutechessOutput {
    fn kind(&self) -> OutputKind {
        OutputKind::Cutechess
    }

    fn start_game(&mut self, white: &str, black: &str, current: u64, total: u64) {
        println!("Started game {current} of {total} ({white} vs {black})");
    }

    fn end_game(&mut self, game: &MatchData, id: u64) {
        println!(
            "Finished game {id} ({} vs {}): {} {{{}}}",
            game.white,
            game.black,
            game.result_str(),
            game.reason
        );
    }

    fn print_score(&mut self, ctx: &ReportContext) {
        print!("{}", Self::score_lines(ctx));
    }

    fn print_interval(&mut self, ctx: &ReportContext) {
        let stats = ctx.h2h();
        let elo = Elo::new(&stats, false);
        print!("{}", Self::score_lines(ctx));
        println!(
            "Elo difference: {:.1} +/- {:.1}, LOS: {:.1} %, DrawRatio: {:.1} %",
            elo.diff(),
            elo.error(),
            elo.los(),
            stats.draw_ratio()
        );
        if ctx.sprt.enabled() {
            let llr = ctx.sprt.llr(&stats);
            println!(
                "SPRT: llr {llr:.2} ({:.1}%), lbound {:.2}, ubound {:.2}",
                ctx.sprt.fraction(llr) * 100.0,
                ctx.sprt.lower_bound(),
                ctx.sprt.upper_bound()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_honours_the_requested_format() {
        assert_eq!(
            create_output(OutputKind::Cutechess, false).kind(),
            OutputKind::Cutechess
        );
        assert_eq!(
            create_output(OutputKind::Fastshogi, true).kind(),
            OutputKind::Fastshogi
        );
        assert_eq!(
            create_output(OutputKind::from_name("nonsense"), true).kind(),
            OutputKind::Fastshogi
        );
    }

    #[test]
    fn penta_counts_merge_the_level_categories() {
        let stats = Stats {
            penta_ll: 1,
            penta_ld: 2,
            penta_wl: 3,
            penta_dd: 4,
            penta_wd: 5,
            penta_ww: 6,
            ..Stats::default()
        };
        assert_eq!(FastshogiOutput::penta_counts(&stats), "[1, 2, 7, 5, 6]");
    }

    #[test]
    fn option_summaries() {
        let engine = EngineConfig {
            options: vec![
                ("Threads".to_string(), "4".to_string()),
                ("Hash".to_string(), "256".to_string()),
            ],
            ..EngineConfig::default()
        };
        assert_eq!(option_summary(&engine, "Threads", "t"), "4t");
        assert_eq!(option_summary(&engine, "Hash", "MB"), "256MB");
        assert_eq!(option_summary(&engine, "MultiPV", ""), "NULL");
        let bare = EngineConfig::default();
        assert_eq!(merged(&engine, &bare, |e| option_summary(e, "Threads", "t")), "4t - NULL");
        assert_eq!(merged(&engine, &engine, |e| option_summary(e, "Threads", "t")), "4t");
    }
}
