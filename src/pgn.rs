use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::anyhow;

use crate::config::{PgnConfig, SearchLimits};
use crate::play::engine::ScoreKind;
use crate::play::run_match::{MatchData, MoveRecord, Termination};
use crate::utils::{format_millis, Res};

/// PGN 80-column convention; a single move with its comment may exceed it,
/// tokens are never split.
const LINE_LENGTH: usize = 80;

fn termination_tag(termination: Termination) -> &'static str {
    match termination {
        Termination::Normal => "normal",
        Termination::Adjudication => "adjudication",
        Termination::Disconnect | Termination::Stall => "abandoned",
        Termination::Timeout => "time forfeit",
        Termination::IllegalMove => "illegal move",
        Termination::Interrupt => "unterminated",
    }
}

fn score_string(record: &MoveRecord) -> String {
    match record.score_kind {
        ScoreKind::Cp => format!("{:+.2}", record.score as f64 / 100.0),
        ScoreKind::Mate => {
            if record.score >= 0 {
                format!("+M{}", record.score)
            } else {
                format!("-M{}", -record.score)
            }
        }
    }
}

/// Joins the non-empty parts into a `{…}` comment.
fn comment(parts: &[String]) -> String {
    let body = parts
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}

fn starting_numbering(fen: &str) -> (bool, usize) {
    if fen == "startpos" {
        return (true, 1);
    }
    let fields: Vec<&str> = fen.split_whitespace().collect();
    let white_to_move = fields.get(1) != Some(&"b");
    let fullmove = fields
        .get(5)
        .and_then(|f| f.parse::<usize>().ok())
        .unwrap_or(1);
    (white_to_move, fullmove)
}

/// Renders one finished game. `round_id` lands in the `Round` tag; the two
/// limit sets fill the `TimeControl` tags.
pub fn build_pgn(
    game: &MatchData,
    config: &PgnConfig,
    round_id: u64,
    white_limits: &SearchLimits,
    black_limits: &SearchLimits,
) -> String {
    let mut pgn = String::new();
    let mut header = |name: &str, value: &str| {
        if !value.is_empty() {
            _ = writeln!(pgn, "[{name} \"{value}\"]");
        }
    };

    header("Event", &config.event);
    header("Site", &config.site);
    header("Date", &game.start_time.format("%Y.%m.%d").to_string());
    header("Round", &round_id.to_string());
    header("White", &game.white);
    header("Black", &game.black);
    header("Result", game.result_str());
    if game.fen != "startpos" {
        header("SetUp", "1");
        header("FEN", &game.fen);
    }
    if !config.min {
        let duration = (game.end_time - game.start_time).num_seconds().max(0);
        header(
            "GameDuration",
            &format!("{:02}:{:02}:{:02}", duration / 3600, duration % 3600 / 60, duration % 60),
        );
        header(
            "GameStartTime",
            &game.start_time.format("%Y-%m-%dT%H:%M:%S%.3f UTC").to_string(),
        );
        header(
            "GameEndTime",
            &game.end_time.format("%Y-%m-%dT%H:%M:%S%.3f UTC").to_string(),
        );
        header("PlyCount", &game.moves.len().to_string());
        header("Termination", termination_tag(game.termination));
        if white_limits == black_limits {
            header("TimeControl", &white_limits.to_string());
        } else {
            header("WhiteTimeControl", &white_limits.to_string());
            header("BlackTimeControl", &black_limits.to_string());
        }
    }
    pgn.push('\n');

    let (white_to_move, fullmove) = starting_numbering(&game.fen);
    let mut move_number = usize::from(!white_to_move) + 2 * fullmove - 1;
    let mut line_length = 0;
    let mut first_move = true;

    for (idx, record) in game.moves.iter().enumerate() {
        let last = idx + 1 == game.moves.len();
        let dots = if first_move && !white_to_move { 3 } else { 1 };

        let mut move_str = String::new();
        if dots == 3 || move_number % 2 == 1 {
            _ = write!(move_str, "{}{} ", (move_number + 1) / 2, ".".repeat(dots));
        }
        move_str.push_str(&record.usi);
        if !config.min {
            move_str.push(' ');
            let details = if record.book {
                comment(&["book".to_string()])
            } else {
                comment(&[
                    format!(
                        "{}/{} {}",
                        score_string(record),
                        record.depth,
                        format_millis(record.elapsed_ms)
                    ),
                    if config.track_timeleft {
                        format!("tl={}", format_millis(record.time_left_after))
                    } else {
                        String::new()
                    },
                    if config.track_nodes {
                        format!("n={}", record.nodes)
                    } else {
                        String::new()
                    },
                    if config.track_seldepth {
                        format!("sd={}", record.seldepth)
                    } else {
                        String::new()
                    },
                    if config.track_nps {
                        format!("nps={}", record.nps)
                    } else {
                        String::new()
                    },
                    if config.track_hashfull {
                        format!("hashfull={}", record.hashfull)
                    } else {
                        String::new()
                    },
                    if last { game.reason.clone() } else { String::new() },
                ])
            };
            move_str.push_str(&details);
        }

        move_number += 1;
        if line_length + move_str.len() > LINE_LENGTH {
            pgn.push('\n');
            line_length = 0;
        }
        if line_length > 0 {
            pgn.push(' ');
            line_length += 1;
        }
        pgn.push_str(&move_str);
        line_length += move_str.len();
        first_move = false;

        if !record.legal {
            break;
        }
    }

    if !game.moves.is_empty() {
        pgn.push(' ');
    }
    pgn.push_str(game.result_str());
    pgn.push('\n');
    pgn
}

/// Append-only PGN stream; one game per completion. A failed write is the
/// one tournament-fatal I/O error.
#[derive(Debug)]
pub struct PgnWriter {
    file: BufWriter<File>,
}

impl PgnWriter {
    pub fn create(path: &Path) -> Res<Self> {
        let file = File::options()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| anyhow!("Couldn't open PGN file '{}': {err}", path.display()))?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, pgn: &str) -> Res<()> {
        self.file
            .write_all(pgn.as_bytes())
            .and_then(|()| self.file.write_all(b"\n"))
            .and_then(|()| self.file.flush())
            .map_err(|err| anyhow!("Couldn't append to the PGN file: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::play::run_match::GameOutcome;
    use chrono::Utc;

    fn record(usi: &str, score: i64, depth: u32, elapsed: i64) -> MoveRecord {
        MoveRecord {
            score,
            depth,
            elapsed_ms: elapsed,
            ..MoveRecord::played(usi.to_string())
        }
    }

    fn game(moves: Vec<MoveRecord>) -> MatchData {
        MatchData {
            white: "alpha".to_string(),
            black: "beta".to_string(),
            fen: "startpos".to_string(),
            outcome: Some(GameOutcome::WhiteWin),
            termination: Termination::Normal,
            reason: "Black mates".to_string(),
            moves,
            start_time: Utc::now(),
            end_time: Utc::now(),
            end_fen: String::new(),
        }
    }

    fn limits() -> SearchLimits {
        SearchLimits::default()
    }

    #[test]
    fn tags_and_result() {
        let pgn = build_pgn(
            &game(vec![record("e2e4", 30, 10, 1500)]),
            &PgnConfig::default(),
            3,
            &limits(),
            &limits(),
        );
        assert!(pgn.contains("[Event \"?\"]"));
        assert!(pgn.contains("[Round \"3\"]"));
        assert!(pgn.contains("[White \"alpha\"]"));
        assert!(pgn.contains("[Black \"beta\"]"));
        assert!(pgn.contains("[Result \"1-0\"]"));
        assert!(pgn.contains("[PlyCount \"1\"]"));
        assert!(pgn.contains("[Termination \"normal\"]"));
        assert!(!pgn.contains("[FEN"));
        assert!(pgn.trim_end().ends_with("1-0"));
    }

    #[test]
    fn min_mode_strips_detail() {
        let config = PgnConfig {
            min: true,
            ..PgnConfig::default()
        };
        let pgn = build_pgn(
            &game(vec![record("e2e4", 30, 10, 1500), record("e7e5", -25, 11, 1400)]),
            &config,
            1,
            &limits(),
            &limits(),
        );
        assert!(!pgn.contains("PlyCount"));
        assert!(!pgn.contains('{'));
        assert!(pgn.contains("1. e2e4 e7e5 1-0"));
    }

    #[test]
    fn comments_carry_score_depth_and_time() {
        let pgn = build_pgn(
            &game(vec![record("e2e4", 36, 12, 1516)]),
            &PgnConfig::default(),
            1,
            &limits(),
            &limits(),
        );
        assert!(pgn.contains("1. e2e4 {+0.36/12 1.516s, Black mates}"));
    }

    #[test]
    fn tracking_toggles_add_fields() {
        let config = PgnConfig {
            track_nodes: true,
            track_seldepth: true,
            track_nps: true,
            track_timeleft: true,
            track_hashfull: true,
            ..PgnConfig::default()
        };
        let mut mov = record("e2e4", 36, 12, 1000);
        mov.nodes = 5000;
        mov.seldepth = 20;
        mov.nps = 5_000_000;
        mov.hashfull = 120;
        mov.time_left_after = 59_000;
        let pgn = build_pgn(&game(vec![mov]), &config, 1, &limits(), &limits());
        assert!(pgn.contains("tl=59.000s"));
        assert!(pgn.contains("n=5000"));
        assert!(pgn.contains("sd=20"));
        assert!(pgn.contains("nps=5000000"));
        assert!(pgn.contains("hashfull=120"));
    }

    #[test]
    fn book_moves_and_mate_scores() {
        let mut moves = vec![MoveRecord::book("e2e4".to_string())];
        let mut mate = record("d8h4", -2, 30, 100);
        mate.score_kind = ScoreKind::Mate;
        moves.push(mate);
        let pgn = build_pgn(&game(moves), &PgnConfig::default(), 1, &limits(), &limits());
        assert!(pgn.contains("1. e2e4 {book}"));
        assert!(pgn.contains("-M2/30"));
    }

    #[test]
    fn black_start_uses_ellipsis_numbering() {
        let mut data = game(vec![record("e7e5", 0, 1, 10), record("g1f3", 0, 1, 10)]);
        data.fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".to_string();
        let config = PgnConfig {
            min: true,
            ..PgnConfig::default()
        };
        let pgn = build_pgn(&data, &config, 1, &limits(), &limits());
        assert!(pgn.contains("[SetUp \"1\"]"));
        assert!(pgn.contains("[FEN \"rnbqkbnr"));
        assert!(pgn.contains("1... e7e5 2. g1f3"));
    }

    #[test]
    fn illegal_move_ends_the_movetext() {
        let mut moves = vec![record("e2e4", 0, 1, 10), record("e1e8", 0, 1, 10)];
        moves[1].legal = false;
        let mut data = game(moves);
        data.termination = Termination::IllegalMove;
        data.outcome = Some(GameOutcome::BlackWin);
        data.reason = "alpha makes an illegal move: e1e8".to_string();
        let pgn = build_pgn(&data, &PgnConfig::default(), 1, &limits(), &limits());
        assert!(pgn.contains("[Termination \"illegal move\"]"));
        assert!(pgn.contains("e1e8"));
        assert!(pgn.trim_end().ends_with("0-1"));
    }

    #[test]
    fn long_games_wrap_at_eighty_columns() {
        let moves: Vec<MoveRecord> = (0..60)
            .flat_map(|_| [record("g1f3", 0, 1, 10), record("g8f6", 0, 1, 10)])
            .collect();
        let config = PgnConfig {
            min: true,
            ..PgnConfig::default()
        };
        let pgn = build_pgn(&game(moves), &config, 1, &limits(), &limits());
        let body = pgn.split_once("\n\n").unwrap().1;
        assert!(body.lines().count() > 1);
        for line in body.lines() {
            assert!(line.len() <= LINE_LENGTH + 12, "overlong line: {line}");
            assert!(!line.ends_with(' '));
        }
    }

    #[test]
    fn termination_tags() {
        assert_eq!(termination_tag(Termination::Normal), "normal");
        assert_eq!(termination_tag(Termination::Adjudication), "adjudication");
        assert_eq!(termination_tag(Termination::Disconnect), "abandoned");
        assert_eq!(termination_tag(Termination::Stall), "abandoned");
        assert_eq!(termination_tag(Termination::Timeout), "time forfeit");
        assert_eq!(termination_tag(Termination::IllegalMove), "illegal move");
        assert_eq!(termination_tag(Termination::Interrupt), "unterminated");
    }
}
