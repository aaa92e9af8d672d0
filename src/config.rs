use std::fmt::{self, Formatter};
use std::path::PathBuf;

use strum_macros::{Display, EnumString};

use crate::play::time_control::TcLimits;

pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_NEW_GAME_TIMEOUT_MS: u64 = 60_000;
/// Engines are allowed to overshoot their clock by this much unless the user
/// configures a different margin.
pub const DEFAULT_TIME_MARGIN_MS: i64 = 100;

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TournamentKind {
    #[default]
    #[strum(serialize = "roundrobin")]
    RoundRobin,
    Gauntlet,
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Fastshogi,
    Cutechess,
}

impl OutputKind {
    /// Unrecognized names fall back to the default format.
    pub fn from_name(name: &str) -> Self {
        match name {
            "cutechess" => OutputKind::Cutechess,
            _ => OutputKind::Fastshogi,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum BookOrder {
    #[default]
    Sequential,
    Random,
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SprtModel {
    Trinomial,
    #[default]
    Pentanomial,
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct ResignAdjudication {
    pub score: i64,
    pub move_count: u32,
    pub twosided: bool,
    pub enabled: bool,
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct DrawAdjudication {
    pub score: i64,
    pub move_count: u32,
    /// Half-moves that must be played before draw adjudication starts.
    pub min_moves: u32,
    pub enabled: bool,
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct MaxMovesAdjudication {
    /// In plies.
    pub move_count: u32,
    pub enabled: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SprtConfig {
    pub elo0: f64,
    pub elo1: f64,
    pub alpha: f64,
    pub beta: f64,
    pub model: SprtModel,
    pub enabled: bool,
}

impl Default for SprtConfig {
    fn default() -> Self {
        Self {
            elo0: 0.0,
            elo1: 5.0,
            alpha: 0.05,
            beta: 0.05,
            model: SprtModel::default(),
            enabled: false,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TbConfig {
    pub path: Option<PathBuf>,
    /// Probe only positions with at most this many pieces.
    pub pieces: Option<u32>,
    pub ignore_50: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PgnConfig {
    pub file: Option<PathBuf>,
    pub event: String,
    pub site: String,
    /// Emit only the minimal tag roster and bare move text.
    pub min: bool,
    pub track_nodes: bool,
    pub track_seldepth: bool,
    pub track_nps: bool,
    pub track_hashfull: bool,
    pub track_timeleft: bool,
}

impl Default for PgnConfig {
    fn default() -> Self {
        Self {
            file: None,
            event: "?".to_string(),
            site: "?".to_string(),
            min: false,
            track_nodes: false,
            track_seldepth: false,
            track_nps: false,
            track_hashfull: false,
            track_timeleft: false,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BookConfig {
    pub file: Option<PathBuf>,
    pub order: BookOrder,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LogConfig {
    pub file: Option<PathBuf>,
    /// Log engine lines as they arrive instead of after each read completes.
    pub realtime: bool,
}

/// The resource limit an engine plays under: nodes, depth, a fixed time per
/// move, or a clock with increment, plus the shared overshoot margin.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct SearchLimits {
    pub tc: TcLimits,
    pub nodes: u64,
    pub depth: u32,
}

impl SearchLimits {
    /// True iff nothing bounds the search; the margin alone is not a limit.
    pub fn is_unbounded(&self) -> bool {
        self.nodes == 0
            && self.depth == 0
            && self.tc.time == 0
            && self.tc.increment == 0
            && self.tc.fixed_time == 0
    }
}

impl fmt::Display for SearchLimits {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.tc.time + self.tc.increment > 0 {
            write!(f, "{}", self.tc.time as f64 / 1000.0)?;
            if self.tc.increment > 0 {
                write!(f, "+{}", self.tc.increment as f64 / 1000.0)?;
            }
            Ok(())
        } else if self.tc.fixed_time > 0 {
            write!(f, "{}/move", self.tc.fixed_time as f64 / 1000.0)
        } else if self.depth > 0 {
            write!(f, "{} plies", self.depth)
        } else if self.nodes > 0 {
            write!(f, "{} nodes", self.nodes)
        } else {
            write!(f, "infinite")
        }
    }
}

/// An engine's identity. Immutable after parsing; cloned into every session
/// playing that engine.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EngineConfig {
    pub name: String,
    pub cmd: String,
    pub dir: Option<PathBuf>,
    pub args: Vec<String>,
    /// Option overrides in configuration order (`Threads` is reordered to the
    /// front when they are applied).
    pub options: Vec<(String, String)>,
    pub limits: SearchLimits,
    pub affinity: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TournamentConfig {
    pub kind: TournamentKind,
    pub concurrency: usize,
    /// 1 or 2; 2 plays each opening twice with colours swapped.
    pub games: u64,
    pub rounds: u64,
    pub rating_interval: u64,
    pub score_interval: u64,
    pub seed: u64,
    pub resign: ResignAdjudication,
    pub draw: DrawAdjudication,
    pub max_moves: MaxMovesAdjudication,
    pub sprt: SprtConfig,
    pub tb: TbConfig,
    pub output: OutputKind,
    pub pgn: PgnConfig,
    pub epd_file: Option<PathBuf>,
    pub book: BookConfig,
    pub log: LogConfig,
    pub startup_timeout_ms: u64,
    pub new_game_timeout_ms: u64,
    /// Report pentanomial statistics; only meaningful with `games == 2`.
    pub report_penta: bool,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            kind: TournamentKind::default(),
            concurrency: 1,
            games: 2,
            rounds: 1,
            rating_interval: 10,
            score_interval: 1,
            seed: 0,
            resign: ResignAdjudication::default(),
            draw: DrawAdjudication::default(),
            max_moves: MaxMovesAdjudication::default(),
            sprt: SprtConfig::default(),
            tb: TbConfig::default(),
            output: OutputKind::default(),
            pgn: PgnConfig::default(),
            epd_file: None,
            book: BookConfig::default(),
            log: LogConfig::default(),
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            new_game_timeout_ms: DEFAULT_NEW_GAME_TIMEOUT_MS,
            report_penta: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn output_kind_fallback() {
        assert_eq!(OutputKind::from_name("cutechess"), OutputKind::Cutechess);
        assert_eq!(OutputKind::from_name("fastshogi"), OutputKind::Fastshogi);
        assert_eq!(OutputKind::from_name("none"), OutputKind::Fastshogi);
    }

    #[test]
    fn enum_names() {
        assert_eq!(
            TournamentKind::from_str("roundrobin").unwrap(),
            TournamentKind::RoundRobin
        );
        assert_eq!(
            TournamentKind::from_str("gauntlet").unwrap(),
            TournamentKind::Gauntlet
        );
        assert_eq!(SprtModel::from_str("trinomial").unwrap(), SprtModel::Trinomial);
        assert_eq!(BookOrder::from_str("random").unwrap(), BookOrder::Random);
    }

    #[test]
    fn limit_display() {
        let tc = |time, increment, fixed_time| SearchLimits {
            tc: TcLimits {
                time,
                increment,
                fixed_time,
                timemargin: 0,
            },
            ..SearchLimits::default()
        };
        assert_eq!(tc(60_000, 1000, 0).to_string(), "60+1");
        assert_eq!(tc(8000, 0, 0).to_string(), "8");
        assert_eq!(tc(0, 0, 500).to_string(), "0.5/move");
        assert_eq!(
            SearchLimits {
                nodes: 40_000,
                ..SearchLimits::default()
            }
            .to_string(),
            "40000 nodes"
        );
        assert_eq!(
            SearchLimits {
                depth: 12,
                ..SearchLimits::default()
            }
            .to_string(),
            "12 plies"
        );
    }
}
