use std::collections::HashMap;
use std::sync::Mutex;

use derive_more::{Add, AddAssign};

/// Elo point estimates and confidence intervals.
pub mod elo;
/// The sequential probability ratio stopping test.
pub mod sprt;

/// One game's result from one engine's perspective.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GameScore {
    Win,
    Draw,
    Loss,
}

impl GameScore {
    pub fn flipped(self) -> Self {
        match self {
            GameScore::Win => GameScore::Loss,
            GameScore::Draw => GameScore::Draw,
            GameScore::Loss => GameScore::Win,
        }
    }
}

/// Trinomial counts over games and pentanomial counts over colour-swapped
/// game pairs, both from one engine's perspective against one opponent.
/// Merging is plain addition, so merge order never matters.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Add, AddAssign)]
pub struct Stats {
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub penta_ww: u64,
    pub penta_wd: u64,
    pub penta_wl: u64,
    pub penta_dd: u64,
    pub penta_ld: u64,
    pub penta_ll: u64,
}

impl Stats {
    pub fn from_game(score: GameScore) -> Self {
        let mut stats = Self::default();
        match score {
            GameScore::Win => stats.wins = 1,
            GameScore::Draw => stats.draws = 1,
            GameScore::Loss => stats.losses = 1,
        }
        stats
    }

    /// Pentanomial counts for one completed pair; the category ignores which
    /// game of the pair came first.
    pub fn from_pair(first: GameScore, second: GameScore) -> Self {
        use GameScore::*;
        let mut stats = Self::default();
        match (first, second) {
            (Win, Win) => stats.penta_ww = 1,
            (Win, Draw) | (Draw, Win) => stats.penta_wd = 1,
            (Win, Loss) | (Loss, Win) => stats.penta_wl = 1,
            (Draw, Draw) => stats.penta_dd = 1,
            (Draw, Loss) | (Loss, Draw) => stats.penta_ld = 1,
            (Loss, Loss) => stats.penta_ll = 1,
        }
        stats
    }

    /// The same results seen from the opponent's side.
    pub fn flipped(&self) -> Self {
        Self {
            wins: self.losses,
            losses: self.wins,
            draws: self.draws,
            penta_ww: self.penta_ll,
            penta_wd: self.penta_ld,
            penta_wl: self.penta_wl,
            penta_dd: self.penta_dd,
            penta_ld: self.penta_wd,
            penta_ll: self.penta_ww,
        }
    }

    pub fn games(&self) -> u64 {
        self.wins + self.losses + self.draws
    }

    pub fn pairs(&self) -> u64 {
        self.penta_ww + self.penta_wd + self.penta_wl + self.penta_dd + self.penta_ld + self.penta_ll
    }

    pub fn points(&self) -> f64 {
        self.wins as f64 + self.draws as f64 / 2.0
    }

    pub fn points_ratio(&self) -> f64 {
        if self.games() == 0 {
            0.0
        } else {
            self.points() / self.games() as f64 * 100.0
        }
    }

    pub fn draw_ratio(&self) -> f64 {
        if self.games() == 0 {
            0.0
        } else {
            self.draws as f64 / self.games() as f64 * 100.0
        }
    }

    /// Share of pairs that ended level.
    pub fn draw_ratio_penta(&self) -> f64 {
        if self.pairs() == 0 {
            0.0
        } else {
            (self.penta_wl + self.penta_dd) as f64 / self.pairs() as f64 * 100.0
        }
    }

    pub fn pairs_ratio(&self) -> f64 {
        let lost = self.penta_ll + self.penta_ld;
        if lost == 0 {
            0.0
        } else {
            (self.penta_ww + self.penta_wd) as f64 / lost as f64
        }
    }

    pub fn wl_dd_ratio(&self) -> f64 {
        if self.penta_dd == 0 {
            0.0
        } else {
            self.penta_wl as f64 / self.penta_dd as f64
        }
    }
}

#[derive(Debug, Default)]
struct ScoreboardState {
    /// `engine → opponent → Stats`, kept symmetric.
    table: HashMap<String, HashMap<String, Stats>>,
    /// First games of pairs whose second game hasn't finished yet, keyed by
    /// `(round, pair-in-round)` and held from engine A's perspective.
    pending: HashMap<(u64, u64), GameScore>,
}

/// Live results of the whole tournament, shared by all workers.
#[derive(Debug, Default)]
pub struct Scoreboard {
    state: Mutex<ScoreboardState>,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished game between `a` and `b`, `a_score` seen from
    /// `a`. `pair_key` joins the two games of a colour-swapped pair; `None`
    /// means the tournament doesn't play pairs, so pentanomial counts stay
    /// untouched.
    pub fn record(&self, a: &str, b: &str, a_score: GameScore, pair_key: Option<(u64, u64)>) {
        let mut delta = Stats::from_game(a_score);
        let mut state = self.state.lock().unwrap();
        if let Some(key) = pair_key {
            match state.pending.remove(&key) {
                None => {
                    _ = state.pending.insert(key, a_score);
                }
                Some(first) => delta += Stats::from_pair(first, a_score),
            }
        }
        *state
            .table
            .entry(a.to_string())
            .or_default()
            .entry(b.to_string())
            .or_default() += delta;
        *state
            .table
            .entry(b.to_string())
            .or_default()
            .entry(a.to_string())
            .or_default() += delta.flipped();
    }

    /// Merges a whole stats block, e.g. when resuming from earlier results.
    pub fn merge(&self, a: &str, b: &str, stats: Stats) {
        let mut state = self.state.lock().unwrap();
        *state
            .table
            .entry(a.to_string())
            .or_default()
            .entry(b.to_string())
            .or_default() += stats;
        *state
            .table
            .entry(b.to_string())
            .or_default()
            .entry(a.to_string())
            .or_default() += stats.flipped();
    }

    pub fn stats_between(&self, a: &str, b: &str) -> Stats {
        self.state
            .lock()
            .unwrap()
            .table
            .get(a)
            .and_then(|opponents| opponents.get(b))
            .copied()
            .unwrap_or_default()
    }

    /// All results of `name`, summed over its opponents.
    pub fn aggregated(&self, name: &str) -> Stats {
        let state = self.state.lock().unwrap();
        let mut total = Stats::default();
        if let Some(opponents) = state.table.get(name) {
            for stats in opponents.values() {
                total += *stats;
            }
        }
        total
    }

    pub fn snapshot(&self) -> HashMap<String, HashMap<String, Stats>> {
        self.state.lock().unwrap().table.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_categories() {
        use GameScore::*;
        assert_eq!(Stats::from_pair(Win, Win).penta_ww, 1);
        assert_eq!(Stats::from_pair(Win, Draw).penta_wd, 1);
        assert_eq!(Stats::from_pair(Draw, Win).penta_wd, 1);
        assert_eq!(Stats::from_pair(Loss, Win).penta_wl, 1);
        assert_eq!(Stats::from_pair(Draw, Draw).penta_dd, 1);
        assert_eq!(Stats::from_pair(Loss, Draw).penta_ld, 1);
        assert_eq!(Stats::from_pair(Loss, Loss).penta_ll, 1);
    }

    #[test]
    fn flipping_swaps_perspective() {
        let stats = Stats {
            wins: 3,
            losses: 1,
            draws: 2,
            penta_ww: 1,
            penta_wd: 1,
            penta_ld: 1,
            ..Stats::default()
        };
        let flipped = stats.flipped();
        assert_eq!(flipped.wins, 1);
        assert_eq!(flipped.losses, 3);
        assert_eq!(flipped.draws, 2);
        assert_eq!(flipped.penta_ll, 1);
        assert_eq!(flipped.penta_ld, 1);
        assert_eq!(flipped.penta_wd, 1);
        assert_eq!(flipped.flipped(), stats);
    }

    #[test]
    fn merge_order_does_not_matter() {
        use GameScore::*;
        let games = [
            ("a", "b", Win, Some((0, 0))),
            ("a", "b", Draw, Some((0, 0))),
            ("a", "b", Loss, Some((1, 0))),
            ("a", "b", Loss, Some((1, 0))),
            ("a", "b", Win, None),
        ];
        let forward = Scoreboard::new();
        for (a, b, score, key) in games {
            forward.record(a, b, score, key);
        }
        let backward = Scoreboard::new();
        for (a, b, score, key) in games.iter().rev() {
            backward.record(a, b, *score, *key);
        }
        assert_eq!(
            forward.stats_between("a", "b"),
            backward.stats_between("a", "b")
        );
        assert_eq!(
            forward.stats_between("b", "a"),
            backward.stats_between("b", "a")
        );
        let stats = forward.stats_between("a", "b");
        assert_eq!(stats.games(), 5);
        assert_eq!(stats.pairs(), 2);
        assert_eq!(stats.penta_wd, 1);
        assert_eq!(stats.penta_ll, 1);
    }

    #[test]
    fn pentanomial_counts_pairs_of_completed_games() {
        use GameScore::*;
        let board = Scoreboard::new();
        let results = [Win, Draw, Win, Win, Loss, Draw, Draw];
        for (i, score) in results.iter().enumerate() {
            let key = (i as u64 / 2, 0);
            board.record("a", "b", *score, Some(key));
        }
        let stats = board.stats_between("a", "b");
        assert_eq!(stats.games(), 7);
        // the seventh game's pair is still pending
        assert_eq!(stats.pairs(), results.len() as u64 / 2);
    }

    #[test]
    fn block_merges_add_to_both_perspectives() {
        let board = Scoreboard::new();
        board.record("a", "b", GameScore::Win, None);
        board.merge(
            "a",
            "b",
            Stats {
                wins: 10,
                losses: 5,
                draws: 5,
                ..Stats::default()
            },
        );
        let a = board.stats_between("a", "b");
        assert_eq!((a.wins, a.losses, a.draws), (11, 5, 5));
        let b = board.stats_between("b", "a");
        assert_eq!((b.wins, b.losses, b.draws), (5, 11, 5));
    }

    #[test]
    fn aggregation_sums_over_opponents() {
        use GameScore::*;
        let board = Scoreboard::new();
        board.record("a", "b", Win, None);
        board.record("a", "c", Loss, None);
        board.record("b", "c", Draw, None);
        let a = board.aggregated("a");
        assert_eq!((a.wins, a.losses, a.draws), (1, 1, 0));
        let c = board.aggregated("c");
        assert_eq!((c.wins, c.losses, c.draws), (1, 0, 1));
        assert_eq!(board.aggregated("missing"), Stats::default());

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot["a"]["b"].wins, 1);
        assert_eq!(snapshot["c"]["a"].wins, 1);
    }

    #[test]
    fn ratios() {
        let stats = Stats {
            wins: 6,
            losses: 2,
            draws: 2,
            penta_ww: 2,
            penta_wd: 1,
            penta_wl: 1,
            penta_dd: 1,
            ..Stats::default()
        };
        assert!((stats.points_ratio() - 70.0).abs() < 1e-9);
        assert!((stats.draw_ratio() - 20.0).abs() < 1e-9);
        assert!((stats.draw_ratio_penta() - 40.0).abs() < 1e-9);
        assert!((stats.wl_dd_ratio() - 1.0).abs() < 1e-9);
        assert_eq!(stats.pairs_ratio(), 0.0);
    }
}
