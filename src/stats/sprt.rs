use std::sync::OnceLock;

use strum_macros::Display;

use crate::config::{SprtConfig, SprtModel};
use crate::stats::elo::{expected_score, pentanomial_moments, wdl_moments};
use crate::stats::Stats;

#[derive(Debug, Display, Copy, Clone, Eq, PartialEq)]
pub enum SprtDecision {
    #[strum(serialize = "H0 was accepted")]
    AcceptH0,
    #[strum(serialize = "H1 was accepted")]
    AcceptH1,
}

/// Sequential probability ratio test between `H0: elo = elo0` and
/// `H1: elo = elo1`. The first bound crossing latches the decision, so later
/// observations can never revert what was reported.
#[derive(Debug)]
pub struct Sprt {
    config: SprtConfig,
    decision: OnceLock<SprtDecision>,
}

impl Sprt {
    pub fn new(config: SprtConfig) -> Self {
        Self {
            config,
            decision: OnceLock::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn model(&self) -> SprtModel {
        self.config.model
    }

    /// `A = ln(β / (1 − α))`.
    pub fn lower_bound(&self) -> f64 {
        (self.config.beta / (1.0 - self.config.alpha)).ln()
    }

    /// `B = ln((1 − β) / α)`.
    pub fn upper_bound(&self) -> f64 {
        ((1.0 - self.config.beta) / self.config.alpha).ln()
    }

    /// Generalized SPRT log-likelihood ratio over the observed score
    /// distribution: `N·(s1 − s0)·(2·µ − s0 − s1) / (2·σ²)`.
    pub fn llr(&self, stats: &Stats) -> f64 {
        let (mean, var, n) = match self.config.model {
            SprtModel::Trinomial => wdl_moments(stats),
            SprtModel::Pentanomial => pentanomial_moments(stats),
        };
        if n < 1.0 || var <= 0.0 {
            return 0.0;
        }
        let s0 = expected_score(self.config.elo0);
        let s1 = expected_score(self.config.elo1);
        n * (s1 - s0) * (2.0 * mean - s0 - s1) / (2.0 * var)
    }

    /// How far the current LLR has travelled toward the bound it is heading
    /// for, in `[0, 1]` until a decision is reached.
    pub fn fraction(&self, llr: f64) -> f64 {
        if llr < 0.0 {
            llr / self.lower_bound()
        } else {
            llr / self.upper_bound()
        }
    }

    /// The latched decision, updated from fresh statistics. Returns `None`
    /// while the test wants more games.
    pub fn check(&self, stats: &Stats) -> Option<SprtDecision> {
        if let Some(decision) = self.decision.get() {
            return Some(*decision);
        }
        let llr = self.llr(stats);
        let decision = if llr >= self.upper_bound() {
            SprtDecision::AcceptH1
        } else if llr <= self.lower_bound() {
            SprtDecision::AcceptH0
        } else {
            return None;
        };
        // another worker may have latched a decision in the meantime; the
        // first one wins
        _ = self.decision.set(decision);
        Some(*self.decision.get().unwrap())
    }

    pub fn decision(&self) -> Option<SprtDecision> {
        self.decision.get().copied()
    }

    pub fn bounds_str(&self) -> String {
        format!("({:.2}, {:.2})", self.lower_bound(), self.upper_bound())
    }

    pub fn elo_str(&self) -> String {
        format!("[{:.2}, {:.2}]", self.config.elo0, self.config.elo1)
    }
}
