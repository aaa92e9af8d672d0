use crate::stats::Stats;

const CONFIDENCE_Z: f64 = 1.959964;
const LN_10: f64 = std::f64::consts::LN_10;

/// Abramowitz & Stegun 7.1.26; the standard library has no erf.
fn erf(x: f64) -> f64 {
    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

fn phi(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// The expected score of a player who is `elo` points stronger.
pub fn expected_score(elo: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(-elo / 400.0))
}

fn score_to_elo_diff(score: f64) -> f64 {
    let score = score.clamp(1e-9, 1.0 - 1e-9);
    -400.0 * (1.0 / score - 1.0).log10()
}

/// Sample mean, sample variance and sample count of the per-game score
/// distribution.
pub(crate) fn wdl_moments(stats: &Stats) -> (f64, f64, f64) {
    let n = stats.games() as f64;
    if n < 1.0 {
        return (0.5, 0.0, 0.0);
    }
    let mean = (stats.wins as f64 + stats.draws as f64 * 0.5) / n;
    let var = (stats.wins as f64 * (1.0 - mean).powi(2)
        + stats.draws as f64 * (0.5 - mean).powi(2)
        + stats.losses as f64 * (0.0 - mean).powi(2))
        / n;
    (mean, var, n)
}

/// The same moments over the five pair-score categories
/// `{0, ¼, ½, ¾, 1}`, with the pair count as the sample count.
pub(crate) fn pentanomial_moments(stats: &Stats) -> (f64, f64, f64) {
    let n = stats.pairs() as f64;
    if n < 1.0 {
        return (0.5, 0.0, 0.0);
    }
    let counts = [
        (stats.penta_ll, 0.0),
        (stats.penta_ld, 0.25),
        (stats.penta_wl + stats.penta_dd, 0.5),
        (stats.penta_wd, 0.75),
        (stats.penta_ww, 1.0),
    ];
    let mean = counts
        .iter()
        .map(|(count, score)| *count as f64 * score)
        .sum::<f64>()
        / n;
    let var = counts
        .iter()
        .map(|(count, score)| *count as f64 * (score - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean, var, n)
}

/// Elo point estimate with confidence interval, over either the trinomial
/// game distribution or the pentanomial pair distribution.
#[derive(Debug, Copy, Clone)]
pub struct Elo {
    mean: f64,
    var: f64,
    n: f64,
}

impl Elo {
    pub fn wdl(stats: &Stats) -> Self {
        let (mean, var, n) = wdl_moments(stats);
        Self { mean, var, n }
    }

    pub fn pentanomial(stats: &Stats) -> Self {
        let (mean, var, n) = pentanomial_moments(stats);
        Self { mean, var, n }
    }

    /// Picks the model the tournament reports with.
    pub fn new(stats: &Stats, penta: bool) -> Self {
        if penta {
            Self::pentanomial(stats)
        } else {
            Self::wdl(stats)
        }
    }

    fn stderr(&self) -> f64 {
        if self.n < 1.0 {
            0.0
        } else {
            (self.var / self.n).sqrt()
        }
    }

    pub fn diff(&self) -> f64 {
        score_to_elo_diff(self.mean)
    }

    /// Half-width of the 95% confidence interval, in Elo.
    pub fn error(&self) -> f64 {
        let margin = CONFIDENCE_Z * self.stderr();
        let upper = score_to_elo_diff(self.mean + margin);
        let lower = score_to_elo_diff(self.mean - margin);
        (upper - lower) / 2.0
    }

    /// Likelihood of superiority, in percent.
    pub fn los(&self) -> f64 {
        let stderr = self.stderr();
        if stderr == 0.0 {
            return 50.0;
        }
        phi((self.mean - 0.5) / stderr) * 100.0
    }

    /// Normalised Elo: the point estimate measured in units of one standard
    /// deviation of the score distribution.
    pub fn n_elo_diff(&self) -> f64 {
        let sigma = self.var.sqrt();
        if sigma == 0.0 {
            return 0.0;
        }
        self.diff() / (sigma * (800.0 / LN_10))
    }

    pub fn n_elo_error(&self) -> f64 {
        let sigma = self.var.sqrt();
        if sigma == 0.0 {
            return 0.0;
        }
        self.error() / (sigma * (800.0 / LN_10))
    }

    pub fn format_elo(&self) -> String {
        format!("{:.2} +/- {:.2}", self.diff(), self.error())
    }

    pub fn format_n_elo(&self) -> String {
        format!("{:.2} +/- {:.2}", self.n_elo_diff(), self.n_elo_error())
    }
}
