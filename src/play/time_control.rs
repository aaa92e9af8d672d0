use std::time::Duration;

/// Raw per-side limits in milliseconds. `fixed_time` (go movetime) takes
/// precedence over `time`/`increment` (go wtime/winc); when all three are
/// zero the side plays without a clock (nodes or depth limited).
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct TcLimits {
    pub time: i64,
    pub increment: i64,
    pub fixed_time: i64,
    /// How far an engine may overshoot before it flags.
    pub timemargin: i64,
}

/// One side's clock for one game. `update` charges the elapsed time of a move
/// and reports whether the side stayed within its budget; after a flag the
/// balance goes negative and stays meaningless for the rest of the game.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TimeControl {
    limits: TcLimits,
    time_left: i64,
}

impl TimeControl {
    pub fn new(limits: TcLimits) -> Self {
        Self {
            limits,
            // the first move's increment is credited up front
            time_left: limits.time + limits.increment,
        }
    }

    pub fn is_fixed_time(&self) -> bool {
        self.limits.fixed_time != 0
    }

    pub fn is_timed(&self) -> bool {
        self.limits.time != 0
    }

    pub fn is_increment(&self) -> bool {
        self.limits.increment != 0
    }

    pub fn time_left(&self) -> i64 {
        self.time_left
    }

    pub fn fixed_time(&self) -> i64 {
        self.limits.fixed_time
    }

    pub fn increment(&self) -> i64 {
        self.limits.increment
    }

    /// The deadline for reading the engine's `bestmove`, or `None` when the
    /// side plays without a clock.
    pub fn timeout_threshold(&self) -> Option<Duration> {
        let threshold = if self.is_fixed_time() {
            self.limits.fixed_time + self.limits.timemargin
        } else if self.is_timed() || self.is_increment() {
            self.time_left + self.limits.timemargin
        } else {
            return None;
        };
        Some(Duration::from_millis(threshold.max(0) as u64))
    }

    /// Charges `elapsed` milliseconds. Returns false iff the side flagged.
    pub fn update(&mut self, elapsed: i64) -> bool {
        if self.is_fixed_time() {
            if elapsed > self.limits.fixed_time + self.limits.timemargin {
                self.time_left = self.limits.fixed_time - elapsed;
                return false;
            }
            // the next move gets the full per-move budget again
            self.time_left = self.limits.fixed_time;
            true
        } else if self.is_timed() || self.is_increment() {
            if elapsed > self.time_left + self.limits.timemargin {
                self.time_left -= elapsed;
                return false;
            }
            self.time_left = (self.time_left - elapsed).max(0) + self.limits.increment;
            true
        } else {
            self.time_left = 0;
            true
        }
    }
}
