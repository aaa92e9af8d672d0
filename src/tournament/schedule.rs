use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use itertools::Itertools;

use crate::config::TournamentKind;

/// One scheduled game. The two games of a colour-swapped pair share the same
/// `(round_id, pair)` key and opening; the second has `swap_colours` set.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Pairing {
    pub round_id: u64,
    pub game_in_round: u64,
    pub engine_a: usize,
    pub engine_b: usize,
    pub opening_idx: usize,
    pub swap_colours: bool,
}

impl Pairing {
    pub fn white(&self) -> usize {
        if self.swap_colours {
            self.engine_b
        } else {
            self.engine_a
        }
    }

    pub fn black(&self) -> usize {
        if self.swap_colours {
            self.engine_a
        } else {
            self.engine_b
        }
    }

    pub fn pair_key(&self) -> (u64, u64) {
        (self.round_id, self.game_in_round / 2)
    }
}

/// Generates the ordered stream of pairings for the whole tournament.
/// `next_pairing` decodes a counter, so handing out games is one lock around
/// an increment.
#[derive(Debug)]
pub struct Scheduler {
    /// Engine index pairs, each played once per round.
    pairs: Vec<(usize, usize)>,
    games: u64,
    total: u64,
    book_len: usize,
    next: Mutex<u64>,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        kind: TournamentKind,
        num_engines: usize,
        rounds: u64,
        games: u64,
        book_len: usize,
        stop: Arc<AtomicBool>,
    ) -> Self {
        assert!(num_engines >= 2);
        assert!(book_len > 0);
        let pairs: Vec<(usize, usize)> = match kind {
            TournamentKind::RoundRobin => (0..num_engines).tuple_combinations().collect(),
            TournamentKind::Gauntlet => (1..num_engines).map(|challenger| (0, challenger)).collect(),
        };
        let total = rounds * pairs.len() as u64 * games;
        Self {
            pairs,
            games,
            total,
            book_len,
            next: Mutex::new(0),
            stop,
        }
    }

    pub fn total_games(&self) -> u64 {
        self.total
    }

    /// The next pairing, or `None` once the stream is exhausted or the stop
    /// flag was raised.
    pub fn next_pairing(&self) -> Option<Pairing> {
        if self.stop.load(Ordering::Relaxed) {
            return None;
        }
        let mut next = self.next.lock().unwrap();
        if *next >= self.total {
            return None;
        }
        let idx = *next;
        *next += 1;
        drop(next);

        let per_round = self.pairs.len() as u64 * self.games;
        let round_id = idx / per_round;
        let game_in_round = idx % per_round;
        let slot = game_in_round / self.games;
        let game = game_in_round % self.games;
        let (engine_a, engine_b) = self.pairs[slot as usize];
        // openings advance once per pair slot and wrap around the book
        let opening_idx = ((round_id * self.pairs.len() as u64 + slot) % self.book_len as u64) as usize;
        Some(Pairing {
            round_id,
            game_in_round,
            engine_a,
            engine_b,
            opening_idx,
            swap_colours: game % 2 == 1,
        })
    }
}
