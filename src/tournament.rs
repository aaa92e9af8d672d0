/// The worker pool driving the pairing stream.
pub mod runner;
/// Pairing generation for round-robin and gauntlet tournaments.
pub mod schedule;
