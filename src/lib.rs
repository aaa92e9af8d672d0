//! [`arbiters`](crate) runs automated tournaments between external USI engine
//! processes. It supervises the engine children, mediates the line protocol,
//! plays colour-swapped game pairs from an opening book, adjudicates results,
//! aggregates trinomial and pentanomial statistics, and runs an SPRT stopping
//! test to decide with quantified confidence whether one engine is stronger
//! than another.
//!
//! Board rules and move legality are consumed as a black box through the
//! `shakmaty` crate; everything protocol- and tournament-shaped lives here.

/// Thin wrapper around the rules library: position setup, move legality,
/// terminal detection.
pub mod board;
/// EPD opening books.
pub mod book;
/// Hand-written command line parser for the cutechess/fastchess dialect.
pub mod cli;
/// Scripted engine conformance checks.
pub mod compliance;
/// Tournament and engine configuration types.
pub mod config;
/// EPD stream of final positions.
pub mod epd;
/// Global engine communication logger.
pub mod logger;
/// Pluggable progress reporters.
pub mod output;
/// PGN building and the append-only game stream.
pub mod pgn;
/// Everything needed to play a single game: process driver, engine session,
/// time control, options, adjudication and the match loop.
pub mod play;
/// Scoreboard, Elo estimation and the SPRT stopping rule.
pub mod stats;
/// Syzygy tablebase adjudication.
pub mod tablebase;
/// Pairing generation and the worker pool.
pub mod tournament;
/// Low-level helpers shared by the other modules.
pub mod utils;
