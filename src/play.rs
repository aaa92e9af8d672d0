/// Score-based, max-moves and tablebase adjudication.
pub mod adjudication;
/// The engine session: handshake, options, position/go exchanges.
pub mod engine;
/// Engine option declarations and validation.
pub mod options;
/// The child process driver.
pub mod process;
/// One game between two sessions.
pub mod run_match;
/// Per-side clocks.
pub mod time_control;
