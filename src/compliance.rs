use std::time::Duration;

use colored::Colorize;

use crate::config::{EngineConfig, SearchLimits};
use crate::play::engine::{SessionTimeouts, UsiEngine};
use crate::play::process::Status;
use crate::play::time_control::TcLimits;

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// A position with a tactical flavour, so engines that only parrot startpos
/// fail here.
const MIDGAME_FEN: &str = "3r2k1/p5n1/1pq1p2p/2p3p1/2P1P1n1/1P1P2pP/PN1Q2K1/5R2 w - - 0 27";

fn step(number: &mut u32, description: &str, passed: bool) -> bool {
    *number += 1;
    if passed {
        println!("{} Step {number}: {description}", " Passed".green().bold());
    } else {
        eprintln!("{} Step {number}: {description}", " Failed".red().bold());
    }
    passed
}

/// Walks one engine through the protocol exchanges a tournament relies on
/// and reports every step. Returns true iff the engine passed all of them.
pub fn run(cmd: &str, args: &[String]) -> bool {
    let config = EngineConfig {
        name: "compliance".to_string(),
        cmd: cmd.to_string(),
        args: args.to_vec(),
        limits: SearchLimits {
            tc: TcLimits {
                time: 100,
                ..TcLimits::default()
            },
            ..SearchLimits::default()
        },
        ..EngineConfig::default()
    };
    let timeouts = SessionTimeouts {
        startup: STEP_TIMEOUT,
        new_game: STEP_TIMEOUT,
    };

    let mut number = 0;
    let mut engine = match UsiEngine::start(&config, timeouts) {
        Ok(engine) => {
            _ = step(&mut number, "Start the engine and await usiok", true);
            engine
        }
        Err(err) => {
            _ = step(&mut number, "Start the engine and await usiok", false);
            eprintln!("{err:#}");
            return false;
        }
    };

    let search_probe = |engine: &mut UsiEngine, number: &mut u32, go: &str| -> bool {
        let sent = engine.write(go) == Status::Ok;
        step(number, &format!("Send {go}"), sent)
            && step(
                number,
                &format!("Read bestmove after {go}"),
                engine.read_until("bestmove", Some(STEP_TIMEOUT)) == Status::Ok
                    && engine.bestmove().is_some(),
            )
            && step(
                number,
                "Engine printed an info line with a score",
                engine.last_info_line().is_some(),
            )
    };

    let all = |number: &mut u32, engine: &mut UsiEngine| -> bool {
        step(
            number,
            "Check if engine is ready",
            engine.is_ready(STEP_TIMEOUT) == Status::Ok,
        ) && step(number, "Check id name", engine.id_name().is_some())
            && step(number, "Check id author", engine.id_author().is_some())
            && step(number, "Send usinewgame", engine.new_game() == Status::Ok)
            && step(
                number,
                "Set position to startpos",
                engine.position("startpos", &[]) == Status::Ok,
            )
            && step(
                number,
                "Check if engine is ready after startpos",
                engine.is_ready(STEP_TIMEOUT) == Status::Ok,
            )
            && step(
                number,
                "Set position to a midgame fen",
                engine.position(MIDGAME_FEN, &[]) == Status::Ok,
            )
            && step(
                number,
                "Check if engine is ready after fen",
                engine.is_ready(STEP_TIMEOUT) == Status::Ok,
            )
            && search_probe(engine, number, "go wtime 100")
            && search_probe(engine, number, "go wtime 100 btime 100")
            && search_probe(engine, number, "go wtime 100 winc 100 btime 100 binc 100")
            && step(
                number,
                "Set position to startpos moves e2e4 e7e5",
                engine.position("startpos", &["e2e4".to_string(), "e7e5".to_string()])
                    == Status::Ok,
            )
            && search_probe(engine, number, "go wtime 100 btime 100")
    };

    let passed = all(&mut number, &mut engine);
    engine.quit();
    if passed {
        println!("Engine passed all compliance checks.");
    } else {
        eprintln!("Engine failed compliance.");
    }
    passed
}
