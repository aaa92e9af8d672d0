//! Drives a real child process (the scripted `dummy_engine` binary) through
//! the session API: handshake capture, option parsing, read deadlines and
//! the option application order.

use std::time::Duration;

use arbiters::config::{EngineConfig, SearchLimits};
use arbiters::play::engine::{SessionTimeouts, UsiEngine};
use arbiters::play::process::{Status, StreamKind};
use arbiters::play::time_control::TcLimits;

fn dummy_config(args: &[&str]) -> EngineConfig {
    EngineConfig {
        name: "dummy".to_string(),
        cmd: env!("CARGO_BIN_EXE_dummy_engine").to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        limits: SearchLimits {
            tc: TcLimits {
                time: 1000,
                ..TcLimits::default()
            },
            ..SearchLimits::default()
        },
        ..EngineConfig::default()
    }
}

fn timeouts() -> SessionTimeouts {
    SessionTimeouts {
        startup: Duration::from_secs(10),
        new_game: Duration::from_secs(10),
    }
}

fn lines(engine: &UsiEngine) -> Vec<String> {
    engine
        .output()
        .iter()
        .map(|line| line.content.clone())
        .collect()
}

#[test]
fn startup_passes_arguments_and_captures_the_handshake() {
    let config = dummy_config(&["arg1", "arg2", "arg3"]);
    let engine = UsiEngine::start(&config, timeouts()).unwrap();
    assert!(engine.initialized());

    let output = lines(&engine);
    assert_eq!(output.len(), 11);
    assert_eq!(output[0], "argv[1]: arg1");
    assert_eq!(output[1], "argv[2]: arg2");
    assert_eq!(output[2], "argv[3]: arg3");
    assert_eq!(output[3], "id name dummy_engine");
    assert_eq!(output[10], "usiok");
    assert!(engine
        .output()
        .iter()
        .all(|line| line.kind == StreamKind::Stdout));

    assert_eq!(engine.id_name(), Some("dummy_engine"));
    assert_eq!(engine.id_author(), Some("arbiters"));
}

#[test]
fn handshake_populates_the_option_registry() {
    let config = dummy_config(&[]);
    let engine = UsiEngine::start(&config, timeouts()).unwrap();
    assert_eq!(engine.options().len(), 3);
    let threads = engine.options().get("Threads").unwrap();
    assert!(threads.is_valid("1024"));
    assert!(!threads.is_valid("1025"));
    assert!(engine.options().get("Hash").is_some());
    assert!(engine.options().get("MultiPV").is_some());
    assert!(engine.options().get("Ponder").is_none());
}

#[test]
fn low_level_reads_and_pings() {
    let config = dummy_config(&["arg1", "arg2", "arg3"]);
    let mut engine = UsiEngine::start(&config, timeouts()).unwrap();

    assert_eq!(engine.write("usi"), Status::Ok);
    assert_eq!(engine.read_until("usiok", Some(Duration::from_secs(5))), Status::Ok);
    let output = lines(&engine);
    assert_eq!(output.len(), 8);
    assert_eq!(output[0], "id name dummy_engine");
    assert_eq!(output[1], "id author arbiters");
    assert_eq!(output[2], "option name Threads type spin default 1 min 1 max 1024");
    assert_eq!(output[3], "option name Hash type spin default 1 min 1 max 500000");
    assert_eq!(output[4], "option name MultiPV type spin default 1 min 1 max 256");
    assert_eq!(output[5], "line0");
    assert_eq!(output[6], "line1");
    assert_eq!(output[7], "usiok");

    assert_eq!(engine.is_ready(Duration::from_secs(5)), Status::Ok);
    assert_eq!(lines(&engine), ["readyok"]);
}

#[test]
fn read_deadlines_time_out_without_killing_the_engine() {
    let config = dummy_config(&[]);
    let mut engine = UsiEngine::start(&config, timeouts()).unwrap();

    assert_eq!(engine.write("sleep"), Status::Ok);
    // the dummy sleeps a full second before answering
    assert_eq!(
        engine.read_until("done", Some(Duration::from_millis(100))),
        Status::Timeout
    );
    assert_eq!(
        engine.read_until("done", Some(Duration::from_secs(5))),
        Status::Ok
    );
    assert_eq!(lines(&engine), ["done"]);

    // the engine survived the timeout
    assert_eq!(engine.is_ready(Duration::from_secs(5)), Status::Ok);
}

#[test]
fn restarting_creates_a_fresh_session() {
    let config = dummy_config(&[]);
    let engine = UsiEngine::start(&config, timeouts()).unwrap();
    assert_eq!(engine.id_name(), Some("dummy_engine"));
    drop(engine);

    let engine = UsiEngine::start(&config, timeouts()).unwrap();
    assert_eq!(engine.id_name(), Some("dummy_engine"));
    assert_eq!(engine.options().len(), 3);
}

#[test]
fn configured_options_are_applied_threads_first() {
    let mut config = dummy_config(&[]);
    config.options = vec![
        ("Hash".to_string(), "1600".to_string()),
        ("MultiPV".to_string(), "3".to_string()),
        ("Threads".to_string(), "4".to_string()),
    ];
    let mut engine = UsiEngine::start(&config, timeouts()).unwrap();
    assert_eq!(engine.new_game(), Status::Ok);
    engine.apply_options();

    assert_eq!(
        engine.read_until(
            "option set: setoption name MultiPV value 3",
            Some(Duration::from_secs(5))
        ),
        Status::Ok
    );
    let output = lines(&engine);
    assert_eq!(output.len(), 3);
    assert_eq!(output[0], "option set: setoption name Threads value 4");
    assert_eq!(output[1], "option set: setoption name Hash value 1600");
    assert_eq!(output[2], "option set: setoption name MultiPV value 3");
}

#[test]
fn invalid_overrides_are_skipped() {
    let mut config = dummy_config(&[]);
    config.options = vec![
        ("Threads".to_string(), "100000".to_string()),
        ("Nonexistent".to_string(), "1".to_string()),
        ("Hash".to_string(), "16".to_string()),
    ];
    let mut engine = UsiEngine::start(&config, timeouts()).unwrap();
    engine.apply_options();

    // only the valid Hash override reaches the engine
    assert_eq!(
        engine.read_until("option set: setoption name Hash value 16", Some(Duration::from_secs(5))),
        Status::Ok
    );
    assert_eq!(lines(&engine).len(), 1);
}

#[test]
fn search_exchange_extracts_bestmove_and_info() {
    let config = dummy_config(&[]);
    let mut engine = UsiEngine::start(&config, timeouts()).unwrap();
    assert_eq!(engine.new_game(), Status::Ok);
    assert_eq!(engine.position("startpos", &[]), Status::Ok);
    assert_eq!(engine.write("go wtime 1000 btime 1000"), Status::Ok);
    assert_eq!(
        engine.read_until("bestmove", Some(Duration::from_secs(5))),
        Status::Ok
    );

    assert_eq!(engine.bestmove().as_deref(), Some("e2e4"));
    let info = engine.last_info();
    assert_eq!(info.depth, 1);
    assert_eq!(info.seldepth, 2);
    assert_eq!(info.score, 10);
    assert_eq!(info.nodes, 100);
    assert_eq!(info.nps, 100_000);
    assert_eq!(info.hashfull, 1);
    assert_eq!(info.pv, ["e2e4"]);
}

#[test]
fn quit_is_idempotent() {
    let config = dummy_config(&[]);
    let mut engine = UsiEngine::start(&config, timeouts()).unwrap();
    engine.quit();
    engine.quit();
}
