//! A deterministic, scripted USI responder used by the integration tests.
//! It echoes its arguments on startup, declares a fixed option set, answers
//! the usual pings, acknowledges every `setoption`, and always plays `e2e4`.

use std::io::{BufRead, Write};
use std::thread::sleep;
use std::time::Duration;

fn say(out: &mut impl Write, line: &str) {
    // the parent reads through a pipe, so every line must be flushed
    writeln!(out, "{line}").unwrap();
    out.flush().unwrap();
}

fn main() {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for (i, arg) in std::env::args().skip(1).enumerate() {
        say(&mut out, &format!("argv[{}]: {arg}", i + 1));
    }

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let command = line.split_whitespace().next().unwrap_or("");
        match command {
            "usi" => {
                say(&mut out, "id name dummy_engine");
                say(&mut out, "id author arbiters");
                say(&mut out, "option name Threads type spin default 1 min 1 max 1024");
                say(&mut out, "option name Hash type spin default 1 min 1 max 500000");
                say(&mut out, "option name MultiPV type spin default 1 min 1 max 256");
                say(&mut out, "line0");
                say(&mut out, "line1");
                say(&mut out, "usiok");
            }
            "isready" => say(&mut out, "readyok"),
            "usinewgame" | "position" | "stop" => {}
            "setoption" => say(&mut out, &format!("option set: {line}")),
            "sleep" => {
                sleep(Duration::from_millis(1000));
                say(&mut out, "done");
            }
            "go" => {
                say(
                    &mut out,
                    "info depth 1 seldepth 2 multipv 1 score cp 10 time 1 nodes 100 nps 100000 hashfull 1 pv e2e4",
                );
                say(&mut out, "bestmove e2e4");
            }
            "quit" => return,
            _ => {}
        }
    }
}
