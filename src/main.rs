use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;

use arbiters::cli::{self, Invocation};
use arbiters::logger;
use arbiters::tournament::runner::Tournament;
use arbiters::utils::Res;

fn main() {
    match run_program() {
        Ok(code) => exit(code),
        Err(err) => {
            eprintln!("{} {err:#}", "Error:".red());
            // configuration problems (and a dead PGN sink) are the only
            // fatal errors
            exit(1);
        }
    }
}

fn run_program() -> Res<i32> {
    let invocation = cli::parse_cli(std::env::args().skip(1))?;
    match invocation {
        Invocation::Version => {
            println!("arbiters {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Invocation::Help => {
            cli::print_help();
            Ok(0)
        }
        Invocation::Compliance { cmd, args } => Ok(i32::from(!arbiters::compliance::run(&cmd, &args))),
        Invocation::Tournament { config, engines } => {
            if let Some(path) = &config.log.file {
                logger::init(path, config.log.realtime)?;
            }

            let stop = Arc::new(AtomicBool::new(false));
            let interrupted = Arc::new(AtomicBool::new(false));
            {
                let stop = stop.clone();
                let interrupted = interrupted.clone();
                ctrlc::set_handler(move || {
                    if stop.swap(true, Ordering::SeqCst) {
                        // second Ctrl-C: give up on in-flight games
                        exit(2);
                    }
                    interrupted.store(true, Ordering::SeqCst);
                    eprintln!("\nStopping; finishing the current moves (Ctrl-C again to force quit)");
                })
                .map_err(|err| anyhow::anyhow!("Couldn't install the Ctrl-C handler: {err}"))?;
            }

            let tournament = Tournament::new(*config, engines, stop)?;
            tournament.run()?;

            if tournament.fatal() {
                Ok(1)
            } else if interrupted.load(Ordering::SeqCst) {
                Ok(2)
            } else {
                Ok(0)
            }
        }
    }
}
