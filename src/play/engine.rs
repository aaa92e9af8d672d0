use std::fmt::Write as _;
use std::time::Duration;

use anyhow::bail;
use crossbeam_channel::{bounded, Receiver, Sender};
use lazy_static::lazy_static;
use shakmaty::Color;
use strum_macros::Display;

use crate::config::{EngineConfig, TournamentConfig};
use crate::logger;
use crate::play::options::{EngineOption, OptionRegistry, OptionValue};
use crate::play::process::{LineBuffer, Process, Status, StreamKind};
use crate::play::time_control::TimeControl;
use crate::utils::{tokens, Res};

/// How many engine processes may be mid-spawn at once, across all workers.
/// Protects against spawn storms on machines with many cores.
pub const SPAWN_GATE_CAPACITY: usize = 16;

/// Upper bound on captured lines between two terminators.
const OUTPUT_RING_CAPACITY: usize = 1024;

const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Counting semaphore over a bounded channel: a permit is a unit parked in
/// the channel, released again when the permit drops.
struct SpawnGate {
    tx: Sender<()>,
    rx: Receiver<()>,
}

pub struct SpawnPermit {
    rx: Receiver<()>,
}

impl SpawnGate {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    fn acquire(&self) -> SpawnPermit {
        self.tx.send(()).expect("the spawn gate never disconnects");
        SpawnPermit {
            rx: self.rx.clone(),
        }
    }
}

impl Drop for SpawnPermit {
    fn drop(&mut self) {
        // the channel holds one unit per live permit, so this can't miss
        _ = self.rx.try_recv();
    }
}

lazy_static! {
    static ref SPAWN_GATE: SpawnGate = SpawnGate::new(SPAWN_GATE_CAPACITY);
}

/// Handshake and refresh deadlines; both configurable, independently of the
/// per-move clock.
#[derive(Debug, Copy, Clone)]
pub struct SessionTimeouts {
    pub startup: Duration,
    pub new_game: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            startup: Duration::from_millis(crate::config::DEFAULT_STARTUP_TIMEOUT_MS),
            new_game: Duration::from_millis(crate::config::DEFAULT_NEW_GAME_TIMEOUT_MS),
        }
    }
}

impl From<&TournamentConfig> for SessionTimeouts {
    fn from(config: &TournamentConfig) -> Self {
        Self {
            startup: Duration::from_millis(config.startup_timeout_ms),
            new_game: Duration::from_millis(config.new_game_timeout_ms),
        }
    }
}

#[derive(Debug, Default, Display, Copy, Clone, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum ScoreKind {
    #[default]
    Cp,
    Mate,
}

/// Fields extracted from the most recent usable `info` line. Missing fields
/// stay zero.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchInfo {
    pub score_kind: ScoreKind,
    pub score: i64,
    pub depth: u32,
    pub seldepth: u32,
    pub time: i64,
    pub nodes: u64,
    pub nps: u64,
    pub hashfull: u32,
    pub pv: Vec<String>,
}

/// Builds the `go` command for the side to move. Token order: `nodes`,
/// `depth`, then either `movetime` alone (fixed mode) or `wtime`/`btime`
/// followed by `winc`/`binc` for whichever side has time or increment.
pub fn build_go_command(
    limits: &crate::config::SearchLimits,
    our_tc: &TimeControl,
    enemy_tc: &TimeControl,
    stm: Color,
) -> String {
    let mut cmd = String::from("go");
    if limits.nodes > 0 {
        _ = write!(cmd, " nodes {}", limits.nodes);
    }
    if limits.depth > 0 {
        _ = write!(cmd, " depth {}", limits.depth);
    }

    // movetime and a running clock are mutually exclusive
    if our_tc.is_fixed_time() {
        _ = write!(cmd, " movetime {}", our_tc.fixed_time());
        return cmd;
    }

    let (white, black) = match stm {
        Color::White => (our_tc, enemy_tc),
        Color::Black => (enemy_tc, our_tc),
    };
    if our_tc.is_timed() || our_tc.is_increment() {
        if white.is_timed() || white.is_increment() {
            _ = write!(cmd, " wtime {}", white.time_left());
        }
        if black.is_timed() || black.is_increment() {
            _ = write!(cmd, " btime {}", black.time_left());
        }
    }
    if our_tc.is_increment() {
        if white.is_increment() {
            _ = write!(cmd, " winc {}", white.increment());
        }
        if black.is_increment() {
            _ = write!(cmd, " binc {}", black.increment());
        }
    }
    cmd
}

/// One running engine instance: the child process, the option registry
/// populated at the handshake, and a ring of recent output. At most one
/// search is outstanding at any time, enforced by the synchronous call
/// pattern of the match loop.
#[derive(Debug)]
pub struct UsiEngine {
    config: EngineConfig,
    process: Process,
    options: OptionRegistry,
    output: LineBuffer,
    timeouts: SessionTimeouts,
    id_name: Option<String>,
    id_author: Option<String>,
    initialized: bool,
    quit_sent: bool,
}

impl UsiEngine {
    /// Spawns the engine (bounded by the global spawn gate) and performs the
    /// `usi`/`usiok` handshake, collecting option declarations and the
    /// engine's reported identity.
    pub fn start(config: &EngineConfig, timeouts: SessionTimeouts) -> Res<Self> {
        let _permit = SPAWN_GATE.acquire();

        if let Some(cpus) = &config.affinity {
            logger::warn(format!(
                "Engine '{}' requests CPU affinity {cpus:?}, which this build doesn't apply",
                config.name
            ));
        }

        let process = Process::start(
            config.dir.as_deref(),
            &config.cmd,
            &config.args,
            &config.name,
            logger::realtime_logging(),
        )?;
        let mut engine = Self {
            config: config.clone(),
            process,
            options: OptionRegistry::default(),
            output: LineBuffer::new(OUTPUT_RING_CAPACITY),
            timeouts,
            id_name: None,
            id_author: None,
            initialized: false,
            quit_sent: false,
        };

        if engine.write("usi") != Status::Ok {
            bail!("Couldn't write 'usi' to engine '{}'", engine.config.name);
        }
        let status = engine.read_until("usiok", Some(timeouts.startup));
        if status != Status::Ok {
            bail!(
                "Engine '{}' didn't respond with 'usiok' after startup: {status}",
                engine.config.name
            );
        }
        engine.collect_handshake();
        engine.initialized = true;
        Ok(engine)
    }

    fn collect_handshake(&mut self) {
        let mut options = OptionRegistry::default();
        for line in self.output.iter().filter(|l| l.kind == StreamKind::Stdout) {
            let content = line.content.trim();
            if content.starts_with("option ") {
                match EngineOption::parse(content) {
                    Ok(option) => options.add(option),
                    Err(err) => logger::warn(format!(
                        "Ignoring malformed option declaration from '{}': {err}",
                        self.config.name
                    )),
                }
            } else if let Some(rest) = content.strip_prefix("id name ") {
                self.id_name = Some(rest.trim().to_string());
            } else if let Some(rest) = content.strip_prefix("id author ") {
                self.id_author = Some(rest.trim().to_string());
            }
        }
        self.options = options;
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The name the engine reported with `id name`, if any.
    pub fn id_name(&self) -> Option<&str> {
        self.id_name.as_deref()
    }

    pub fn id_author(&self) -> Option<&str> {
        self.id_author.as_deref()
    }

    pub fn options(&self) -> &OptionRegistry {
        &self.options
    }

    pub fn output(&self) -> &LineBuffer {
        &self.output
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn write(&mut self, msg: &str) -> Status {
        logger::write_to_engine(&self.config.name, msg);
        self.process.write_input(msg)
    }

    /// Clears the output ring, then reads until `terminator` or the deadline.
    pub fn read_until(&mut self, terminator: &str, deadline: Option<Duration>) -> Status {
        self.output.clear();
        let status = self
            .process
            .read_output(&mut self.output, terminator, deadline);
        if !logger::realtime_logging() {
            for line in self.output.iter() {
                logger::read_from_engine(
                    &self.config.name,
                    &line.content,
                    line.kind == StreamKind::Stderr,
                );
            }
        }
        status
    }

    /// `isready`/`readyok` ping with the given deadline.
    pub fn is_ready(&mut self, threshold: Duration) -> Status {
        let alive = self.process.alive();
        if alive != Status::Ok {
            return alive;
        }
        if self.write("isready") != Status::Ok {
            return Status::Error;
        }
        let status = self.read_until("readyok", Some(threshold));
        if status != Status::Ok {
            logger::warn(format!("Engine '{}' is not responsive", self.config.name));
        }
        status
    }

    /// `usinewgame` followed by a ready ping with the refresh deadline.
    pub fn new_game(&mut self) -> Status {
        if self.write("usinewgame") != Status::Ok {
            return Status::Error;
        }
        self.is_ready(self.timeouts.new_game)
    }

    /// Sends the configured option overrides. `Threads` goes first so that
    /// engines which size thread pools lazily see it before anything else.
    pub fn apply_options(&mut self) {
        let mut overrides = self.config.options.clone();
        overrides.sort_by_key(|(name, _)| name != "Threads");
        for (name, value) in &overrides {
            self.set_option(name, value);
        }
    }

    /// Validates against the registry and sends `setoption`. Unknown options
    /// and out-of-domain values are warned about and skipped; they never fail
    /// the match.
    pub fn set_option(&mut self, name: &str, value: &str) {
        let Some(option) = self.options.get(name) else {
            logger::warn(format!(
                "Engine '{}' doesn't have an option named '{name}'",
                self.config.name
            ));
            return;
        };
        if !option.is_valid(value) {
            logger::warn(format!(
                "Invalid value '{value}' for option '{name}' of engine '{}'",
                self.config.name
            ));
            return;
        }
        let is_button = matches!(option.value, OptionValue::Button);
        let msg = if is_button {
            // buttons fire on "true" and omit the value token
            format!("setoption name {name}")
        } else {
            format!("setoption name {name} value {value}")
        };
        if self.write(&msg) == Status::Ok {
            if let Some(option) = self.options.get_mut(name) {
                _ = option.set_value(value);
            }
        }
    }

    /// Emits the canonical position command for the given start FEN and move
    /// prefix.
    pub fn position(&mut self, fen: &str, moves: &[String]) -> Status {
        let mut cmd = if fen == "startpos" {
            "position startpos".to_string()
        } else {
            format!("position fen {fen}")
        };
        if !moves.is_empty() {
            cmd.push_str(" moves");
            for mov in moves {
                cmd.push(' ');
                cmd.push_str(mov);
            }
        }
        self.write(&cmd)
    }

    pub fn go(&mut self, our_tc: &TimeControl, enemy_tc: &TimeControl, stm: Color) -> Status {
        let cmd = build_go_command(&self.config.limits, our_tc, enemy_tc, stm);
        self.write(&cmd)
    }

    /// The move token following `bestmove` on the last captured line.
    pub fn bestmove(&self) -> Option<String> {
        let last = self.output.last()?;
        let mut words = tokens(&last.content);
        while let Some(word) = words.next() {
            if word == "bestmove" {
                return words.next().map(str::to_string);
            }
        }
        logger::warn(format!(
            "No bestmove found in the last line from '{}'",
            self.config.name
        ));
        None
    }

    /// The most recent info line that carries a score for the main line:
    /// it must contain `info` and ` score `, and either no `multipv` or
    /// ` multipv 1`. Lines with bound scores are only used when no exact
    /// score is available.
    pub fn last_info_line(&self) -> Option<String> {
        let mut fallback = None;
        for line in self.output.iter().rev() {
            let content = &line.content;
            if !content.contains("info")
                || !content.contains(" score ")
                || (content.contains(" multipv ") && !content.contains(" multipv 1"))
            {
                continue;
            }
            let bound = content.contains("lowerbound") || content.contains("upperbound");
            if !bound {
                return Some(content.clone());
            }
            if fallback.is_none() {
                fallback = Some(content.clone());
            }
        }
        fallback
    }

    /// Parses the chosen info line into its fields; all-zero when the engine
    /// printed no usable line.
    pub fn last_info(&self) -> SearchInfo {
        let Some(line) = self.last_info_line() else {
            logger::warn(format!(
                "No info line with a score found from '{}'",
                self.config.name
            ));
            return SearchInfo::default();
        };
        parse_info_line(&line)
    }

    /// Best-effort and idempotent.
    pub fn quit(&mut self) {
        if self.initialized && !self.quit_sent {
            self.quit_sent = true;
            _ = self.write("quit");
        }
    }
}

impl Drop for UsiEngine {
    fn drop(&mut self) {
        self.quit();
        // give the engine a moment to exit on its own; the process drop
        // kills whatever is left
        _ = self.process.wait_for_exit(QUIT_GRACE);
    }
}

fn parse_info_line(line: &str) -> SearchInfo {
    let mut info = SearchInfo::default();
    let mut words = tokens(line);
    while let Some(key) = words.next() {
        match key {
            "depth" => info.depth = next_number(&mut words),
            "seldepth" => info.seldepth = next_number(&mut words),
            "time" => info.time = next_number(&mut words),
            "nodes" => info.nodes = next_number(&mut words),
            "nps" => info.nps = next_number(&mut words),
            "hashfull" => info.hashfull = next_number(&mut words),
            "score" => match words.next() {
                Some("cp") => {
                    info.score_kind = ScoreKind::Cp;
                    info.score = next_number(&mut words);
                }
                Some("mate") => {
                    info.score_kind = ScoreKind::Mate;
                    info.score = next_number(&mut words);
                }
                _ => {}
            },
            "pv" => {
                info.pv = words.by_ref().map(str::to_string).collect();
            }
            _ => {}
        }
    }
    info
}

fn next_number<T: num::PrimInt + std::str::FromStr + Default>(
    words: &mut crate::utils::Tokens,
) -> T {
    words
        .next()
        .and_then(|word| word.parse().ok())
        .unwrap_or_default()
}
