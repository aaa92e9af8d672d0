use std::collections::HashSet;
use std::iter::Peekable;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail};

use crate::config::{
    BookOrder, DrawAdjudication, EngineConfig, MaxMovesAdjudication, OutputKind,
    ResignAdjudication, SprtConfig, SprtModel, TournamentConfig, TournamentKind,
    DEFAULT_TIME_MARGIN_MS,
};
use crate::play::time_control::TcLimits;
use crate::utils::{parse_bool_from_str, parse_fp_from_str, parse_int_from_str, Res};

/// What the command line asked for.
pub enum Invocation {
    Tournament {
        config: Box<TournamentConfig>,
        engines: Vec<EngineConfig>,
    },
    /// `arbiters compliance <cmd> [args…]`
    Compliance { cmd: String, args: Vec<String> },
    Version,
    Help,
}

/// Engine settings as given on the command line; unset fields fall back to
/// `-each` before they become an [`EngineConfig`].
#[derive(Debug, Default, Clone)]
struct EngineArgs {
    name: Option<String>,
    cmd: Option<String>,
    dir: Option<PathBuf>,
    args: Vec<String>,
    options: Vec<(String, String)>,
    time: Option<f64>,
    increment: Option<f64>,
    fixed_time: Option<f64>,
    timemargin: Option<i64>,
    nodes: Option<u64>,
    depth: Option<u32>,
    affinity: Option<Vec<usize>>,
}

type ArgIter = Peekable<std::vec::IntoIter<String>>;

fn next_arg(args: &mut ArgIter, flag: &str) -> Res<String> {
    args.next()
        .ok_or_else(|| anyhow!("Missing value after '{flag}'"))
}

/// Splits `key=value`; the value part is optional (`-pgnout min=true` vs a
/// bare `min`).
fn split_key_value(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (arg, None),
    }
}

fn require<'a>(key: &str, value: Option<&'a str>) -> Res<&'a str> {
    value.ok_or_else(|| anyhow!("Expected '=<value>' after '{key}'"))
}

/// `time[+increment]` in seconds, or `inf`.
fn parse_tc(value: &str) -> Res<(f64, f64)> {
    if value == "inf" || value == "infinite" {
        return Ok((0.0, 0.0));
    }
    let mut parts = value.split('+');
    let time = parse_fp_from_str(parts.next().unwrap().trim(), "the start time")?;
    let increment = match parts.next() {
        Some(inc) => parse_fp_from_str(inc.trim(), "the increment")?,
        None => 0.0,
    };
    if parts.next().is_some() {
        bail!("Malformed time control '{value}' (expected time[+increment])");
    }
    Ok((time, increment))
}

fn parse_affinity(value: &str) -> Res<Vec<usize>> {
    value
        .split(',')
        .map(|cpu| parse_int_from_str(cpu.trim(), "a CPU index"))
        .collect()
}

/// Consumes `key=value` members until the next `-flag`.
fn parse_engine(args: &mut ArgIter) -> Res<EngineArgs> {
    let mut engine = EngineArgs::default();
    while let Some(arg) = args.peek() {
        if arg.starts_with('-') {
            break;
        }
        let arg = args.next().unwrap();
        let (key, value) = split_key_value(&arg);
        match key {
            "name" => engine.name = Some(require(key, value)?.to_string()),
            "cmd" => engine.cmd = Some(require(key, value)?.to_string()),
            "dir" => engine.dir = Some(PathBuf::from(require(key, value)?)),
            "arg" => engine.args.push(require(key, value)?.to_string()),
            "tc" => {
                let (time, increment) = parse_tc(require(key, value)?)?;
                engine.time = Some(time);
                engine.increment = Some(increment);
            }
            "st" => {
                engine.fixed_time = Some(parse_fp_from_str(require(key, value)?, "st (move time)")?)
            }
            "timemargin" => {
                engine.timemargin = Some(parse_int_from_str(require(key, value)?, "timemargin")?)
            }
            "nodes" => engine.nodes = Some(parse_int_from_str(require(key, value)?, "nodes")?),
            "depth" => engine.depth = Some(parse_int_from_str(require(key, value)?, "depth")?),
            "affinity" => engine.affinity = Some(parse_affinity(require(key, value)?)?),
            _ => match key.strip_prefix("option.") {
                Some(option) => engine
                    .options
                    .push((option.to_string(), require(key, value)?.to_string())),
                None => bail!("Unknown engine setting '{key}'"),
            },
        }
    }
    Ok(engine)
}

/// `-each` provides defaults for every field an `-engine` left unset.
fn combine_engine_args(engine: &mut EngineArgs, each: &EngineArgs) {
    engine.name = engine.name.take().or_else(|| each.name.clone());
    engine.cmd = engine.cmd.take().or_else(|| each.cmd.clone());
    engine.dir = engine.dir.take().or_else(|| each.dir.clone());
    if engine.args.is_empty() {
        engine.args = each.args.clone();
    }
    engine.time = engine.time.or(each.time);
    engine.increment = engine.increment.or(each.increment);
    engine.fixed_time = engine.fixed_time.or(each.fixed_time);
    engine.timemargin = engine.timemargin.or(each.timemargin);
    engine.nodes = engine.nodes.or(each.nodes);
    engine.depth = engine.depth.or(each.depth);
    engine.affinity = engine.affinity.take().or_else(|| each.affinity.clone());
    for (name, value) in &each.options {
        if !engine.options.iter().any(|(existing, _)| existing == name) {
            engine.options.push((name.clone(), value.clone()));
        }
    }
}

fn secs_to_ms(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

fn resolve_engine(mut args: EngineArgs, each: &EngineArgs) -> Res<EngineConfig> {
    combine_engine_args(&mut args, each);
    let Some(cmd) = args.cmd else {
        bail!("Every engine needs a 'cmd' (either on -engine or via -each)")
    };
    let tc = TcLimits {
        time: args.time.map_or(0, secs_to_ms),
        increment: args.increment.map_or(0, secs_to_ms),
        fixed_time: args.fixed_time.map_or(0, secs_to_ms),
        timemargin: args.timemargin.unwrap_or(DEFAULT_TIME_MARGIN_MS),
    };
    let limits = crate::config::SearchLimits {
        tc,
        nodes: args.nodes.unwrap_or(0),
        depth: args.depth.unwrap_or(0),
    };
    if limits.is_unbounded() {
        bail!("Engine '{cmd}' has no limit; set tc, st, nodes or depth");
    }
    let name = args.name.unwrap_or_else(|| {
        PathBuf::from(&cmd)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| cmd.clone())
    });
    Ok(EngineConfig {
        name,
        cmd,
        dir: args.dir,
        args: args.args,
        options: args.options,
        limits,
        affinity: args.affinity,
    })
}

fn parse_resign(args: &mut ArgIter) -> Res<ResignAdjudication> {
    let mut resign = ResignAdjudication {
        move_count: 1,
        enabled: true,
        ..ResignAdjudication::default()
    };
    while let Some(arg) = args.peek() {
        if arg.starts_with('-') {
            break;
        }
        let arg = args.next().unwrap();
        let (key, value) = split_key_value(&arg);
        match key {
            "score" => resign.score = parse_int_from_str(require(key, value)?, "resign score")?,
            "movecount" => {
                resign.move_count = parse_int_from_str(require(key, value)?, "resign movecount")?
            }
            "twosided" => resign.twosided = parse_bool_from_str(require(key, value)?, "twosided")?,
            _ => bail!("Unknown resign setting '{key}'"),
        }
    }
    Ok(resign)
}

fn parse_draw(args: &mut ArgIter) -> Res<DrawAdjudication> {
    let mut draw = DrawAdjudication {
        move_count: 1,
        enabled: true,
        ..DrawAdjudication::default()
    };
    while let Some(arg) = args.peek() {
        if arg.starts_with('-') {
            break;
        }
        let arg = args.next().unwrap();
        let (key, value) = split_key_value(&arg);
        match key {
            "score" => draw.score = parse_int_from_str(require(key, value)?, "draw score")?,
            "movecount" => {
                draw.move_count = parse_int_from_str(require(key, value)?, "draw movecount")?
            }
            "movenumber" => {
                draw.min_moves = parse_int_from_str(require(key, value)?, "draw movenumber")?
            }
            _ => bail!("Unknown draw setting '{key}'"),
        }
    }
    Ok(draw)
}

fn parse_sprt(args: &mut ArgIter) -> Res<SprtConfig> {
    let mut sprt = SprtConfig {
        enabled: true,
        ..SprtConfig::default()
    };
    while let Some(arg) = args.peek() {
        if arg.starts_with('-') {
            break;
        }
        let arg = args.next().unwrap();
        let (key, value) = split_key_value(&arg);
        match key {
            "elo0" => sprt.elo0 = parse_fp_from_str(require(key, value)?, "elo0")?,
            "elo1" => sprt.elo1 = parse_fp_from_str(require(key, value)?, "elo1")?,
            "alpha" => sprt.alpha = parse_fp_from_str(require(key, value)?, "alpha")?,
            "beta" => sprt.beta = parse_fp_from_str(require(key, value)?, "beta")?,
            "model" => {
                sprt.model = SprtModel::from_str(require(key, value)?)
                    .map_err(|_| anyhow!("Unknown SPRT model '{}'", value.unwrap_or_default()))?
            }
            _ => bail!("Unknown sprt setting '{key}'"),
        }
    }
    Ok(sprt)
}

fn parse_openings(args: &mut ArgIter, config: &mut TournamentConfig) -> Res<()> {
    while let Some(arg) = args.peek() {
        if arg.starts_with('-') {
            break;
        }
        let arg = args.next().unwrap();
        let (key, value) = split_key_value(&arg);
        match key {
            "file" => config.book.file = Some(PathBuf::from(require(key, value)?)),
            "format" => {
                let format = require(key, value)?;
                if format != "epd" {
                    bail!("Unsupported opening book format '{format}' (only 'epd')");
                }
            }
            "order" => {
                config.book.order = BookOrder::from_str(require(key, value)?)
                    .map_err(|_| anyhow!("Unknown book order '{}'", value.unwrap_or_default()))?
            }
            _ => bail!("Unknown openings setting '{key}'"),
        }
    }
    Ok(())
}

fn parse_pgnout(args: &mut ArgIter, config: &mut TournamentConfig) -> Res<()> {
    while let Some(arg) = args.peek() {
        if arg.starts_with('-') {
            break;
        }
        let arg = args.next().unwrap();
        let (key, value) = split_key_value(&arg);
        let flag = |value: Option<&str>| -> Res<bool> {
            value.map_or(Ok(true), |v| parse_bool_from_str(v, "a pgn tracking flag"))
        };
        match key {
            "file" => config.pgn.file = Some(PathBuf::from(require(key, value)?)),
            "min" => config.pgn.min = flag(value)?,
            "nodes" => config.pgn.track_nodes = flag(value)?,
            "seldepth" => config.pgn.track_seldepth = flag(value)?,
            "nps" => config.pgn.track_nps = flag(value)?,
            "hashfull" => config.pgn.track_hashfull = flag(value)?,
            "timeleft" => config.pgn.track_timeleft = flag(value)?,
            _ => bail!("Unknown pgnout setting '{key}'"),
        }
    }
    Ok(())
}

fn parse_log(args: &mut ArgIter, config: &mut TournamentConfig) -> Res<()> {
    while let Some(arg) = args.peek() {
        if arg.starts_with('-') {
            break;
        }
        let arg = args.next().unwrap();
        let (key, value) = split_key_value(&arg);
        match key {
            "file" => config.log.file = Some(PathBuf::from(require(key, value)?)),
            "realtime" => {
                config.log.realtime = parse_bool_from_str(require(key, value)?, "realtime")?
            }
            _ => bail!("Unknown log setting '{key}'"),
        }
    }
    Ok(())
}

/// Duplicate display names get a numeric suffix, so results stay separable.
fn make_names_unique(engines: &mut [EngineConfig]) {
    let mut seen: HashSet<String> = HashSet::new();
    for engine in engines.iter_mut() {
        if seen.contains(&engine.name.to_lowercase()) {
            let mut counter = 2;
            while seen.contains(&format!("{}_{counter}", engine.name).to_lowercase()) {
                counter += 1;
            }
            engine.name = format!("{}_{counter}", engine.name);
        }
        _ = seen.insert(engine.name.to_lowercase());
    }
}

fn validate(config: &TournamentConfig, engines: &[EngineConfig]) -> Res<()> {
    if engines.len() < 2 {
        bail!("At least two engines are required");
    }
    if config.concurrency == 0 {
        bail!("concurrency must be at least 1");
    }
    if !(1..=2).contains(&config.games) {
        bail!("games must be 1 or 2 (2 plays colour-swapped pairs)");
    }
    if config.rounds == 0 {
        bail!("rounds must be at least 1");
    }
    if config.sprt.enabled {
        if engines.len() != 2 {
            bail!("SPRT needs exactly two engines");
        }
        let sprt = &config.sprt;
        if !(0.0..0.5).contains(&sprt.alpha)
            || !(0.0..0.5).contains(&sprt.beta)
            || sprt.alpha <= 0.0
            || sprt.beta <= 0.0
        {
            bail!("SPRT alpha and beta must lie in (0, 0.5)");
        }
        if sprt.elo1 <= sprt.elo0 {
            bail!("SPRT needs elo1 > elo0");
        }
        if sprt.model == SprtModel::Pentanomial && config.games != 2 {
            bail!("The pentanomial SPRT model needs games=2; use model=trinomial");
        }
    }
    Ok(())
}

/// Parses the command line (without the program name). Cutechess and
/// fastchess use single-dash long options, which rules out derive-style
/// parsers, so this is written by hand.
pub fn parse_cli<I: Iterator<Item = String>>(raw: I) -> Res<Invocation> {
    let raw: Vec<String> = raw.collect();
    if raw.first().map(String::as_str) == Some("compliance") {
        let mut rest = raw.into_iter().skip(1);
        let Some(cmd) = rest.next() else {
            bail!("Usage: arbiters compliance <engine> [args…]")
        };
        return Ok(Invocation::Compliance {
            cmd,
            args: rest.collect(),
        });
    }

    let mut args: ArgIter = raw.into_iter().peekable();
    let mut config = TournamentConfig::default();
    let mut engines: Vec<EngineArgs> = vec![];
    let mut each = EngineArgs::default();

    while let Some(mut arg) = args.next() {
        // cutechess expects single-dash long options, but accept '--long' too
        if arg.starts_with("--") {
            _ = arg.remove(0);
        }
        match arg.as_str() {
            "-h" | "-help" => return Ok(Invocation::Help),
            "-v" | "-version" => return Ok(Invocation::Version),
            "-engine" => engines.push(parse_engine(&mut args)?),
            "-each" => each = parse_engine(&mut args)?,
            "-type" | "-tournament" => {
                let value = next_arg(&mut args, &arg)?;
                config.kind = TournamentKind::from_str(&value)
                    .map_err(|_| anyhow!("Unknown tournament type '{value}'"))?;
            }
            "-concurrency" => {
                config.concurrency = parse_int_from_str(&next_arg(&mut args, &arg)?, "concurrency")?
            }
            "-games" => config.games = parse_int_from_str(&next_arg(&mut args, &arg)?, "games")?,
            "-rounds" => config.rounds = parse_int_from_str(&next_arg(&mut args, &arg)?, "rounds")?,
            "-ratinginterval" => {
                config.rating_interval =
                    parse_int_from_str(&next_arg(&mut args, &arg)?, "ratinginterval")?
            }
            "-scoreinterval" => {
                config.score_interval =
                    parse_int_from_str(&next_arg(&mut args, &arg)?, "scoreinterval")?
            }
            "-seed" | "-srand" => {
                config.seed = parse_int_from_str(&next_arg(&mut args, &arg)?, "seed")?
            }
            "-openings" => parse_openings(&mut args, &mut config)?,
            "-resign" => config.resign = parse_resign(&mut args)?,
            "-draw" => config.draw = parse_draw(&mut args)?,
            "-maxmoves" => {
                config.max_moves = MaxMovesAdjudication {
                    move_count: parse_int_from_str(&next_arg(&mut args, &arg)?, "maxmoves")?,
                    enabled: true,
                }
            }
            "-sprt" => config.sprt = parse_sprt(&mut args)?,
            "-tb" => config.tb.path = Some(PathBuf::from(next_arg(&mut args, &arg)?)),
            "-tbpieces" => {
                config.tb.pieces = Some(parse_int_from_str(&next_arg(&mut args, &arg)?, "tbpieces")?)
            }
            "-tbignore50" => config.tb.ignore_50 = true,
            "-output" | "-resultformat" => {
                config.output = OutputKind::from_name(&next_arg(&mut args, &arg)?)
            }
            "-pgnout" => parse_pgnout(&mut args, &mut config)?,
            "-epdout" | "-fenout" => {
                config.epd_file = Some(PathBuf::from(next_arg(&mut args, &arg)?))
            }
            "-log" => parse_log(&mut args, &mut config)?,
            "-startuptimeout" => {
                config.startup_timeout_ms =
                    parse_int_from_str(&next_arg(&mut args, &arg)?, "startuptimeout")?
            }
            "-newgametimeout" => {
                config.new_game_timeout_ms =
                    parse_int_from_str(&next_arg(&mut args, &arg)?, "newgametimeout")?
            }
            "-event" => config.pgn.event = next_arg(&mut args, &arg)?,
            "-site" => config.pgn.site = next_arg(&mut args, &arg)?,
            unknown => bail!("Unrecognized option '{unknown}'. Use -help for the option list"),
        }
    }

    config.report_penta = config.games == 2;

    let mut engines: Vec<EngineConfig> = engines
        .into_iter()
        .map(|engine| resolve_engine(engine, &each))
        .collect::<Res<_>>()?;
    make_names_unique(&mut engines);
    validate(&config, &engines)?;

    Ok(Invocation::Tournament {
        config: Box::new(config),
        engines,
    })
}

pub fn print_help() {
    println!(
        "\
Usage: arbiters [options]
       arbiters compliance <engine> [args…]

Options:
  -engine cmd=C [name=N] [dir=D] [arg=A]* [tc=T[+I]] [st=SECS] [nodes=N]
          [depth=D] [timemargin=MS] [affinity=0,1,..] [option.Name=Value]*
  -each …                       defaults applied to every engine
  -type roundrobin|gauntlet     pairing scheme (default roundrobin)
  -concurrency N                parallel games (default 1)
  -games 1|2                    games per pairing; 2 swaps colours (default 2)
  -rounds N                     repetitions of the full pairing set
  -ratinginterval N             games between rating reports (default 10)
  -scoreinterval N              games between score lines (default 1)
  -seed N                       opening book shuffle seed
  -openings file=F [format=epd] [order=random|sequential]
  -resign movecount=N score=S [twosided=true]
  -draw movenumber=N movecount=N score=S
  -maxmoves N                   adjudicate a draw after N plies
  -sprt elo0=X elo1=Y alpha=A beta=B [model=trinomial|pentanomial]
  -tb PATH [-tbpieces N] [-tbignore50]
  -output fastshogi|cutechess   report format (default fastshogi)
  -pgnout file=F [min] [nodes] [seldepth] [nps] [hashfull] [timeleft]
  -epdout F                     final positions, one EPD per game
  -log file=F [realtime=true]   engine communication log
  -startuptimeout MS            usiok deadline (default 60000)
  -newgametimeout MS            usinewgame readyok deadline (default 60000)
  -event E  -site S             PGN tags
  -version  -help"
    );
}
