use std::str::{FromStr, SplitWhitespace};

use num::{Float, PrimInt};

pub type Res<T> = anyhow::Result<T>;

pub type Tokens<'a> = SplitWhitespace<'a>;

pub fn tokens(input: &str) -> Tokens {
    input.split_whitespace()
}

pub fn parse_int_from_str<T: PrimInt + FromStr>(as_str: &str, name: &str) -> Res<T> {
    // parse::<T>() returns an unbounded error type on failure,
    // so the message is written by hand
    as_str
        .parse::<T>()
        .map_err(|_err| anyhow::anyhow!("Couldn't parse {name} ('{as_str}')"))
}

pub fn parse_fp_from_str<T: Float + FromStr>(as_str: &str, name: &str) -> Res<T> {
    as_str
        .parse::<T>()
        .map_err(|_err| anyhow::anyhow!("Couldn't parse {name} ('{as_str}')"))
}

pub fn parse_bool_from_str(input: &str, name: &str) -> Res<bool> {
    if input.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if input.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(anyhow::anyhow!(
            "Invalid value for {name}: '{input}' (expected 'true' or 'false')"
        ))
    }
}

/// Formats a millisecond count the way PGN move comments expect, i.e. seconds
/// with millisecond precision.
pub fn format_millis(millis: i64) -> String {
    format!("{:.3}s", millis as f64 / 1000.0)
}
