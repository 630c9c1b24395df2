use nom::IResult;
use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char, digit1, multispace0, one_of};
use nom::combinator::{all_consuming, map, opt};
use nom::multi::separated_list0;
use nom::sequence::{delimited, pair, separated_pair, terminated};

use crate::error::{ControlError, Result};

/// Splits `"write_buffer_size=64M; max_write_buffer_number = 4"` into name/value pairs.
///
/// Values run up to the next `;` and are trimmed. A trailing `;` is allowed.
pub fn parse_options_str(input: &str) -> Result<Vec<(String, String)>> {
    let pairs = terminated(separated_list0(char(';'), option_pair), opt(char(';')));
    let (_, pairs) = all_consuming(delimited(multispace0, pairs, multispace0))(input)
        .map_err(|err| ControlError::invalid_option("<options string>", err.to_string()))?;
    Ok(pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect())
}

fn option_pair(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        delimited(multispace0, option_name, multispace0),
        char('='),
        option_value,
    )(input)
}

fn option_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn option_value(input: &str) -> IResult<&str, &str> {
    map(take_while(|c: char| c != ';'), str::trim)(input)
}

fn size_literal(input: &str) -> IResult<&str, (&str, Option<char>)> {
    pair(digit1, opt(one_of("kKmMgGtT")))(input)
}

/// Byte counts with an optional binary unit suffix: `4096`, `64k`, `64M`, `1G`, `2T`.
pub(crate) fn parse_size(name: &str, value: &str) -> Result<u64> {
    let invalid = |reason: String| ControlError::invalid_option(name, reason);
    let (_, (digits, unit)) = all_consuming(size_literal)(value)
        .map_err(|_| invalid(format!("`{value}` is not a size")))?;
    let number: u64 = digits
        .parse()
        .map_err(|_| invalid(format!("`{value}` is out of range")))?;
    let shift = match unit.map(|c| c.to_ascii_lowercase()) {
        None => 0,
        Some('k') => 10,
        Some('m') => 20,
        Some('g') => 30,
        Some(_) => 40,
    };
    number
        .checked_mul(1 << shift)
        .ok_or_else(|| invalid(format!("`{value}` is out of range")))
}

pub(crate) fn parse_u32(name: &str, value: &str) -> Result<u32> {
    let size = parse_size(name, value)?;
    u32::try_from(size)
        .map_err(|_| ControlError::invalid_option(name, format!("`{value}` is out of range")))
}

pub(crate) fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ControlError::invalid_option(
            name,
            format!("`{value}` is not a boolean"),
        )),
    }
}

/// Colon separated list, `1:2:10`. An empty value is an empty list.
pub(crate) fn parse_u32_list(name: &str, value: &str) -> Result<Vec<u32>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(':')
        .map(|item| parse_u32(name, item.trim()))
        .collect()
}
