//! Parsing of legacy duration strings such as `5m`, `1h30m` or `now-10s`.
//!
//! The grammar is an optional sign followed by one or more `<decimal><unit>` groups with
//! units `ns`, `us` (`µs`, `μs`), `ms`, `s`, `m` and `h`. A bare `0` is accepted.

use thiserror::Error;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("invalid duration \"{0}\"")]
    Invalid(String),
    #[error("missing unit in duration \"{0}\"")]
    MissingUnit(String),
    #[error("unknown unit \"{unit}\" in duration \"{input}\"")]
    UnknownUnit { unit: String, input: String },
    #[error("duration \"{0}\" overflows")]
    Overflow(String),
}

/// Parses a duration into nanoseconds.
pub fn parse_duration(input: &str) -> Result<i64, DurationParseError> {
    let mut s = input;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(0);
    }
    if s.is_empty() {
        return Err(DurationParseError::Invalid(input.to_string()));
    }

    let mut total: u128 = 0;
    while !s.is_empty() {
        let int_len = s.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, mut rest) = s.split_at(int_len);

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationParseError::Invalid(input.to_string()));
        }

        let unit_len = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        if unit_len == 0 {
            return Err(DurationParseError::MissingUnit(input.to_string()));
        }
        let unit = &rest[..unit_len];
        s = &rest[unit_len..];

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => {
                return Err(DurationParseError::UnknownUnit {
                    unit: unit.to_string(),
                    input: input.to_string(),
                });
            }
        };

        let overflow = || DurationParseError::Overflow(input.to_string());
        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut value = whole.checked_mul(scale).ok_or_else(overflow)?;

        // Digits past nanosecond precision cannot contribute.
        let frac_digits = &frac_part[..frac_part.len().min(18)];
        if !frac_digits.is_empty() {
            let numerator: u128 = frac_digits.parse().map_err(|_| overflow())?;
            let denominator = 10u128.pow(frac_digits.len() as u32);
            value = value
                .checked_add(numerator * scale / denominator)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(value).ok_or_else(overflow)?;
        if total > i64::MAX as u128 + u128::from(negative) {
            return Err(overflow());
        }
    }

    if negative {
        Ok((total as i128).wrapping_neg() as i64)
    } else {
        Ok(total as i64)
    }
}

/// Offset in nanoseconds for the start of a legacy query range (`5m`, `now-5m`).
pub fn parse_from(from: &str) -> Result<i64, DurationParseError> {
    let raw = from.replacen("now-", "", 1);
    Ok(parse_duration(&format!("-{raw}"))?.saturating_neg())
}

/// Offset in nanoseconds for the end of a legacy query range (`now`, `now-1m`, `1m`).
pub fn parse_to(to: &str) -> Result<i64, DurationParseError> {
    if to == "now" {
        return Ok(0);
    }
    if let Some(raw) = to.strip_prefix("now-") {
        return Ok(parse_duration(&format!("-{raw}"))?.saturating_neg());
    }
    Ok(parse_duration(to)?.saturating_neg())
}

pub fn nanos_to_seconds(nanos: i64) -> i64 {
    nanos / NANOS_PER_SECOND
}
