//! Utility functions: tracing, duration strings, address extraction.

use chrono::Duration;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize pretty CLI logging.
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  fmt()
    .with_env_filter(filter)
    .with_target(false)
    .pretty()
    .init();
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration {0:?}")]
pub struct DurationParseError(pub String);

/// Parse a duration string such as `300ms`, `1.5h`, `1h30m` or `-5m`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
  let err = || DurationParseError(input.to_string());
  let s = input.trim();
  let (negative, mut rest) = match s.as_bytes().first() {
    Some(b'-') => (true, &s[1..]),
    Some(b'+') => (false, &s[1..]),
    _ => (false, s),
  };
  if rest == "0" {
    return Ok(Duration::zero());
  }
  if rest.is_empty() {
    return Err(err());
  }

  let mut total_nanos: f64 = 0.0;
  while !rest.is_empty() {
    let num_len = rest
      .find(|c: char| !(c.is_ascii_digit() || c == '.'))
      .ok_or_else(err)?;
    if num_len == 0 {
      return Err(err());
    }
    let value: f64 = rest[..num_len].parse().map_err(|_| err())?;
    rest = &rest[num_len..];

    let unit_len = rest
      .find(|c: char| c.is_ascii_digit() || c == '.')
      .unwrap_or(rest.len());
    let scale = match &rest[..unit_len] {
      "ns" => 1.0,
      "us" | "µs" => 1e3,
      "ms" => 1e6,
      "s" => 1e9,
      "m" => 60.0 * 1e9,
      "h" => 3600.0 * 1e9,
      _ => return Err(err()),
    };
    rest = &rest[unit_len..];
    total_nanos += value * scale;
  }

  if total_nanos > i64::MAX as f64 {
    return Err(err());
  }
  let nanos = total_nanos.round() as i64;
  Ok(Duration::nanoseconds(if negative { -nanos } else { nanos }))
}

/// Extract the bare address from `Name <addr>` or return the trimmed input.
pub fn extract_address(s: &str) -> String {
  if let Some(start) = s.find('<') {
    if let Some(end) = s[start + 1..].find('>') {
      return s[start + 1..start + 1 + end].trim().to_string();
    }
  }
  s.trim().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_simple_units() {
    assert_eq!(parse_duration("1h").unwrap(), Duration::hours(1));
    assert_eq!(parse_duration("30m").unwrap(), Duration::minutes(30));
    assert_eq!(parse_duration("45s").unwrap(), Duration::seconds(45));
    assert_eq!(parse_duration("250ms").unwrap(), Duration::milliseconds(250));
    assert_eq!(parse_duration("0").unwrap(), Duration::zero());
  }

  #[test]
  fn parses_compound_and_fractional() {
    assert_eq!(
      parse_duration("1h30m").unwrap(),
      Duration::minutes(90)
    );
    assert_eq!(parse_duration("1.5h").unwrap(), Duration::minutes(90));
    assert_eq!(parse_duration("-5m").unwrap(), Duration::minutes(-5));
  }

  #[test]
  fn rejects_garbage() {
    for bad in ["", "h", "10", "1x", "1h-", "--1h", "abc"] {
      assert!(parse_duration(bad).is_err(), "{bad:?} should not parse");
    }
  }

  #[test]
  fn extracts_bracketed_address() {
    assert_eq!(extract_address("Alice <alice@tempmail.dev>"), "alice@tempmail.dev");
    assert_eq!(extract_address("<bob@tempmail.dev>"), "bob@tempmail.dev");
    assert_eq!(extract_address("  carol@tempmail.dev "), "carol@tempmail.dev");
  }
}
