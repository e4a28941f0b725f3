//! Parsing for the duration-string convention used throughout configuration
//! (spec §6): a decimal quantity followed by one of `ms|s|m|min|sec`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

#[derive(Debug, thiserror::Error)]
#[error("invalid duration string {0:?}: expected a number followed by ms|s|m|min|sec")]
pub struct ParseDurationError(String);

/// Parses strings like `"500ms"`, `"30s"`, `"5m"`, `"5min"`, `"90sec"`.
pub fn parse(input: &str) -> Result<Duration, ParseDurationError> {
    let input = input.trim();
    let split_at = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| ParseDurationError(input.to_string()))?;
    let (num, unit) = input.split_at(split_at);
    let value: f64 = num
        .parse()
        .map_err(|_| ParseDurationError(input.to_string()))?;

    let millis = match unit {
        "ms" => value,
        "s" | "sec" => value * 1_000.0,
        "m" | "min" => value * 60_000.0,
        _ => return Err(ParseDurationError(input.to_string())),
    };

    Ok(Duration::from_secs_f64(millis / 1_000.0))
}

pub fn format(d: Duration) -> String {
    format!("{}ms", d.as_millis())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}

pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(*d))
}

pub mod option {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }

    pub fn serialize<S>(d: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match d {
            Some(d) => serializer.serialize_some(&format(*d)),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_documented_suffixes() {
        assert_eq!(parse("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse("5min").unwrap(), Duration::from_secs(300));
        assert_eq!(parse("90sec").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert!(parse("5fortnights").is_err());
    }
}
