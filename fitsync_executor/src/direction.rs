//! Enabled-direction parsing (spec §6): a closed set of `source->dest`
//! pairs configured by the driver, each processed independently and in
//! order.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Direction {
    pub source: String,
    pub destination: String,
}

impl Direction {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.destination)
    }
}

#[derive(Debug, Error)]
pub enum DirectionParseError {
    #[error("direction \"{0}\" is not of the form source->destination")]
    Malformed(String),
}

impl FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (src, dst) = s
            .split_once("->")
            .ok_or_else(|| DirectionParseError::Malformed(s.to_string()))?;
        if src.trim().is_empty() || dst.trim().is_empty() {
            return Err(DirectionParseError::Malformed(s.to_string()));
        }
        Ok(Direction::new(src.trim(), dst.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_direction() {
        let direction: Direction = "strava->garmin".parse().unwrap();
        assert_eq!(direction, Direction::new("strava", "garmin"));
    }

    #[test]
    fn rejects_missing_arrow() {
        assert!("strava garmin".parse::<Direction>().is_err());
    }
}
