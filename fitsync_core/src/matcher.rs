//! Weighted fuzzy equivalence between two activity records (spec §4.2).
//!
//! Distinct from [`crate::fingerprint`]: the matcher answers "could these
//! be the same activity?" at query time, used to resolve mappings when
//! fingerprints disagree. It never touches the catalog — the executor
//! decides what to do with its verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::ActivityRecord;

const START_TIME_WEIGHT: f64 = 0.40;
const SPORT_TYPE_WEIGHT: f64 = 0.20;
const DISTANCE_WEIGHT: f64 = 0.20;
const DURATION_WEIGHT: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Scores strictly above this are a match.
    pub match_threshold: f64,
    /// Scores strictly above this (and at or below `match_threshold`) are ambiguous.
    pub ambiguous_threshold: f64,
    pub start_time_tolerance_s: i64,
    pub distance_relative_tolerance: f64,
    pub distance_absolute_tolerance_m: f64,
    pub duration_relative_tolerance: f64,
    pub duration_absolute_tolerance_s: i64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.80,
            ambiguous_threshold: 0.60,
            start_time_tolerance_s: 5 * 60,
            distance_relative_tolerance: 0.05,
            distance_absolute_tolerance_m: 100.0,
            duration_relative_tolerance: 0.10,
            duration_absolute_tolerance_s: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Match,
    Ambiguous,
    NoMatch,
}

/// Weighted-sum score in `[0.0, 1.0]` between two activity records.
pub fn score(a: &ActivityRecord, b: &ActivityRecord, config: &MatcherConfig) -> f64 {
    let mut total = 0.0;

    if within_start_time(a.start_time, b.start_time, config.start_time_tolerance_s) {
        total += START_TIME_WEIGHT;
    }
    if a.sport_type == b.sport_type {
        total += SPORT_TYPE_WEIGHT;
    }
    if within_distance(a.distance_m, b.distance_m, config) {
        total += DISTANCE_WEIGHT;
    }
    if within_duration(a.duration_s, b.duration_s, config) {
        total += DURATION_WEIGHT;
    }

    total
}

/// Classify a raw score per the spec's thresholds.
pub fn classify(score: f64, config: &MatcherConfig) -> Verdict {
    if score > config.match_threshold {
        Verdict::Match
    } else if score > config.ambiguous_threshold {
        Verdict::Ambiguous
    } else {
        Verdict::NoMatch
    }
}

/// Score and classify in one call — the normal entry point for callers
/// that don't need the raw score.
pub fn evaluate(a: &ActivityRecord, b: &ActivityRecord, config: &MatcherConfig) -> Verdict {
    classify(score(a, b, config), config)
}

fn within_start_time(a: DateTime<Utc>, b: DateTime<Utc>, tolerance_s: i64) -> bool {
    // Strict half-open: a delta of exactly `tolerance_s` does not count
    // (spec §8 boundary: "exactly 5 minutes -> time term counts at zero").
    (a - b).num_seconds().abs() < tolerance_s
}

fn within_distance(a: f64, b: f64, config: &MatcherConfig) -> bool {
    let delta = (a - b).abs();
    let relative_allowance = a.max(b) * config.distance_relative_tolerance;
    delta <= relative_allowance.max(config.distance_absolute_tolerance_m)
}

fn within_duration(a: i64, b: i64, config: &MatcherConfig) -> bool {
    let delta = (a - b).abs();
    let relative_allowance = (a.max(b) as f64 * config.duration_relative_tolerance) as i64;
    delta <= relative_allowance.max(config.duration_absolute_tolerance_s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sport::SportType;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn activity(start: DateTime<Utc>, sport: SportType, distance_m: f64, duration_s: i64) -> ActivityRecord {
        ActivityRecord::new("t", sport, start, distance_m, duration_s, None)
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn identical_activities_score_one() {
        let t = base_time();
        let a = activity(t, SportType::Ride, 20000.0, 3600);
        let b = activity(t, SportType::Ride, 20000.0, 3600);
        assert_relative_eq!(score(&a, &b, &MatcherConfig::default()), 1.0);
    }

    #[test]
    fn start_time_delta_of_exactly_five_minutes_counts_as_zero() {
        let config = MatcherConfig::default();
        let a = activity(base_time(), SportType::Ride, 20000.0, 3600);
        let b = activity(
            base_time() + Duration::seconds(config.start_time_tolerance_s),
            SportType::Ride,
            20000.0,
            3600,
        );
        // start-time term drops out (0.40), the rest still matches.
        assert_relative_eq!(score(&a, &b, &config), 1.0 - START_TIME_WEIGHT);
    }

    #[test]
    fn start_time_delta_one_second_under_threshold_counts() {
        let config = MatcherConfig::default();
        let a = activity(base_time(), SportType::Ride, 20000.0, 3600);
        let b = activity(
            base_time() + Duration::seconds(config.start_time_tolerance_s - 1),
            SportType::Ride,
            20000.0,
            3600,
        );
        assert_relative_eq!(score(&a, &b, &config), 1.0);
    }

    #[test]
    fn distance_five_percent_higher_still_matches() {
        let t = base_time();
        let a = activity(t, SportType::Ride, 20000.0, 3600);
        let b = activity(t, SportType::Ride, 21000.0, 3600);
        assert_eq!(evaluate(&a, &b, &MatcherConfig::default()), Verdict::Match);
    }

    #[test]
    fn classification_thresholds() {
        let config = MatcherConfig::default();
        assert_eq!(classify(0.81, &config), Verdict::Match);
        assert_eq!(classify(0.80, &config), Verdict::Ambiguous);
        assert_eq!(classify(0.70, &config), Verdict::Ambiguous);
        assert_eq!(classify(0.60, &config), Verdict::NoMatch);
        assert_eq!(classify(0.0, &config), Verdict::NoMatch);
    }

    #[test]
    fn wildly_different_activities_score_low() {
        let a = activity(base_time(), SportType::Ride, 20000.0, 3600);
        let b = activity(
            base_time() + Duration::hours(5),
            SportType::Swim,
            500.0,
            1200,
        );
        assert_eq!(
            evaluate(&a, &b, &MatcherConfig::default()),
            Verdict::NoMatch
        );
    }
}
