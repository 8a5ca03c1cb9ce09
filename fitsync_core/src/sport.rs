//! Canonical sport-type vocabulary and per-platform normalization (spec §4.3).
//!
//! The synonym table is data (`assets/sport_types.toml`), loaded once into
//! [`SPORT_TYPE_MAP`], so new platform vocabulary is a TOML edit rather than
//! a code change.

use std::{collections::HashMap, fmt};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

const SPORT_TYPES_TOML: &str = include_str!("../assets/sport_types.toml");

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SportType {
    Ride,
    Run,
    Swim,
    Walk,
    Hike,
    VirtualRide,
    Other,
}

impl fmt::Display for SportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SportType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ride => "ride",
            Self::Run => "run",
            Self::Swim => "swim",
            Self::Walk => "walk",
            Self::Hike => "hike",
            Self::VirtualRide => "virtual_ride",
            Self::Other => "other",
        }
    }

    fn from_canonical_key(key: &str) -> Option<Self> {
        match key {
            "ride" => Some(Self::Ride),
            "run" => Some(Self::Run),
            "swim" => Some(Self::Swim),
            "walk" => Some(Self::Walk),
            "hike" => Some(Self::Hike),
            "virtual_ride" => Some(Self::VirtualRide),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SynonymGroup {
    synonyms: Vec<String>,
}

type SynonymTable = HashMap<String, SynonymGroup>;

lazy_static! {
    static ref SPORT_TYPE_MAP: HashMap<String, SportType> = init_sport_type_map();
}

fn init_sport_type_map() -> HashMap<String, SportType> {
    let table: SynonymTable =
        toml::from_str(SPORT_TYPES_TOML).expect("bundled sport_types.toml must parse");
    let mut map = HashMap::new();
    for (canonical_key, group) in table {
        let Some(canonical) = SportType::from_canonical_key(&canonical_key) else {
            continue;
        };
        for synonym in group.synonyms {
            map.insert(synonym.to_lowercase(), canonical);
        }
    }
    map
}

/// Normalize a platform-reported sport-type string to the canonical
/// closed vocabulary. Unknown inputs map to [`SportType::Other`], never
/// an error — spec §4.3.
pub fn normalize(platform_sport: &str) -> SportType {
    SPORT_TYPE_MAP
        .get(platform_sport.to_lowercase().as_str())
        .copied()
        .unwrap_or(SportType::Other)
}

/// Two platform-local sport strings are equivalent under normalization.
pub fn equivalent(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_synonyms_normalize() {
        assert_eq!(normalize("Running"), SportType::Run);
        assert_eq!(normalize("gravel_ride"), SportType::Ride);
        assert_eq!(normalize("zwift"), SportType::VirtualRide);
        assert_eq!(normalize("trail_run"), SportType::Run);
    }

    #[test]
    fn unknown_sport_maps_to_other() {
        assert_eq!(normalize("underwater_basket_weaving"), SportType::Other);
    }

    #[test]
    fn equivalence_is_synonym_aware() {
        assert!(equivalent("Ride", "gravel_ride"));
        assert!(!equivalent("Ride", "Run"));
    }

    #[test]
    fn virtual_ride_is_distinct_from_ride() {
        assert_ne!(normalize("zwift"), normalize("road"));
    }
}
