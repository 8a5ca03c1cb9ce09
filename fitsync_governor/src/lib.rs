//! The Rate-Limit Governor (spec §4.5): a token-bucket-style admission
//! controller over the catalog's `api_limits` counters. Decay is lazy —
//! [`CatalogStore::bump_api`] expires stale windows on every call, so no
//! background timer is required.

use std::time::Duration as StdDuration;

use chrono::Utc;
use fitsync_catalog::{CatalogError, CatalogStore};
use serde::{Deserialize, Serialize};

/// Configured caps and safety margins for one platform. Strava's example
/// in spec §4.5: daily cap 200 configured down to 180, quarter-hour cap
/// 100 configured down to 90.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlatformBudget {
    pub daily_cap: i64,
    pub daily_margin: i64,
    pub quarter_hour_cap: i64,
    pub quarter_hour_margin: i64,
}

impl PlatformBudget {
    pub fn effective_daily_cap(&self) -> i64 {
        self.daily_cap - self.daily_margin
    }

    pub fn effective_quarter_hour_cap(&self) -> i64 {
        self.quarter_hour_cap - self.quarter_hour_margin
    }

    /// Strava's caps from spec §4.5, margined to 180/200 and 90/100.
    pub fn strava_default() -> Self {
        Self {
            daily_cap: 200,
            daily_margin: 20,
            quarter_hour_cap: 100,
            quarter_hour_margin: 10,
        }
    }

    /// A generous default for platforms spec.md doesn't enumerate caps for.
    pub fn generous_default() -> Self {
        Self {
            daily_cap: 10_000,
            daily_margin: 0,
            quarter_hour_cap: 1_000,
            quarter_hour_margin: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted,
    Denied { retry_after: StdDuration },
}

pub struct Governor<'a> {
    catalog: &'a CatalogStore,
}

impl<'a> Governor<'a> {
    pub fn new(catalog: &'a CatalogStore) -> Self {
        Self { catalog }
    }

    /// Ensure `platform` has a row in `api_limits`, seeding it with
    /// `budget`'s raw caps (the margin is applied at reservation time,
    /// not baked into the stored cap, so margin tuning doesn't require a
    /// schema migration).
    pub async fn ensure_initialized(
        &self,
        platform: &str,
        budget: &PlatformBudget,
    ) -> Result<(), CatalogError> {
        if self.catalog.get_api(platform).await?.is_none() {
            self.catalog
                .init_api_limits(platform, budget.daily_cap, budget.quarter_hour_cap)
                .await?;
        }
        Ok(())
    }

    /// Before every outbound API call, the executor calls `reserve`.
    /// Neither window full (below cap minus margin) -> increments and
    /// grants. Either window full -> denies with the remaining time on
    /// the window that is full (spec §4.5).
    pub async fn reserve(
        &self,
        platform: &str,
        budget: &PlatformBudget,
        cost: i64,
    ) -> Result<Reservation, CatalogError> {
        self.ensure_initialized(platform, budget).await?;
        let counters = self
            .catalog
            .get_api(platform)
            .await?
            .expect("just ensured initialized");

        let now = Utc::now();
        let quarter_hour_calls = if now >= counters.window_reset_at {
            0
        } else {
            counters.quarter_hour_calls
        };
        let daily_calls = if now >= counters.day_reset_at {
            0
        } else {
            counters.daily_calls
        };

        if daily_calls + cost > budget.effective_daily_cap() {
            let retry_after = (counters.day_reset_at - now).to_std().unwrap_or_default();
            return Ok(Reservation::Denied { retry_after });
        }
        if quarter_hour_calls + cost > budget.effective_quarter_hour_cap() {
            let retry_after = (counters.window_reset_at - now).to_std().unwrap_or_default();
            return Ok(Reservation::Denied { retry_after });
        }

        self.catalog.bump_api(platform, cost).await?;
        Ok(Reservation::Granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_budget() -> PlatformBudget {
        PlatformBudget {
            daily_cap: 200,
            daily_margin: 20,
            quarter_hour_cap: 2,
            quarter_hour_margin: 0,
        }
    }

    #[tokio::test]
    async fn grants_up_to_the_margined_cap_then_denies() {
        let catalog = CatalogStore::open_in_memory().await.unwrap();
        let governor = Governor::new(&catalog);
        let budget = tight_budget();

        assert_eq!(
            governor.reserve("strava", &budget, 1).await.unwrap(),
            Reservation::Granted
        );
        assert_eq!(
            governor.reserve("strava", &budget, 1).await.unwrap(),
            Reservation::Granted
        );
        match governor.reserve("strava", &budget, 1).await.unwrap() {
            Reservation::Denied { retry_after } => assert!(retry_after.as_secs() > 0),
            Reservation::Granted => panic!("third reservation should have been denied"),
        }
    }

    #[tokio::test]
    async fn daily_margin_is_respected_for_strava_defaults() {
        let budget = PlatformBudget::strava_default();
        assert_eq!(budget.effective_daily_cap(), 180);
        assert_eq!(budget.effective_quarter_hour_cap(), 90);
    }
}
