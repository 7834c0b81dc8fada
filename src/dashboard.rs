use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::household::get_household;
use crate::household_active::HouseholdContext;
use crate::model::HouseholdId;
use crate::stats::{
    current_week_stats, historical_stats, HistoricalWeek, WeekStats, DEFAULT_WEEKS_BACK,
};
use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeStats {
    pub current_week: WeekStats,
    pub history: Vec<HistoricalWeek>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub has_active_household: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_household_id: Option<HouseholdId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_household_name: Option<String>,
    pub personal: ScopeStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub household: Option<ScopeStats>,
}

async fn scope_stats(
    pool: &SqlitePool,
    user_id: &str,
    household_id: Option<HouseholdId>,
    now: DateTime<Utc>,
) -> AppResult<ScopeStats> {
    Ok(ScopeStats {
        current_week: current_week_stats(pool, user_id, household_id, now).await?,
        history: historical_stats(pool, user_id, household_id, DEFAULT_WEEKS_BACK, now).await?,
    })
}

pub async fn build(
    pool: &SqlitePool,
    ctx: &HouseholdContext,
    user_id: &str,
    now: DateTime<Utc>,
) -> AppResult<Dashboard> {
    let personal = scope_stats(pool, user_id, None, now).await?;

    let Some(active) = ctx.resolve_active(pool, user_id).await? else {
        return Ok(Dashboard {
            has_active_household: false,
            active_household_id: None,
            active_household_name: None,
            personal,
            household: None,
        });
    };

    let household = get_household(pool, active).await?;
    Ok(Dashboard {
        has_active_household: true,
        active_household_id: Some(active),
        active_household_name: Some(household.name),
        personal,
        household: Some(scope_stats(pool, user_id, Some(active), now).await?),
    })
}
