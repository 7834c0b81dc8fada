use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::model::{HouseholdId, ItemDetail};
use crate::query::{ItemFilter, ItemOrder, ItemQuery, Scope};
use crate::time::{end_of_week, start_of_week, week_label};
use crate::error::VALIDATION_FAILED;
use crate::{AppError, AppResult};

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const DEFAULT_WEEKS_BACK: u32 = 4;
/// Ten years of weeks.
pub const MAX_WEEKS_BACK: u32 = 520;

pub const PALETTE: [&str; 10] = [
    "#FF6384", "#36A2EB", "#FFCE56", "#4BC0C0", "#9966FF", "#FF9F40", "#C9CBCF", "#7BC043",
    "#F37736", "#8E6C8A",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub name: String,
    pub count: i64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekStats {
    pub total_items: i64,
    pub urgent_items: i64,
    pub total_estimated_cost: Decimal,
    pub items_by_category: Vec<CategoryStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalWeek {
    pub label: String,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub stats: WeekStats,
}

/// Aggregates items in the order given. Category groups are ranked by count;
/// equal counts keep the order in which each group first appeared.
pub fn summarize(items: &[ItemDetail]) -> WeekStats {
    let mut groups: Vec<(String, i64)> = Vec::new();
    let mut total_estimated_cost = Decimal::ZERO;
    let mut urgent_items = 0;

    for detail in items {
        if detail.item.is_urgent {
            urgent_items += 1;
        }
        total_estimated_cost += detail.item.estimated_price.unwrap_or(Decimal::ZERO);

        let name = detail.category_name.as_deref().unwrap_or(UNCATEGORIZED);
        match groups.iter_mut().find(|(group, _)| group == name) {
            Some((_, count)) => *count += 1,
            None => groups.push((name.to_string(), 1)),
        }
    }

    groups.sort_by(|a, b| b.1.cmp(&a.1));
    let items_by_category = groups
        .into_iter()
        .enumerate()
        .map(|(index, (name, count))| CategoryStats {
            name,
            count,
            color: PALETTE[index % PALETTE.len()].to_string(),
        })
        .collect();

    WeekStats {
        total_items: items.len() as i64,
        urgent_items,
        total_estimated_cost,
        items_by_category,
    }
}

fn scoped_query(user_id: &str, household_id: Option<HouseholdId>) -> ItemQuery<'_> {
    let scope = if household_id.is_some() {
        Scope::Household
    } else {
        Scope::Personal
    };
    let filter = ItemFilter {
        scope,
        ..ItemFilter::default()
    };
    ItemQuery::new(user_id, household_id, filter).ordered(ItemOrder::Chronological)
}

/// Stats for items created in `[week_start, week_end)`: the household's items
/// when `household_id` is set, otherwise the user's personal items.
pub async fn week_stats(
    pool: &SqlitePool,
    user_id: &str,
    household_id: Option<HouseholdId>,
    week_start: DateTime<Utc>,
    week_end: DateTime<Utc>,
) -> AppResult<WeekStats> {
    let items = scoped_query(user_id, household_id)
        .created_within(week_start, week_end)
        .fetch(pool)
        .await?;
    Ok(summarize(&items))
}

pub async fn current_week_stats(
    pool: &SqlitePool,
    user_id: &str,
    household_id: Option<HouseholdId>,
    now: DateTime<Utc>,
) -> AppResult<WeekStats> {
    let start = start_of_week(now);
    week_stats(pool, user_id, household_id, start, end_of_week(start)).await
}

fn weeks_back_error(weeks_back: u32) -> AppError {
    AppError::new(VALIDATION_FAILED, "Invalid input: weeks_back").with_context(
        "weeks_back",
        format!("must be at most {MAX_WEEKS_BACK} (got {weeks_back})"),
    )
}

/// `weeks_back` consecutive weeks ending with the one containing `now`, oldest first.
/// At most [`MAX_WEEKS_BACK`] weeks are allowed.
pub async fn historical_stats(
    pool: &SqlitePool,
    user_id: &str,
    household_id: Option<HouseholdId>,
    weeks_back: u32,
    now: DateTime<Utc>,
) -> AppResult<Vec<HistoricalWeek>> {
    if weeks_back > MAX_WEEKS_BACK {
        return Err(weeks_back_error(weeks_back));
    }
    let mut weeks = Vec::with_capacity(weeks_back as usize);
    for i in 0..weeks_back {
        let shifted = now
            .checked_sub_signed(Duration::days(7 * i64::from(i)))
            .ok_or_else(|| weeks_back_error(weeks_back))?;
        let week_start = start_of_week(shifted);
        let week_end = end_of_week(week_start);
        let stats = week_stats(pool, user_id, household_id, week_start, week_end).await?;
        weeks.push(HistoricalWeek {
            label: week_label(week_start),
            week_start,
            week_end,
            stats,
        });
    }
    weeks.reverse();
    Ok(weeks)
}
