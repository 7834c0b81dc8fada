//! Item selection shared by every list-shaped read.
//!
//! `ItemQuery` renders one filter both as SQL (`push_predicate`) and as an
//! in-memory predicate (`matches`); the two must select the same rows.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::VALIDATION_FAILED;
use crate::model::{CategoryId, HouseholdId, Item, ItemDetail};
use crate::{AppError, AppResult};

pub(crate) const ITEM_DETAIL_SELECT: &str = "SELECT i.id, i.name, i.quantity, i.is_urgent, \
     i.estimated_price, i.category_id, i.vendor, i.notes, i.created_by_user_id, \
     i.household_id, i.created_at, i.updated_at, i.version, \
     c.name AS category_name, h.name AS household_name \
     FROM items i \
     LEFT JOIN categories c ON c.id = i.category_id \
     LEFT JOIN households h ON h.id = i.household_id";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Personal,
    Household,
    #[default]
    Default,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Personal => "personal",
            Scope::Household => "household",
            Scope::Default => "default",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "personal" => Ok(Scope::Personal),
            "household" => Ok(Scope::Household),
            "" | "default" | "all" => Ok(Scope::Default),
            _ => Err(AppError::new(VALIDATION_FAILED, "Invalid input: scope")
                .with_context("scope", format!("unknown scope '{value}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub urgent: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemOrder {
    /// Urgent first, then newest first.
    #[default]
    Listing,
    /// Oldest first.
    Chronological,
}

/// Lowercased search needle, or `None` when the search is blank.
pub fn fold_search(search: Option<&str>) -> Option<String> {
    search
        .filter(|raw| !raw.trim().is_empty())
        .map(str::to_lowercase)
}

pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, Clone)]
pub struct ItemQuery<'a> {
    user_id: &'a str,
    active: Option<HouseholdId>,
    filter: ItemFilter,
    needle: Option<String>,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    order: ItemOrder,
}

impl<'a> ItemQuery<'a> {
    pub fn new(user_id: &'a str, active: Option<HouseholdId>, filter: ItemFilter) -> Self {
        let needle = fold_search(filter.search.as_deref());
        Self {
            user_id,
            active,
            filter,
            needle,
            window: None,
            order: ItemOrder::Listing,
        }
    }

    /// Items created in `[start, end)`.
    pub fn created_within(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.window = Some((start, end));
        self
    }

    pub fn ordered(mut self, order: ItemOrder) -> Self {
        self.order = order;
        self
    }

    pub fn filter(&self) -> &ItemFilter {
        &self.filter
    }

    /// Household scope with no active household selects nothing.
    pub fn selects_nothing(&self) -> bool {
        self.filter.scope == Scope::Household && self.active.is_none()
    }

    /// Appends the WHERE conditions for alias `i`, starting with `WHERE`.
    pub fn push_predicate(&self, qb: &mut QueryBuilder<'a, Sqlite>) {
        qb.push(" WHERE ");
        match (self.filter.scope, self.active) {
            (Scope::Household, Some(active)) => {
                qb.push("i.household_id = ").push_bind(active);
            }
            (Scope::Household, None) => {
                qb.push("0 = 1");
            }
            (Scope::Default, Some(active)) => {
                qb.push("((i.household_id IS NULL AND i.created_by_user_id = ")
                    .push_bind(self.user_id)
                    .push(") OR i.household_id = ")
                    .push_bind(active)
                    .push(")");
            }
            (Scope::Personal, _) | (Scope::Default, None) => {
                qb.push("(i.household_id IS NULL AND i.created_by_user_id = ")
                    .push_bind(self.user_id)
                    .push(")");
            }
        }

        if let Some(category_id) = self.filter.category_id {
            qb.push(" AND i.category_id = ").push_bind(category_id);
        }
        if let Some(urgent) = self.filter.urgent {
            qb.push(" AND i.is_urgent = ").push_bind(i64::from(urgent));
        }
        if let Some(needle) = &self.needle {
            qb.push(" AND instr(i.name_folded, ")
                .push_bind(needle.clone())
                .push(") > 0");
        }
        if let Some((start, end)) = self.window {
            qb.push(" AND i.created_at >= ")
                .push_bind(start.timestamp_millis())
                .push(" AND i.created_at < ")
                .push_bind(end.timestamp_millis());
        }
    }

    pub fn push_order(&self, qb: &mut QueryBuilder<'a, Sqlite>) {
        match self.order {
            ItemOrder::Listing => {
                qb.push(" ORDER BY i.is_urgent DESC, i.created_at DESC, i.id DESC")
            }
            ItemOrder::Chronological => qb.push(" ORDER BY i.created_at ASC, i.id ASC"),
        };
    }

    pub fn build(&self) -> QueryBuilder<'a, Sqlite> {
        let mut qb = QueryBuilder::new(ITEM_DETAIL_SELECT);
        self.push_predicate(&mut qb);
        self.push_order(&mut qb);
        qb
    }

    pub fn matches(&self, item: &Item) -> bool {
        let personal = item.household_id.is_none() && item.created_by_user_id == self.user_id;
        let in_scope = match (self.filter.scope, self.active) {
            (Scope::Household, Some(active)) => item.household_id == Some(active),
            (Scope::Household, None) => false,
            (Scope::Default, Some(active)) => personal || item.household_id == Some(active),
            (Scope::Personal, _) | (Scope::Default, None) => personal,
        };
        in_scope
            && self
                .filter
                .category_id
                .map_or(true, |id| item.category_id == Some(id))
            && self.filter.urgent.map_or(true, |urgent| item.is_urgent == urgent)
            && self
                .needle
                .as_deref()
                .map_or(true, |needle| fold_name(&item.name).contains(needle))
            && self.window.map_or(true, |(start, end)| {
                item.created_at >= start && item.created_at < end
            })
    }

    /// Orders items in memory exactly like `push_order`.
    pub fn sort(&self, items: &mut [Item]) {
        match self.order {
            ItemOrder::Listing => items.sort_by_key(|item| {
                (
                    Reverse(item.is_urgent),
                    Reverse(item.created_at),
                    Reverse(item.id),
                )
            }),
            ItemOrder::Chronological => items.sort_by_key(|item| (item.created_at, item.id)),
        }
    }

    pub async fn fetch(&self, pool: &SqlitePool) -> AppResult<Vec<ItemDetail>> {
        if self.selects_nothing() {
            return Ok(Vec::new());
        }
        let mut qb = self.build();
        let rows = qb
            .build()
            .fetch_all(pool)
            .await
            .map_err(|err| AppError::unexpected(err, "item_query"))?;
        rows.iter().map(ItemDetail::try_from).collect()
    }
}
