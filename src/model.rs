use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

use crate::{time::from_ms, AppError, AppResult};

pub type HouseholdId = i64;
pub type ItemId = i64;
pub type CategoryId = i64;

pub const ITEM_DECODE_ERROR: &str = "ITEM/DECODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HouseholdRole {
    Owner,
    Admin,
    Member,
}

impl HouseholdRole {
    pub fn as_str(self) -> &'static str {
        match self {
            HouseholdRole::Owner => "owner",
            HouseholdRole::Admin => "admin",
            HouseholdRole::Member => "member",
        }
    }
}

impl fmt::Display for HouseholdRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HouseholdRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "owner" => Ok(HouseholdRole::Owner),
            "admin" => Ok(HouseholdRole::Admin),
            "member" => Ok(HouseholdRole::Member),
            other => Err(AppError::new("HOUSEHOLD/DECODE", "Unknown household role")
                .with_context("role", other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Household {
    pub id: HouseholdId,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&SqliteRow> for Household {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            owner_id: row.try_get("owner_id")?,
            created_at: from_ms(row.try_get("created_at")?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseholdMember {
    pub id: i64,
    pub user_id: String,
    pub household_id: HouseholdId,
    pub role: HouseholdRole,
    pub joined_at: DateTime<Utc>,
}

impl TryFrom<&SqliteRow> for HouseholdMember {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            household_id: row.try_get("household_id")?,
            role: role.parse()?,
            joined_at: from_ms(row.try_get("joined_at")?),
        })
    }
}

/// A membership as seen from the member's side, for household listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HouseholdSummary {
    pub household: Household,
    pub role: HouseholdRole,
    pub joined_at: DateTime<Utc>,
    pub member_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub household_id: HouseholdId,
}

impl TryFrom<&SqliteRow> for Category {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            household_id: row.try_get("household_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub quantity: i64,
    pub is_urgent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub household_id: Option<HouseholdId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Item {
    pub fn is_personal(&self) -> bool {
        self.household_id.is_none()
    }
}

pub(crate) fn decode_price(raw: Option<String>) -> AppResult<Option<Decimal>> {
    raw.map(|text| {
        Decimal::from_str(&text).map_err(|err| {
            AppError::new(ITEM_DECODE_ERROR, "Stored price is not a decimal")
                .with_context("value", text.clone())
                .with_context("error", err.to_string())
        })
    })
    .transpose()
}

impl TryFrom<&SqliteRow> for Item {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            quantity: row.try_get("quantity")?,
            is_urgent: row.try_get::<i64, _>("is_urgent")? != 0,
            estimated_price: decode_price(row.try_get("estimated_price")?)?,
            category_id: row.try_get("category_id")?,
            vendor: row.try_get("vendor")?,
            notes: row.try_get("notes")?,
            created_by_user_id: row.try_get("created_by_user_id")?,
            household_id: row.try_get("household_id")?,
            created_at: from_ms(row.try_get("created_at")?),
            updated_at: from_ms(row.try_get("updated_at")?),
            version: row.try_get("version")?,
        })
    }
}

/// An item with the names of its related rows, as returned by get and list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub household_name: Option<String>,
}

impl TryFrom<&SqliteRow> for ItemDetail {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            item: Item::try_from(row)?,
            category_name: row.try_get("category_name")?,
            household_name: row.try_get("household_name")?,
        })
    }
}

/// Caller-supplied item fields for create and update. Ownership, timestamps
/// and version are never taken from input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInput {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub estimated_price: Option<Decimal>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub household_id: Option<HouseholdId>,
}

fn default_quantity() -> i64 {
    1
}

impl ItemInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: default_quantity(),
            is_urgent: false,
            estimated_price: None,
            category_id: None,
            vendor: None,
            notes: None,
            household_id: None,
        }
    }
}

impl From<&Item> for ItemInput {
    fn from(item: &Item) -> Self {
        Self {
            name: item.name.clone(),
            quantity: item.quantity,
            is_urgent: item.is_urgent,
            estimated_price: item.estimated_price,
            category_id: item.category_id,
            vendor: item.vendor.clone(),
            notes: item.notes.clone(),
            household_id: item.household_id,
        }
    }
}
