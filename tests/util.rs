#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use needful_lib::household_active::HouseholdContext;
use needful_lib::model::{Household, ItemDetail, ItemInput};
use needful_lib::{db, household, items, migrate};
use rust_decimal::Decimal;
use sqlx::SqlitePool;

pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = db::open_memory_pool().await?;
    migrate::apply_migrations(&pool).await?;
    Ok(pool)
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("valid timestamp")
}

pub async fn household_owned_by(
    pool: &SqlitePool,
    owner: &str,
    name: &str,
) -> Result<(Household, HouseholdContext)> {
    let ctx = HouseholdContext::in_memory();
    let hh = household::create_household(pool, &ctx, owner, name).await?;
    Ok((hh, ctx))
}

pub fn input(name: &str) -> ItemInput {
    ItemInput::named(name)
}

pub fn priced(name: &str, cents: i64) -> ItemInput {
    let mut input = ItemInput::named(name);
    input.estimated_price = Some(Decimal::new(cents, 2));
    input
}

pub async fn add_at(
    pool: &SqlitePool,
    user: &str,
    input: ItemInput,
    at: DateTime<Utc>,
) -> Result<ItemDetail> {
    Ok(items::create_item_at(pool, user, input, at).await?)
}
