use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::access::{ensure_can_access, ensure_can_modify};
use crate::categories::find_category;
use crate::error::ITEM_NOT_FOUND;
use crate::household::is_member;
use crate::model::{HouseholdId, ItemDetail, ItemId, ItemInput};
use crate::query::{fold_name, ItemFilter, ItemQuery, ITEM_DETAIL_SELECT};
use crate::time::now;
use crate::validation::{check_item, FieldErrors};
use crate::{AppError, AppResult};

async fn load(pool: &SqlitePool, id: ItemId) -> AppResult<ItemDetail> {
    let sql = format!("{ITEM_DETAIL_SELECT} WHERE i.id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|err| AppError::unexpected(err, "item_get"))?;
    match row {
        Some(row) => ItemDetail::try_from(&row),
        None => Err(AppError::not_found(ITEM_NOT_FOUND, "Item", id)),
    }
}

/// Membership and category rules that need storage. Failures land in
/// `errors` next to the field-level ones. Membership is only required when
/// the item moves into a household other than `kept_household`.
async fn check_relations(
    pool: &SqlitePool,
    user_id: &str,
    input: &ItemInput,
    kept_household: Option<HouseholdId>,
    errors: &mut FieldErrors,
) -> AppResult<()> {
    if let Some(household_id) = input.household_id {
        let moving = kept_household != Some(household_id);
        if moving && !is_member(pool, user_id, household_id).await? {
            errors.add("household_id", "you are not a member of this household");
        }
    }

    if let Some(category_id) = input.category_id {
        match find_category(pool, category_id).await? {
            None => errors.add("category_id", "does not exist"),
            Some(category) => match input.household_id {
                Some(household_id) if category.household_id != household_id => {
                    errors.add("category_id", "belongs to a different household")
                }
                Some(_) => {}
                None => {
                    if !is_member(pool, user_id, category.household_id).await? {
                        errors.add("category_id", "belongs to a household you are not in");
                    }
                }
            },
        }
    }
    Ok(())
}

async fn validate(
    pool: &SqlitePool,
    user_id: &str,
    input: &ItemInput,
    kept_household: Option<HouseholdId>,
) -> AppResult<()> {
    let mut errors = check_item(input);
    check_relations(pool, user_id, input, kept_household, &mut errors).await?;
    if !errors.is_empty() {
        warn!(
            target: "needful",
            event = "item_validation_failed",
            user_id,
            household_id = input.household_id
        );
    }
    errors.into_result()
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn create_item(pool: &SqlitePool, user_id: &str, input: ItemInput) -> AppResult<ItemDetail> {
    create_item_at(pool, user_id, input, now()).await
}

/// Creates an item stamped with `created_at`.
pub async fn create_item_at(
    pool: &SqlitePool,
    user_id: &str,
    input: ItemInput,
    created_at: DateTime<Utc>,
) -> AppResult<ItemDetail> {
    validate(pool, user_id, &input, None).await?;

    let name = input.name.trim();
    let ts = created_at.timestamp_millis();
    let id = sqlx::query(
        "INSERT INTO items (name, name_folded, quantity, is_urgent, estimated_price,
                            category_id, vendor, notes, created_by_user_id, household_id,
                            created_at, updated_at, version)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
    )
    .bind(name)
    .bind(fold_name(name))
    .bind(input.quantity)
    .bind(i64::from(input.is_urgent))
    .bind(input.estimated_price.map(|p| p.normalize().to_string()))
    .bind(input.category_id)
    .bind(trimmed(&input.vendor))
    .bind(trimmed(&input.notes))
    .bind(user_id)
    .bind(input.household_id)
    .bind(ts)
    .bind(ts)
    .execute(pool)
    .await
    .map_err(|err| AppError::unexpected(err, "item_insert"))?
    .last_insert_rowid();

    info!(
        target: "needful",
        event = "item_created",
        item_id = id,
        user_id,
        household_id = input.household_id
    );
    load(pool, id).await
}

pub async fn get_item(pool: &SqlitePool, user_id: &str, id: ItemId) -> AppResult<ItemDetail> {
    let detail = load(pool, id).await?;
    ensure_can_access(pool, &detail.item, user_id).await?;
    Ok(detail)
}

/// Replaces the editable fields. `expected_version` must match the stored
/// version; the creator and creation time never change.
pub async fn update_item(
    pool: &SqlitePool,
    user_id: &str,
    id: ItemId,
    input: ItemInput,
    expected_version: i64,
) -> AppResult<ItemDetail> {
    let current = load(pool, id).await?;
    ensure_can_modify(pool, &current.item, user_id).await?;
    validate(pool, user_id, &input, current.item.household_id).await?;

    let name = input.name.trim();
    let result = sqlx::query(
        "UPDATE items
            SET name = ?, name_folded = ?, quantity = ?, is_urgent = ?, estimated_price = ?,
                category_id = ?, vendor = ?, notes = ?, household_id = ?,
                updated_at = ?, version = version + 1
          WHERE id = ? AND version = ?",
    )
    .bind(name)
    .bind(fold_name(name))
    .bind(input.quantity)
    .bind(i64::from(input.is_urgent))
    .bind(input.estimated_price.map(|p| p.normalize().to_string()))
    .bind(input.category_id)
    .bind(trimmed(&input.vendor))
    .bind(trimmed(&input.notes))
    .bind(input.household_id)
    .bind(now().timestamp_millis())
    .bind(id)
    .bind(expected_version)
    .execute(pool)
    .await
    .map_err(|err| AppError::unexpected(err, "item_update"))?;

    if result.rows_affected() == 0 {
        // Gone or changed since it was read.
        let latest = load(pool, id).await?;
        warn!(
            target: "needful",
            event = "item_update_conflict",
            item_id = id,
            expected_version,
            stored_version = latest.item.version
        );
        return Err(AppError::concurrent_modification("Item", id)
            .with_context("expected_version", expected_version.to_string())
            .with_context("stored_version", latest.item.version.to_string()));
    }

    info!(target: "needful", event = "item_updated", item_id = id, user_id);
    load(pool, id).await
}

pub async fn delete_item(pool: &SqlitePool, user_id: &str, id: ItemId) -> AppResult<()> {
    let current = load(pool, id).await?;
    ensure_can_modify(pool, &current.item, user_id).await?;

    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|err| AppError::unexpected(err, "item_delete"))?;
    info!(target: "needful", event = "item_deleted", item_id = id, user_id);
    Ok(())
}

pub async fn list_items(
    pool: &SqlitePool,
    user_id: &str,
    active: Option<HouseholdId>,
    filter: ItemFilter,
) -> AppResult<Vec<ItemDetail>> {
    ItemQuery::new(user_id, active, filter).fetch(pool).await
}
