use sqlx::SqlitePool;
use tracing::info;

use crate::error::{is_unique_violation, CATEGORY_NOT_FOUND, INTEGRITY_DUPLICATE_CATEGORY};
use crate::household::{get_household, is_member};
use crate::model::{Category, CategoryId, HouseholdId};
use crate::validation::validate_category_name;
use crate::{AppError, AppResult};

async fn ensure_member(pool: &SqlitePool, user_id: &str, household_id: HouseholdId) -> AppResult<()> {
    if is_member(pool, user_id, household_id).await? {
        Ok(())
    } else {
        Err(AppError::forbidden("You are not a member of this household")
            .with_context("household_id", household_id.to_string()))
    }
}

pub async fn find_category(pool: &SqlitePool, id: CategoryId) -> AppResult<Option<Category>> {
    let row = sqlx::query("SELECT id, name, household_id FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|err| AppError::unexpected(err, "category_get"))?;
    row.as_ref().map(Category::try_from).transpose()
}

pub async fn create_category(
    pool: &SqlitePool,
    user_id: &str,
    household_id: HouseholdId,
    name: &str,
) -> AppResult<Category> {
    get_household(pool, household_id).await?;
    ensure_member(pool, user_id, household_id).await?;
    validate_category_name(name)?;
    let name = name.trim();

    let inserted = sqlx::query("INSERT INTO categories (name, household_id) VALUES (?, ?)")
        .bind(name)
        .bind(household_id)
        .execute(pool)
        .await;
    let id = match inserted {
        Ok(done) => done.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::integrity(
                INTEGRITY_DUPLICATE_CATEGORY,
                "A category with this name already exists in the household",
            )
            .with_context("name", name.to_string())
            .with_context("household_id", household_id.to_string()))
        }
        Err(err) => return Err(AppError::unexpected(err, "category_create")),
    };

    info!(target: "needful", event = "category_created", category_id = id, household_id);
    Ok(Category {
        id,
        name: name.to_string(),
        household_id,
    })
}

pub async fn list_categories(
    pool: &SqlitePool,
    user_id: &str,
    household_id: HouseholdId,
) -> AppResult<Vec<Category>> {
    get_household(pool, household_id).await?;
    ensure_member(pool, user_id, household_id).await?;
    let rows = sqlx::query(
        "SELECT id, name, household_id FROM categories
          WHERE household_id = ?
          ORDER BY name COLLATE NOCASE, id",
    )
    .bind(household_id)
    .fetch_all(pool)
    .await
    .map_err(|err| AppError::unexpected(err, "category_list"))?;
    rows.iter().map(Category::try_from).collect()
}

/// Items that used the category keep existing with no category.
pub async fn delete_category(pool: &SqlitePool, user_id: &str, id: CategoryId) -> AppResult<()> {
    let category = find_category(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(CATEGORY_NOT_FOUND, "Category", id))?;
    ensure_member(pool, user_id, category.household_id).await?;

    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|err| AppError::unexpected(err, "category_delete"))?;
    info!(
        target: "needful",
        event = "category_deleted",
        category_id = id,
        household_id = category.household_id
    );
    Ok(())
}
