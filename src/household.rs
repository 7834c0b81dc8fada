use futures::FutureExt;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::db::run_in_tx;
use crate::error::{
    is_unique_violation, HOUSEHOLD_NOT_FOUND, INTEGRITY_ALREADY_MEMBER, INTEGRITY_NOT_OWNER,
    INTEGRITY_OWNER_CANNOT_LEAVE, MEMBERSHIP_NOT_FOUND,
};
use crate::household_active::HouseholdContext;
use crate::model::{Household, HouseholdId, HouseholdMember, HouseholdRole, HouseholdSummary};
use crate::time::{from_ms, now_ms};
use crate::validation::validate_household_name;
use crate::{AppError, AppResult};

pub async fn household_exists(pool: &SqlitePool, id: HouseholdId) -> AppResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM households WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|err| AppError::unexpected(err, "household_exists"))?;
    Ok(found.is_some())
}

pub async fn is_member(pool: &SqlitePool, user_id: &str, id: HouseholdId) -> AppResult<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM household_members WHERE user_id = ? AND household_id = ?",
    )
    .bind(user_id)
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|err| AppError::unexpected(err, "membership_lookup"))?;
    Ok(found.is_some())
}

pub async fn membership(
    pool: &SqlitePool,
    user_id: &str,
    id: HouseholdId,
) -> AppResult<Option<HouseholdMember>> {
    let row = sqlx::query(
        "SELECT id, user_id, household_id, role, joined_at
           FROM household_members
          WHERE user_id = ? AND household_id = ?",
    )
    .bind(user_id)
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|err| AppError::unexpected(err, "membership_lookup"))?;
    row.as_ref().map(HouseholdMember::try_from).transpose()
}

pub async fn get_household(pool: &SqlitePool, id: HouseholdId) -> AppResult<Household> {
    let row = sqlx::query("SELECT id, name, owner_id, created_at FROM households WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|err| AppError::unexpected(err, "household_get"))?;
    match row {
        Some(row) => Household::try_from(&row),
        None => Err(AppError::not_found(HOUSEHOLD_NOT_FOUND, "Household", id)),
    }
}

/// Creates the household and its owner membership together, then makes it
/// the active household.
pub async fn create_household(
    pool: &SqlitePool,
    ctx: &HouseholdContext,
    user_id: &str,
    name: &str,
) -> AppResult<Household> {
    validate_household_name(name)?;
    let name = name.trim().to_string();
    let owner_id = user_id.to_string();
    let now = now_ms();

    let household = run_in_tx(pool, move |conn| {
        async move {
            let id = sqlx::query(
                "INSERT INTO households (name, owner_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(&name)
            .bind(&owner_id)
            .bind(now)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

            sqlx::query(
                "INSERT INTO household_members (user_id, household_id, role, joined_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&owner_id)
            .bind(id)
            .bind(HouseholdRole::Owner.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await?;

            Ok::<_, AppError>(Household {
                id,
                name,
                owner_id,
                created_at: from_ms(now),
            })
        }
        .boxed()
    })
    .await
    .map_err(|err| AppError::unexpected(err, "household_create"))?;

    info!(target: "needful", event = "household_created", household_id = household.id, user_id);
    ctx.set_active(household.id);
    Ok(household)
}

pub async fn join_household(
    pool: &SqlitePool,
    ctx: &HouseholdContext,
    user_id: &str,
    id: HouseholdId,
) -> AppResult<HouseholdMember> {
    get_household(pool, id).await?;
    if is_member(pool, user_id, id).await? {
        return Err(already_member(id));
    }

    let now = now_ms();
    let inserted = sqlx::query(
        "INSERT INTO household_members (user_id, household_id, role, joined_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(id)
    .bind(HouseholdRole::Member.as_str())
    .bind(now)
    .execute(pool)
    .await;

    let member_id = match inserted {
        Ok(done) => done.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => return Err(already_member(id)),
        Err(err) => return Err(AppError::unexpected(err, "household_join")),
    };

    info!(target: "needful", event = "household_joined", household_id = id, user_id);
    ctx.set_active(id);
    Ok(HouseholdMember {
        id: member_id,
        user_id: user_id.to_string(),
        household_id: id,
        role: HouseholdRole::Member,
        joined_at: from_ms(now),
    })
}

fn already_member(id: HouseholdId) -> AppError {
    AppError::integrity(INTEGRITY_ALREADY_MEMBER, "You are already a member of this household")
        .with_context("household_id", id.to_string())
}

pub async fn switch_household(
    pool: &SqlitePool,
    ctx: &HouseholdContext,
    user_id: &str,
    id: HouseholdId,
) -> AppResult<Household> {
    if !is_member(pool, user_id, id).await? {
        return Err(AppError::forbidden("You are not a member of this household")
            .with_context("household_id", id.to_string()));
    }
    let household = get_household(pool, id).await?;
    ctx.set_active(id);
    Ok(household)
}

pub async fn leave_household(
    pool: &SqlitePool,
    ctx: &HouseholdContext,
    user_id: &str,
    id: HouseholdId,
) -> AppResult<()> {
    let member = membership(pool, user_id, id).await?.ok_or_else(|| {
        AppError::new(MEMBERSHIP_NOT_FOUND, "You are not a member of this household")
            .with_context("household_id", id.to_string())
    })?;
    if member.role == HouseholdRole::Owner {
        return Err(AppError::integrity(
            INTEGRITY_OWNER_CANNOT_LEAVE,
            "The owner cannot leave the household; delete it instead",
        )
        .with_context("household_id", id.to_string()));
    }

    sqlx::query("DELETE FROM household_members WHERE id = ?")
        .bind(member.id)
        .execute(pool)
        .await
        .map_err(|err| AppError::unexpected(err, "household_leave"))?;

    info!(target: "needful", event = "household_left", household_id = id, user_id);
    ctx.clear_if(id);
    Ok(())
}

/// Owner only. Members, categories and household items go with it.
pub async fn delete_household(
    pool: &SqlitePool,
    ctx: &HouseholdContext,
    user_id: &str,
    id: HouseholdId,
) -> AppResult<()> {
    let household = get_household(pool, id).await?;
    if household.owner_id != user_id {
        return Err(AppError::integrity(
            INTEGRITY_NOT_OWNER,
            "Only the owner can delete the household",
        )
        .with_context("household_id", id.to_string()));
    }

    sqlx::query("DELETE FROM households WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|err| AppError::unexpected(err, "household_delete"))?;

    info!(target: "needful", event = "household_deleted", household_id = id, user_id);
    ctx.clear_if(id);
    Ok(())
}

pub async fn list_households(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<HouseholdSummary>> {
    let rows = sqlx::query(
        "SELECT h.id, h.name, h.owner_id, h.created_at, m.role, m.joined_at,
                (SELECT COUNT(*) FROM household_members c WHERE c.household_id = h.id)
                  AS member_count
           FROM household_members m
           JOIN households h ON h.id = m.household_id
          WHERE m.user_id = ?
          ORDER BY m.joined_at DESC, h.id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|err| AppError::unexpected(err, "household_list"))?;

    rows.iter()
        .map(|row| -> AppResult<HouseholdSummary> {
            let role: String = row.try_get("role")?;
            Ok(HouseholdSummary {
                household: Household::try_from(row)?,
                role: role.parse()?,
                joined_at: from_ms(row.try_get("joined_at")?),
                member_count: row.try_get("member_count")?,
            })
        })
        .collect()
}

pub async fn list_members(
    pool: &SqlitePool,
    user_id: &str,
    id: HouseholdId,
) -> AppResult<Vec<HouseholdMember>> {
    get_household(pool, id).await?;
    if !is_member(pool, user_id, id).await? {
        return Err(AppError::forbidden("You are not a member of this household")
            .with_context("household_id", id.to_string()));
    }
    let rows = sqlx::query(
        "SELECT id, user_id, household_id, role, joined_at
           FROM household_members
          WHERE household_id = ?
          ORDER BY CASE role WHEN 'owner' THEN 0 WHEN 'admin' THEN 1 ELSE 2 END,
                   joined_at, id",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .map_err(|err| AppError::unexpected(err, "household_members"))?;
    rows.iter().map(HouseholdMember::try_from).collect()
}
