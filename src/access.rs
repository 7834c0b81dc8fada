//! Who may see and change an item.
//!
//! The creator always may. Anyone else needs the item to belong to a
//! household they are currently a member of; any role qualifies.

use sqlx::SqlitePool;
use tracing::warn;

use crate::household;
use crate::model::Item;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Creator,
    Member,
    Denied,
}

impl Access {
    pub fn allowed(self) -> bool {
        !matches!(self, Access::Denied)
    }
}

/// True when the decision needs a membership lookup.
pub fn needs_membership(item: &Item, user_id: &str) -> bool {
    item.created_by_user_id != user_id && item.household_id.is_some()
}

pub fn evaluate(item: &Item, user_id: &str, is_member: bool) -> Access {
    if item.created_by_user_id == user_id {
        Access::Creator
    } else if item.household_id.is_some() && is_member {
        Access::Member
    } else {
        Access::Denied
    }
}

pub async fn decide(pool: &SqlitePool, item: &Item, user_id: &str) -> AppResult<Access> {
    let is_member = match item.household_id {
        Some(household_id) if needs_membership(item, user_id) => {
            household::is_member(pool, user_id, household_id).await?
        }
        _ => false,
    };
    Ok(evaluate(item, user_id, is_member))
}

pub async fn can_access(pool: &SqlitePool, item: &Item, user_id: &str) -> AppResult<bool> {
    Ok(decide(pool, item, user_id).await?.allowed())
}

/// Modification rights are the same as read rights.
pub async fn can_modify(pool: &SqlitePool, item: &Item, user_id: &str) -> AppResult<bool> {
    can_access(pool, item, user_id).await
}

fn denied(item: &Item, user_id: &str, action: &'static str) -> AppError {
    warn!(
        target: "needful",
        event = "item_access_denied",
        action,
        item_id = item.id,
        user_id,
        household_id = item.household_id
    );
    AppError::forbidden(format!("You are not allowed to {action} this item"))
        .with_context("item_id", item.id.to_string())
}

pub async fn ensure_can_access(pool: &SqlitePool, item: &Item, user_id: &str) -> AppResult<()> {
    if can_access(pool, item, user_id).await? {
        Ok(())
    } else {
        Err(denied(item, user_id, "view"))
    }
}

pub async fn ensure_can_modify(pool: &SqlitePool, item: &Item, user_id: &str) -> AppResult<()> {
    if can_modify(pool, item, user_id).await? {
        Ok(())
    } else {
        Err(denied(item, user_id, "change"))
    }
}
