use sqlx::SqlitePool;

use crate::config::Config;
use crate::household_active::{HouseholdContext, StoreHandle};
use crate::model::HouseholdId;
use crate::{db, migrate, AppError, AppResult};

/// Process-wide handles: the pool and the resolved configuration.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    /// Migration versions applied while opening.
    pub migrated: Vec<&'static str>,
}

impl AppState {
    /// Opens the database and brings the schema up to date.
    pub async fn open(config: Config) -> AppResult<Self> {
        let pool = db::open_sqlite_pool(&config.db_path)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "db_open"))?;
        let migrated = migrate::apply_migrations(&pool)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "migrate"))?;
        Ok(Self {
            pool,
            config,
            migrated,
        })
    }

    /// Request context for `user_id`, backed by that user's session file.
    pub fn request(&self, user_id: &str) -> AppResult<RequestContext> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::new(
                crate::error::VALIDATION_FAILED,
                "Invalid input: user",
            )
            .with_context("user", "is required"));
        }
        let store = StoreHandle::file(self.config.session_file(user_id))
            .map_err(|err| AppError::from(err).with_context("operation", "session_open"))?;
        Ok(RequestContext {
            pool: self.pool.clone(),
            user_id: user_id.to_string(),
            households: HouseholdContext::new(store),
        })
    }
}

/// Everything one command needs: who is asking and their session pointer.
pub struct RequestContext {
    pub pool: SqlitePool,
    pub user_id: String,
    pub households: HouseholdContext,
}

impl RequestContext {
    pub fn in_memory(pool: SqlitePool, user_id: &str) -> Self {
        Self {
            pool,
            user_id: user_id.to_string(),
            households: HouseholdContext::in_memory(),
        }
    }

    pub async fn active_household(&self) -> AppResult<Option<HouseholdId>> {
        self.households.resolve_active(&self.pool, &self.user_id).await
    }
}
