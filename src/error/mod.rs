use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use sqlx::Error as SqlxError;
use std::io::Error as IoError;

mod crash_id;

pub use crash_id::CrashId;

pub const ITEM_NOT_FOUND: &str = "ITEM/NOT_FOUND";
pub const HOUSEHOLD_NOT_FOUND: &str = "HOUSEHOLD/NOT_FOUND";
pub const CATEGORY_NOT_FOUND: &str = "CATEGORY/NOT_FOUND";
pub const MEMBERSHIP_NOT_FOUND: &str = "MEMBERSHIP/NOT_FOUND";
pub const ACCESS_FORBIDDEN: &str = "ACCESS/FORBIDDEN";
pub const VALIDATION_FAILED: &str = "VALIDATION/FAILED";
pub const CONCURRENT_MODIFICATION: &str = "CONFLICT/CONCURRENT_MODIFICATION";
pub const INTEGRITY_OWNER_CANNOT_LEAVE: &str = "INTEGRITY/OWNER_CANNOT_LEAVE";
pub const INTEGRITY_NOT_OWNER: &str = "INTEGRITY/NOT_OWNER";
pub const INTEGRITY_ALREADY_MEMBER: &str = "INTEGRITY/ALREADY_MEMBER";
pub const INTEGRITY_DUPLICATE_CATEGORY: &str = "INTEGRITY/DUPLICATE_CATEGORY";
pub const GENERIC_FAIL: &str = "GENERIC/FAIL";
pub const GENERIC_FAIL_MESSAGE: &str = "Something went wrong. Please try again.";

/// Outcome classes callers branch on. Derived from the error code so that
/// codes stay the single source of truth on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    ValidationFailed,
    ConcurrentModification,
    IntegrityViolation,
    Storage,
}

impl ErrorKind {
    /// Process exit status used by the CLI for this outcome.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::NotFound => 3,
            ErrorKind::Forbidden => 4,
            ErrorKind::ValidationFailed => 5,
            ErrorKind::ConcurrentModification => 6,
            ErrorKind::IntegrityViolation => 7,
            ErrorKind::Storage => 1,
        }
    }

    /// Client-caused outcomes are logged at warn; everything else at error.
    pub fn is_client_error(self) -> bool {
        !matches!(self, ErrorKind::Storage)
    }
}

/// A structured application error that can be serialized and surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    /// Machine readable error code.
    pub code: String,
    /// Human friendly message that can be shown directly to the user.
    pub message: String,
    /// Arbitrary key/value pairs that provide additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
    /// Optional nested cause that preserves the error chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<AppError>>,
    /// Correlation id attached to unexpected failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_id: Option<CrashId>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;
pub type Result<T> = AppResult<T>;

impl AppError {
    /// Default code used when an upstream error does not expose a specific code.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";
    /// Code used for errors created from free-form messages.
    pub const GENERIC_CODE: &'static str = "APP/GENERIC";

    /// Construct a new application error with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
            crash_id: None,
        }
    }

    pub fn not_found(code: &str, entity: &str, id: impl ToString) -> Self {
        AppError::new(code, format!("{entity} not found")).with_context("id", id.to_string())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::new(ACCESS_FORBIDDEN, message)
    }

    pub fn integrity(code: &str, message: impl Into<String>) -> Self {
        AppError::new(code, message)
    }

    pub fn concurrent_modification(entity: &str, id: impl ToString) -> Self {
        AppError::new(
            CONCURRENT_MODIFICATION,
            format!("{entity} was changed by someone else; reload and try again"),
        )
        .with_context("id", id.to_string())
    }

    /// Wrap an unexpected failure behind a generic message, keeping the cause
    /// and stamping a crash id so the log line can be found again.
    pub fn unexpected(cause: impl Into<AppError>, operation: &'static str) -> Self {
        let mut error = AppError::new(GENERIC_FAIL, GENERIC_FAIL_MESSAGE)
            .with_context("operation", operation)
            .with_cause(cause);
        error.set_crash_id(CrashId::new());
        error.log_with_event("unexpected_failure");
        error
    }

    /// Returns the error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the contextual metadata associated with the error.
    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    /// Returns the nested cause if one is present.
    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    pub fn crash_id(&self) -> Option<&CrashId> {
        self.crash_id.as_ref()
    }

    pub fn set_crash_id(&mut self, crash_id: CrashId) {
        self.crash_id = Some(crash_id);
    }

    pub fn kind(&self) -> ErrorKind {
        let code = self.code.as_str();
        if code.ends_with("/NOT_FOUND") {
            ErrorKind::NotFound
        } else if code == ACCESS_FORBIDDEN {
            ErrorKind::Forbidden
        } else if code.starts_with("VALIDATION/") {
            ErrorKind::ValidationFailed
        } else if code.starts_with("CONFLICT/") {
            ErrorKind::ConcurrentModification
        } else if code.starts_with("INTEGRITY/") {
            ErrorKind::IntegrityViolation
        } else {
            ErrorKind::Storage
        }
    }

    /// Adds a contextual key/value pair to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Extends the context map with additional key/value pairs.
    pub fn with_contexts<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.context
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the nested cause for the error.
    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    pub fn log_with_event(&self, event: &'static str) {
        tracing::error!(
            target: "needful",
            event,
            code = %self.code,
            message = %self.message,
            crash_id = self.crash_id.as_ref().map(|id| id.to_string()).as_deref(),
            cause = self.cause.as_ref().map(|cause| cause.to_string()).as_deref(),
        );
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        fn convert(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }

            let mut root = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
            if let Some(source) = err.source() {
                root.cause = Some(Box::new(convert(source)));
            }
            root
        }

        convert(error.as_ref())
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let code = format!("IO/{:?}", error.kind());
        let mut app_error = AppError::new(code, error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            app_error = app_error.with_context("os_code", os_code.to_string());
        }
        app_error
    }
}

impl From<SerdeJsonError> for AppError {
    fn from(error: SerdeJsonError) -> Self {
        let code = if error.is_data() {
            "JSON/DATA"
        } else if error.is_syntax() {
            "JSON/SYNTAX"
        } else if error.is_eof() {
            "JSON/EOF"
        } else if error.is_io() {
            "JSON/IO"
        } else {
            "JSON/ERROR"
        };

        let mut app_error = AppError::new(code, error.to_string());
        let line = error.line();
        if line > 0 {
            app_error = app_error.with_context("line", line.to_string());
        }
        let column = error.column();
        if column > 0 {
            app_error = app_error.with_context("column", column.to_string());
        }
        app_error
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::new("SQLX/ROW_MISSING", "Record not found"),
            SqlxError::ColumnNotFound(name) => {
                AppError::new("SQLX/COLUMN_MISSING", format!("Column not found: {name}"))
            }
            SqlxError::PoolTimedOut => AppError::new(
                "SQLX/POOL_TIMEOUT",
                "Timed out acquiring a database connection",
            ),
            SqlxError::PoolClosed => AppError::new("SQLX/POOL_CLOSED", "Database pool is closed"),
            SqlxError::Io(err) => AppError::from(err).with_context("source", "sqlx"),
            SqlxError::Database(db) => {
                let code = db
                    .code()
                    .map(|code| format!("Sqlite/{code}"))
                    .unwrap_or_else(|| "SQLX/DATABASE".to_string());
                let mut app_error = AppError::new(code, db.message().to_string());
                if let Some(constraint) = db.constraint() {
                    app_error = app_error.with_context("constraint", constraint.to_string());
                }
                app_error
            }
            SqlxError::ColumnDecode { index, source } => {
                AppError::new("SQLX/COLUMN_DECODE", source.to_string())
                    .with_context("column_index", index.to_string())
            }
            SqlxError::Decode(decode_err) => AppError::new("SQLX/DECODE", decode_err.to_string()),
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}

/// True when a sqlx error is a UNIQUE constraint violation.
pub fn is_unique_violation(error: &SqlxError) -> bool {
    matches!(error, SqlxError::Database(db) if db.is_unique_violation())
}

/// Render a panic payload into a message.
pub fn panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
