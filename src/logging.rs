use std::time::Instant;

use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::AppError;

static INIT: OnceCell<()> = OnceCell::new();

/// JSON logs to stderr, filtered by `filter` (env-filter syntax). Only the
/// first call installs anything.
pub fn init_logging(filter: &str) {
    INIT.get_or_init(|| {
        let _ = tracing_log::LogTracer::init();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .try_init();
    });
}

/// Enter / success / failure events for one command, with its duration.
pub struct OpScope {
    cmd: &'static str,
    user_id: String,
    household_id: Option<i64>,
    start: Instant,
}

impl OpScope {
    pub fn new(cmd: &'static str, user_id: &str, household_id: Option<i64>) -> Self {
        let scope = Self {
            cmd,
            user_id: user_id.to_string(),
            household_id,
            start: Instant::now(),
        };
        debug!(
            target: "needful",
            event = "op_enter",
            cmd = scope.cmd,
            user_id = %scope.user_id,
            household_id = scope.household_id
        );
        scope
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn success(&self) {
        info!(
            target: "needful",
            event = "op_ok",
            cmd = self.cmd,
            user_id = %self.user_id,
            household_id = self.household_id,
            duration_ms = self.elapsed_ms()
        );
    }

    /// Caller mistakes log at warn; storage and unexpected failures at error.
    pub fn fail(&self, err: &AppError) {
        let context = if err.context().is_empty() {
            None
        } else {
            serde_json::to_string(err.context()).ok()
        };
        if err.kind().is_client_error() {
            warn!(
                target: "needful",
                event = "op_rejected",
                cmd = self.cmd,
                user_id = %self.user_id,
                household_id = self.household_id,
                duration_ms = self.elapsed_ms(),
                code = %err.code(),
                message = %err.message(),
                context = context.as_deref()
            );
        } else {
            error!(
                target: "needful",
                event = "op_failed",
                cmd = self.cmd,
                user_id = %self.user_id,
                household_id = self.household_id,
                duration_ms = self.elapsed_ms(),
                code = %err.code(),
                message = %err.message(),
                crash_id = err.crash_id().map(|id| id.to_string()).as_deref()
            );
        }
    }
}
