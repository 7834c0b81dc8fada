use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::{Future, FutureExt};

use crate::error::{panic_payload, CrashId};
use crate::{AppError, AppResult};

pub const PANIC_CODE: &str = "RUNTIME/PANIC";

fn panic_error(command: &'static str, payload: Box<dyn Any + Send>) -> AppError {
    let mut error =
        AppError::new(PANIC_CODE, panic_payload(payload.as_ref())).with_context("command", command);
    error.set_crash_id(CrashId::new());
    error.log_with_event("panic_caught");
    error
}

/// Runs `f`, turning a panic into a `RUNTIME/PANIC` error.
pub fn fence<T, F>(command: &'static str, f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T>,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(panic_error(command, payload)))
}

/// Async form of [`fence`]; panics while building or polling the future are caught.
pub async fn fence_async<T, F, Fut>(command: &'static str, f: F) -> AppResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let fut = catch_unwind(AssertUnwindSafe(|| AssertUnwindSafe(f()).catch_unwind()))
        .map_err(|payload| panic_error(command, payload))?;
    fut.await
        .unwrap_or_else(|payload| Err(panic_error(command, payload)))
}
