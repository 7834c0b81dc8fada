pub mod access;
pub mod categories;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod household;
pub mod household_active;
pub mod items;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod query;
pub mod state;
pub mod stats;
pub mod time;
pub mod util;
pub mod validation;

pub use error::{AppError, AppResult, ErrorKind};
pub use household_active::HouseholdContext;
pub use logging::init_logging;
pub use state::{AppState, RequestContext};
