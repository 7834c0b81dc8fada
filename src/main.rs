use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use needful_lib::config::{Config, Overrides};
use needful_lib::error::VALIDATION_FAILED;
use needful_lib::logging::OpScope;
use needful_lib::model::{CategoryId, HouseholdId, ItemId, ItemInput};
use needful_lib::query::{ItemFilter, Scope};
use needful_lib::util::fence_async;
use needful_lib::{
    categories, dashboard, household, items, migrate, time, AppError, AppResult, AppState,
    RequestContext,
};

#[derive(Debug, Parser)]
#[command(name = "needful", about = "Household needs tracker", version)]
struct Cli {
    /// Id of the acting user.
    #[arg(long, env = "NEEDFUL_USER", global = true)]
    user: Option<String>,

    /// Database file (default: <data dir>/needful.sqlite3).
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Directory for the database and session files.
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter in env-filter syntax.
    #[arg(long, value_name = "FILTER", global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create, join and manage households.
    #[command(subcommand)]
    Household(HouseholdCommand),
    /// Household categories.
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Needed items.
    #[command(subcommand)]
    Item(ItemCommand),
    /// Current week and recent history, personal and for the active household.
    Dashboard,
    /// Session pointer maintenance.
    #[command(subcommand)]
    Session(SessionCommand),
    /// Database maintenance.
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum HouseholdCommand {
    /// Create a household owned by the user and make it active.
    Create { name: String },
    /// Join an existing household and make it active.
    Join { id: HouseholdId },
    /// Make a household the user belongs to active.
    Switch { id: HouseholdId },
    /// Leave a household.
    Leave { id: HouseholdId },
    /// Delete an owned household with its members, categories and items.
    Delete { id: HouseholdId },
    /// Households the user belongs to.
    List,
    /// Members of a household.
    Members { id: HouseholdId },
}

#[derive(Debug, Subcommand)]
enum CategoryCommand {
    /// Add a category to a household (default: the active one).
    Add {
        name: String,
        #[arg(long)]
        household: Option<HouseholdId>,
    },
    /// Categories of a household (default: the active one).
    List {
        #[arg(long)]
        household: Option<HouseholdId>,
    },
    /// Delete a category; its items keep existing uncategorised.
    Delete { id: CategoryId },
}

#[derive(Debug, Args)]
struct ItemFields {
    #[arg(long)]
    quantity: Option<i64>,
    /// Mark the item urgent (true/false).
    #[arg(long)]
    urgent: Option<bool>,
    #[arg(long)]
    price: Option<Decimal>,
    #[arg(long)]
    category: Option<CategoryId>,
    #[arg(long)]
    vendor: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    /// Share the item with this household.
    #[arg(long, conflicts_with = "shared")]
    household: Option<HouseholdId>,
    /// Share the item with the active household.
    #[arg(long)]
    shared: bool,
}

#[derive(Debug, Subcommand)]
enum ItemCommand {
    /// Record a needed item. Personal unless --household or --shared is given.
    Add {
        name: String,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// Items visible to the user.
    List {
        /// personal, household or default.
        #[arg(long, default_value = "default")]
        scope: Scope,
        #[arg(long)]
        category: Option<CategoryId>,
        #[arg(long)]
        urgent: Option<bool>,
        #[arg(long)]
        search: Option<String>,
    },
    /// One item with its category and household names.
    Show { id: ItemId },
    /// Change an item. --version must be the version last read.
    Edit {
        id: ItemId,
        #[arg(long)]
        version: i64,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: ItemFields,
        #[arg(long, conflicts_with = "price")]
        clear_price: bool,
        #[arg(long, conflicts_with = "category")]
        clear_category: bool,
        /// Make the item personal again.
        #[arg(long, conflicts_with_all = ["household", "shared"])]
        personal: bool,
    },
    /// Delete an item.
    Delete { id: ItemId },
}

#[derive(Debug, Subcommand)]
enum SessionCommand {
    /// Forget the active household.
    End,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply pending schema migrations.
    Migrate,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Household(cmd) => match cmd {
                HouseholdCommand::Create { .. } => "household_create",
                HouseholdCommand::Join { .. } => "household_join",
                HouseholdCommand::Switch { .. } => "household_switch",
                HouseholdCommand::Leave { .. } => "household_leave",
                HouseholdCommand::Delete { .. } => "household_delete",
                HouseholdCommand::List => "household_list",
                HouseholdCommand::Members { .. } => "household_members",
            },
            Commands::Category(cmd) => match cmd {
                CategoryCommand::Add { .. } => "category_add",
                CategoryCommand::List { .. } => "category_list",
                CategoryCommand::Delete { .. } => "category_delete",
            },
            Commands::Item(cmd) => match cmd {
                ItemCommand::Add { .. } => "item_add",
                ItemCommand::List { .. } => "item_list",
                ItemCommand::Show { .. } => "item_show",
                ItemCommand::Edit { .. } => "item_edit",
                ItemCommand::Delete { .. } => "item_delete",
            },
            Commands::Dashboard => "dashboard",
            Commands::Session(SessionCommand::End) => "session_end",
            Commands::Db(DbCommand::Migrate) => "db_migrate",
        }
    }
}

fn required(field: &'static str) -> AppError {
    AppError::new(VALIDATION_FAILED, format!("Invalid input: {field}"))
        .with_context(field, "is required")
}

fn to_json<T: Serialize>(value: &T) -> AppResult<Value> {
    Ok(serde_json::to_value(value)?)
}

async fn household_or_active(
    ctx: &RequestContext,
    explicit: Option<HouseholdId>,
) -> AppResult<HouseholdId> {
    match explicit {
        Some(id) => Ok(id),
        None => ctx
            .active_household()
            .await?
            .ok_or_else(|| required("household_id")),
    }
}

impl ItemFields {
    async fn apply(self, ctx: &RequestContext, input: &mut ItemInput) -> AppResult<()> {
        if let Some(quantity) = self.quantity {
            input.quantity = quantity;
        }
        if let Some(urgent) = self.urgent {
            input.is_urgent = urgent;
        }
        if self.price.is_some() {
            input.estimated_price = self.price;
        }
        if self.category.is_some() {
            input.category_id = self.category;
        }
        if self.vendor.is_some() {
            input.vendor = self.vendor;
        }
        if self.notes.is_some() {
            input.notes = self.notes;
        }
        if self.household.is_some() {
            input.household_id = self.household;
        } else if self.shared {
            input.household_id = Some(household_or_active(ctx, None).await?);
        }
        Ok(())
    }
}

async fn run_household(ctx: &RequestContext, cmd: HouseholdCommand) -> AppResult<Value> {
    let pool = &ctx.pool;
    let user = ctx.user_id.as_str();
    let hh = &ctx.households;
    match cmd {
        HouseholdCommand::Create { name } => {
            to_json(&household::create_household(pool, hh, user, &name).await?)
        }
        HouseholdCommand::Join { id } => {
            to_json(&household::join_household(pool, hh, user, id).await?)
        }
        HouseholdCommand::Switch { id } => {
            to_json(&household::switch_household(pool, hh, user, id).await?)
        }
        HouseholdCommand::Leave { id } => {
            household::leave_household(pool, hh, user, id).await?;
            Ok(json!({ "left": id }))
        }
        HouseholdCommand::Delete { id } => {
            household::delete_household(pool, hh, user, id).await?;
            Ok(json!({ "deleted": id }))
        }
        HouseholdCommand::List => {
            let active = ctx.active_household().await?;
            let households = household::list_households(pool, user).await?;
            Ok(json!({ "active_household_id": active, "households": households }))
        }
        HouseholdCommand::Members { id } => {
            to_json(&household::list_members(pool, user, id).await?)
        }
    }
}

async fn run_category(ctx: &RequestContext, cmd: CategoryCommand) -> AppResult<Value> {
    let pool = &ctx.pool;
    let user = ctx.user_id.as_str();
    match cmd {
        CategoryCommand::Add { name, household } => {
            let household_id = household_or_active(ctx, household).await?;
            to_json(&categories::create_category(pool, user, household_id, &name).await?)
        }
        CategoryCommand::List { household } => {
            let household_id = household_or_active(ctx, household).await?;
            to_json(&categories::list_categories(pool, user, household_id).await?)
        }
        CategoryCommand::Delete { id } => {
            categories::delete_category(pool, user, id).await?;
            Ok(json!({ "deleted": id }))
        }
    }
}

async fn run_item(ctx: &RequestContext, cmd: ItemCommand) -> AppResult<Value> {
    let pool = &ctx.pool;
    let user = ctx.user_id.as_str();
    match cmd {
        ItemCommand::Add { name, fields } => {
            let mut input = ItemInput::named(name);
            fields.apply(ctx, &mut input).await?;
            to_json(&items::create_item(pool, user, input).await?)
        }
        ItemCommand::List {
            scope,
            category,
            urgent,
            search,
        } => {
            let active = ctx.active_household().await?;
            let filter = ItemFilter {
                scope,
                category_id: category,
                urgent,
                search,
            };
            to_json(&items::list_items(pool, user, active, filter).await?)
        }
        ItemCommand::Show { id } => to_json(&items::get_item(pool, user, id).await?),
        ItemCommand::Edit {
            id,
            version,
            name,
            fields,
            clear_price,
            clear_category,
            personal,
        } => {
            let current = items::get_item(pool, user, id).await?;
            let mut input = ItemInput::from(&current.item);
            if let Some(name) = name {
                input.name = name;
            }
            fields.apply(ctx, &mut input).await?;
            if clear_price {
                input.estimated_price = None;
            }
            if clear_category {
                input.category_id = None;
            }
            if personal {
                input.household_id = None;
            }
            to_json(&items::update_item(pool, user, id, input, version).await?)
        }
        ItemCommand::Delete { id } => {
            items::delete_item(pool, user, id).await?;
            Ok(json!({ "deleted": id }))
        }
    }
}

async fn run(state: &AppState, user: Option<&str>, command: Commands) -> AppResult<Value> {
    let request = || -> AppResult<RequestContext> {
        state.request(user.ok_or_else(|| required("user"))?)
    };
    match command {
        Commands::Household(cmd) => run_household(&request()?, cmd).await,
        Commands::Category(cmd) => run_category(&request()?, cmd).await,
        Commands::Item(cmd) => run_item(&request()?, cmd).await,
        Commands::Dashboard => {
            let ctx = request()?;
            to_json(&dashboard::build(&ctx.pool, &ctx.households, &ctx.user_id, time::now()).await?)
        }
        Commands::Session(SessionCommand::End) => {
            request()?.households.clear();
            Ok(json!({ "active_household_id": null }))
        }
        // Opening the state already applied them.
        Commands::Db(DbCommand::Migrate) => Ok(json!({
            "applied": state.migrated,
            "known": migrate::known_versions(),
        })),
    }
}

fn report_error(err: &AppError) -> i32 {
    match serde_json::to_string(err) {
        Ok(body) => eprintln!("{body}"),
        Err(_) => eprintln!("{err}"),
    }
    err.kind().exit_code()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::resolve(Overrides {
        db: cli.db,
        data_dir: cli.data_dir,
        log: cli.log,
    }) {
        Ok(config) => config,
        Err(err) => {
            let err = AppError::new("CONFIG/INVALID", err.to_string());
            process::exit(report_error(&err));
        }
    };
    needful_lib::init_logging(&config.log_filter);

    let state = match AppState::open(config).await {
        Ok(state) => state,
        Err(err) => process::exit(report_error(&err)),
    };

    let name = cli.command.name();
    let user = cli.user;
    let scope = OpScope::new(name, user.as_deref().unwrap_or(""), None);
    let result = fence_async(name, || run(&state, user.as_deref(), cli.command)).await;
    state.pool.close().await;

    match result {
        Ok(value) => {
            scope.success();
            match serde_json::to_string_pretty(&value) {
                Ok(body) => println!("{body}"),
                Err(err) => process::exit(report_error(&AppError::from(err))),
            }
        }
        Err(err) => {
            scope.fail(&err);
            process::exit(report_error(&err));
        }
    }
}
