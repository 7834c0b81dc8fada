use rust_decimal::Decimal;

use crate::error::VALIDATION_FAILED;
use crate::model::ItemInput;
use crate::{AppError, AppResult};

pub const ITEM_NAME_MAX: usize = 100;
pub const VENDOR_MAX: usize = 100;
pub const NOTES_MAX: usize = 500;
pub const HOUSEHOLD_NAME_MAX: usize = 100;
pub const CATEGORY_NAME_MAX: usize = 50;
pub const PRICE_SCALE_MAX: u32 = 2;

/// Collects every failing field before anything is written, so a caller gets
/// the full list of corrections in one round trip.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<(&'static str, String)>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push((field, message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn required_text(&mut self, field: &'static str, value: &str, max: usize) {
        if value.trim().is_empty() {
            self.add(field, "is required");
        } else {
            self.max_len(field, value, max);
        }
    }

    /// Measured on the trimmed value, which is what gets stored.
    pub fn max_len(&mut self, field: &'static str, value: &str, max: usize) {
        let len = value.trim().chars().count();
        if len > max {
            self.add(field, format!("must be at most {max} characters (got {len})"));
        }
    }

    pub fn optional_text(&mut self, field: &'static str, value: Option<&str>, max: usize) {
        if let Some(value) = value {
            self.max_len(field, value, max);
        }
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        // One entry per field, in first-failure order.
        let mut merged: Vec<(&'static str, String)> = Vec::new();
        for (field, message) in self.errors {
            match merged.iter_mut().find(|(seen, _)| *seen == field) {
                Some((_, joined)) => {
                    joined.push_str("; ");
                    joined.push_str(&message);
                }
                None => merged.push((field, message)),
            }
        }
        let fields: Vec<&str> = merged.iter().map(|(field, _)| *field).collect();
        let message = format!("Invalid input: {}", fields.join(", "));
        Err(AppError::new(VALIDATION_FAILED, message).with_contexts(merged))
    }
}

pub fn check_price(errors: &mut FieldErrors, price: Option<Decimal>) {
    if let Some(price) = price {
        if price.is_sign_negative() && !price.is_zero() {
            errors.add("estimated_price", "must not be negative");
        }
        if price.normalize().scale() > PRICE_SCALE_MAX {
            errors.add(
                "estimated_price",
                format!("must have at most {PRICE_SCALE_MAX} decimal places"),
            );
        }
    }
}

/// Field-level checks for an item payload. Cross-row rules (membership,
/// category household) are checked by the items module.
pub fn check_item(input: &ItemInput) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.required_text("name", &input.name, ITEM_NAME_MAX);
    if input.quantity < 1 {
        errors.add("quantity", "must be at least 1");
    } else if input.quantity > i64::from(i32::MAX) {
        errors.add("quantity", "is too large");
    }
    check_price(&mut errors, input.estimated_price);
    errors.optional_text("vendor", input.vendor.as_deref(), VENDOR_MAX);
    errors.optional_text("notes", input.notes.as_deref(), NOTES_MAX);
    errors
}

pub fn validate_household_name(name: &str) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    errors.required_text("name", name, HOUSEHOLD_NAME_MAX);
    errors.into_result()
}

pub fn validate_category_name(name: &str) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    errors.required_text("name", name, CATEGORY_NAME_MAX);
    errors.into_result()
}
