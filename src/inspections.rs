//! Inspection checklist rules and the defects they raise.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{InspectionItem, NewInspectionItem};

pub const ITEM_OK: &str = "ok";
pub const ITEM_ATTENTION: &str = "attention";
pub const ITEM_NOT_APPLICABLE: &str = "na";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("inspection_end_date cannot be before inspection_date")]
    EndBeforeStart,
    #[error("item {0}: day_of_week must be between 1 and 7")]
    DayOutOfRange(i32),
    #[error("item {0}: item_number must be positive")]
    BadItemNumber(i32),
    #[error("item {0}: description is required")]
    MissingDescription(i32),
    #[error("item {0}: unknown status '{1}'")]
    UnknownStatus(i32, String),
    #[error("item {0}: a comment is required when attention is needed")]
    MissingComment(i32),
    #[error("item {0} is listed twice for day {1}")]
    Duplicate(i32, i32),
    #[error("current_mileage cannot be negative")]
    NegativeMileage,
}

impl From<ItemError> for AppError {
    fn from(value: ItemError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemInput {
    pub item_number: i32,
    pub item_description: String,
    pub day_of_week: i32,
    pub status: String,
    pub comments: Option<String>,
}

pub fn validate_header(
    inspection_date: NaiveDate,
    end_date: Option<NaiveDate>,
    current_mileage: Option<i32>,
) -> Result<(), ItemError> {
    if end_date.is_some_and(|end| end < inspection_date) {
        return Err(ItemError::EndBeforeStart);
    }
    if current_mileage.is_some_and(|miles| miles < 0) {
        return Err(ItemError::NegativeMileage);
    }
    Ok(())
}

pub fn build_items(
    inspection_id: Uuid,
    inputs: &[ItemInput],
) -> Result<Vec<NewInspectionItem>, ItemError> {
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        let number = input.item_number;
        if number <= 0 {
            return Err(ItemError::BadItemNumber(number));
        }
        if !(1..=7).contains(&input.day_of_week) {
            return Err(ItemError::DayOutOfRange(number));
        }
        if !seen.insert((number, input.day_of_week)) {
            return Err(ItemError::Duplicate(number, input.day_of_week));
        }
        let description = input.item_description.trim();
        if description.is_empty() {
            return Err(ItemError::MissingDescription(number));
        }
        let status = input.status.trim().to_ascii_lowercase();
        if !matches!(status.as_str(), ITEM_OK | ITEM_ATTENTION | ITEM_NOT_APPLICABLE) {
            return Err(ItemError::UnknownStatus(number, input.status.clone()));
        }
        let comments = input
            .comments
            .as_ref()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if status == ITEM_ATTENTION && comments.is_none() {
            return Err(ItemError::MissingComment(number));
        }
        items.push(NewInspectionItem {
            id: Uuid::new_v4(),
            inspection_id,
            item_number: number,
            item_description: description.to_string(),
            day_of_week: input.day_of_week,
            status,
            comments,
        });
    }
    items.sort_by_key(|item| (item.day_of_week, item.item_number));
    Ok(items)
}

/// Items flagged for attention become workshop defects.
pub fn defects(items: &[InspectionItem]) -> impl Iterator<Item = &InspectionItem> {
    items.iter().filter(|item| item.status == ITEM_ATTENTION)
}

pub fn defect_title(reg_number: &str, item: &InspectionItem) -> String {
    let title = format!("{reg_number}: {}", item.item_description);
    title.chars().take(255).collect()
}
