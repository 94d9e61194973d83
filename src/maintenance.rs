//! Maintenance status calculation and change tracking for `vehicle_maintenance`.
//!
//! Status rules:
//! * dates: overdue when the due date has passed, due soon when it falls
//!   within the category threshold (inclusive), otherwise ok;
//! * mileage and engine hours: the same against the current reading, and
//!   not set when either reading is missing.

use std::collections::HashMap;
use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    MaintenanceCategory, NewMaintenanceHistory, NewVehicleMaintenance, VehicleMaintenance,
};
use crate::schema::vehicle_maintenance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    NotSet,
    Ok,
    DueSoon,
    Overdue,
}

impl MaintenanceStatus {
    pub fn needs_attention(self) -> bool {
        matches!(self, MaintenanceStatus::DueSoon | MaintenanceStatus::Overdue)
    }
}

pub fn date_status(due: Option<NaiveDate>, today: NaiveDate, threshold_days: i32) -> MaintenanceStatus {
    let Some(due) = due else {
        return MaintenanceStatus::NotSet;
    };
    if due < today {
        return MaintenanceStatus::Overdue;
    }
    if (due - today).num_days() <= i64::from(threshold_days) {
        MaintenanceStatus::DueSoon
    } else {
        MaintenanceStatus::Ok
    }
}

pub fn mileage_status(due: Option<i32>, current: Option<i32>, threshold: i32) -> MaintenanceStatus {
    counter_status(due, current, threshold)
}

pub fn hours_status(due: Option<i32>, current: Option<i32>, threshold: i32) -> MaintenanceStatus {
    counter_status(due, current, threshold)
}

fn counter_status(due: Option<i32>, current: Option<i32>, threshold: i32) -> MaintenanceStatus {
    let (Some(due), Some(current)) = (due, current) else {
        return MaintenanceStatus::NotSet;
    };
    if due < current {
        return MaintenanceStatus::Overdue;
    }
    if i64::from(due) - i64::from(current) <= i64::from(threshold) {
        MaintenanceStatus::DueSoon
    } else {
        MaintenanceStatus::Ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Date,
    Mileage,
    Hours,
}

impl ItemKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "date" => Some(ItemKind::Date),
            "mileage" => Some(ItemKind::Mileage),
            "hours" => Some(ItemKind::Hours),
            _ => None,
        }
    }
}

pub struct TrackedField {
    pub field_name: &'static str,
    pub label: &'static str,
    pub kind: ItemKind,
    pub default_threshold: i32,
}

/// Maintenance fields that carry a due status, with the thresholds used
/// when no category row overrides them.
pub const TRACKED_FIELDS: [TrackedField; 6] = [
    TrackedField {
        field_name: "tax_due_date",
        label: "Tax",
        kind: ItemKind::Date,
        default_threshold: 30,
    },
    TrackedField {
        field_name: "mot_due_date",
        label: "MOT",
        kind: ItemKind::Date,
        default_threshold: 30,
    },
    TrackedField {
        field_name: "first_aid_kit_expiry",
        label: "First Aid Kit",
        kind: ItemKind::Date,
        default_threshold: 30,
    },
    TrackedField {
        field_name: "next_service_mileage",
        label: "Service",
        kind: ItemKind::Mileage,
        default_threshold: 1000,
    },
    TrackedField {
        field_name: "cambelt_due_mileage",
        label: "Cambelt",
        kind: ItemKind::Mileage,
        default_threshold: 5000,
    },
    TrackedField {
        field_name: "next_service_hours",
        label: "Service (Hours)",
        kind: ItemKind::Hours,
        default_threshold: 50,
    },
];

/// Category names and alert thresholds keyed by maintenance field.
#[derive(Debug, Clone, Default)]
pub struct Thresholds {
    by_field: HashMap<String, (String, i32)>,
}

impl Thresholds {
    pub fn from_categories(categories: &[MaintenanceCategory]) -> Self {
        let by_field = categories
            .iter()
            .map(|category| {
                (
                    category.field_name.clone(),
                    (category.name.clone(), category.alert_threshold),
                )
            })
            .collect();
        Self { by_field }
    }

    fn lookup(&self, field: &TrackedField) -> (String, i32) {
        self.by_field
            .get(field.field_name)
            .cloned()
            .unwrap_or_else(|| (field.label.to_string(), field.default_threshold))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceItem {
    pub field_name: &'static str,
    pub name: String,
    pub kind: ItemKind,
    pub status: MaintenanceStatus,
    pub threshold: i32,
    pub due_date: Option<NaiveDate>,
    pub due_value: Option<i32>,
    pub current_value: Option<i32>,
    /// Days, miles or hours left; negative once overdue.
    pub remaining: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceSummary {
    pub overall_status: MaintenanceStatus,
    pub items: Vec<MaintenanceItem>,
}

impl MaintenanceSummary {
    pub fn alerts(&self) -> impl Iterator<Item = &MaintenanceItem> {
        self.items.iter().filter(|item| item.status.needs_attention())
    }
}

pub fn summarize(
    record: Option<&VehicleMaintenance>,
    thresholds: &Thresholds,
    today: NaiveDate,
) -> MaintenanceSummary {
    let items: Vec<MaintenanceItem> = TRACKED_FIELDS
        .iter()
        .map(|field| {
            let (name, threshold) = thresholds.lookup(field);
            match field.kind {
                ItemKind::Date => {
                    let due = record.and_then(|r| date_field(r, field.field_name));
                    MaintenanceItem {
                        field_name: field.field_name,
                        name,
                        kind: field.kind,
                        status: date_status(due, today, threshold),
                        threshold,
                        due_date: due,
                        due_value: None,
                        current_value: None,
                        remaining: due.map(|due| (due - today).num_days()),
                    }
                }
                ItemKind::Mileage | ItemKind::Hours => {
                    let (due, current) = record
                        .map(|r| counter_field(r, field.field_name))
                        .unwrap_or((None, None));
                    let status = if field.kind == ItemKind::Mileage {
                        mileage_status(due, current, threshold)
                    } else {
                        hours_status(due, current, threshold)
                    };
                    MaintenanceItem {
                        field_name: field.field_name,
                        name,
                        kind: field.kind,
                        status,
                        threshold,
                        due_date: None,
                        due_value: due,
                        current_value: current,
                        remaining: due
                            .zip(current)
                            .map(|(due, current)| i64::from(due) - i64::from(current)),
                    }
                }
            }
        })
        .collect();

    let overall_status = items
        .iter()
        .map(|item| item.status)
        .max()
        .unwrap_or(MaintenanceStatus::NotSet);

    MaintenanceSummary {
        overall_status,
        items,
    }
}

fn date_field(record: &VehicleMaintenance, field: &str) -> Option<NaiveDate> {
    match field {
        "tax_due_date" => record.tax_due_date,
        "mot_due_date" => record.mot_due_date,
        "first_aid_kit_expiry" => record.first_aid_kit_expiry,
        _ => None,
    }
}

fn counter_field(record: &VehicleMaintenance, field: &str) -> (Option<i32>, Option<i32>) {
    match field {
        "next_service_mileage" => (record.next_service_mileage, record.current_mileage),
        "cambelt_due_mileage" => (record.cambelt_due_mileage, record.current_mileage),
        "next_service_hours" => (record.next_service_hours, record.current_hours),
        _ => (None, None),
    }
}

/// Pending edits to a maintenance record. `None` leaves a column alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = vehicle_maintenance)]
pub struct MaintenanceChanges {
    pub current_mileage: Option<Option<i32>>,
    pub tax_due_date: Option<Option<NaiveDate>>,
    pub mot_due_date: Option<Option<NaiveDate>>,
    pub first_aid_kit_expiry: Option<Option<NaiveDate>>,
    pub last_service_mileage: Option<Option<i32>>,
    pub next_service_mileage: Option<Option<i32>>,
    pub cambelt_due_mileage: Option<Option<i32>>,
    pub current_hours: Option<Option<i32>>,
    pub next_service_hours: Option<Option<i32>>,
    pub notes: Option<Option<String>>,
    pub last_mileage_update: Option<Option<NaiveDateTime>>,
    pub last_dvla_sync: Option<Option<NaiveDateTime>>,
    pub dvla_sync_status: Option<Option<String>>,
    pub dvla_sync_error: Option<Option<String>>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field_name: &'static str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub value_type: &'static str,
}

impl MaintenanceChanges {
    /// Drops edits that match the stored values and describes the rest.
    pub fn retain_changed(&mut self, current: Option<&VehicleMaintenance>) -> Vec<FieldChange> {
        let mut out = Vec::new();
        retain(
            &mut self.current_mileage,
            current.and_then(|r| r.current_mileage),
            "current_mileage",
            "mileage",
            &mut out,
        );
        retain(
            &mut self.tax_due_date,
            current.and_then(|r| r.tax_due_date),
            "tax_due_date",
            "date",
            &mut out,
        );
        retain(
            &mut self.mot_due_date,
            current.and_then(|r| r.mot_due_date),
            "mot_due_date",
            "date",
            &mut out,
        );
        retain(
            &mut self.first_aid_kit_expiry,
            current.and_then(|r| r.first_aid_kit_expiry),
            "first_aid_kit_expiry",
            "date",
            &mut out,
        );
        retain(
            &mut self.last_service_mileage,
            current.and_then(|r| r.last_service_mileage),
            "last_service_mileage",
            "mileage",
            &mut out,
        );
        retain(
            &mut self.next_service_mileage,
            current.and_then(|r| r.next_service_mileage),
            "next_service_mileage",
            "mileage",
            &mut out,
        );
        retain(
            &mut self.cambelt_due_mileage,
            current.and_then(|r| r.cambelt_due_mileage),
            "cambelt_due_mileage",
            "mileage",
            &mut out,
        );
        retain(
            &mut self.current_hours,
            current.and_then(|r| r.current_hours),
            "current_hours",
            "hours",
            &mut out,
        );
        retain(
            &mut self.next_service_hours,
            current.and_then(|r| r.next_service_hours),
            "next_service_hours",
            "hours",
            &mut out,
        );
        retain(
            &mut self.notes,
            current.and_then(|r| r.notes.clone()),
            "notes",
            "text",
            &mut out,
        );
        out
    }

    /// Stamps bookkeeping columns; call after `retain_changed`.
    pub fn stamp(&mut self, now: NaiveDateTime) {
        if self.current_mileage.is_some() {
            self.last_mileage_update = Some(Some(now));
        }
        self.updated_at = Some(now);
    }
}

fn retain<T: Clone + PartialEq + Display>(
    slot: &mut Option<Option<T>>,
    stored: Option<T>,
    field_name: &'static str,
    value_type: &'static str,
    out: &mut Vec<FieldChange>,
) {
    let Some(new_value) = slot.as_ref() else {
        return;
    };
    if *new_value == stored {
        *slot = None;
        return;
    }
    out.push(FieldChange {
        field_name,
        old_value: stored.map(|value| value.to_string()),
        new_value: new_value.as_ref().map(|value| value.to_string()),
        value_type,
    });
}

/// Loads the maintenance record for a vehicle, creating an empty one first if needed.
pub fn ensure_record(conn: &mut PgConnection, vehicle_id: Uuid) -> QueryResult<VehicleMaintenance> {
    diesel::insert_into(vehicle_maintenance::table)
        .values(&NewVehicleMaintenance {
            id: Uuid::new_v4(),
            vehicle_id,
        })
        .on_conflict(vehicle_maintenance::vehicle_id)
        .do_nothing()
        .execute(conn)?;

    vehicle_maintenance::table
        .filter(vehicle_maintenance::vehicle_id.eq(vehicle_id))
        .first(conn)
}

pub fn history_rows(
    vehicle_id: Uuid,
    changes: &[FieldChange],
    comment: &str,
    updated_by: Option<Uuid>,
) -> Vec<NewMaintenanceHistory> {
    changes
        .iter()
        .map(|change| NewMaintenanceHistory {
            id: Uuid::new_v4(),
            vehicle_id,
            field_name: change.field_name.to_string(),
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
            value_type: change.value_type.to_string(),
            comment: comment.to_string(),
            updated_by,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn record() -> VehicleMaintenance {
        let now = today().and_hms_opt(9, 0, 0).unwrap();
        VehicleMaintenance {
            id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            current_mileage: Some(50_000),
            last_mileage_update: None,
            tax_due_date: Some(today() + Duration::days(10)),
            mot_due_date: Some(today() - Duration::days(1)),
            first_aid_kit_expiry: None,
            last_service_mileage: None,
            next_service_mileage: Some(60_000),
            cambelt_due_mileage: Some(52_000),
            current_hours: None,
            next_service_hours: Some(400),
            notes: None,
            last_dvla_sync: None,
            dvla_sync_status: None,
            dvla_sync_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn date_threshold_boundaries() {
        let due = |days| Some(today() + Duration::days(days));
        assert_eq!(date_status(due(29), today(), 30), MaintenanceStatus::DueSoon);
        assert_eq!(date_status(due(30), today(), 30), MaintenanceStatus::DueSoon);
        assert_eq!(date_status(due(31), today(), 30), MaintenanceStatus::Ok);
        assert_eq!(date_status(due(0), today(), 30), MaintenanceStatus::DueSoon);
        assert_eq!(date_status(due(-1), today(), 30), MaintenanceStatus::Overdue);
        assert_eq!(date_status(None, today(), 30), MaintenanceStatus::NotSet);
    }

    #[test]
    fn mileage_requires_both_readings() {
        assert_eq!(mileage_status(Some(60_000), None, 1000), MaintenanceStatus::NotSet);
        assert_eq!(mileage_status(None, Some(50_000), 1000), MaintenanceStatus::NotSet);
    }

    #[test]
    fn mileage_thresholds() {
        assert_eq!(mileage_status(Some(51_000), Some(50_000), 1000), MaintenanceStatus::DueSoon);
        assert_eq!(mileage_status(Some(51_001), Some(50_000), 1000), MaintenanceStatus::Ok);
        assert_eq!(mileage_status(Some(50_000), Some(50_000), 1000), MaintenanceStatus::DueSoon);
        assert_eq!(mileage_status(Some(49_999), Some(50_000), 1000), MaintenanceStatus::Overdue);
    }

    #[test]
    fn hours_follow_counter_rules() {
        assert_eq!(hours_status(Some(400), Some(360), 50), MaintenanceStatus::DueSoon);
        assert_eq!(hours_status(Some(400), Some(300), 50), MaintenanceStatus::Ok);
        assert_eq!(hours_status(Some(400), Some(401), 50), MaintenanceStatus::Overdue);
    }

    #[test]
    fn summary_reports_worst_status() {
        let summary = summarize(Some(&record()), &Thresholds::default(), today());
        assert_eq!(summary.overall_status, MaintenanceStatus::Overdue);

        let by_field: HashMap<_, _> = summary
            .items
            .iter()
            .map(|item| (item.field_name, item.status))
            .collect();
        assert_eq!(by_field["tax_due_date"], MaintenanceStatus::DueSoon);
        assert_eq!(by_field["mot_due_date"], MaintenanceStatus::Overdue);
        assert_eq!(by_field["first_aid_kit_expiry"], MaintenanceStatus::NotSet);
        assert_eq!(by_field["next_service_mileage"], MaintenanceStatus::Ok);
        assert_eq!(by_field["cambelt_due_mileage"], MaintenanceStatus::DueSoon);
        assert_eq!(by_field["next_service_hours"], MaintenanceStatus::NotSet);
        assert_eq!(summary.alerts().count(), 3);
    }

    #[test]
    fn category_thresholds_override_defaults() {
        let now = today().and_hms_opt(0, 0, 0).unwrap();
        let categories = vec![MaintenanceCategory {
            id: Uuid::new_v4(),
            name: "Road Tax".into(),
            kind: "date".into(),
            field_name: "tax_due_date".into(),
            alert_threshold: 7,
            description: None,
            created_at: now,
            updated_at: now,
        }];
        let summary = summarize(
            Some(&record()),
            &Thresholds::from_categories(&categories),
            today(),
        );
        let tax = summary
            .items
            .iter()
            .find(|item| item.field_name == "tax_due_date")
            .unwrap();
        assert_eq!(tax.name, "Road Tax");
        assert_eq!(tax.status, MaintenanceStatus::Ok);
        assert_eq!(tax.remaining, Some(10));
    }

    #[test]
    fn empty_record_is_not_set() {
        let summary = summarize(None, &Thresholds::default(), today());
        assert_eq!(summary.overall_status, MaintenanceStatus::NotSet);
        assert_eq!(summary.items.len(), TRACKED_FIELDS.len());
    }

    #[test]
    fn unchanged_fields_are_dropped() {
        let stored = record();
        let mut changes = MaintenanceChanges {
            current_mileage: Some(Some(50_000)),
            tax_due_date: Some(Some(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap())),
            mot_due_date: Some(None),
            ..Default::default()
        };
        let diff = changes.retain_changed(Some(&stored));

        assert!(changes.current_mileage.is_none());
        assert_eq!(diff.len(), 2);
        assert_eq!(diff[0].field_name, "tax_due_date");
        assert_eq!(diff[0].old_value.as_deref(), Some("2025-03-11"));
        assert_eq!(diff[0].new_value.as_deref(), Some("2025-04-01"));
        assert_eq!(diff[1].field_name, "mot_due_date");
        assert_eq!(diff[1].new_value, None);
    }

    #[test]
    fn stamp_marks_mileage_updates() {
        let now = today().and_hms_opt(12, 0, 0).unwrap();
        let mut changes = MaintenanceChanges {
            current_mileage: Some(Some(1)),
            ..Default::default()
        };
        changes.stamp(now);
        assert_eq!(changes.last_mileage_update, Some(Some(now)));
        assert_eq!(changes.updated_at, Some(now));
    }
}
