//! DVLA / MOT History synchronisation for vehicle maintenance records.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::VehicleSyncConfig;
use crate::error::{AppError, AppResult};
use crate::maintenance::{ensure_record, history_rows, FieldChange, MaintenanceChanges};
use crate::models::{DvlaSyncLog, NewDvlaSyncLog, Vehicle, VehicleMaintenance};
use crate::schema::{dvla_sync_log, maintenance_history, vehicle_maintenance, vehicles};
use crate::state::AppState;
use crate::vehicle_data::retry::with_fixed_retries;
use crate::vehicle_data::{
    DvlaVehicle, MotHistory, MotHistoryProvider, ProviderError, VehicleEnquiry,
};

pub const SYNC_HISTORY_COMMENT: &str = "Updated from DVLA/MOT sync";

const STATUS_SUCCESS: &str = "success";
const STATUS_ERROR: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    /// A single vehicle requested from the UI.
    Manual,
    /// Several vehicles requested from the UI.
    Bulk,
    /// Scheduled run through the job queue.
    Automatic,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Bulk => "bulk",
            TriggerType::Automatic => "automatic",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleSyncOutcome {
    pub vehicle_id: Uuid,
    pub reg_number: String,
    pub success: bool,
    pub fields_updated: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<VehicleSyncOutcome>,
}

impl SyncReport {
    fn from_results(results: Vec<VehicleSyncOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

/// The columns a sync would write, computed from provider data.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub changes: MaintenanceChanges,
    pub field_changes: Vec<FieldChange>,
    pub make: Option<String>,
    pub colour: Option<String>,
    pub year_of_manufacture: Option<i32>,
    pub fuel_type: Option<String>,
}

impl SyncPlan {
    pub fn fields_updated(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .field_changes
            .iter()
            .map(|change| change.field_name.to_string())
            .collect();
        if self.make.is_some() {
            fields.push("make".into());
        }
        if self.colour.is_some() {
            fields.push("colour".into());
        }
        fields
    }
}

/// Maps provider data onto maintenance and vehicle columns and keeps only
/// what differs from the stored values.
pub fn plan_sync(
    vehicle: &Vehicle,
    record: Option<&VehicleMaintenance>,
    dvla: &DvlaVehicle,
    mot: Option<&MotHistory>,
) -> SyncPlan {
    let mut changes = MaintenanceChanges::default();

    if let Some(tax_due) = dvla.tax_due_date {
        changes.tax_due_date = Some(Some(tax_due));
    }

    let mot_due = mot
        .and_then(MotHistory::current_expiry)
        .or(dvla.mot_expiry_date);
    if let Some(mot_due) = mot_due {
        changes.mot_due_date = Some(Some(mot_due));
    }

    let stored_mileage = record.and_then(|r| r.current_mileage);
    if let Some(odometer) = mot.and_then(MotHistory::latest_odometer_miles) {
        if stored_mileage.map_or(true, |stored| odometer > stored) {
            changes.current_mileage = Some(Some(odometer));
        }
    }

    let field_changes = changes.retain_changed(record);

    SyncPlan {
        changes,
        field_changes,
        make: fill_if_empty(vehicle.make.as_deref(), dvla.make.as_deref()),
        colour: fill_if_empty(vehicle.colour.as_deref(), dvla.colour.as_deref()),
        year_of_manufacture: vehicle
            .year_of_manufacture
            .is_none()
            .then_some(dvla.year_of_manufacture)
            .flatten(),
        fuel_type: fill_if_empty(vehicle.fuel_type.as_deref(), dvla.fuel_type.as_deref()),
    }
}

fn fill_if_empty(current: Option<&str>, incoming: Option<&str>) -> Option<String> {
    let current_empty = current.map_or(true, |value| value.trim().is_empty());
    match incoming {
        Some(value) if current_empty && !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

/// Provider handles and pacing for one sync run.
#[derive(Clone)]
pub struct VehicleSyncer {
    enquiry: Arc<dyn VehicleEnquiry>,
    mot: Option<Arc<dyn MotHistoryProvider>>,
    settings: VehicleSyncConfig,
}

impl VehicleSyncer {
    pub fn new(
        enquiry: Arc<dyn VehicleEnquiry>,
        mot: Option<Arc<dyn MotHistoryProvider>>,
        settings: VehicleSyncConfig,
    ) -> Self {
        Self {
            enquiry,
            mot,
            settings,
        }
    }

    pub fn from_state(state: &AppState) -> AppResult<Self> {
        let enquiry = state
            .services
            .vehicle_enquiry
            .clone()
            .ok_or_else(|| AppError::unavailable("DVLA API is not configured"))?;
        Ok(Self::new(
            enquiry,
            state.services.mot_history.clone(),
            state.config.vehicle_sync.clone(),
        ))
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.settings.retry_delay_ms)
    }

    /// Syncs vehicles one after another with a fixed pause between them.
    pub async fn sync_vehicles(
        &self,
        state: &AppState,
        targets: Vec<Vehicle>,
        trigger: TriggerType,
        triggered_by: Option<Uuid>,
    ) -> SyncReport {
        let pause = Duration::from_millis(self.settings.delay_between_vehicles_ms);
        let mut results = Vec::with_capacity(targets.len());
        for (index, vehicle) in targets.iter().enumerate() {
            if index > 0 && !pause.is_zero() {
                sleep(pause).await;
            }
            results.push(self.sync_vehicle(state, vehicle, trigger, triggered_by).await);
        }
        let report = SyncReport::from_results(results);
        info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            trigger = trigger.as_str(),
            "vehicle sync finished"
        );
        report
    }

    pub async fn sync_vehicle(
        &self,
        state: &AppState,
        vehicle: &Vehicle,
        trigger: TriggerType,
        triggered_by: Option<Uuid>,
    ) -> VehicleSyncOutcome {
        let dvla = with_fixed_retries(self.settings.max_attempts, self.retry_delay(), || {
            self.enquiry.lookup(&vehicle.reg_number)
        })
        .await;

        let result = match dvla {
            Ok(dvla) => {
                let mot = self.fetch_mot(&vehicle.reg_number).await;
                match state.db() {
                    Ok(mut conn) => apply_success(
                        &mut conn,
                        vehicle,
                        &dvla,
                        mot.as_ref(),
                        trigger,
                        triggered_by,
                    ),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(AppError::bad_request(describe_provider_error(&err))),
        };

        match result {
            Ok(fields_updated) => {
                info!(
                    vehicle_id = %vehicle.id,
                    reg_number = %vehicle.reg_number,
                    fields = fields_updated.len(),
                    "vehicle synced"
                );
                VehicleSyncOutcome {
                    vehicle_id: vehicle.id,
                    reg_number: vehicle.reg_number.clone(),
                    success: true,
                    fields_updated,
                    error: None,
                }
            }
            Err(err) => {
                let message = err.message().to_string();
                warn!(
                    vehicle_id = %vehicle.id,
                    reg_number = %vehicle.reg_number,
                    error = %message,
                    "vehicle sync failed"
                );
                if let Ok(mut conn) = state.db() {
                    if let Err(log_err) =
                        record_failure(&mut conn, vehicle, &message, trigger, triggered_by)
                    {
                        warn!(vehicle_id = %vehicle.id, error = %log_err, "failed to record sync failure");
                    }
                }
                VehicleSyncOutcome {
                    vehicle_id: vehicle.id,
                    reg_number: vehicle.reg_number.clone(),
                    success: false,
                    fields_updated: Vec::new(),
                    error: Some(message),
                }
            }
        }
    }

    /// MOT history is optional: missing configuration, 404 and errors all yield `None`.
    async fn fetch_mot(&self, reg_number: &str) -> Option<MotHistory> {
        let provider = self.mot.as_ref()?;
        match with_fixed_retries(self.settings.max_attempts, self.retry_delay(), || {
            provider.history(reg_number)
        })
        .await
        {
            Ok(history) => Some(history),
            Err(ProviderError::NotFound) => None,
            Err(err) => {
                warn!(reg_number, error = %err, "MOT history unavailable; continuing with DVLA data");
                None
            }
        }
    }
}

fn describe_provider_error(err: &ProviderError) -> String {
    match err {
        ProviderError::NotFound => "vehicle not found in DVLA records".to_string(),
        other => format!("DVLA lookup failed: {other}"),
    }
}

fn apply_success(
    conn: &mut PgConnection,
    vehicle: &Vehicle,
    dvla: &DvlaVehicle,
    mot: Option<&MotHistory>,
    trigger: TriggerType,
    triggered_by: Option<Uuid>,
) -> AppResult<Vec<String>> {
    conn.transaction::<_, AppError, _>(|conn| {
        let record = ensure_record(conn, vehicle.id)?;
        let mut plan = plan_sync(vehicle, Some(&record), dvla, mot);
        let fields_updated = plan.fields_updated();
        let now = Utc::now().naive_utc();

        plan.changes.stamp(now);
        plan.changes.last_dvla_sync = Some(Some(now));
        plan.changes.dvla_sync_status = Some(Some(STATUS_SUCCESS.to_string()));
        plan.changes.dvla_sync_error = Some(None);

        diesel::update(vehicle_maintenance::table.find(record.id))
            .set(&plan.changes)
            .execute(conn)?;

        let history = history_rows(vehicle.id, &plan.field_changes, SYNC_HISTORY_COMMENT, triggered_by);
        if !history.is_empty() {
            diesel::insert_into(maintenance_history::table)
                .values(&history)
                .execute(conn)?;
        }

        if plan.make.is_some()
            || plan.colour.is_some()
            || plan.year_of_manufacture.is_some()
            || plan.fuel_type.is_some()
        {
            diesel::update(vehicles::table.find(vehicle.id))
                .set((
                    vehicles::make.eq(plan.make.clone().or_else(|| vehicle.make.clone())),
                    vehicles::colour.eq(plan.colour.clone().or_else(|| vehicle.colour.clone())),
                    vehicles::year_of_manufacture
                        .eq(plan.year_of_manufacture.or(vehicle.year_of_manufacture)),
                    vehicles::fuel_type
                        .eq(plan.fuel_type.clone().or_else(|| vehicle.fuel_type.clone())),
                    vehicles::updated_at.eq(now),
                ))
                .execute(conn)?;
        }

        let new_mileage = plan.changes.current_mileage.flatten();
        let log = NewDvlaSyncLog {
            id: Uuid::new_v4(),
            vehicle_id: vehicle.id,
            reg_number: vehicle.reg_number.clone(),
            sync_status: STATUS_SUCCESS.to_string(),
            trigger_type: trigger.as_str().to_string(),
            fields_updated: fields_updated.clone(),
            tax_due_date_old: record.tax_due_date,
            tax_due_date_new: plan.changes.tax_due_date.flatten().or(record.tax_due_date),
            mot_due_date_old: record.mot_due_date,
            mot_due_date_new: plan.changes.mot_due_date.flatten().or(record.mot_due_date),
            mileage_old: record.current_mileage,
            mileage_new: new_mileage.or(record.current_mileage),
            error_message: None,
            api_response: Some(json!({ "dvla": dvla, "mot": mot })),
            triggered_by,
        };
        diesel::insert_into(dvla_sync_log::table)
            .values(&log)
            .execute(conn)?;

        Ok(fields_updated)
    })
}

fn record_failure(
    conn: &mut PgConnection,
    vehicle: &Vehicle,
    message: &str,
    trigger: TriggerType,
    triggered_by: Option<Uuid>,
) -> AppResult<()> {
    conn.transaction::<_, AppError, _>(|conn| {
        let record = ensure_record(conn, vehicle.id)?;
        let now = Utc::now().naive_utc();
        diesel::update(vehicle_maintenance::table.find(record.id))
            .set((
                vehicle_maintenance::last_dvla_sync.eq(Some(now)),
                vehicle_maintenance::dvla_sync_status.eq(Some(STATUS_ERROR)),
                vehicle_maintenance::dvla_sync_error.eq(Some(message)),
                vehicle_maintenance::updated_at.eq(now),
            ))
            .execute(conn)?;

        let log = NewDvlaSyncLog {
            id: Uuid::new_v4(),
            vehicle_id: vehicle.id,
            reg_number: vehicle.reg_number.clone(),
            sync_status: STATUS_ERROR.to_string(),
            trigger_type: trigger.as_str().to_string(),
            fields_updated: Vec::new(),
            tax_due_date_old: record.tax_due_date,
            tax_due_date_new: None,
            mot_due_date_old: record.mot_due_date,
            mot_due_date_new: None,
            mileage_old: record.current_mileage,
            mileage_new: None,
            error_message: Some(message.to_string()),
            api_response: None,
            triggered_by,
        };
        diesel::insert_into(dvla_sync_log::table)
            .values(&log)
            .execute(conn)?;
        Ok(())
    })
}

/// Active vehicles, or the requested subset of them.
pub fn load_targets(conn: &mut PgConnection, vehicle_ids: &[Uuid]) -> QueryResult<Vec<Vehicle>> {
    let mut query = vehicles::table
        .filter(vehicles::status.eq("active"))
        .order(vehicles::reg_number.asc())
        .into_boxed();
    if !vehicle_ids.is_empty() {
        query = query.filter(vehicles::id.eq_any(vehicle_ids.to_vec()));
    }
    query.load(conn)
}

pub fn recent_log(
    conn: &mut PgConnection,
    vehicle_id: Uuid,
    limit: i64,
) -> QueryResult<Vec<DvlaSyncLog>> {
    dvla_sync_log::table
        .filter(dvla_sync_log::vehicle_id.eq(vehicle_id))
        .order(dvla_sync_log::created_at.desc())
        .limit(limit)
        .load(conn)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::vehicle_data::MotTest;

    fn vehicle() -> Vehicle {
        let now = Utc::now().naive_utc();
        Vehicle {
            id: Uuid::new_v4(),
            reg_number: "BG21 EXH".into(),
            nickname: None,
            category: "van".into(),
            status: "active".into(),
            make: None,
            model: Some("Transit".into()),
            colour: Some("Blue".into()),
            year_of_manufacture: None,
            fuel_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn record(mileage: Option<i32>) -> VehicleMaintenance {
        let now = Utc::now().naive_utc();
        VehicleMaintenance {
            id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            current_mileage: mileage,
            last_mileage_update: None,
            tax_due_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            mot_due_date: None,
            first_aid_kit_expiry: None,
            last_service_mileage: None,
            next_service_mileage: None,
            cambelt_due_mileage: None,
            current_hours: None,
            next_service_hours: None,
            notes: None,
            last_dvla_sync: None,
            dvla_sync_status: None,
            dvla_sync_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn dvla() -> DvlaVehicle {
        DvlaVehicle {
            registration_number: "BG21EXH".into(),
            tax_status: Some("Taxed".into()),
            tax_due_date: NaiveDate::from_ymd_opt(2026, 1, 1),
            mot_status: Some("Valid".into()),
            mot_expiry_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            make: Some("FORD".into()),
            colour: Some("WHITE".into()),
            year_of_manufacture: Some(2021),
            fuel_type: Some("DIESEL".into()),
        }
    }

    fn mot(odometer: &str, unit: &str) -> MotHistory {
        MotHistory {
            registration: "BG21EXH".into(),
            mot_tests: vec![MotTest {
                completed_date: "2025-05-30T10:00:00.000Z".into(),
                test_result: "PASSED".into(),
                expiry_date: NaiveDate::from_ymd_opt(2026, 5, 29),
                odometer_value: Some(odometer.into()),
                odometer_unit: Some(unit.into()),
            }],
            mot_test_due_date: None,
        }
    }

    #[test]
    fn mot_history_expiry_takes_precedence() {
        let stored = record(Some(40_000));
        let plan = plan_sync(&vehicle(), Some(&stored), &dvla(), Some(&mot("45000", "MI")));
        assert_eq!(
            plan.changes.mot_due_date,
            Some(NaiveDate::from_ymd_opt(2026, 5, 29))
        );
        assert_eq!(plan.changes.current_mileage, Some(Some(45_000)));
        assert_eq!(
            plan.fields_updated(),
            vec!["current_mileage", "tax_due_date", "mot_due_date", "make"]
        );
    }

    #[test]
    fn falls_back_to_dvla_mot_expiry_without_history() {
        let plan = plan_sync(&vehicle(), Some(&record(None)), &dvla(), None);
        assert_eq!(
            plan.changes.mot_due_date,
            Some(NaiveDate::from_ymd_opt(2025, 6, 1))
        );
        assert!(plan.changes.current_mileage.is_none());
    }

    #[test]
    fn mileage_never_decreases() {
        let plan = plan_sync(
            &vehicle(),
            Some(&record(Some(60_000))),
            &dvla(),
            Some(&mot("45000", "MI")),
        );
        assert!(plan.changes.current_mileage.is_none());
    }

    #[test]
    fn kilometre_odometer_is_ignored() {
        let plan = plan_sync(
            &vehicle(),
            Some(&record(Some(1_000))),
            &dvla(),
            Some(&mot("90000", "KM")),
        );
        assert!(plan.changes.current_mileage.is_none());
    }

    #[test]
    fn only_empty_vehicle_fields_are_filled() {
        let plan = plan_sync(&vehicle(), None, &dvla(), None);
        assert_eq!(plan.make.as_deref(), Some("FORD"));
        assert_eq!(plan.colour, None);
        assert_eq!(plan.year_of_manufacture, Some(2021));
        assert_eq!(plan.fuel_type.as_deref(), Some("DIESEL"));
    }

    #[test]
    fn unchanged_data_produces_no_field_changes() {
        let mut stored = record(Some(45_000));
        stored.tax_due_date = NaiveDate::from_ymd_opt(2026, 1, 1);
        stored.mot_due_date = NaiveDate::from_ymd_opt(2026, 5, 29);
        let mut vehicle = vehicle();
        vehicle.make = Some("Ford".into());
        let plan = plan_sync(&vehicle, Some(&stored), &dvla(), Some(&mot("45000", "MI")));
        assert!(plan.field_changes.is_empty());
        assert!(plan.fields_updated().is_empty());
    }

    #[test]
    fn report_counts() {
        let outcome = |success| VehicleSyncOutcome {
            vehicle_id: Uuid::new_v4(),
            reg_number: "X".into(),
            success,
            fields_updated: Vec::new(),
            error: None,
        };
        let report = SyncReport::from_results(vec![outcome(true), outcome(false), outcome(true)]);
        assert_eq!((report.total, report.successful, report.failed), (3, 2, 1));
    }
}
