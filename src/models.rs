use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = vehicles)]
pub struct Vehicle {
    pub id: Uuid,
    pub reg_number: String,
    pub nickname: Option<String>,
    pub category: String,
    pub status: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub colour: Option<String>,
    pub year_of_manufacture: Option<i32>,
    pub fuel_type: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vehicles)]
pub struct NewVehicle {
    pub id: Uuid,
    pub reg_number: String,
    pub nickname: Option<String>,
    pub category: String,
    pub status: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub colour: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = maintenance_categories)]
pub struct MaintenanceCategory {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub field_name: String,
    pub alert_threshold: i32,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = vehicle_maintenance)]
#[diesel(belongs_to(Vehicle))]
pub struct VehicleMaintenance {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub current_mileage: Option<i32>,
    pub last_mileage_update: Option<NaiveDateTime>,
    pub tax_due_date: Option<NaiveDate>,
    pub mot_due_date: Option<NaiveDate>,
    pub first_aid_kit_expiry: Option<NaiveDate>,
    pub last_service_mileage: Option<i32>,
    pub next_service_mileage: Option<i32>,
    pub cambelt_due_mileage: Option<i32>,
    pub current_hours: Option<i32>,
    pub next_service_hours: Option<i32>,
    pub notes: Option<String>,
    pub last_dvla_sync: Option<NaiveDateTime>,
    pub dvla_sync_status: Option<String>,
    pub dvla_sync_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vehicle_maintenance)]
pub struct NewVehicleMaintenance {
    pub id: Uuid,
    pub vehicle_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = maintenance_history)]
pub struct MaintenanceHistory {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub value_type: String,
    pub comment: String,
    pub updated_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = maintenance_history)]
pub struct NewMaintenanceHistory {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub value_type: String,
    pub comment: String,
    pub updated_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = dvla_sync_log)]
pub struct DvlaSyncLog {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub reg_number: String,
    pub sync_status: String,
    pub trigger_type: String,
    pub fields_updated: Vec<String>,
    pub tax_due_date_old: Option<NaiveDate>,
    pub tax_due_date_new: Option<NaiveDate>,
    pub mot_due_date_old: Option<NaiveDate>,
    pub mot_due_date_new: Option<NaiveDate>,
    pub mileage_old: Option<i32>,
    pub mileage_new: Option<i32>,
    pub error_message: Option<String>,
    pub api_response: Option<serde_json::Value>,
    pub triggered_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = dvla_sync_log)]
pub struct NewDvlaSyncLog {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub reg_number: String,
    pub sync_status: String,
    pub trigger_type: String,
    pub fields_updated: Vec<String>,
    pub tax_due_date_old: Option<NaiveDate>,
    pub tax_due_date_new: Option<NaiveDate>,
    pub mot_due_date_old: Option<NaiveDate>,
    pub mot_due_date_new: Option<NaiveDate>,
    pub mileage_old: Option<i32>,
    pub mileage_new: Option<i32>,
    pub error_message: Option<String>,
    pub api_response: Option<serde_json::Value>,
    pub triggered_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = vehicle_inspections)]
pub struct VehicleInspection {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub user_id: Uuid,
    pub inspection_date: NaiveDate,
    pub inspection_end_date: Option<NaiveDate>,
    pub current_mileage: Option<i32>,
    pub status: String,
    pub submitted_at: Option<NaiveDateTime>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub manager_comments: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vehicle_inspections)]
pub struct NewVehicleInspection {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub user_id: Uuid,
    pub inspection_date: NaiveDate,
    pub inspection_end_date: Option<NaiveDate>,
    pub current_mileage: Option<i32>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = inspection_items)]
#[diesel(belongs_to(VehicleInspection, foreign_key = inspection_id))]
pub struct InspectionItem {
    pub id: Uuid,
    pub inspection_id: Uuid,
    pub item_number: i32,
    pub item_description: String,
    pub day_of_week: i32,
    pub status: String,
    pub comments: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = inspection_items)]
pub struct NewInspectionItem {
    pub id: Uuid,
    pub inspection_id: Uuid,
    pub item_number: i32,
    pub item_description: String,
    pub day_of_week: i32,
    pub status: String,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = workshop_task_categories)]
pub struct WorkshopTaskCategory {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub color: Option<String>,
    pub sort_order: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = workshop_task_categories)]
pub struct NewWorkshopTaskCategory {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub color: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = workshop_tasks)]
pub struct WorkshopTask {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub inspection_id: Option<Uuid>,
    pub inspection_item_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub current_mileage: Option<i32>,
    pub created_by: Uuid,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = workshop_tasks)]
pub struct NewWorkshopTask {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub inspection_id: Option<Uuid>,
    pub inspection_item_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub current_mileage: Option<i32>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = workshop_task_comments)]
pub struct WorkshopTaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = workshop_task_comments)]
pub struct NewWorkshopTaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = timesheets)]
pub struct Timesheet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub week_ending: NaiveDate,
    pub reg_number: Option<String>,
    pub status: String,
    pub submitted_at: Option<NaiveDateTime>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub manager_comments: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = timesheets)]
pub struct NewTimesheet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub week_ending: NaiveDate,
    pub reg_number: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = timesheet_entries)]
#[diesel(belongs_to(Timesheet))]
pub struct TimesheetEntry {
    pub id: Uuid,
    pub timesheet_id: Uuid,
    pub day_of_week: i32,
    pub time_started: Option<NaiveTime>,
    pub time_finished: Option<NaiveTime>,
    pub working_in_yard: bool,
    pub did_not_work: bool,
    pub daily_total_minutes: i32,
    pub remarks: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = timesheet_entries)]
pub struct NewTimesheetEntry {
    pub id: Uuid,
    pub timesheet_id: Uuid,
    pub day_of_week: i32,
    pub time_started: Option<NaiveTime>,
    pub time_finished: Option<NaiveTime>,
    pub working_in_yard: bool,
    pub did_not_work: bool,
    pub daily_total_minutes: i32,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = rams_documents)]
pub struct RamsDocument {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub s3_key: String,
    pub uploaded_by: Uuid,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = rams_documents)]
pub struct NewRamsDocument {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub s3_key: String,
    pub uploaded_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = rams_assignments)]
#[diesel(belongs_to(RamsDocument))]
pub struct RamsAssignment {
    pub id: Uuid,
    pub rams_document_id: Uuid,
    pub employee_id: Uuid,
    pub status: String,
    pub assigned_at: NaiveDateTime,
    pub assigned_by: Option<Uuid>,
    pub read_at: Option<NaiveDateTime>,
    pub signed_at: Option<NaiveDateTime>,
    pub signature_data: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = rams_assignments)]
pub struct NewRamsAssignment {
    pub id: Uuid,
    pub rams_document_id: Uuid,
    pub employee_id: Uuid,
    pub status: String,
    pub assigned_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = rams_visitor_signatures)]
pub struct RamsVisitorSignature {
    pub id: Uuid,
    pub rams_document_id: Uuid,
    pub visitor_name: String,
    pub visitor_company: Option<String>,
    pub visitor_role: Option<String>,
    pub signature_data: String,
    pub recorded_by: Uuid,
    pub signed_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = rams_visitor_signatures)]
pub struct NewRamsVisitorSignature {
    pub id: Uuid,
    pub rams_document_id: Uuid,
    pub visitor_name: String,
    pub visitor_company: Option<String>,
    pub visitor_role: Option<String>,
    pub signature_data: String,
    pub recorded_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub message_type: String,
    pub subject: String,
    pub body: String,
    pub priority: String,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: Uuid,
    pub message_type: String,
    pub subject: String,
    pub body: String,
    pub priority: String,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = message_recipients)]
pub struct MessageRecipient {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub read_at: Option<NaiveDateTime>,
    pub signed_at: Option<NaiveDateTime>,
    pub signature_data: Option<String>,
    pub dismissed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = message_recipients)]
pub struct NewMessageRecipient {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = error_reports)]
pub struct ErrorReport {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub error_code: Option<String>,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
    pub additional_context: serde_json::Value,
    pub status: String,
    pub admin_notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub resolved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = error_reports)]
pub struct NewErrorReport {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub error_code: Option<String>,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
    pub additional_context: serde_json::Value,
    pub status: String,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = error_logs)]
pub struct ErrorLog {
    pub id: Uuid,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub error_type: Option<String>,
    pub component_name: Option<String>,
    pub page_url: Option<String>,
    pub severity: String,
    pub user_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = error_logs)]
pub struct NewErrorLog {
    pub id: Uuid,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub error_type: Option<String>,
    pub component_name: Option<String>,
    pub page_url: Option<String>,
    pub severity: String,
    pub user_id: Option<Uuid>,
}
