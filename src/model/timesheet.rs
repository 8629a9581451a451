use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::string_column;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimesheetStatus {
    Draft,
    PendingCompanyApproval,
    PendingManagerApproval,
    Completed,
    Rejected,
}

string_column!(TimesheetStatus);

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Timesheet {
    pub id: u64,
    pub shift_id: u64,
    #[sqlx(try_from = "String")]
    pub status: TimesheetStatus,
    pub submitted_by: Option<u64>,
    #[schema(value_type = Option<String>)]
    pub submitted_at: Option<NaiveDateTime>,
    /// Signature image as a `data:image/...` URL
    pub company_signature: Option<String>,
    pub company_approved_by: Option<u64>,
    #[schema(value_type = Option<String>)]
    pub company_approved_at: Option<NaiveDateTime>,
    pub manager_signature: Option<String>,
    pub manager_approved_by: Option<u64>,
    #[schema(value_type = Option<String>)]
    pub manager_approved_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Timesheet {
    pub const COLUMNS: &'static str = "id, shift_id, status, submitted_by, submitted_at, \
        company_signature, company_approved_by, company_approved_at, \
        manager_signature, manager_approved_by, manager_approved_at, \
        rejection_reason, created_at, updated_at";
}
