use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::shift::RoleCode;
use super::string_column;

/// Persisted clock status of an assignment.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkerStatus {
    Assigned,
    ClockedIn,
    OnBreak,
    ClockedOut,
    ShiftEnded,
    NoShow,
}

string_column!(WorkerStatus);

impl WorkerStatus {
    /// Statuses that allow the shift's timesheet to be finalized.
    pub fn is_finished(self) -> bool {
        matches!(self, WorkerStatus::ShiftEnded | WorkerStatus::NoShow)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct AssignedPersonnel {
    #[schema(example = 301)]
    pub id: u64,
    #[schema(example = 40)]
    pub shift_id: u64,
    /// `None` for an open slot
    pub user_id: Option<u64>,
    #[sqlx(try_from = "String")]
    pub role_code: RoleCode,
    #[sqlx(try_from = "String")]
    pub status: WorkerStatus,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl AssignedPersonnel {
    pub const COLUMNS: &'static str =
        "id, shift_id, user_id, role_code, status, created_at, updated_at";
}
