use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use super::string_column;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShiftStatus {
    Pending,
    Active,
    InProgress,
    Completed,
    Cancelled,
}

string_column!(ShiftStatus);

/// Staffing role a worker fills on a shift.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
pub enum RoleCode {
    #[serde(rename = "CC")]
    #[strum(serialize = "CC")]
    CrewChief,
    #[serde(rename = "SH")]
    #[strum(serialize = "SH")]
    Stagehand,
    #[serde(rename = "FO")]
    #[strum(serialize = "FO")]
    ForkOperator,
    #[serde(rename = "RFO")]
    #[strum(serialize = "RFO")]
    ReachForkOperator,
    #[serde(rename = "RG")]
    #[strum(serialize = "RG")]
    Rigger,
    #[serde(rename = "GL")]
    #[strum(serialize = "GL")]
    GeneralLaborer,
}

string_column!(RoleCode);

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Shift {
    #[schema(example = 40)]
    pub id: u64,
    #[schema(example = 12)]
    pub job_id: u64,
    #[schema(value_type = String, format = "date", example = "2026-03-14")]
    pub date: NaiveDate,
    #[schema(value_type = String, example = "2026-03-14T08:00:00")]
    pub start_time: NaiveDateTime,
    #[schema(value_type = String, example = "2026-03-14T16:00:00")]
    pub end_time: NaiveDateTime,
    pub location: Option<String>,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ShiftStatus,
    pub required_crew_chiefs: u32,
    pub required_stagehands: u32,
    pub required_fork_operators: u32,
    pub required_reach_fork_operators: u32,
    pub required_riggers: u32,
    pub required_general_laborers: u32,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Shift {
    pub const COLUMNS: &'static str = "id, job_id, date, start_time, end_time, location, description, \
        status, required_crew_chiefs, required_stagehands, required_fork_operators, \
        required_reach_fork_operators, required_riggers, required_general_laborers, \
        created_at, updated_at";

    pub fn required_for(&self, role: RoleCode) -> u32 {
        match role {
            RoleCode::CrewChief => self.required_crew_chiefs,
            RoleCode::Stagehand => self.required_stagehands,
            RoleCode::ForkOperator => self.required_fork_operators,
            RoleCode::ReachForkOperator => self.required_reach_fork_operators,
            RoleCode::Rigger => self.required_riggers,
            RoleCode::GeneralLaborer => self.required_general_laborers,
        }
    }
}
