use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::string_column;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

string_column!(JobStatus);

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Job {
    #[schema(example = 12)]
    pub id: u64,
    #[schema(example = 3)]
    pub company_id: u64,
    #[schema(example = "Arena load-in")]
    pub name: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    pub location: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub const COLUMNS: &'static str =
        "id, company_id, name, description, status, start_date, end_date, location, created_at, updated_at";
}
