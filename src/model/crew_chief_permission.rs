use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::string_column;

/// What a crew chief grant is scoped to. `Client` targets a company id.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PermissionType {
    Client,
    Job,
    Shift,
}

string_column!(PermissionType);

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct CrewChiefPermission {
    pub id: u64,
    pub user_id: u64,
    #[sqlx(try_from = "String")]
    pub permission_type: PermissionType,
    pub target_id: u64,
    pub granted_by: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl CrewChiefPermission {
    pub const COLUMNS: &'static str =
        "id, user_id, permission_type, target_id, granted_by, created_at";
}
