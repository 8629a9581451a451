use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// User row without the password hash.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct User {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[schema(example = 4)]
    pub role_id: u8,
    pub company_id: Option<u64>,
    pub is_active: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<DateTime<Utc>>,
}
