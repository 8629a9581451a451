use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Company {
    #[schema(example = 3)]
    pub id: u64,
    #[schema(example = "Hands On Productions")]
    pub name: String,
    pub contact_email: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
