use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

/// One clock-in/clock-out pair. An assignment has at most three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, ToSchema)]
pub struct TimeEntry {
    pub id: u64,
    pub assigned_personnel_id: u64,
    #[schema(example = 1)]
    pub entry_number: u8,
    #[schema(value_type = String, example = "2026-03-14T08:02:11")]
    pub clock_in: NaiveDateTime,
    #[schema(value_type = Option<String>)]
    pub clock_out: Option<NaiveDateTime>,
    pub is_active: bool,
}

impl TimeEntry {
    pub const COLUMNS: &'static str =
        "id, assigned_personnel_id, entry_number, clock_in, clock_out, is_active";

    pub fn is_open(&self) -> bool {
        self.clock_out.is_none()
    }

    /// Closed duration in whole minutes; open entries count as zero.
    pub fn minutes(&self) -> i64 {
        match self.clock_out {
            Some(out) => (out - self.clock_in).num_minutes().max(0),
            None => 0,
        }
    }
}
