use actix_web::web;
use chrono::NaiveDateTime;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

use super::response::{self, ApiResult};
use crate::auth::auth::AuthUser;
use crate::staffing::store::{self, WorkerView};
use crate::utils::cache::ShiftCache;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CorrectEntry {
    #[schema(value_type = String, example = "2026-03-14T08:00:00")]
    pub clock_in: NaiveDateTime,
    /// Leave empty to reopen the worker's last entry
    #[schema(value_type = Option<String>, example = "2026-03-14T12:00:00")]
    pub clock_out: Option<NaiveDateTime>,
}

/// Admin correction of a recorded clock-in/clock-out pair.
#[utoipa::path(
    put,
    path = "/api/v1/time-entries/{entry_id}",
    params(("entry_id" = u64, Path, description = "Time entry id")),
    request_body = CorrectEntry,
    responses(
        (status = 200, description = "Entry corrected", body = WorkerView),
        (status = 400, description = "Invalid or overlapping time range"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Time entry not found"),
        (status = 409, description = "Timesheet already submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Clock"
)]
pub async fn correct_time_entry(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    payload: web::Json<CorrectEntry>,
) -> ApiResult {
    auth.require_admin()?;
    let entry_id = path.into_inner();

    let view = store::correct_entry(pool.get_ref(), entry_id, payload.clock_in, payload.clock_out).await?;

    cache.invalidate(view.assignment.shift_id).await;
    tracing::info!(entry_id, corrected_by = auth.user_id, "Time entry corrected by admin");
    Ok(response::ok(view))
}
