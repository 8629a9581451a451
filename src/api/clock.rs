use actix_web::web;
use chrono::Utc;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::instrument;
use utoipa::ToSchema;

use super::guard;
use super::response::{self, ApiError, ApiResult};
use crate::auth::auth::AuthUser;
use crate::staffing::clock::ClockAction;
use crate::staffing::store::{self, WorkerView};
use crate::utils::cache::ShiftCache;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClockRequest {
    #[schema(example = 301)]
    pub assignment_id: u64,
}

/// Workers may clock themselves in and out; every other action, and acting
/// on someone else, needs management rights on the shift.
async fn authorize(pool: &MySqlPool, auth: &AuthUser, shift_id: u64, assignment_id: u64, action: ClockAction) -> ApiResult<()> {
    let mut conn = pool.acquire().await?;

    if matches!(action, ClockAction::ClockIn | ClockAction::ClockOut) {
        let owner = sqlx::query_scalar::<_, Option<u64>>(
            "SELECT user_id FROM assigned_personnel WHERE id = ? AND shift_id = ?",
        )
        .bind(assignment_id)
        .bind(shift_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ApiError::NotFound("Assignment"))?;

        if owner == Some(auth.user_id) {
            return Ok(());
        }
    }

    guard::require_shift_manager(&mut conn, auth, shift_id).await?;
    Ok(())
}

async fn run(
    auth: AuthUser,
    pool: &MySqlPool,
    cache: &ShiftCache,
    shift_id: u64,
    assignment_id: u64,
    action: ClockAction,
) -> ApiResult {
    authorize(pool, &auth, shift_id, assignment_id, action).await?;

    let at = Utc::now().naive_utc();
    let view = store::apply_clock_action(pool, shift_id, assignment_id, action, at).await?;

    cache.invalidate(shift_id).await;
    tracing::info!(
        shift_id,
        assignment_id,
        action = action.as_str(),
        actor = auth.user_id,
        "Clock action recorded"
    );
    Ok(response::ok(view))
}

#[utoipa::path(
    post,
    path = "/api/v1/shifts/{shift_id}/clock-in",
    params(("shift_id" = u64, Path, description = "Shift id")),
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Worker clocked in", body = WorkerView),
        (status = 403, description = "Not allowed to clock this worker"),
        (status = 409, description = "Already clocked in, entry limit reached, worker finished or timesheet submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Clock"
)]
#[instrument(name = "clock_in", skip_all, fields(shift_id = *path, assignment_id = body.assignment_id))]
pub async fn clock_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    body: web::Json<ClockRequest>,
) -> ApiResult {
    run(auth, pool.get_ref(), cache.get_ref(), path.into_inner(), body.assignment_id, ClockAction::ClockIn).await
}

#[utoipa::path(
    post,
    path = "/api/v1/shifts/{shift_id}/clock-out",
    params(("shift_id" = u64, Path, description = "Shift id")),
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Worker clocked out", body = WorkerView),
        (status = 409, description = "Worker is not clocked in")
    ),
    security(("bearer_auth" = [])),
    tag = "Clock"
)]
#[instrument(name = "clock_out", skip_all, fields(shift_id = *path, assignment_id = body.assignment_id))]
pub async fn clock_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    body: web::Json<ClockRequest>,
) -> ApiResult {
    run(auth, pool.get_ref(), cache.get_ref(), path.into_inner(), body.assignment_id, ClockAction::ClockOut).await
}

#[utoipa::path(
    post,
    path = "/api/v1/shifts/{shift_id}/end-shift",
    params(("shift_id" = u64, Path, description = "Shift id")),
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Worker's shift ended", body = WorkerView),
        (status = 403, description = "No management rights on this shift"),
        (status = 409, description = "Worker already finished")
    ),
    security(("bearer_auth" = [])),
    tag = "Clock"
)]
#[instrument(name = "end_shift", skip_all, fields(shift_id = *path, assignment_id = body.assignment_id))]
pub async fn end_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    body: web::Json<ClockRequest>,
) -> ApiResult {
    run(auth, pool.get_ref(), cache.get_ref(), path.into_inner(), body.assignment_id, ClockAction::EndShift).await
}

#[utoipa::path(
    post,
    path = "/api/v1/shifts/{shift_id}/no-show",
    params(("shift_id" = u64, Path, description = "Shift id")),
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Worker marked as no-show", body = WorkerView),
        (status = 403, description = "No management rights on this shift"),
        (status = 409, description = "Worker has already started")
    ),
    security(("bearer_auth" = [])),
    tag = "Clock"
)]
#[instrument(name = "no_show", skip_all, fields(shift_id = *path, assignment_id = body.assignment_id))]
pub async fn no_show(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    body: web::Json<ClockRequest>,
) -> ApiResult {
    run(auth, pool.get_ref(), cache.get_ref(), path.into_inner(), body.assignment_id, ClockAction::NoShow).await
}

/// Ends the shift for every worker who has not finished yet.
#[utoipa::path(
    post,
    path = "/api/v1/shifts/{shift_id}/end-all",
    params(("shift_id" = u64, Path, description = "Shift id")),
    responses(
        (status = 200, description = "Workers whose shift was ended", body = [WorkerView]),
        (status = 403, description = "No management rights on this shift"),
        (status = 409, description = "Timesheet already submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Clock"
)]
#[instrument(name = "end_all", skip_all, fields(shift_id = *path))]
pub async fn end_all(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
) -> ApiResult {
    let shift_id = path.into_inner();
    {
        let mut conn = pool.acquire().await?;
        guard::require_shift_manager(&mut conn, &auth, shift_id).await?;
    }

    let ended = store::end_all(pool.get_ref(), shift_id, Utc::now().naive_utc()).await?;

    cache.invalidate(shift_id).await;
    tracing::info!(shift_id, ended = ended.len(), actor = auth.user_id, "Ended shift for all workers");
    Ok(response::ok(ended))
}
