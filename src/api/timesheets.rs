use actix_web::{HttpResponse, http::header, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::guard;
use super::response::{self, ApiError, ApiResult, Meta, conflict_on_duplicate, page_window};
use super::shifts::{FilterValue, visibility_clause};
use crate::auth::auth::AuthUser;
use crate::export;
use crate::model::{
    role::Role,
    shift::{Shift, ShiftStatus},
    timesheet::{Timesheet, TimesheetStatus},
};
use crate::staffing::store::{WorkerView, ensure_no_active_workers, ensure_timesheet_open, fetch_scope};
use crate::staffing::timesheet::minutes_to_hours;
use crate::utils::cache::ShiftCache;

const SIGNATURE_PREFIX: &str = "data:image/";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignatureReq {
    /// Signature image as a `data:image/...;base64,` URL
    #[validate(length(min = 16, max = 2_000_000))]
    pub signature: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RejectReq {
    #[validate(length(min = 1, max = 1000))]
    #[schema(example = "Break times are missing")]
    pub reason: String,
}

#[derive(Deserialize, IntoParams)]
pub struct TimesheetFilter {
    pub status: Option<TimesheetStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Timesheet together with the hours it certifies.
#[derive(Debug, Serialize, ToSchema)]
pub struct TimesheetDetail {
    pub timesheet: Timesheet,
    pub shift: Shift,
    pub job_name: String,
    pub company_name: String,
    pub workers: Vec<WorkerView>,
    pub total_hours: f64,
}

fn validate_signature(signature: &str) -> ApiResult<()> {
    if signature.starts_with(SIGNATURE_PREFIX) && signature.contains(";base64,") {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "signature must be a base64 data:image URL".into(),
        ))
    }
}

async fn fetch_timesheet(conn: &mut MySqlConnection, timesheet_id: u64, lock: bool) -> ApiResult<Timesheet> {
    sqlx::query_as::<_, Timesheet>(&format!(
        "SELECT {} FROM timesheets WHERE id = ?{}",
        Timesheet::COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(timesheet_id)
    .fetch_optional(conn)
    .await?
    .ok_or(ApiError::NotFound("Timesheet"))
}

/// Opens a draft timesheet once every worker on the shift has finished.
#[utoipa::path(
    post,
    path = "/api/v1/shifts/{shift_id}/timesheet",
    params(("shift_id" = u64, Path, description = "Shift id")),
    responses(
        (status = 201, description = "Draft timesheet created", body = Timesheet),
        (status = 403, description = "No management rights on this shift"),
        (status = 409, description = "Workers still active or timesheet already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Timesheet"
)]
pub async fn create_timesheet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
) -> ApiResult {
    let shift_id = path.into_inner();
    let mut tx = pool.begin().await?;
    guard::require_shift_manager(&mut tx, &auth, shift_id).await?;

    // timesheet row before assignment rows, as in every clock path
    ensure_timesheet_open(&mut tx, shift_id).await?;
    ensure_no_active_workers(&mut tx, shift_id).await?;

    let result = sqlx::query("INSERT INTO timesheets (shift_id, status) VALUES (?, ?)")
        .bind(shift_id)
        .bind(TimesheetStatus::Draft.as_ref())
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Shift already has a timesheet"))?;

    let timesheet = fetch_timesheet(&mut tx, result.last_insert_id(), false).await?;
    tx.commit().await?;

    cache.invalidate(shift_id).await;
    info!(shift_id, timesheet_id = timesheet.id, "Timesheet draft created");
    Ok(response::created(timesheet))
}

#[utoipa::path(
    get,
    path = "/api/v1/timesheets",
    params(TimesheetFilter),
    responses(
        (status = 200, description = "Paginated timesheet list", body = [Timesheet]),
        (status = 403, description = "Insufficient role")
    ),
    security(("bearer_auth" = [])),
    tag = "Timesheet"
)]
pub async fn list_timesheets(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TimesheetFilter>,
) -> ApiResult {
    auth.require_any(&[Role::CompanyUser, Role::CrewChief])?;
    let (page, per_page, offset) = page_window(query.page, query.per_page);

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();
    where_sql.push_str(visibility_clause(&auth, &mut args)?);

    if let Some(status) = query.status {
        where_sql.push_str(" AND t.status = ?");
        args.push(FilterValue::Str(status.to_string()));
    }

    let from_sql = format!(" FROM timesheets t JOIN shifts s ON s.id = t.shift_id{where_sql}");

    let count_sql = format!("SELECT COUNT(*){from_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(s.as_str()),
            FilterValue::Date(d) => count_q.bind(*d),
        };
    }
    let total = count_q.fetch_one(pool.get_ref()).await?;

    let columns = Timesheet::COLUMNS
        .split(", ")
        .map(|c| format!("t.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let data_sql = format!("SELECT {columns}{from_sql} ORDER BY t.updated_at DESC, t.id DESC LIMIT ? OFFSET ?");
    let mut data_q = sqlx::query_as::<_, Timesheet>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
            FilterValue::Date(d) => data_q.bind(d),
        };
    }
    let timesheets = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(response::paginated(
        timesheets,
        Meta {
            page,
            per_page,
            total,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/timesheets/{timesheet_id}",
    params(("timesheet_id" = u64, Path, description = "Timesheet id")),
    responses(
        (status = 200, description = "Timesheet with per-worker hours", body = TimesheetDetail),
        (status = 403, description = "No access to this shift"),
        (status = 404, description = "Timesheet not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Timesheet"
)]
pub async fn get_timesheet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
) -> ApiResult {
    let timesheet = {
        let mut conn = pool.acquire().await?;
        let timesheet = fetch_timesheet(&mut conn, path.into_inner(), false).await?;
        guard::require_shift_viewer(&mut conn, &auth, timesheet.shift_id).await?;
        timesheet
    };

    let detail = cache.get_or_load(pool.get_ref(), timesheet.shift_id).await?;
    let workers: Vec<WorkerView> = detail
        .workers
        .iter()
        .filter(|w| w.assignment.user_id.is_some())
        .cloned()
        .collect();
    let total_minutes: i64 = workers.iter().map(|w| w.worked_minutes).sum();

    Ok(response::ok(TimesheetDetail {
        timesheet,
        shift: detail.shift.clone(),
        job_name: detail.job_name.clone(),
        company_name: detail.company_name.clone(),
        workers,
        total_hours: minutes_to_hours(total_minutes),
    }))
}

/// Submits the timesheet for company approval and completes the shift.
#[utoipa::path(
    post,
    path = "/api/v1/timesheets/{timesheet_id}/finalize",
    params(("timesheet_id" = u64, Path, description = "Timesheet id")),
    responses(
        (status = 200, description = "Timesheet submitted", body = Timesheet),
        (status = 403, description = "No management rights on this shift"),
        (status = 409, description = "Workers still active or invalid status")
    ),
    security(("bearer_auth" = [])),
    tag = "Timesheet"
)]
pub async fn finalize_timesheet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
) -> ApiResult {
    let timesheet_id = path.into_inner();
    let mut tx = pool.begin().await?;

    let timesheet = fetch_timesheet(&mut tx, timesheet_id, true).await?;
    guard::require_shift_manager(&mut tx, &auth, timesheet.shift_id).await?;

    timesheet
        .status
        .validate_transition(TimesheetStatus::PendingCompanyApproval)?;
    // workers could have been reassigned or reopened since the draft
    ensure_no_active_workers(&mut tx, timesheet.shift_id).await?;

    sqlx::query(
        "UPDATE timesheets SET status = ?, submitted_by = ?, submitted_at = ?, rejection_reason = NULL WHERE id = ?",
    )
    .bind(TimesheetStatus::PendingCompanyApproval.as_ref())
    .bind(auth.user_id)
    .bind(Utc::now().naive_utc())
    .bind(timesheet_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE shifts SET status = ? WHERE id = ?")
        .bind(ShiftStatus::Completed.as_ref())
        .bind(timesheet.shift_id)
        .execute(&mut *tx)
        .await?;

    let updated = fetch_timesheet(&mut tx, timesheet_id, false).await?;
    tx.commit().await?;

    cache.invalidate(updated.shift_id).await;
    info!(timesheet_id, shift_id = updated.shift_id, submitted_by = auth.user_id, "Timesheet finalized");
    Ok(response::ok(updated))
}

#[utoipa::path(
    post,
    path = "/api/v1/timesheets/{timesheet_id}/company-approve",
    params(("timesheet_id" = u64, Path, description = "Timesheet id")),
    request_body = SignatureReq,
    responses(
        (status = 200, description = "Approved by the client company", body = Timesheet),
        (status = 400, description = "Invalid signature"),
        (status = 403, description = "No access to this company"),
        (status = 409, description = "Timesheet is not awaiting company approval")
    ),
    security(("bearer_auth" = [])),
    tag = "Timesheet"
)]
pub async fn company_approve(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    payload: web::Json<SignatureReq>,
) -> ApiResult {
    auth.require_any(&[Role::CompanyUser])?;
    payload.validate()?;
    validate_signature(&payload.signature)?;

    let timesheet_id = path.into_inner();
    let mut tx = pool.begin().await?;

    let timesheet = fetch_timesheet(&mut tx, timesheet_id, true).await?;
    let scope = fetch_scope(&mut tx, timesheet.shift_id).await?;
    auth.require_company_access(scope.company_id)?;

    timesheet
        .status
        .validate_transition(TimesheetStatus::PendingManagerApproval)?;

    sqlx::query(
        "UPDATE timesheets SET status = ?, company_signature = ?, company_approved_by = ?, company_approved_at = ? WHERE id = ?",
    )
    .bind(TimesheetStatus::PendingManagerApproval.as_ref())
    .bind(&payload.signature)
    .bind(auth.user_id)
    .bind(Utc::now().naive_utc())
    .bind(timesheet_id)
    .execute(&mut *tx)
    .await?;

    let updated = fetch_timesheet(&mut tx, timesheet_id, false).await?;
    tx.commit().await?;

    cache.invalidate(updated.shift_id).await;
    info!(timesheet_id, approved_by = auth.user_id, "Timesheet approved by company");
    Ok(response::ok(updated))
}

#[utoipa::path(
    post,
    path = "/api/v1/timesheets/{timesheet_id}/manager-approve",
    params(("timesheet_id" = u64, Path, description = "Timesheet id")),
    request_body = SignatureReq,
    responses(
        (status = 200, description = "Timesheet completed", body = Timesheet),
        (status = 400, description = "Invalid signature"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Timesheet is not awaiting manager approval")
    ),
    security(("bearer_auth" = [])),
    tag = "Timesheet"
)]
pub async fn manager_approve(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    payload: web::Json<SignatureReq>,
) -> ApiResult {
    auth.require_admin()?;
    payload.validate()?;
    validate_signature(&payload.signature)?;

    let timesheet_id = path.into_inner();
    let mut tx = pool.begin().await?;

    let timesheet = fetch_timesheet(&mut tx, timesheet_id, true).await?;
    timesheet.status.validate_transition(TimesheetStatus::Completed)?;

    sqlx::query(
        "UPDATE timesheets SET status = ?, manager_signature = ?, manager_approved_by = ?, manager_approved_at = ? WHERE id = ?",
    )
    .bind(TimesheetStatus::Completed.as_ref())
    .bind(&payload.signature)
    .bind(auth.user_id)
    .bind(Utc::now().naive_utc())
    .bind(timesheet_id)
    .execute(&mut *tx)
    .await?;

    let updated = fetch_timesheet(&mut tx, timesheet_id, false).await?;
    tx.commit().await?;

    cache.invalidate(updated.shift_id).await;
    info!(timesheet_id, approved_by = auth.user_id, "Timesheet completed");
    Ok(response::ok(updated))
}

/// Sends a pending timesheet back; it can be finalized again afterwards.
#[utoipa::path(
    post,
    path = "/api/v1/timesheets/{timesheet_id}/reject",
    params(("timesheet_id" = u64, Path, description = "Timesheet id")),
    request_body = RejectReq,
    responses(
        (status = 200, description = "Timesheet rejected", body = Timesheet),
        (status = 403, description = "No access to this company"),
        (status = 409, description = "Timesheet is not pending approval")
    ),
    security(("bearer_auth" = [])),
    tag = "Timesheet"
)]
pub async fn reject_timesheet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    payload: web::Json<RejectReq>,
) -> ApiResult {
    auth.require_any(&[Role::CompanyUser])?;
    payload.validate()?;

    let timesheet_id = path.into_inner();
    let mut tx = pool.begin().await?;

    let timesheet = fetch_timesheet(&mut tx, timesheet_id, true).await?;
    let scope = fetch_scope(&mut tx, timesheet.shift_id).await?;
    auth.require_company_access(scope.company_id)?;

    timesheet.status.validate_transition(TimesheetStatus::Rejected)?;

    sqlx::query("UPDATE timesheets SET status = ?, rejection_reason = ? WHERE id = ?")
        .bind(TimesheetStatus::Rejected.as_ref())
        .bind(payload.reason.trim())
        .bind(timesheet_id)
        .execute(&mut *tx)
        .await?;

    let updated = fetch_timesheet(&mut tx, timesheet_id, false).await?;
    tx.commit().await?;

    cache.invalidate(updated.shift_id).await;
    warn!(timesheet_id, rejected_by = auth.user_id, "Timesheet rejected");
    Ok(response::ok(updated))
}

#[utoipa::path(
    get,
    path = "/api/v1/timesheets/{timesheet_id}/export",
    params(("timesheet_id" = u64, Path, description = "Timesheet id")),
    responses(
        (status = 200, description = "CSV attachment", body = String, content_type = "text/csv"),
        (status = 403, description = "No access to this shift"),
        (status = 404, description = "Timesheet not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Timesheet"
)]
pub async fn export_timesheet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
) -> ApiResult {
    let timesheet = {
        let mut conn = pool.acquire().await?;
        let timesheet = fetch_timesheet(&mut conn, path.into_inner(), false).await?;
        guard::require_shift_viewer(&mut conn, &auth, timesheet.shift_id).await?;
        timesheet
    };

    let detail = cache.get_or_load(pool.get_ref(), timesheet.shift_id).await?;
    let body = export::render_timesheet_csv(&detail, timesheet.status)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(timesheet_id = timesheet.id, bytes = body.len(), "Timesheet exported");
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", export::file_name(&detail)),
        ))
        .body(body))
}

#[utoipa::path(
    delete,
    path = "/api/v1/timesheets/{timesheet_id}",
    params(("timesheet_id" = u64, Path, description = "Timesheet id")),
    responses(
        (status = 200, description = "Timesheet deleted"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Completed timesheets are kept")
    ),
    security(("bearer_auth" = [])),
    tag = "Timesheet"
)]
pub async fn delete_timesheet(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
) -> ApiResult {
    auth.require_admin()?;
    let timesheet_id = path.into_inner();
    let mut tx = pool.begin().await?;

    let timesheet = fetch_timesheet(&mut tx, timesheet_id, true).await?;
    if timesheet.status.is_terminal() {
        return Err(ApiError::Conflict("Completed timesheets cannot be deleted".into()));
    }

    sqlx::query("DELETE FROM timesheets WHERE id = ?")
        .bind(timesheet_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    cache.invalidate(timesheet.shift_id).await;
    info!(timesheet_id, deleted_by = auth.user_id, "Timesheet deleted");
    Ok(response::message("Timesheet deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_must_be_image_data_urls() {
        assert!(validate_signature("data:image/png;base64,iVBORw0KGgo=").is_ok());
        assert!(validate_signature("https://example.com/sig.png").is_err());
        assert!(validate_signature("data:image/png,rawbytes").is_err());
        assert!(validate_signature("data:text/plain;base64,aGk=").is_err());
    }

    #[test]
    fn reject_reason_is_required() {
        let req = RejectReq {
            reason: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
