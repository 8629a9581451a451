use actix_web::web;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::guard;
use super::response::{self, ApiError, ApiResult, Meta, on_constraint_violation, page_window};
use crate::auth::auth::AuthUser;
use crate::model::{
    role::Role,
    shift::{Shift, ShiftStatus},
};
use crate::staffing::store::{ShiftDetail, fetch_shift};
use crate::utils::cache::ShiftCache;
use crate::utils::db_utils::{build_update_sql, execute_update};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateShift {
    #[schema(example = 12)]
    pub job_id: u64,
    /// Defaults to the date of `start_time`
    #[schema(value_type = Option<String>, format = "date", example = "2026-03-14")]
    pub date: Option<NaiveDate>,
    #[schema(value_type = String, example = "2026-03-14T08:00:00")]
    pub start_time: NaiveDateTime,
    #[schema(value_type = String, example = "2026-03-14T16:00:00")]
    pub end_time: NaiveDateTime,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    pub description: Option<String>,
    pub status: Option<ShiftStatus>,
    #[validate(range(max = 500))]
    #[serde(default)]
    pub required_crew_chiefs: u32,
    #[validate(range(max = 500))]
    #[serde(default)]
    pub required_stagehands: u32,
    #[validate(range(max = 500))]
    #[serde(default)]
    pub required_fork_operators: u32,
    #[validate(range(max = 500))]
    #[serde(default)]
    pub required_reach_fork_operators: u32,
    #[validate(range(max = 500))]
    #[serde(default)]
    pub required_riggers: u32,
    #[validate(range(max = 500))]
    #[serde(default)]
    pub required_general_laborers: u32,
}

#[derive(Deserialize, IntoParams)]
pub struct ShiftFilter {
    /// Inclusive lower bound on the shift date (YYYY-MM-DD)
    #[param(value_type = Option<String>)]
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the shift date (YYYY-MM-DD)
    #[param(value_type = Option<String>)]
    pub date_to: Option<NaiveDate>,
    pub status: Option<ShiftStatus>,
    pub job_id: Option<u64>,
    pub company_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub(super) enum FilterValue {
    U64(u64),
    Str(String),
    Date(NaiveDate),
}

const UPDATABLE: &[&str] = &[
    "date",
    "start_time",
    "end_time",
    "location",
    "description",
    "status",
    "required_crew_chiefs",
    "required_stagehands",
    "required_fork_operators",
    "required_reach_fork_operators",
    "required_riggers",
    "required_general_laborers",
];

/// Shifts a non-admin may list: their company's, or ones they work or manage.
pub(super) fn visibility_clause(auth: &AuthUser, args: &mut Vec<FilterValue>) -> ApiResult<&'static str> {
    match auth.role {
        Role::Admin => Ok(""),
        Role::CompanyUser => {
            let company_id = auth
                .company_id
                .ok_or_else(|| ApiError::Forbidden("No company profile".into()))?;
            args.push(FilterValue::U64(company_id));
            Ok(" AND s.job_id IN (SELECT id FROM jobs WHERE company_id = ?)")
        }
        Role::CrewChief | Role::Employee => {
            for _ in 0..4 {
                args.push(FilterValue::U64(auth.user_id));
            }
            Ok(" AND (s.id IN (SELECT shift_id FROM assigned_personnel WHERE user_id = ?) \
                 OR s.id IN (SELECT target_id FROM crew_chief_permissions WHERE user_id = ? AND permission_type = 'shift') \
                 OR s.job_id IN (SELECT target_id FROM crew_chief_permissions WHERE user_id = ? AND permission_type = 'job') \
                 OR s.job_id IN (SELECT j.id FROM jobs j JOIN crew_chief_permissions p \
                     ON p.target_id = j.company_id AND p.permission_type = 'client' WHERE p.user_id = ?))")
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/shifts",
    params(ShiftFilter),
    responses(
        (status = 200, description = "Paginated shift list", body = [Shift]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn list_shifts(auth: AuthUser, pool: web::Data<MySqlPool>, query: web::Query<ShiftFilter>) -> ApiResult {
    let (page, per_page, offset) = page_window(query.page, query.per_page);

    if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
        if from > to {
            return Err(ApiError::BadRequest("date_from cannot be after date_to".into()));
        }
    }

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    where_sql.push_str(visibility_clause(&auth, &mut args)?);

    if let Some(from) = query.date_from {
        where_sql.push_str(" AND s.date >= ?");
        args.push(FilterValue::Date(from));
    }
    if let Some(to) = query.date_to {
        where_sql.push_str(" AND s.date <= ?");
        args.push(FilterValue::Date(to));
    }
    if let Some(status) = query.status {
        where_sql.push_str(" AND s.status = ?");
        args.push(FilterValue::Str(status.to_string()));
    }
    if let Some(job_id) = query.job_id {
        where_sql.push_str(" AND s.job_id = ?");
        args.push(FilterValue::U64(job_id));
    }
    if let Some(company_id) = query.company_id {
        where_sql.push_str(" AND s.job_id IN (SELECT id FROM jobs WHERE company_id = ?)");
        args.push(FilterValue::U64(company_id));
    }

    let count_sql = format!("SELECT COUNT(*) FROM shifts s{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(s.as_str()),
            FilterValue::Date(d) => count_q.bind(*d),
        };
    }
    let total = count_q.fetch_one(pool.get_ref()).await?;

    let columns = Shift::COLUMNS
        .split(", ")
        .map(|c| format!("s.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let data_sql = format!(
        "SELECT {columns} FROM shifts s{where_sql} ORDER BY s.date DESC, s.start_time DESC LIMIT ? OFFSET ?"
    );
    let mut data_q = sqlx::query_as::<_, Shift>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
            FilterValue::Date(d) => data_q.bind(d),
        };
    }
    let shifts = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(response::paginated(
        shifts,
        Meta {
            page,
            per_page,
            total,
        },
    ))
}

/// Shift with workers, their entries and display states, and fulfillment.
#[utoipa::path(
    get,
    path = "/api/v1/shifts/{shift_id}",
    params(("shift_id" = u64, Path, description = "Shift id")),
    responses(
        (status = 200, description = "Shift detail", body = ShiftDetail),
        (status = 403, description = "No access to this shift"),
        (status = 404, description = "Shift not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn get_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
) -> ApiResult {
    let shift_id = path.into_inner();
    let mut conn = pool.acquire().await?;
    guard::require_shift_viewer(&mut conn, &auth, shift_id).await?;
    drop(conn);

    let detail = cache.get_or_load(pool.get_ref(), shift_id).await?;
    Ok(response::ok(detail.as_ref()))
}

#[utoipa::path(
    post,
    path = "/api/v1/shifts",
    request_body = CreateShift,
    responses(
        (status = 201, description = "Shift created", body = Shift),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn create_shift(auth: AuthUser, pool: web::Data<MySqlPool>, payload: web::Json<CreateShift>) -> ApiResult {
    auth.require_admin()?;
    payload.validate()?;

    if payload.end_time <= payload.start_time {
        return Err(ApiError::BadRequest("end_time must be after start_time".into()));
    }
    let date = payload.date.unwrap_or_else(|| payload.start_time.date());

    let result = sqlx::query(
        r#"
        INSERT INTO shifts (job_id, date, start_time, end_time, location, description, status,
            required_crew_chiefs, required_stagehands, required_fork_operators,
            required_reach_fork_operators, required_riggers, required_general_laborers)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.job_id)
    .bind(date)
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(payload.location.as_deref())
    .bind(payload.description.as_deref())
    .bind(payload.status.unwrap_or(ShiftStatus::Pending).as_ref())
    .bind(payload.required_crew_chiefs)
    .bind(payload.required_stagehands)
    .bind(payload.required_fork_operators)
    .bind(payload.required_reach_fork_operators)
    .bind(payload.required_riggers)
    .bind(payload.required_general_laborers)
    .execute(pool.get_ref())
    .await
    .map_err(|e| on_constraint_violation(e, || ApiError::BadRequest("Unknown job_id".into())))?;

    let mut conn = pool.acquire().await?;
    let shift = fetch_shift(&mut conn, result.last_insert_id()).await?;
    tracing::info!(shift_id = shift.id, job_id = shift.job_id, date = %shift.date, "Shift created");
    Ok(response::created(shift))
}

/// Partial update; only whitelisted columns are accepted.
#[utoipa::path(
    patch,
    path = "/api/v1/shifts/{shift_id}",
    params(("shift_id" = u64, Path, description = "Shift id")),
    request_body(content = Object, description = "Any of date, start_time, end_time, location, description, status, required_*"),
    responses(
        (status = 200, description = "Shift updated", body = Shift),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "Shift not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn update_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    payload: web::Json<Map<String, Value>>,
) -> ApiResult {
    auth.require_admin()?;
    let shift_id = path.into_inner();

    if let Some(status) = payload.get("status") {
        status
            .as_str()
            .and_then(|s| s.parse::<ShiftStatus>().ok())
            .ok_or_else(|| ApiError::BadRequest("Invalid shift status".into()))?;
    }
    for (key, value) in payload.iter().filter(|(k, _)| k.starts_with("required_")) {
        if value.as_u64().is_none() {
            return Err(ApiError::BadRequest(format!("Field '{key}' must be a non-negative integer")));
        }
    }

    let update = build_update_sql("shifts", &payload, UPDATABLE, shift_id)?;

    let mut tx = pool.begin().await?;
    execute_update(&mut tx, update).await?;
    let shift = fetch_shift(&mut tx, shift_id).await?;
    if shift.end_time <= shift.start_time {
        return Err(ApiError::BadRequest("end_time must be after start_time".into()));
    }
    tx.commit().await?;

    cache.invalidate(shift_id).await;
    Ok(response::ok(shift))
}

#[utoipa::path(
    delete,
    path = "/api/v1/shifts/{shift_id}",
    params(("shift_id" = u64, Path, description = "Shift id")),
    responses(
        (status = 200, description = "Shift deleted with its assignments and entries"),
        (status = 404, description = "Shift not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn delete_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
) -> ApiResult {
    auth.require_admin()?;
    let shift_id = path.into_inner();

    let result = sqlx::query("DELETE FROM shifts WHERE id = ?")
        .bind(shift_id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Shift"));
    }

    cache.invalidate(shift_id).await;
    tracing::info!(shift_id, deleted_by = auth.user_id, "Shift deleted");
    Ok(response::message("Shift deleted"))
}
