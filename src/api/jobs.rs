use actix_web::web;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::response::{self, ApiError, ApiResult, Meta, on_constraint_violation, page_window};
use crate::auth::auth::AuthUser;
use crate::model::{
    job::{Job, JobStatus},
    role::Role,
    shift::Shift,
};
use crate::utils::db_utils::{build_update_sql, execute_update};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateJob {
    #[schema(example = 3)]
    pub company_id: u64,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Arena load-in")]
    pub name: String,
    pub description: Option<String>,
    pub status: Option<JobStatus>,
    #[schema(example = "2026-03-14", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-03-16", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct JobFilter {
    /// Filter by owning company
    pub company_id: Option<u64>,
    /// Filter by job status
    pub status: Option<JobStatus>,
    /// Case-insensitive name search
    pub search: Option<String>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(String),
}

const UPDATABLE: &[&str] = &["name", "description", "status", "start_date", "end_date", "location"];

async fn fetch_job(pool: &MySqlPool, job_id: u64) -> ApiResult<Job> {
    sqlx::query_as::<_, Job>(&format!("SELECT {} FROM jobs WHERE id = ?", Job::COLUMNS))
        .bind(job_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Job"))
}

/// Jobs a non-admin may see: company users their company's, crew their assigned ones.
fn visibility_clause(auth: &AuthUser, args: &mut Vec<FilterValue>) -> ApiResult<&'static str> {
    match auth.role {
        Role::Admin => Ok(""),
        Role::CompanyUser => {
            let company_id = auth
                .company_id
                .ok_or_else(|| ApiError::Forbidden("No company profile".into()))?;
            args.push(FilterValue::U64(company_id));
            Ok(" AND company_id = ?")
        }
        Role::CrewChief | Role::Employee => {
            args.push(FilterValue::U64(auth.user_id));
            Ok(" AND id IN (SELECT s.job_id FROM shifts s \
                 JOIN assigned_personnel ap ON ap.shift_id = s.id WHERE ap.user_id = ?)")
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    params(JobFilter),
    responses(
        (status = 200, description = "Paginated job list", body = [Job]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
pub async fn list_jobs(auth: AuthUser, pool: web::Data<MySqlPool>, query: web::Query<JobFilter>) -> ApiResult {
    let (page, per_page, offset) = page_window(query.page, query.per_page);

    // -------------------------
    // WHERE clause
    // -------------------------
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    where_sql.push_str(visibility_clause(&auth, &mut args)?);

    if let Some(company_id) = query.company_id {
        where_sql.push_str(" AND company_id = ?");
        args.push(FilterValue::U64(company_id));
    }
    if let Some(status) = query.status {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status.to_string()));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        where_sql.push_str(" AND LOWER(name) LIKE ?");
        args.push(FilterValue::Str(format!("%{}%", search.to_lowercase())));
    }

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM jobs{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(s.as_str()),
        };
    }
    let total = count_q.fetch_one(pool.get_ref()).await?;

    // -------------------------
    // DATA query
    // -------------------------
    let data_sql = format!(
        "SELECT {} FROM jobs{where_sql} ORDER BY COALESCE(start_date, DATE(created_at)) DESC, id DESC LIMIT ? OFFSET ?",
        Job::COLUMNS
    );
    let mut data_q = sqlx::query_as::<_, Job>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }
    let jobs = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(response::paginated(
        jobs,
        Meta {
            page,
            per_page,
            total,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs/{job_id}",
    params(("job_id" = u64, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job found", body = Job),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
pub async fn get_job(auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> ApiResult {
    let job = fetch_job(pool.get_ref(), path.into_inner()).await?;
    if auth.role == Role::CompanyUser {
        auth.require_company_access(job.company_id)?;
    }
    Ok(response::ok(job))
}

#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    request_body = CreateJob,
    responses(
        (status = 201, description = "Job created", body = Job),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
pub async fn create_job(auth: AuthUser, pool: web::Data<MySqlPool>, payload: web::Json<CreateJob>) -> ApiResult {
    auth.require_admin()?;
    payload.validate()?;

    if let (Some(start), Some(end)) = (payload.start_date, payload.end_date) {
        if start > end {
            return Err(ApiError::BadRequest("start_date cannot be after end_date".into()));
        }
    }

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (company_id, name, description, status, start_date, end_date, location)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.company_id)
    .bind(payload.name.trim())
    .bind(payload.description.as_deref())
    .bind(payload.status.unwrap_or(JobStatus::Pending).as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.location.as_deref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| on_constraint_violation(e, || ApiError::BadRequest("Unknown company_id".into())))?;

    let job = fetch_job(pool.get_ref(), result.last_insert_id()).await?;
    tracing::info!(job_id = job.id, company_id = job.company_id, "Job created");
    Ok(response::created(job))
}

/// Partial update; only whitelisted columns are accepted.
#[utoipa::path(
    patch,
    path = "/api/v1/jobs/{job_id}",
    params(("job_id" = u64, Path, description = "Job id")),
    request_body(content = Object, description = "Any of name, description, status, start_date, end_date, location"),
    responses(
        (status = 200, description = "Job updated", body = Job),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
pub async fn update_job(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Map<String, Value>>,
) -> ApiResult {
    auth.require_admin()?;
    let job_id = path.into_inner();

    if let Some(status) = payload.get("status") {
        status
            .as_str()
            .and_then(|s| s.parse::<JobStatus>().ok())
            .ok_or_else(|| ApiError::BadRequest("Invalid job status".into()))?;
    }

    let update = build_update_sql("jobs", &payload, UPDATABLE, job_id)?;
    let mut conn = pool.acquire().await?;
    if execute_update(&mut conn, update).await? == 0 {
        // MySQL reports 0 rows for a no-op update too, so check existence
        fetch_job(pool.get_ref(), job_id).await?;
    }

    let job = fetch_job(pool.get_ref(), job_id).await?;
    Ok(response::ok(job))
}

#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{job_id}",
    params(("job_id" = u64, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job deleted with its shifts"),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
pub async fn delete_job(auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> ApiResult {
    auth.require_admin()?;
    let job_id = path.into_inner();

    let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(job_id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Job"));
    }

    tracing::info!(job_id, deleted_by = auth.user_id, "Job deleted");
    Ok(response::message("Job deleted"))
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs/{job_id}/shifts",
    params(("job_id" = u64, Path, description = "Job id")),
    responses(
        (status = 200, description = "Shifts of the job", body = [Shift]),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
pub async fn list_job_shifts(auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> ApiResult {
    auth.require_any(&[Role::CompanyUser, Role::CrewChief])?;
    let job = fetch_job(pool.get_ref(), path.into_inner()).await?;
    if auth.role == Role::CompanyUser {
        auth.require_company_access(job.company_id)?;
    }

    let shifts = sqlx::query_as::<_, Shift>(&format!(
        "SELECT {} FROM shifts WHERE job_id = ? ORDER BY start_time",
        Shift::COLUMNS
    ))
    .bind(job.id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok(shifts))
}
