use std::collections::{HashMap, HashSet};

use actix_web::web;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::ToSchema;

use super::guard;
use super::response::{self, ApiError, ApiResult, conflict_on_duplicate};
use crate::auth::auth::AuthUser;
use crate::model::{assigned_personnel::{AssignedPersonnel, WorkerStatus}, shift::RoleCode};
use crate::staffing::StaffingError;
use crate::staffing::fulfillment::ensure_capacity;
use crate::staffing::store::{ensure_timesheet_open, fetch_assignments, fetch_shift};
use crate::utils::cache::ShiftCache;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignWorker {
    /// Leave empty to create an open slot
    #[schema(example = 17)]
    pub user_id: Option<u64>,
    pub role_code: RoleCode,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncImport {
    pub workers: Vec<AssignWorker>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SyncSummary {
    pub added: Vec<u64>,
    pub updated: Vec<u64>,
    pub removed: Vec<u64>,
    /// Assignments kept because they already have time entries
    pub kept: Vec<u64>,
}

async fn ensure_active_user(conn: &mut MySqlConnection, user_id: u64) -> ApiResult<()> {
    let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    if !active {
        return Err(ApiError::BadRequest(format!("User {user_id} is deactivated")));
    }
    Ok(())
}

async fn insert_assignment(
    conn: &mut MySqlConnection,
    shift_id: u64,
    user_id: Option<u64>,
    role_code: RoleCode,
) -> ApiResult<u64> {
    let result = sqlx::query(
        "INSERT INTO assigned_personnel (shift_id, user_id, role_code, status) VALUES (?, ?, ?, ?)",
    )
    .bind(shift_id)
    .bind(user_id)
    .bind(role_code.as_ref())
    .bind(WorkerStatus::Assigned.as_ref())
    .execute(conn)
    .await
    .map_err(|e| conflict_on_duplicate(e, "Worker is already assigned to this shift"))?;
    Ok(result.last_insert_id())
}

/// Assignment ids on the shift that already have at least one time entry.
async fn assignments_with_entries(conn: &mut MySqlConnection, shift_id: u64) -> ApiResult<HashSet<u64>> {
    let ids = sqlx::query_scalar::<_, u64>(
        "SELECT DISTINCT te.assigned_personnel_id FROM time_entries te \
         JOIN assigned_personnel ap ON ap.id = te.assigned_personnel_id WHERE ap.shift_id = ?",
    )
    .bind(shift_id)
    .fetch_all(conn)
    .await?;
    Ok(ids.into_iter().collect())
}

#[utoipa::path(
    post,
    path = "/api/v1/shifts/{shift_id}/personnel",
    params(("shift_id" = u64, Path, description = "Shift id")),
    request_body = AssignWorker,
    responses(
        (status = 201, description = "Worker assigned", body = AssignedPersonnel),
        (status = 403, description = "No management rights on this shift"),
        (status = 409, description = "Already assigned, role full or timesheet submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Personnel"
)]
pub async fn assign_worker(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    payload: web::Json<AssignWorker>,
) -> ApiResult {
    let shift_id = path.into_inner();
    let mut tx = pool.begin().await?;
    guard::require_shift_manager(&mut tx, &auth, shift_id).await?;
    ensure_timesheet_open(&mut tx, shift_id).await?;

    let shift = fetch_shift(&mut tx, shift_id).await?;
    // lock the roster so concurrent assigns see each other's rows
    let assignments = fetch_assignments(&mut tx, shift_id, true).await?;

    if let Some(user_id) = payload.user_id {
        ensure_active_user(&mut tx, user_id).await?;
        ensure_capacity(&shift, &assignments, payload.role_code)?;
    }
    let id = insert_assignment(&mut tx, shift_id, payload.user_id, payload.role_code).await?;

    let assignment = sqlx::query_as::<_, AssignedPersonnel>(&format!(
        "SELECT {} FROM assigned_personnel WHERE id = ?",
        AssignedPersonnel::COLUMNS
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    cache.invalidate(shift_id).await;
    info!(shift_id, assignment_id = id, role = %payload.role_code, "Worker assigned");
    Ok(response::created(assignment))
}

#[utoipa::path(
    delete,
    path = "/api/v1/shifts/{shift_id}/personnel/{assignment_id}",
    params(
        ("shift_id" = u64, Path, description = "Shift id"),
        ("assignment_id" = u64, Path, description = "Assignment id")
    ),
    responses(
        (status = 200, description = "Worker removed from the shift"),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "Worker already has time entries or timesheet submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Personnel"
)]
pub async fn unassign_worker(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<(u64, u64)>,
) -> ApiResult {
    let (shift_id, assignment_id) = path.into_inner();
    let mut tx = pool.begin().await?;
    guard::require_shift_manager(&mut tx, &auth, shift_id).await?;
    ensure_timesheet_open(&mut tx, shift_id).await?;

    let assignments = fetch_assignments(&mut tx, shift_id, true).await?;
    if !assignments.iter().any(|a| a.id == assignment_id) {
        return Err(ApiError::NotFound("Assignment"));
    }
    if assignments_with_entries(&mut tx, shift_id).await?.contains(&assignment_id) {
        return Err(StaffingError::AssignmentHasEntries.into());
    }

    sqlx::query("DELETE FROM assigned_personnel WHERE id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    cache.invalidate(shift_id).await;
    info!(shift_id, assignment_id, "Worker unassigned");
    Ok(response::message("Worker unassigned"))
}

/// Replaces the shift's roster with `workers`.
///
/// Assignments that already have time entries always survive. Listed users
/// already on the shift keep their row and take the listed role.
#[utoipa::path(
    put,
    path = "/api/v1/shifts/{shift_id}/sync-import",
    params(("shift_id" = u64, Path, description = "Shift id")),
    request_body = SyncImport,
    responses(
        (status = 200, description = "Roster replaced", body = SyncSummary),
        (status = 403, description = "No management rights on this shift"),
        (status = 409, description = "A role would be over capacity or timesheet submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Personnel"
)]
pub async fn sync_import(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<ShiftCache>,
    path: web::Path<u64>,
    payload: web::Json<SyncImport>,
) -> ApiResult {
    let shift_id = path.into_inner();
    let payload = payload.into_inner();

    let mut seen = HashSet::new();
    for worker in &payload.workers {
        if let Some(user_id) = worker.user_id {
            if !seen.insert(user_id) {
                return Err(ApiError::BadRequest(format!("User {user_id} is listed twice")));
            }
        }
    }

    let mut tx = pool.begin().await?;
    guard::require_shift_manager(&mut tx, &auth, shift_id).await?;
    ensure_timesheet_open(&mut tx, shift_id).await?;

    let shift = fetch_shift(&mut tx, shift_id).await?;
    let current = fetch_assignments(&mut tx, shift_id, true).await?;
    let with_entries = assignments_with_entries(&mut tx, shift_id).await?;

    let by_user: HashMap<u64, &AssignedPersonnel> =
        current.iter().filter_map(|a| a.user_id.map(|u| (u, a))).collect();

    let mut summary = SyncSummary::default();
    // the roster as it will look after the import, for capacity checks
    let mut roster: Vec<AssignedPersonnel> = Vec::new();

    for a in &current {
        let listed = a.user_id.is_some_and(|u| seen.contains(&u));
        if with_entries.contains(&a.id) {
            summary.kept.push(a.id);
            roster.push(a.clone());
        } else if !listed {
            summary.removed.push(a.id);
        }
    }

    if !summary.removed.is_empty() {
        let placeholders = vec!["?"; summary.removed.len()].join(", ");
        let sql = format!("DELETE FROM assigned_personnel WHERE id IN ({placeholders})");
        let mut q = sqlx::query(&sql);
        for id in &summary.removed {
            q = q.bind(*id);
        }
        q.execute(&mut *tx).await?;
    }

    for worker in &payload.workers {
        let existing = worker.user_id.and_then(|u| by_user.get(&u).copied());
        match existing {
            // rows with entries keep their original role
            Some(a) if with_entries.contains(&a.id) => {}
            Some(a) => {
                ensure_capacity(&shift, &roster, worker.role_code)?;
                if a.role_code != worker.role_code {
                    sqlx::query("UPDATE assigned_personnel SET role_code = ? WHERE id = ?")
                        .bind(worker.role_code.as_ref())
                        .bind(a.id)
                        .execute(&mut *tx)
                        .await?;
                    summary.updated.push(a.id);
                }
                let mut kept = a.clone();
                kept.role_code = worker.role_code;
                roster.push(kept);
            }
            None => {
                if let Some(user_id) = worker.user_id {
                    ensure_active_user(&mut tx, user_id).await?;
                    ensure_capacity(&shift, &roster, worker.role_code)?;
                }
                let id = insert_assignment(&mut tx, shift_id, worker.user_id, worker.role_code).await?;
                summary.added.push(id);
                roster.push(roster_row(id, shift_id, worker));
            }
        }
    }

    tx.commit().await?;

    cache.invalidate(shift_id).await;
    info!(
        shift_id,
        added = summary.added.len(),
        updated = summary.updated.len(),
        removed = summary.removed.len(),
        kept = summary.kept.len(),
        "Roster synced"
    );
    Ok(response::ok(summary))
}

fn roster_row(id: u64, shift_id: u64, worker: &AssignWorker) -> AssignedPersonnel {
    let now = chrono::Utc::now();
    AssignedPersonnel {
        id,
        shift_id,
        user_id: worker.user_id,
        role_code: worker.role_code,
        status: WorkerStatus::Assigned,
        created_at: now,
        updated_at: now,
    }
}
