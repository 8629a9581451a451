//! Loads staffing state from MySQL and persists transitions.
//!
//! Every clock mutation runs in one transaction that first locks the
//! assignment row (`SELECT ... FOR UPDATE`), so two concurrent actions on
//! the same worker are serialized and the entry rules hold.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{debug, info};
use utoipa::ToSchema;

use super::clock::{ClockAction, DisplayState, EntryChange, Transition, WorkerClock, apply_change};
use super::fulfillment::Fulfillment;
use super::permissions::ShiftScope;
use super::timesheet::{ensure_roster_editable, minutes_to_hours, unfinished};
use super::StaffingError;
use crate::api::response::{ApiError, ApiResult};
use crate::model::{
    assigned_personnel::AssignedPersonnel,
    shift::{Shift, ShiftStatus},
    time_entry::TimeEntry,
    timesheet::TimesheetStatus,
};

/// One worker on a shift, as returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkerView {
    pub assignment: AssignedPersonnel,
    pub user_name: Option<String>,
    pub display_state: DisplayState,
    pub entries: Vec<TimeEntry>,
    pub worked_minutes: i64,
    pub worked_hours: f64,
}

impl WorkerView {
    pub fn new(assignment: AssignedPersonnel, user_name: Option<String>, entries: Vec<TimeEntry>) -> Self {
        let clock = WorkerClock::new(assignment.status, &entries);
        let display_state = clock.display_state(assignment.user_id.is_some());
        let worked_minutes = clock.worked_minutes();

        Self {
            assignment,
            user_name,
            display_state,
            entries,
            worked_minutes,
            worked_hours: minutes_to_hours(worked_minutes),
        }
    }
}

/// Shift with everything the staffing screens need.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShiftDetail {
    pub shift: Shift,
    pub job_name: String,
    pub company_id: u64,
    pub company_name: String,
    pub workers: Vec<WorkerView>,
    pub fulfillment: Fulfillment,
    pub fully_staffed: bool,
    pub timesheet_id: Option<u64>,
    pub timesheet_status: Option<TimesheetStatus>,
}

pub async fn fetch_shift(conn: &mut MySqlConnection, shift_id: u64) -> ApiResult<Shift> {
    sqlx::query_as::<_, Shift>(&format!("SELECT {} FROM shifts WHERE id = ?", Shift::COLUMNS))
        .bind(shift_id)
        .fetch_optional(conn)
        .await?
        .ok_or(ApiError::NotFound("Shift"))
}

pub async fn fetch_scope(conn: &mut MySqlConnection, shift_id: u64) -> ApiResult<ShiftScope> {
    let row = sqlx::query_as::<_, (u64, u64)>(
        "SELECT j.company_id, s.job_id FROM shifts s JOIN jobs j ON j.id = s.job_id WHERE s.id = ?",
    )
    .bind(shift_id)
    .fetch_optional(conn)
    .await?
    .ok_or(ApiError::NotFound("Shift"))?;

    Ok(ShiftScope {
        company_id: row.0,
        job_id: row.1,
        shift_id,
    })
}

pub async fn fetch_assignments(
    conn: &mut MySqlConnection,
    shift_id: u64,
    lock: bool,
) -> ApiResult<Vec<AssignedPersonnel>> {
    let sql = format!(
        "SELECT {} FROM assigned_personnel WHERE shift_id = ? ORDER BY id{}",
        AssignedPersonnel::COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    );
    Ok(sqlx::query_as::<_, AssignedPersonnel>(&sql)
        .bind(shift_id)
        .fetch_all(conn)
        .await?)
}

/// Share-locks the shift's timesheet row and fails if it has been submitted.
///
/// Call before locking any assignment row; finalization takes the
/// timesheet lock first too.
pub async fn ensure_timesheet_open(conn: &mut MySqlConnection, shift_id: u64) -> ApiResult<()> {
    let status = sqlx::query_scalar::<_, String>("SELECT status FROM timesheets WHERE shift_id = ? FOR SHARE")
        .bind(shift_id)
        .fetch_optional(conn)
        .await?
        .map(|status| {
            status
                .parse::<TimesheetStatus>()
                .map_err(|_| ApiError::Internal(format!("unknown timesheet status {status}")))
        })
        .transpose()?;

    Ok(ensure_roster_editable(status)?)
}

async fn lock_assignment(
    conn: &mut MySqlConnection,
    shift_id: u64,
    assignment_id: u64,
) -> ApiResult<AssignedPersonnel> {
    sqlx::query_as::<_, AssignedPersonnel>(&format!(
        "SELECT {} FROM assigned_personnel WHERE id = ? AND shift_id = ? FOR UPDATE",
        AssignedPersonnel::COLUMNS
    ))
    .bind(assignment_id)
    .bind(shift_id)
    .fetch_optional(conn)
    .await?
    .ok_or(ApiError::NotFound("Assignment"))
}

pub async fn fetch_entries(conn: &mut MySqlConnection, assignment_id: u64) -> ApiResult<Vec<TimeEntry>> {
    Ok(sqlx::query_as::<_, TimeEntry>(&format!(
        "SELECT {} FROM time_entries WHERE assigned_personnel_id = ? ORDER BY entry_number",
        TimeEntry::COLUMNS
    ))
    .bind(assignment_id)
    .fetch_all(conn)
    .await?)
}

/// Entries of every assignment on a shift, grouped by assignment id.
pub async fn fetch_shift_entries(
    conn: &mut MySqlConnection,
    shift_id: u64,
) -> ApiResult<HashMap<u64, Vec<TimeEntry>>> {
    let entries = sqlx::query_as::<_, TimeEntry>(&format!(
        "SELECT {} FROM time_entries WHERE assigned_personnel_id IN \
         (SELECT id FROM assigned_personnel WHERE shift_id = ?) \
         ORDER BY assigned_personnel_id, entry_number",
        TimeEntry::COLUMNS
    ))
    .bind(shift_id)
    .fetch_all(conn)
    .await?;

    let mut grouped: HashMap<u64, Vec<TimeEntry>> = HashMap::new();
    for entry in entries {
        grouped.entry(entry.assigned_personnel_id).or_default().push(entry);
    }
    Ok(grouped)
}

async fn fetch_user_names(conn: &mut MySqlConnection, shift_id: u64) -> ApiResult<HashMap<u64, String>> {
    let rows = sqlx::query_as::<_, (u64, String)>(
        "SELECT u.id, u.name FROM users u \
         JOIN assigned_personnel ap ON ap.user_id = u.id WHERE ap.shift_id = ?",
    )
    .bind(shift_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Assembles the worker views of a shift.
pub async fn fetch_workers(conn: &mut MySqlConnection, shift_id: u64) -> ApiResult<Vec<WorkerView>> {
    let assignments = fetch_assignments(conn, shift_id, false).await?;
    let mut entries = fetch_shift_entries(conn, shift_id).await?;
    let names = fetch_user_names(conn, shift_id).await?;

    Ok(assignments
        .into_iter()
        .map(|a| {
            let name = a.user_id.and_then(|uid| names.get(&uid).cloned());
            let worker_entries = entries.remove(&a.id).unwrap_or_default();
            WorkerView::new(a, name, worker_entries)
        })
        .collect())
}

pub async fn load_shift_detail(pool: &MySqlPool, shift_id: u64) -> ApiResult<ShiftDetail> {
    let mut conn = pool.acquire().await?;

    let shift = fetch_shift(&mut conn, shift_id).await?;
    let (job_name, company_id, company_name) = sqlx::query_as::<_, (String, u64, String)>(
        "SELECT j.name, c.id, c.name FROM jobs j JOIN companies c ON c.id = j.company_id WHERE j.id = ?",
    )
    .bind(shift.job_id)
    .fetch_one(&mut *conn)
    .await?;

    let workers = fetch_workers(&mut conn, shift_id).await?;
    let assignments: Vec<AssignedPersonnel> = workers.iter().map(|w| w.assignment.clone()).collect();
    let fulfillment = Fulfillment::compute(&shift, &assignments);

    let timesheet = sqlx::query_as::<_, (u64, String)>("SELECT id, status FROM timesheets WHERE shift_id = ?")
        .bind(shift_id)
        .fetch_optional(&mut *conn)
        .await?;
    let (timesheet_id, timesheet_status) = match timesheet {
        Some((id, status)) => (
            Some(id),
            Some(
                status
                    .parse::<TimesheetStatus>()
                    .map_err(|_| ApiError::Internal(format!("unknown timesheet status {status}")))?,
            ),
        ),
        None => (None, None),
    };

    Ok(ShiftDetail {
        shift,
        job_name,
        company_id,
        company_name,
        workers,
        fully_staffed: fulfillment.is_fully_staffed(),
        fulfillment,
        timesheet_id,
        timesheet_status,
    })
}

/// Writes a transition for `assignment_id` and returns the stored entries.
async fn persist(
    conn: &mut MySqlConnection,
    assignment_id: u64,
    mut entries: Vec<TimeEntry>,
    transition: &Transition,
) -> ApiResult<Vec<TimeEntry>> {
    if let Some(change) = &transition.change {
        let new_id = match *change {
            EntryChange::Open {
                entry_number,
                clock_in,
            } => {
                let result = sqlx::query(
                    "INSERT INTO time_entries (assigned_personnel_id, entry_number, clock_in, clock_out, is_active) \
                     VALUES (?, ?, ?, NULL, TRUE)",
                )
                .bind(assignment_id)
                .bind(entry_number)
                .bind(clock_in)
                .execute(&mut *conn)
                .await?;
                result.last_insert_id()
            }
            EntryChange::Close { entry_id, clock_out } => {
                sqlx::query("UPDATE time_entries SET clock_out = ?, is_active = FALSE WHERE id = ?")
                    .bind(clock_out)
                    .bind(entry_id)
                    .execute(&mut *conn)
                    .await?;
                entry_id
            }
            EntryChange::Correct {
                entry_id,
                clock_in,
                clock_out,
            } => {
                sqlx::query("UPDATE time_entries SET clock_in = ?, clock_out = ?, is_active = ? WHERE id = ?")
                    .bind(clock_in)
                    .bind(clock_out)
                    .bind(clock_out.is_none())
                    .bind(entry_id)
                    .execute(&mut *conn)
                    .await?;
                entry_id
            }
        };
        apply_change(&mut entries, assignment_id, change, new_id);
    }

    sqlx::query("UPDATE assigned_personnel SET status = ? WHERE id = ?")
        .bind(transition.status.as_ref())
        .bind(assignment_id)
        .execute(&mut *conn)
        .await?;

    Ok(entries)
}

/// Runs one clock action for one worker.
pub async fn apply_clock_action(
    pool: &MySqlPool,
    shift_id: u64,
    assignment_id: u64,
    action: ClockAction,
    at: NaiveDateTime,
) -> ApiResult<WorkerView> {
    let mut tx = pool.begin().await?;

    ensure_timesheet_open(&mut tx, shift_id).await?;
    let mut assignment = lock_assignment(&mut tx, shift_id, assignment_id).await?;
    if assignment.user_id.is_none() {
        return Err(StaffingError::UnassignedSlot.into());
    }

    let entries = fetch_entries(&mut tx, assignment_id).await?;
    let transition = WorkerClock::new(assignment.status, &entries).apply(action, at)?;
    let entries = persist(&mut tx, assignment_id, entries, &transition).await?;

    if action == ClockAction::ClockIn {
        sqlx::query("UPDATE shifts SET status = ? WHERE id = ? AND status IN (?, ?)")
            .bind(ShiftStatus::InProgress.as_ref())
            .bind(shift_id)
            .bind(ShiftStatus::Pending.as_ref())
            .bind(ShiftStatus::Active.as_ref())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    debug!(
        shift_id,
        assignment_id,
        action = action.as_str(),
        status = %transition.status,
        "Clock action applied"
    );

    assignment.status = transition.status;
    Ok(WorkerView::new(assignment, None, entries))
}

/// Ends the shift for every staffed worker who has not finished yet.
pub async fn end_all(pool: &MySqlPool, shift_id: u64, at: NaiveDateTime) -> ApiResult<Vec<WorkerView>> {
    let mut tx = pool.begin().await?;

    ensure_timesheet_open(&mut tx, shift_id).await?;
    let assignments = fetch_assignments(&mut tx, shift_id, true).await?;
    let pending: Vec<AssignedPersonnel> = unfinished(&assignments).cloned().collect();

    let mut ended = Vec::with_capacity(pending.len());
    for mut assignment in pending {
        let entries = fetch_entries(&mut tx, assignment.id).await?;
        let transition = WorkerClock::new(assignment.status, &entries).end_shift(at)?;
        let entries = persist(&mut tx, assignment.id, entries, &transition).await?;
        assignment.status = transition.status;
        ended.push(WorkerView::new(assignment, None, entries));
    }

    tx.commit().await?;

    info!(shift_id, ended = ended.len(), "Ended shift for all workers");
    Ok(ended)
}

/// Applies an admin correction to a single time entry.
pub async fn correct_entry(
    pool: &MySqlPool,
    entry_id: u64,
    clock_in: NaiveDateTime,
    clock_out: Option<NaiveDateTime>,
) -> ApiResult<WorkerView> {
    let mut tx = pool.begin().await?;

    let (assignment_id, shift_id) = sqlx::query_as::<_, (u64, u64)>(
        "SELECT ap.id, ap.shift_id FROM time_entries te \
         JOIN assigned_personnel ap ON ap.id = te.assigned_personnel_id WHERE te.id = ?",
    )
    .bind(entry_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ApiError::NotFound("Time entry"))?;

    ensure_timesheet_open(&mut tx, shift_id).await?;
    let mut assignment = lock_assignment(&mut tx, shift_id, assignment_id).await?;
    let entries = fetch_entries(&mut tx, assignment_id).await?;
    let transition = WorkerClock::new(assignment.status, &entries).correct_entry(entry_id, clock_in, clock_out)?;
    let entries = persist(&mut tx, assignment_id, entries, &transition).await?;

    tx.commit().await?;

    info!(entry_id, assignment_id, "Time entry corrected");
    assignment.status = transition.status;
    Ok(WorkerView::new(assignment, None, entries))
}

/// Locks the shift's assignments and applies the finalization gate.
pub async fn ensure_no_active_workers(conn: &mut MySqlConnection, shift_id: u64) -> ApiResult<Vec<AssignedPersonnel>> {
    let assignments = fetch_assignments(conn, shift_id, true).await?;
    super::timesheet::ensure_all_workers_finished(&assignments)?;
    Ok(assignments)
}
