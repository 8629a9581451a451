use thiserror::Error;

use crate::model::{assigned_personnel::WorkerStatus, shift::RoleCode, timesheet::TimesheetStatus};

/// A staffing rule rejected the requested action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaffingError {
    #[error("Worker is already clocked in")]
    AlreadyClockedIn,

    #[error("Worker is not clocked in")]
    NotClockedIn,

    #[error("Maximum of {max} clock-in entries reached")]
    EntryLimitReached { max: usize },

    #[error("Worker was marked as no-show")]
    WorkerNoShow,

    #[error("Worker has already ended their shift")]
    ShiftAlreadyEnded,

    #[error("Cannot mark no-show for a worker in status {status}")]
    NoShowNotAllowed { status: WorkerStatus },

    #[error("Slot has no worker assigned")]
    UnassignedSlot,

    #[error("Invalid time range: {reason}")]
    InvalidTimeRange { reason: String },

    #[error("Time entry {entry_id} does not belong to this worker")]
    EntryNotFound { entry_id: u64 },

    #[error("{} worker(s) have not ended their shift", pending.len())]
    WorkersStillActive { pending: Vec<u64> },

    #[error("Timesheet cannot move from {from} to {to}")]
    InvalidTimesheetTransition {
        from: TimesheetStatus,
        to: TimesheetStatus,
    },

    #[error("All {required} {role_code} position(s) are already filled")]
    RoleFull { role_code: RoleCode, required: u32 },

    #[error("Worker has time entries and cannot be removed")]
    AssignmentHasEntries,

    #[error("Timesheet is {status}; the shift's crew and hours are locked")]
    TimesheetLocked { status: TimesheetStatus },
}

impl StaffingError {
    /// Stable machine-readable code used in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyClockedIn => "ALREADY_CLOCKED_IN",
            Self::NotClockedIn => "NOT_CLOCKED_IN",
            Self::EntryLimitReached { .. } => "ENTRY_LIMIT_REACHED",
            Self::WorkerNoShow => "WORKER_NO_SHOW",
            Self::ShiftAlreadyEnded => "SHIFT_ALREADY_ENDED",
            Self::NoShowNotAllowed { .. } => "NO_SHOW_NOT_ALLOWED",
            Self::UnassignedSlot => "UNASSIGNED_SLOT",
            Self::InvalidTimeRange { .. } => "INVALID_TIME_RANGE",
            Self::EntryNotFound { .. } => "ENTRY_NOT_FOUND",
            Self::WorkersStillActive { .. } => "WORKERS_STILL_ACTIVE",
            Self::InvalidTimesheetTransition { .. } => "INVALID_TIMESHEET_TRANSITION",
            Self::RoleFull { .. } => "ROLE_FULL",
            Self::AssignmentHasEntries => "ASSIGNMENT_HAS_ENTRIES",
            Self::TimesheetLocked { .. } => "TIMESHEET_LOCKED",
        }
    }
}
