//! Timesheet finalization gate and approval lifecycle.

use super::StaffingError;
use crate::model::{assigned_personnel::AssignedPersonnel, timesheet::TimesheetStatus};

/// Fails with the ids of every assignment that still blocks finalization.
///
/// Open slots (no user) never block.
pub fn ensure_all_workers_finished(assignments: &[AssignedPersonnel]) -> Result<(), StaffingError> {
    let pending: Vec<u64> = unfinished(assignments).map(|a| a.id).collect();

    if pending.is_empty() {
        Ok(())
    } else {
        Err(StaffingError::WorkersStillActive { pending })
    }
}

/// Fails once the shift's timesheet has been submitted.
///
/// A shift without a timesheet, or with a draft or rejected one, may still
/// change its crew and hours; finalization re-checks the gate.
pub fn ensure_roster_editable(timesheet: Option<TimesheetStatus>) -> Result<(), StaffingError> {
    match timesheet {
        Some(status) if status.locks_roster() => Err(StaffingError::TimesheetLocked { status }),
        _ => Ok(()),
    }
}

impl TimesheetStatus {
    pub fn is_terminal(self) -> bool {
        self == TimesheetStatus::Completed
    }

    pub fn locks_roster(self) -> bool {
        matches!(
            self,
            TimesheetStatus::PendingCompanyApproval | TimesheetStatus::PendingManagerApproval | TimesheetStatus::Completed
        )
    }

    /// Validates a lifecycle move.
    ///
    /// Draft and Rejected sheets are (re)submitted for company approval,
    /// the company signs before the manager, and either pending stage may
    /// reject.
    pub fn validate_transition(self, to: TimesheetStatus) -> Result<(), StaffingError> {
        use TimesheetStatus::*;

        let valid = match self {
            Draft | Rejected => to == PendingCompanyApproval,
            PendingCompanyApproval => matches!(to, PendingManagerApproval | Rejected),
            PendingManagerApproval => matches!(to, Completed | Rejected),
            Completed => false,
        };

        if valid {
            Ok(())
        } else {
            Err(StaffingError::InvalidTimesheetTransition { from: self, to })
        }
    }
}

/// Hours as shown on timesheets: minutes rounded to two decimals.
pub fn minutes_to_hours(minutes: i64) -> f64 {
    (minutes as f64 / 60.0 * 100.0).round() / 100.0
}

/// Staffed assignments that are neither ended nor no-show.
pub fn unfinished(assignments: &[AssignedPersonnel]) -> impl Iterator<Item = &AssignedPersonnel> {
    assignments
        .iter()
        .filter(|a| a.user_id.is_some() && !a.status.is_finished())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{assigned_personnel::WorkerStatus, shift::RoleCode};
    use chrono::Utc;

    fn assignment(id: u64, user_id: Option<u64>, status: WorkerStatus) -> AssignedPersonnel {
        AssignedPersonnel {
            id,
            shift_id: 1,
            user_id,
            role_code: RoleCode::Stagehand,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn gate_passes_when_everyone_is_done() {
        let crew = vec![
            assignment(1, Some(10), WorkerStatus::ShiftEnded),
            assignment(2, Some(11), WorkerStatus::NoShow),
            assignment(3, None, WorkerStatus::Assigned),
        ];
        assert_eq!(ensure_all_workers_finished(&crew), Ok(()));
    }

    #[test]
    fn gate_lists_blocking_assignments() {
        let crew = vec![
            assignment(1, Some(10), WorkerStatus::ShiftEnded),
            assignment(2, Some(11), WorkerStatus::ClockedIn),
            assignment(3, Some(12), WorkerStatus::OnBreak),
            assignment(4, Some(13), WorkerStatus::Assigned),
        ];
        assert_eq!(
            ensure_all_workers_finished(&crew),
            Err(StaffingError::WorkersStillActive {
                pending: vec![2, 3, 4]
            })
        );
        assert_eq!(unfinished(&crew).map(|a| a.id).collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn empty_shift_can_be_finalized() {
        assert_eq!(ensure_all_workers_finished(&[]), Ok(()));
    }

    #[test]
    fn approval_flow_happy_path() {
        use TimesheetStatus::*;
        assert!(Draft.validate_transition(PendingCompanyApproval).is_ok());
        assert!(PendingCompanyApproval.validate_transition(PendingManagerApproval).is_ok());
        assert!(PendingManagerApproval.validate_transition(Completed).is_ok());
    }

    #[test]
    fn approval_flow_rejects_skips_and_terminal_moves() {
        use TimesheetStatus::*;
        assert_eq!(
            Draft.validate_transition(Completed),
            Err(StaffingError::InvalidTimesheetTransition {
                from: Draft,
                to: Completed
            })
        );
        assert!(PendingCompanyApproval.validate_transition(Completed).is_err());
        assert!(Completed.validate_transition(Rejected).is_err());
        assert!(Draft.validate_transition(Rejected).is_err());
        assert!(Completed.is_terminal());
    }

    #[test]
    fn rejected_sheet_can_be_resubmitted() {
        use TimesheetStatus::*;
        assert!(PendingManagerApproval.validate_transition(Rejected).is_ok());
        assert!(Rejected.validate_transition(PendingCompanyApproval).is_ok());
        assert!(Rejected.validate_transition(PendingManagerApproval).is_err());
    }

    #[test]
    fn submitted_sheet_locks_the_roster() {
        use TimesheetStatus::*;
        assert_eq!(ensure_roster_editable(None), Ok(()));
        assert_eq!(ensure_roster_editable(Some(Draft)), Ok(()));
        assert_eq!(ensure_roster_editable(Some(Rejected)), Ok(()));
        for status in [PendingCompanyApproval, PendingManagerApproval, Completed] {
            assert_eq!(
                ensure_roster_editable(Some(status)),
                Err(StaffingError::TimesheetLocked { status })
            );
        }
    }

    #[test]
    fn hours_round_to_two_decimals() {
        assert_eq!(minutes_to_hours(0), 0.0);
        assert_eq!(minutes_to_hours(90), 1.5);
        assert_eq!(minutes_to_hours(500), 8.33);
    }
}
