//! Required versus assigned headcount per role code.

use serde::Serialize;
use strum::IntoEnumIterator;
use utoipa::ToSchema;

use super::StaffingError;
use crate::model::{assigned_personnel::AssignedPersonnel, shift::RoleCode, shift::Shift};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoleFulfillment {
    pub role_code: RoleCode,
    pub required: u32,
    pub assigned: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Fulfillment {
    pub roles: Vec<RoleFulfillment>,
    pub total_required: u32,
    pub total_assigned: u32,
}

impl Fulfillment {
    pub fn compute(shift: &Shift, assignments: &[AssignedPersonnel]) -> Self {
        let roles: Vec<RoleFulfillment> = RoleCode::iter()
            .map(|role_code| RoleFulfillment {
                role_code,
                required: shift.required_for(role_code),
                assigned: assigned_count(assignments, role_code),
            })
            .collect();

        Self {
            total_required: roles.iter().map(|r| r.required).sum(),
            total_assigned: roles.iter().map(|r| r.assigned).sum(),
            roles,
        }
    }

    pub fn is_fully_staffed(&self) -> bool {
        self.roles.iter().all(|r| r.assigned >= r.required)
    }
}

fn assigned_count(assignments: &[AssignedPersonnel], role_code: RoleCode) -> u32 {
    assignments
        .iter()
        .filter(|a| a.role_code == role_code && a.user_id.is_some())
        .count() as u32
}

/// Rejects a new worker in `role_code` once the shift's requirement is met.
pub fn ensure_capacity(
    shift: &Shift,
    assignments: &[AssignedPersonnel],
    role_code: RoleCode,
) -> Result<(), StaffingError> {
    let required = shift.required_for(role_code);
    if assigned_count(assignments, role_code) >= required {
        return Err(StaffingError::RoleFull {
            role_code,
            required,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{assigned_personnel::WorkerStatus, shift::ShiftStatus};
    use chrono::{NaiveDate, Utc};

    pub(crate) fn sample_shift() -> Shift {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        Shift {
            id: 40,
            job_id: 12,
            date,
            start_time: date.and_hms_opt(8, 0, 0).unwrap(),
            end_time: date.and_hms_opt(16, 0, 0).unwrap(),
            location: Some("Hall B".to_string()),
            description: None,
            status: ShiftStatus::Pending,
            required_crew_chiefs: 1,
            required_stagehands: 2,
            required_fork_operators: 0,
            required_reach_fork_operators: 0,
            required_riggers: 1,
            required_general_laborers: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn worker(id: u64, user_id: Option<u64>, role_code: RoleCode) -> AssignedPersonnel {
        AssignedPersonnel {
            id,
            shift_id: 40,
            user_id,
            role_code,
            status: WorkerStatus::Assigned,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn counts_per_role() {
        let shift = sample_shift();
        let crew = vec![
            worker(1, Some(1), RoleCode::CrewChief),
            worker(2, Some(2), RoleCode::Stagehand),
            worker(3, None, RoleCode::Stagehand),
        ];

        let f = Fulfillment::compute(&shift, &crew);
        assert_eq!(f.roles.len(), 6);
        assert_eq!(f.total_required, 4);
        assert_eq!(f.total_assigned, 2);
        assert!(!f.is_fully_staffed());

        let sh = f
            .roles
            .iter()
            .find(|r| r.role_code == RoleCode::Stagehand)
            .unwrap();
        assert_eq!((sh.required, sh.assigned), (2, 1));
    }

    #[test]
    fn capacity_is_enforced_per_role() {
        let shift = sample_shift();
        let crew = vec![worker(1, Some(1), RoleCode::CrewChief)];

        assert_eq!(
            ensure_capacity(&shift, &crew, RoleCode::CrewChief),
            Err(StaffingError::RoleFull {
                role_code: RoleCode::CrewChief,
                required: 1
            })
        );
        assert!(ensure_capacity(&shift, &crew, RoleCode::Stagehand).is_ok());
        assert!(ensure_capacity(&shift, &crew, RoleCode::ForkOperator).is_err());
    }
}
