//! Who may manage a shift.

use crate::model::{crew_chief_permission::PermissionType, role::Role};

/// Ownership chain of a shift, used to match crew chief grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftScope {
    pub company_id: u64,
    pub job_id: u64,
    pub shift_id: u64,
}

impl ShiftScope {
    pub fn covers(&self, permission_type: PermissionType, target_id: u64) -> bool {
        match permission_type {
            PermissionType::Client => self.company_id == target_id,
            PermissionType::Job => self.job_id == target_id,
            PermissionType::Shift => self.shift_id == target_id,
        }
    }
}

/// Why a user may manage a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementGrant {
    Admin,
    Permission(PermissionType),
    AssignedCrewChief,
}

/// Resolves management rights over a shift.
///
/// `grants` are the user's crew chief permissions as (type, target) pairs
/// and `assigned_as_crew_chief` is true when the user holds a CC slot on
/// the shift itself.
pub fn management_grant(
    role: Role,
    grants: &[(PermissionType, u64)],
    scope: &ShiftScope,
    assigned_as_crew_chief: bool,
) -> Option<ManagementGrant> {
    if role == Role::Admin {
        return Some(ManagementGrant::Admin);
    }
    if let Some((kind, _)) = grants.iter().find(|(kind, target)| scope.covers(*kind, *target)) {
        return Some(ManagementGrant::Permission(*kind));
    }
    if assigned_as_crew_chief {
        return Some(ManagementGrant::AssignedCrewChief);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCOPE: ShiftScope = ShiftScope {
        company_id: 1,
        job_id: 20,
        shift_id: 300,
    };

    #[test]
    fn admin_always_manages() {
        assert_eq!(
            management_grant(Role::Admin, &[], &SCOPE, false),
            Some(ManagementGrant::Admin)
        );
    }

    #[test]
    fn grants_match_on_their_own_level() {
        for (kind, target) in [
            (PermissionType::Client, 1),
            (PermissionType::Job, 20),
            (PermissionType::Shift, 300),
        ] {
            assert_eq!(
                management_grant(Role::CrewChief, &[(kind, target)], &SCOPE, false),
                Some(ManagementGrant::Permission(kind))
            );
        }
    }

    #[test]
    fn grants_for_other_targets_do_not_match() {
        let grants = [
            (PermissionType::Client, 2),
            (PermissionType::Job, 1),
            (PermissionType::Shift, 20),
        ];
        assert_eq!(management_grant(Role::CrewChief, &grants, &SCOPE, false), None);
        assert_eq!(management_grant(Role::Employee, &[], &SCOPE, false), None);
    }

    #[test]
    fn assigned_crew_chief_manages_their_shift() {
        assert_eq!(
            management_grant(Role::Employee, &[], &SCOPE, true),
            Some(ManagementGrant::AssignedCrewChief)
        );
    }
}
