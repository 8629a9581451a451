//! Shift-level access checks shared by the staffing handlers.

use sqlx::MySqlConnection;

use super::response::{ApiError, ApiResult};
use crate::auth::auth::AuthUser;
use crate::model::{crew_chief_permission::PermissionType, role::Role, shift::RoleCode};
use crate::staffing::permissions::{ManagementGrant, ShiftScope, management_grant};
use crate::staffing::store::fetch_scope;

/// Crew chief grants held by a user as (type, target) pairs.
pub async fn fetch_grants(conn: &mut MySqlConnection, user_id: u64) -> ApiResult<Vec<(PermissionType, u64)>> {
    let rows = sqlx::query_as::<_, (String, u64)>(
        "SELECT permission_type, target_id FROM crew_chief_permissions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|(kind, target)| {
            kind.parse::<PermissionType>()
                .map(|k| (k, target))
                .map_err(|_| ApiError::Internal(format!("unknown permission type {kind}")))
        })
        .collect()
}

async fn assigned_role(conn: &mut MySqlConnection, user_id: u64, shift_id: u64) -> ApiResult<Option<RoleCode>> {
    let role = sqlx::query_scalar::<_, String>(
        "SELECT role_code FROM assigned_personnel WHERE shift_id = ? AND user_id = ?",
    )
    .bind(shift_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    role.map(|r| {
        r.parse::<RoleCode>()
            .map_err(|_| ApiError::Internal(format!("unknown role code {r}")))
    })
    .transpose()
}

/// Resolves the caller's management grant on a shift, if any.
pub async fn resolve_grant(
    conn: &mut MySqlConnection,
    auth: &AuthUser,
    scope: &ShiftScope,
) -> ApiResult<Option<ManagementGrant>> {
    if auth.is_admin() {
        return Ok(Some(ManagementGrant::Admin));
    }
    let grants = fetch_grants(conn, auth.user_id).await?;
    let role = assigned_role(conn, auth.user_id, scope.shift_id).await?;

    Ok(management_grant(
        auth.role,
        &grants,
        scope,
        role == Some(RoleCode::CrewChief),
    ))
}

/// Fails unless the caller may manage the shift's staffing.
pub async fn require_shift_manager(
    conn: &mut MySqlConnection,
    auth: &AuthUser,
    shift_id: u64,
) -> ApiResult<(ShiftScope, ManagementGrant)> {
    let scope = fetch_scope(conn, shift_id).await?;
    match resolve_grant(conn, auth, &scope).await? {
        Some(grant) => Ok((scope, grant)),
        None => Err(ApiError::Forbidden("No management rights on this shift".into())),
    }
}

/// Fails unless the caller may see the shift at all.
pub async fn require_shift_viewer(conn: &mut MySqlConnection, auth: &AuthUser, shift_id: u64) -> ApiResult<ShiftScope> {
    let scope = fetch_scope(conn, shift_id).await?;
    let allowed = match auth.role {
        Role::Admin => true,
        Role::CompanyUser => auth.company_id == Some(scope.company_id),
        Role::CrewChief | Role::Employee => {
            assigned_role(conn, auth.user_id, shift_id).await?.is_some()
                || resolve_grant(conn, auth, &scope).await?.is_some()
        }
    };

    if allowed {
        Ok(scope)
    } else {
        Err(ApiError::Forbidden("No access to this shift".into()))
    }
}
