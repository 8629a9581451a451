use actix_web::web;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use super::guard;
use super::response::{self, ApiError, ApiResult, conflict_on_duplicate};
use crate::auth::auth::AuthUser;
use crate::model::{
    crew_chief_permission::{CrewChiefPermission, PermissionType},
    role::Role,
};
use crate::staffing::permissions::ManagementGrant;
use crate::staffing::store::fetch_scope;

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantPermission {
    #[schema(example = 9)]
    pub user_id: u64,
    pub permission_type: PermissionType,
    /// Company id for `client`, job id for `job`, shift id for `shift`
    #[schema(example = 12)]
    pub target_id: u64,
}

#[derive(Deserialize, IntoParams)]
pub struct PermissionQuery {
    pub user_id: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShiftRights {
    pub shift_id: u64,
    pub can_manage: bool,
    #[schema(value_type = Option<Object>)]
    pub grant: Option<ManagementGrant>,
}

fn target_table(permission_type: PermissionType) -> &'static str {
    match permission_type {
        PermissionType::Client => "companies",
        PermissionType::Job => "jobs",
        PermissionType::Shift => "shifts",
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/crew-chief-permissions",
    params(PermissionQuery),
    responses(
        (status = 200, description = "Grants; crew chiefs only see their own", body = [CrewChiefPermission]),
        (status = 403, description = "Insufficient role")
    ),
    security(("bearer_auth" = [])),
    tag = "Crew Chief"
)]
pub async fn list_permissions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PermissionQuery>,
) -> ApiResult {
    auth.require_any(&[Role::CrewChief])?;
    let user_id = if auth.is_admin() { query.user_id } else { Some(auth.user_id) };

    let mut sql = format!("SELECT {} FROM crew_chief_permissions", CrewChiefPermission::COLUMNS);
    if user_id.is_some() {
        sql.push_str(" WHERE user_id = ?");
    }
    sql.push_str(" ORDER BY user_id, permission_type, target_id");

    let mut q = sqlx::query_as::<_, CrewChiefPermission>(&sql);
    if let Some(user_id) = user_id {
        q = q.bind(user_id);
    }
    let grants = q.fetch_all(pool.get_ref()).await?;

    Ok(response::ok(grants))
}

#[utoipa::path(
    post,
    path = "/api/v1/crew-chief-permissions",
    request_body = GrantPermission,
    responses(
        (status = 201, description = "Permission granted", body = CrewChiefPermission),
        (status = 400, description = "User is not a crew chief or target does not exist"),
        (status = 409, description = "Permission already granted")
    ),
    security(("bearer_auth" = [])),
    tag = "Crew Chief"
)]
pub async fn grant_permission(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<GrantPermission>,
) -> ApiResult {
    auth.require_admin()?;
    let mut conn = pool.acquire().await?;

    let role_id = sqlx::query_scalar::<_, u8>("SELECT role_id FROM users WHERE id = ?")
        .bind(payload.user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    if Role::from_id(role_id) != Some(Role::CrewChief) {
        return Err(ApiError::BadRequest("Permissions can only be granted to crew chiefs".into()));
    }

    let table = target_table(payload.permission_type);
    let exists = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table} WHERE id = ?"))
        .bind(payload.target_id)
        .fetch_one(&mut *conn)
        .await?;
    if exists == 0 {
        return Err(ApiError::BadRequest(format!(
            "No {} with id {}",
            payload.permission_type, payload.target_id
        )));
    }

    let result = sqlx::query(
        "INSERT INTO crew_chief_permissions (user_id, permission_type, target_id, granted_by) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.user_id)
    .bind(payload.permission_type.as_ref())
    .bind(payload.target_id)
    .bind(auth.user_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_on_duplicate(e, "Permission already granted"))?;

    let grant = sqlx::query_as::<_, CrewChiefPermission>(&format!(
        "SELECT {} FROM crew_chief_permissions WHERE id = ?",
        CrewChiefPermission::COLUMNS
    ))
    .bind(result.last_insert_id())
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        user_id = grant.user_id,
        permission_type = %grant.permission_type,
        target_id = grant.target_id,
        granted_by = auth.user_id,
        "Crew chief permission granted"
    );
    Ok(response::created(grant))
}

#[utoipa::path(
    delete,
    path = "/api/v1/crew-chief-permissions/{permission_id}",
    params(("permission_id" = u64, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission revoked"),
        (status = 404, description = "Permission not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Crew Chief"
)]
pub async fn revoke_permission(auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> ApiResult {
    auth.require_admin()?;
    let permission_id = path.into_inner();

    let result = sqlx::query("DELETE FROM crew_chief_permissions WHERE id = ?")
        .bind(permission_id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Permission"));
    }

    tracing::info!(permission_id, revoked_by = auth.user_id, "Crew chief permission revoked");
    Ok(response::message("Permission revoked"))
}

/// Whether the caller may manage the shift, and through which grant.
#[utoipa::path(
    get,
    path = "/api/v1/shifts/{shift_id}/permissions/me",
    params(("shift_id" = u64, Path, description = "Shift id")),
    responses(
        (status = 200, description = "Caller's rights on the shift", body = ShiftRights),
        (status = 404, description = "Shift not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Crew Chief"
)]
pub async fn my_shift_rights(auth: AuthUser, pool: web::Data<MySqlPool>, path: web::Path<u64>) -> ApiResult {
    let shift_id = path.into_inner();
    let mut conn = pool.acquire().await?;

    let scope = fetch_scope(&mut conn, shift_id).await?;
    let grant = guard::resolve_grant(&mut conn, &auth, &scope).await?;

    Ok(response::ok(ShiftRights {
        shift_id,
        can_manage: grant.is_some(),
        grant,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_targets_map_to_tables() {
        assert_eq!(target_table(PermissionType::Client), "companies");
        assert_eq!(target_table(PermissionType::Job), "jobs");
        assert_eq!(target_table(PermissionType::Shift), "shifts");
    }

    #[test]
    fn grant_payload_uses_snake_case_types() {
        let req: GrantPermission =
            serde_json::from_str(r#"{"user_id":9,"permission_type":"client","target_id":3}"#).unwrap();
        assert_eq!(req.permission_type, PermissionType::Client);
        assert!(serde_json::from_str::<GrantPermission>(r#"{"user_id":9,"permission_type":"Client","target_id":3}"#).is_err());
    }
}
