use actix_web::web;

use super::response::{self, ApiResult};
use crate::auth::auth::AuthUser;
use crate::utils::cache::{CacheStats, ShiftCache};

#[utoipa::path(
    get,
    path = "/api/v1/admin/cache",
    responses(
        (status = 200, description = "Shift cache statistics", body = CacheStats),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn cache_stats(auth: AuthUser, cache: web::Data<ShiftCache>) -> ApiResult {
    auth.require_admin()?;
    Ok(response::ok(cache.stats().await))
}

/// Drops every cached shift detail.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/cache",
    responses(
        (status = 200, description = "Cache cleared"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn clear_cache(auth: AuthUser, cache: web::Data<ShiftCache>) -> ApiResult {
    auth.require_admin()?;
    cache.clear();
    tracing::warn!(cleared_by = auth.user_id, "Shift cache cleared");
    Ok(response::message("Cache cleared"))
}
