use actix_web::web;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::response::{self, ApiError, ApiResult, Meta, page_window};
use crate::auth::{auth::AuthUser, handlers::insert_user};
use crate::model::{role::Role, user::User};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 3, max = 100))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// 1 Admin, 2 CompanyUser, 3 CrewChief, 4 Employee
    #[validate(range(min = 1, max = 4))]
    #[schema(example = 3)]
    pub role_id: u8,
    pub company_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct UserQuery {
    pub role_id: Option<u8>,
    pub company_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Admin-created account with any role.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created"),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Username already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn create_user(auth: AuthUser, pool: web::Data<MySqlPool>, payload: web::Json<CreateUser>) -> ApiResult {
    auth.require_admin()?;
    payload.validate()?;

    let role = Role::from_id(payload.role_id).ok_or_else(|| ApiError::BadRequest("Unknown role".into()))?;
    if role == Role::CompanyUser && payload.company_id.is_none() {
        return Err(ApiError::BadRequest("Company users need a company_id".into()));
    }

    let username = payload.username.trim().to_lowercase();
    let id = insert_user(
        &username,
        &payload.password,
        payload.name.trim(),
        role,
        payload.company_id,
        pool.get_ref(),
    )
    .await?;

    tracing::info!(user_id = id, role = ?role, created_by = auth.user_id, "User created");
    Ok(response::created(serde_json::json!({ "id": id, "username": username })))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated users", body = [User]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn list_users(auth: AuthUser, pool: web::Data<MySqlPool>, query: web::Query<UserQuery>) -> ApiResult {
    auth.require_admin()?;

    let (page, per_page, offset) = page_window(query.page, query.per_page);

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<u64> = Vec::new();
    if let Some(role_id) = query.role_id {
        where_sql.push_str(" AND role_id = ?");
        args.push(u64::from(role_id));
    }
    if let Some(company_id) = query.company_id {
        where_sql.push_str(" AND company_id = ?");
        args.push(company_id);
    }

    let count_sql = format!("SELECT COUNT(*) FROM users{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = count_q.bind(*arg);
    }
    let total = count_q.fetch_one(pool.get_ref()).await?;

    let data_sql = format!(
        "SELECT id, username, name, role_id, company_id, is_active, last_login_at \
         FROM users{where_sql} ORDER BY username LIMIT ? OFFSET ?"
    );
    let mut data_q = sqlx::query_as::<_, User>(&data_sql);
    for arg in args {
        data_q = data_q.bind(arg);
    }
    let users = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(response::paginated(
        users,
        Meta {
            page,
            per_page,
            total,
        },
    ))
}
