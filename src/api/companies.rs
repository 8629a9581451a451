use actix_web::web;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;
use validator::Validate;

use super::response::{self, ApiError, ApiResult, conflict_on_duplicate};
use crate::auth::auth::AuthUser;
use crate::model::{company::Company, role::Role};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateCompany {
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Hands On Productions")]
    pub name: String,
    #[validate(email)]
    #[schema(example = "ops@handson.example")]
    pub contact_email: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/companies",
    responses(
        (status = 200, description = "Companies visible to the caller", body = [Company]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Company"
)]
pub async fn list_companies(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult {
    let sql = "SELECT id, name, contact_email, created_at FROM companies";

    let companies = match auth.role {
        Role::CompanyUser => {
            let company_id = auth
                .company_id
                .ok_or_else(|| ApiError::Forbidden("No company profile".into()))?;
            sqlx::query_as::<_, Company>(&format!("{sql} WHERE id = ?"))
                .bind(company_id)
                .fetch_all(pool.get_ref())
                .await?
        }
        _ => {
            sqlx::query_as::<_, Company>(&format!("{sql} ORDER BY name"))
                .fetch_all(pool.get_ref())
                .await?
        }
    };

    Ok(response::ok(companies))
}

#[utoipa::path(
    post,
    path = "/api/v1/companies",
    request_body = CreateCompany,
    responses(
        (status = 201, description = "Company created"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Company already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Company"
)]
pub async fn create_company(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCompany>,
) -> ApiResult {
    auth.require_admin()?;
    payload.validate()?;

    let result = sqlx::query("INSERT INTO companies (name, contact_email) VALUES (?, ?)")
        .bind(payload.name.trim())
        .bind(payload.contact_email.as_deref())
        .execute(pool.get_ref())
        .await
        .map_err(|e| conflict_on_duplicate(e, "Company already exists"))?;

    Ok(response::created(serde_json::json!({ "id": result.last_insert_id() })))
}
