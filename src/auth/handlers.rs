use crate::{
    api::response::{self, ApiError, ApiResult, conflict_on_duplicate},
    auth::{
        auth::{AuthUser, bearer_token},
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    model::{role::Role, user::User},
    models::{LoginReqDto, RegisterReq, TokenType, UserSql},
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};
use validator::Validate;

#[derive(Serialize)]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

fn token_error(e: jsonwebtoken::errors::Error) -> ApiError {
    ApiError::Internal(format!("token encoding failed: {e}"))
}

/// Issues an access/refresh pair and records the refresh token id.
async fn issue_tokens(
    subject: &TokenSubject,
    pool: &MySqlPool,
    config: &Config,
) -> ApiResult<TokenPair> {
    let access_token = generate_access_token(subject, &config.jwt_secret, config.access_token_ttl)
        .map_err(token_error)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(token_error)?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Inserts a user and returns the new id.
pub async fn insert_user(
    username: &str,
    password: &str,
    name: &str,
    role: Role,
    company_id: Option<u64>,
    pool: &MySqlPool,
) -> ApiResult<u64> {
    let hashed = hash_password(password)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;

    let result = sqlx::query(
        r#"INSERT INTO users (username, password, name, role_id, company_id) VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(username)
    .bind(hashed)
    .bind(name)
    .bind(role.id())
    .bind(company_id)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_duplicate(e, "Username already exists"))?;

    Ok(result.last_insert_id())
}

/// Self-service registration; always creates an Employee.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "User registered"),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username already exists")
    ),
    tag = "Auth"
)]
pub async fn register(user: web::Json<RegisterReq>, pool: web::Data<MySqlPool>) -> ApiResult {
    user.validate()?;
    let username = user.username.trim().to_lowercase();

    let id = insert_user(
        &username,
        &user.password,
        user.name.trim(),
        Role::Employee,
        None,
        pool.get_ref(),
    )
    .await?;

    info!(user_id = id, "User registered");
    Ok(response::created(json!({ "id": id, "username": username })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Access and refresh tokens", body = Object, example = json!({
            "success": true,
            "data": { "access_token": "eyJ...", "refresh_token": "eyJ..." }
        })),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        return Err(ApiError::BadRequest("Username or password required".into()));
    }

    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, username, password, role_id, company_id, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim().to_lowercase())
    .fetch_optional(pool.get_ref())
    .await?;

    let db_user = match db_user {
        Some(u) if u.is_active => u,
        Some(_) => {
            info!("Login refused: account disabled");
            return Err(ApiError::Unauthorized("Invalid credentials".into()));
        }
        None => {
            info!("Invalid credentials: user not found");
            return Err(ApiError::Unauthorized("Invalid credentials".into()));
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    let subject = TokenSubject {
        user_id: db_user.id,
        username: db_user.username,
        role: db_user.role_id,
        company_id: db_user.company_id,
    };
    let tokens = issue_tokens(&subject, pool.get_ref(), &config).await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        // not fatal for the login itself
        error!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");
    Ok(response::ok(tokens))
}

/// Rotates a refresh token: the presented one is revoked, a new pair is issued.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair"),
        (status = 401, description = "Invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult {
    let token = bearer_token(&req).ok_or_else(|| ApiError::Unauthorized("No token".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid token".into()))?;
    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::Unauthorized("Refresh token required".into()));
    }

    let mut tx = pool.begin().await?;

    let record = sqlx::query_as::<_, (u64, u64, bool)>(
        "SELECT id, user_id, revoked FROM refresh_tokens WHERE jti = ? FOR UPDATE",
    )
    .bind(&claims.jti)
    .fetch_optional(&mut *tx)
    .await?;

    let (record_id, user_id) = match record {
        Some((id, user_id, false)) => (id, user_id),
        _ => return Err(ApiError::Unauthorized("Refresh token revoked".into())),
    };

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ?")
        .bind(record_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    // role and company may have changed since the token was issued
    let current = sqlx::query_as::<_, UserSql>(
        "SELECT id, username, password, role_id, company_id, is_active FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .filter(|u| u.is_active)
    .ok_or_else(|| ApiError::Unauthorized("Account unavailable".into()))?;

    let subject = TokenSubject {
        user_id: current.id,
        username: current.username,
        role: current.role_id,
        company_id: current.company_id,
    };
    let tokens = issue_tokens(&subject, pool.get_ref(), &config).await?;

    Ok(response::ok(tokens))
}

/// Revokes the presented refresh token. Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let claims = match bearer_token(&req).map(|t| verify_token(t, &config.jwt_secret)) {
        Some(Ok(c)) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, name, role_id, company_id, is_active, last_login_at FROM users WHERE id = ?",
    )
    .bind(auth.user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(ApiError::NotFound("User"))?;

    Ok(response::ok(user))
}
