use crate::api::response::ApiError;
use crate::auth::auth::{AuthUser, bearer_token};
use crate::auth::jwt::verify_token;
use crate::config::Config;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

/// Authenticates every request on a protected scope and stores the caller
/// in request extensions for the `AuthUser` extractor.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| ApiError::Internal("App config missing".into()))?;

    let token = match bearer_token(req.request()) {
        Some(t) => t.to_owned(),
        None => {
            let err = ApiError::Unauthorized("Missing or malformed Authorization header".into());
            return Ok(req.into_response(err.error_response()));
        }
    };

    let auth_user = match verify_token(&token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))
        .and_then(AuthUser::from_claims)
    {
        Ok(user) => user,
        Err(err) => return Ok(req.into_response(err.error_response())),
    };

    tracing::debug!(user_id = auth_user.user_id, path = %req.path(), "Authenticated request");
    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
