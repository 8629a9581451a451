use crate::api::response::ApiError;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use crate::models::{Claims, TokenType};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only for company users
    pub company_id: Option<u64>,
}

impl AuthUser {
    /// Builds the caller from an access token's claims.
    pub fn from_claims(claims: Claims) -> Result<Self, ApiError> {
        if claims.token_type != TokenType::Access {
            return Err(ApiError::Unauthorized("Access token required".into()));
        }
        let role =
            Role::from_id(claims.role).ok_or_else(|| ApiError::Unauthorized("Invalid role".into()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            company_id: claims.company_id,
        })
    }
}

/// Reads the bearer token from the `Authorization` header.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match bearer_token(req) {
            Some(t) => t,
            None => return ready(Err(ApiError::Unauthorized("Missing token".into()))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => return ready(Err(ApiError::Internal("Config missing".into()))),
        };

        let result = verify_token(token, &config.jwt_secret)
            .map_err(|_| ApiError::Unauthorized("Invalid token".into()))
            .and_then(AuthUser::from_claims);

        ready(result)
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin only".into()))
        }
    }

    pub fn require_any(&self, roles: &[Role]) -> Result<(), ApiError> {
        if self.is_admin() || roles.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Insufficient role".into()))
        }
    }

    /// Company users may only act on their own company's records.
    pub fn require_company_access(&self, company_id: u64) -> Result<(), ApiError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::CompanyUser if self.company_id == Some(company_id) => Ok(()),
            _ => Err(ApiError::Forbidden("No access to this company".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, company_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            company_id,
        }
    }

    #[test]
    fn admin_passes_every_gate() {
        let admin = user(Role::Admin, None);
        assert!(admin.require_admin().is_ok());
        assert!(admin.require_any(&[Role::CrewChief]).is_ok());
        assert!(admin.require_company_access(9).is_ok());
    }

    #[test]
    fn company_users_are_scoped_to_their_company() {
        let cu = user(Role::CompanyUser, Some(3));
        assert!(cu.require_company_access(3).is_ok());
        assert!(cu.require_company_access(4).is_err());
        assert!(cu.require_admin().is_err());
        assert!(user(Role::CrewChief, None).require_company_access(3).is_err());
    }

    #[test]
    fn refresh_claims_cannot_authenticate_requests() {
        let claims = Claims {
            user_id: 1,
            sub: "u".into(),
            role: 1,
            exp: usize::MAX,
            jti: "j".into(),
            token_type: TokenType::Refresh,
            company_id: None,
        };
        assert!(matches!(
            AuthUser::from_claims(claims),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
