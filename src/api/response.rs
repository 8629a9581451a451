use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::staffing::StaffingError;

/// Pagination details carried in the `meta` block of list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Meta {
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// `{success, data | error, meta}` envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        data: Some(data),
        error: None,
        meta: None,
    })
}

pub fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope {
        success: true,
        data: Some(data),
        error: None,
        meta: None,
    })
}

pub fn paginated<T: Serialize>(data: Vec<T>, meta: Meta) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        data: Some(data),
        error: None,
        meta: Some(meta),
    })
}

pub fn message(text: &str) -> HttpResponse {
    ok(json!({ "message": text }))
}

/// Page/per-page normalisation used by every list endpoint.
pub fn page_window(page: Option<u32>, per_page: Option<u32>) -> (u32, u32, u64) {
    let per_page = per_page.unwrap_or(10).clamp(1, 100);
    let page = page.unwrap_or(1).max(1);
    let offset = u64::from(page - 1) * u64::from(per_page);
    (page, per_page, offset)
}

pub type ApiResult<T = HttpResponse> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Request validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Staffing(#[from] StaffingError),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Internal Server Error")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Staffing(e) => e.code(),
            Self::Database(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Validation(errors) => serde_json::to_value(errors.field_errors()).ok(),
            Self::Staffing(StaffingError::WorkersStillActive { pending }) => {
                Some(json!({ "pending_assignment_ids": pending }))
            }
            _ => None,
        }
    }
}

/// Maps an integrity constraint violation (SQLSTATE 23000) through `make`,
/// anything else to a database error.
pub fn on_constraint_violation(e: sqlx::Error, make: impl FnOnce() -> ApiError) -> ApiError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23000") {
            return make();
        }
    }
    ApiError::Database(e)
}

pub fn conflict_on_duplicate(e: sqlx::Error, message: &str) -> ApiError {
    on_constraint_violation(e, || ApiError::Conflict(message.to_string()))
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Staffing(StaffingError::EntryNotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Staffing(StaffingError::InvalidTimeRange { .. }) => StatusCode::BAD_REQUEST,
            Self::Staffing(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::Database(e) => tracing::error!(error = %e, "Database error"),
            Self::Internal(reason) => tracing::error!(reason = %reason, "Internal error"),
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(Envelope::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            }),
            meta: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::timesheet::TimesheetStatus;
    use actix_web::body::to_bytes;

    async fn body_json(resp: HttpResponse) -> Value {
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn staffing_errors_render_as_conflicts_with_codes() {
        let err = ApiError::from(StaffingError::AlreadyClockedIn);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let body = body_json(err.error_response()).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "ALREADY_CLOCKED_IN");
        assert_eq!(body["error"]["message"], "Worker is already clocked in");
        assert!(body.get("data").is_none());
    }

    #[actix_web::test]
    async fn gate_errors_carry_pending_ids() {
        let err = ApiError::from(StaffingError::WorkersStillActive {
            pending: vec![4, 9],
        });
        let body = body_json(err.error_response()).await;
        assert_eq!(body["error"]["code"], "WORKERS_STILL_ACTIVE");
        assert_eq!(body["error"]["details"]["pending_assignment_ids"], json!([4, 9]));
    }

    #[actix_web::test]
    async fn submitted_timesheet_blocks_roster_changes_with_conflict() {
        let err = ApiError::from(StaffingError::TimesheetLocked {
            status: TimesheetStatus::PendingCompanyApproval,
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        let body = body_json(err.error_response()).await;
        assert_eq!(body["error"]["code"], "TIMESHEET_LOCKED");
        assert_eq!(
            body["error"]["message"],
            "Timesheet is pending_company_approval; the shift's crew and hours are locked"
        );
    }

    #[actix_web::test]
    async fn database_errors_are_generic() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(err.error_response()).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "Database error");
    }

    #[actix_web::test]
    async fn success_envelope_has_meta_for_lists() {
        let resp = paginated(
            vec![1, 2],
            Meta {
                page: 2,
                per_page: 2,
                total: 5,
            },
        );
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], json!([1, 2]));
        assert_eq!(body["meta"]["total"], 5);
        assert!(body.get("error").is_none());
    }

    #[test]
    fn page_window_clamps() {
        assert_eq!(page_window(None, None), (1, 10, 0));
        assert_eq!(page_window(Some(0), Some(500)), (1, 100, 0));
        assert_eq!(page_window(Some(3), Some(20)), (3, 20, 40));
    }

    #[test]
    fn entry_errors_map_to_client_statuses() {
        assert_eq!(
            ApiError::from(StaffingError::EntryNotFound { entry_id: 1 }).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StaffingError::InvalidTimeRange {
                reason: "x".into()
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("Shift").to_string(), "Shift not found");
    }
}
