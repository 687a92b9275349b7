use actix_web::http::StatusCode;
use actix_web::{error, web, HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

use crate::domain::customer::CustomerError;
use crate::domain::loyalty::LoyaltyError;
use crate::domain::ValidationError;

// ============================================================================
// HTTP API - actix-web surfaces for both services
// ============================================================================
//
// - customers: registry CRUD (customer-service)
// - loyalty:   ledger reads and point additions (loyalty-service)
// - ops:       /health and /metrics (both)
//
// Success bodies are `{ "success": true, "data": ... }`; errors are
// `{ "success": false, "error": ..., "details": [...] }`.
//
// ============================================================================

pub mod customers;
pub mod loyalty;
pub mod ops;

#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    data: T,
}

pub(crate) fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        data,
    })
}

pub(crate) fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope {
        success: true,
        data,
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// HTTP-layer wrapper around the domain errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Customer(#[from] CustomerError),

    #[error(transparent)]
    Loyalty(#[from] LoyaltyError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ApiError {
    fn validation(&self) -> Option<&ValidationError> {
        match self {
            ApiError::Validation(e)
            | ApiError::Customer(CustomerError::Validation(e))
            | ApiError::Loyalty(LoyaltyError::Validation(e)) => Some(e),
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Customer(e) => match e {
                CustomerError::Validation(_) => StatusCode::BAD_REQUEST,
                CustomerError::NotFound(_) => StatusCode::NOT_FOUND,
                CustomerError::EmailTaken(_) => StatusCode::CONFLICT,
                CustomerError::Store(_) | CustomerError::Publish(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Loyalty(e) => match e {
                LoyaltyError::Validation(_) => StatusCode::BAD_REQUEST,
                LoyaltyError::NotEnrolled(_) => StatusCode::NOT_FOUND,
                LoyaltyError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        let body = if let Some(validation) = self.validation() {
            ErrorBody {
                success: false,
                error: validation.message.clone(),
                details: validation.details.clone(),
            }
        } else if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            let error = match self {
                ApiError::Customer(CustomerError::Publish(_)) => {
                    "Failed to publish customer event".to_string()
                }
                _ => "Internal server error".to_string(),
            };
            ErrorBody {
                success: false,
                error,
                details: Vec::new(),
            }
        } else {
            ErrorBody {
                success: false,
                error: self.to_string(),
                details: Vec::new(),
            }
        };

        HttpResponse::build(status).json(body)
    }
}

/// JSON extractor config: malformed or mistyped bodies become 400 validation errors.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, _req| {
            let detail = match &err {
                error::JsonPayloadError::Deserialize(e) => e.to_string(),
                other => other.to_string(),
            };
            ApiError::Validation(ValidationError::single("Invalid request body", detail)).into()
        })
}

/// Fallback for unknown routes
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorBody {
        success: false,
        error: format!("Route {} {} not found", req.method(), req.path()),
        details: Vec::new(),
    })
}
