use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::admin::uploads::UploadReceipt;
use crate::application::auth::AuthError;
use crate::application::error::ErrorReport;
use crate::application::writer::{WriteError, WriteReceipt, WriteResult};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Error response for the read endpoints. Write endpoints answer with a
/// [`WriteResult`] body instead.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        let detail = match hint {
            Some(hint) => format!("{}: {hint}", self.message),
            None => self.message.to_string(),
        };
        ErrorReport::from_message("infra::http::api_error", self.status, detail)
            .attach(&mut response);
        response
    }
}

pub fn write_error_status(error: &WriteError) -> StatusCode {
    match error {
        WriteError::Unauthorized(AuthError::ProviderUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        WriteError::Unauthorized(AuthError::AuthenticationRequired) => StatusCode::UNAUTHORIZED,
        WriteError::Unauthorized(AuthError::HandleUnavailable | AuthError::NotAuthorized) => {
            StatusCode::FORBIDDEN
        }
        WriteError::Validation(_) => StatusCode::BAD_REQUEST,
        WriteError::ConflictExhausted { .. } => StatusCode::CONFLICT,
        WriteError::Store(_) => StatusCode::BAD_GATEWAY,
        WriteError::RepositoryUnavailable | WriteError::TokenUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn write_failure(source: &'static str, error: &WriteError) -> Response {
    let status = write_error_status(error);
    let mut response = (status, Json(WriteResult::failed(error))).into_response();
    ErrorReport::from_error(source, status, error).attach(&mut response);
    response
}

pub fn receipt_response(source: &'static str, result: Result<WriteReceipt, WriteError>) -> Response {
    match result {
        Ok(_) => (StatusCode::OK, Json(WriteResult::succeeded())).into_response(),
        Err(error) => write_failure(source, &error),
    }
}

pub fn upload_response(source: &'static str, result: Result<UploadReceipt, WriteError>) -> Response {
    match result {
        Ok(receipt) => (StatusCode::OK, Json(WriteResult::with_url(receipt.url))).into_response(),
        Err(error) => write_failure(source, &error),
    }
}
