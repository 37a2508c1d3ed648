//! Mapping of engine errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use vigil_core::VigilError;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Handler error wrapping [`VigilError`].
#[derive(Debug)]
pub struct ApiError(pub VigilError);

impl From<VigilError> for ApiError {
    fn from(e: VigilError) -> Self {
        ApiError(e)
    }
}

/// Body that failed to parse or deserialize is bad input like any other.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(VigilError::InvalidInput(rejection.body_text()))
    }
}

/// `Json` extractor whose rejections use the same error body as handlers.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            VigilError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            VigilError::NotFound(_) => StatusCode::NOT_FOUND,
            VigilError::NotReady(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
