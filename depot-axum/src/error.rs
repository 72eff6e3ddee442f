use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use depot_blob::BlobError;
use serde_json::json;

/// Error returned by every handler, rendered as `{name, message, code, className}`
#[derive(Debug)]
pub enum DepotAxumError {
    Blob(BlobError),
    /// Malformed request outside of what the storage core validates
    BadRequest(String),
    /// A request body without `Content-Length` where one is required
    LengthRequired(String),
}

impl From<BlobError> for DepotAxumError {
    fn from(e: BlobError) -> Self {
        Self::Blob(e)
    }
}

impl From<JsonRejection> for DepotAxumError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!(
            "Failed to parse the request body as JSON: {}",
            rejection.body_text()
        ))
    }
}

impl DepotAxumError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn length_required<S: Into<String>>(message: S) -> Self {
        Self::LengthRequired(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::LengthRequired(_) => StatusCode::LENGTH_REQUIRED,
            Self::Blob(e) => match e {
                BlobError::NotFound { .. } => StatusCode::NOT_FOUND,
                BlobError::AlreadyExists { .. } => StatusCode::CONFLICT,
                BlobError::InvalidMediaType { .. }
                | BlobError::InvalidRange { .. }
                | BlobError::Invalid { .. } => StatusCode::BAD_REQUEST,
                BlobError::SessionExpired { .. } => StatusCode::GONE,
                BlobError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn names(status: StatusCode) -> (&'static str, &'static str) {
        match status {
            StatusCode::BAD_REQUEST => ("BadRequest", "bad-request"),
            StatusCode::NOT_FOUND => ("NotFound", "not-found"),
            StatusCode::CONFLICT => ("Conflict", "conflict"),
            StatusCode::GONE => ("Gone", "gone"),
            StatusCode::LENGTH_REQUIRED => ("LengthRequired", "length-required"),
            _ => ("GeneralError", "general-error"),
        }
    }

    /// Message safe to show to clients
    fn client_message(&self) -> String {
        match self {
            Self::BadRequest(message) | Self::LengthRequired(message) => message.clone(),
            Self::Blob(BlobError::Internal { .. }) => "Internal server error".to_string(),
            Self::Blob(e) => e.to_string(),
        }
    }
}

impl IntoResponse for DepotAxumError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Blob(e @ BlobError::Internal { .. }) = &self {
            tracing::error!(error = %e, "request failed");
        }

        let (name, class_name) = Self::names(status);
        let body = json!({
            "name": name,
            "message": self.client_message(),
            "code": status.as_u16(),
            "className": class_name,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_errors_map_to_statuses() {
        let cases = [
            (BlobError::not_found("x"), 404),
            (BlobError::already_exists("x"), 409),
            (BlobError::invalid_media_type("x"), 400),
            (BlobError::invalid_range("x"), 400),
            (BlobError::invalid("x"), 400),
            (BlobError::session_expired("x"), 410),
            (
                BlobError::internal("disk", std::io::Error::new(std::io::ErrorKind::Other, "x")),
                500,
            ),
        ];
        for (error, code) in cases {
            assert_eq!(DepotAxumError::from(error).status().as_u16(), code);
        }
        assert_eq!(DepotAxumError::length_required("x").status().as_u16(), 411);
    }

    #[test]
    fn internal_details_stay_on_the_server() {
        let error = DepotAxumError::from(BlobError::internal(
            "reading metadata of file 'abc'",
            std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"),
        ));
        assert_eq!(error.client_message(), "Internal server error");
    }
}
