use axum::http::{self, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Message shown in place of internal failures outside development mode.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ApiError {
    #[error("Paste content-type is not supported, must be one of {}", .supported.join(", "))]
    InvalidContentType { supported: Vec<String> },
    #[error("Invalid expires parameter, must be a non-negative number of seconds")]
    InvalidExpires,
    #[error("{message}")]
    MalformedPayload { message: String },
    #[error("Could not find a paste with that ID")]
    NotFound,
    #[error("Paste exists but is not JSON")]
    NotJson,
    #[error("No delete token was found")]
    DeleteTokenMissing,
    #[error("Delete token is invalid")]
    DeleteTokenInvalid,
    #[error("generated paste identifier already exists")]
    DuplicateIdentifier,
    #[error("http error")]
    Http {
        #[from]
        source: http::Error,
    },
    #[error("database error")]
    Database { source: sqlx::Error },
    #[error("{0}")]
    Internal(String),
}

/// Underlying error text of a 500 response, attached as a response extension
/// so development mode can surface it.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

impl ApiError {
    /// Machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidContentType { .. } => "INVALID_CONTENT_TYPE",
            ApiError::InvalidExpires => "INVALID_EXPIRES",
            ApiError::MalformedPayload { .. } => "PARSE_ERROR",
            ApiError::NotFound => "PASTE_NOT_FOUND",
            ApiError::NotJson => "PASTE_NOT_JSON",
            ApiError::DeleteTokenMissing => "DELETE_TOKEN_MISSING",
            ApiError::DeleteTokenInvalid => "DELETE_TOKEN_INVALID",
            ApiError::DuplicateIdentifier
            | ApiError::Http { .. }
            | ApiError::Database { .. }
            | ApiError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidContentType { .. } => StatusCode::BAD_REQUEST,
            ApiError::InvalidExpires => StatusCode::BAD_REQUEST,
            ApiError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::NotJson => StatusCode::NOT_FOUND,
            ApiError::DeleteTokenMissing => StatusCode::UNAUTHORIZED,
            ApiError::DeleteTokenInvalid => StatusCode::UNAUTHORIZED,
            ApiError::DuplicateIdentifier => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Http { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Message safe to show any client.
    fn public_message(&self) -> String {
        if self.is_internal() {
            INTERNAL_ERROR_MESSAGE.to_owned()
        } else {
            self.to_string()
        }
    }

    /// Full error chain, for logs and development mode.
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            detail.push_str(": ");
            detail.push_str(&err.to_string());
            source = err.source();
        }
        detail
    }

    /// Render as `CODE\nmessage` plain text, for clients that asked for text-only output.
    pub fn into_text_response(self) -> Response {
        let body = format!("{}\n{}", self.code(), self.public_message());
        self.finish(body.into_response())
    }

    fn finish(self, mut response: Response) -> Response {
        *response.status_mut() = self.status_code();
        if self.is_internal() {
            let detail = self.detail();
            tracing::error!("request failed: {detail}");
            response.extensions_mut().insert(InternalDetail(detail));
        }
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.code(),
            "message": self.public_message(),
        });
        if let ApiError::InvalidContentType { supported } = &self {
            body["supportedMimes"] = json!(supported);
        }

        let response = Json(body).into_response();
        self.finish(response)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(ref db) if is_unique_violation(db.as_ref()) => {
                ApiError::DuplicateIdentifier
            }
            _ => ApiError::Database { source },
        }
    }
}

/// SQLite reports primary key (1555) and unique (2067) violations as extended result codes.
fn is_unique_violation(err: &dyn sqlx::error::DatabaseError) -> bool {
    matches!(err.code().as_deref(), Some("1555") | Some("2067"))
        || err.message().starts_with("UNIQUE constraint failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let err = ApiError::DeleteTokenInvalid;
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), "DELETE_TOKEN_INVALID");
        assert_eq!(err.public_message(), "Delete token is invalid");
    }

    #[test]
    fn internal_errors_hide_their_message() {
        let err = ApiError::Internal("disk on fire".to_owned());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), INTERNAL_ERROR_MESSAGE);
        assert_eq!(err.detail(), "disk on fire");
    }

    #[test]
    fn internal_response_carries_detail_extension() {
        let response = ApiError::DuplicateIdentifier.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<InternalDetail>().unwrap();
        assert!(detail.0.contains("already exists"));
    }

    #[test]
    fn invalid_content_type_lists_supported_types() {
        let err = ApiError::InvalidContentType {
            supported: vec!["text/*".to_owned(), "application/json".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "Paste content-type is not supported, must be one of text/*, application/json"
        );
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            ApiError::from(sqlx::Error::RowNotFound),
            ApiError::NotFound
        ));
    }
}
