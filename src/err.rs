use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

/// Handler result: a status-coded success body, or an [`Error`] that
/// renders itself as a `{success: false, message}` response.
pub type Payload<V> = Result<Reply<V>, Error>;

/// 200 with a flattened success body.
pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Reply::ok(value))
}

/// 201 with a flattened success body.
pub fn creates<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Reply::created(value))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Err(err)
}

pub async fn handler404(path: Uri) -> Error {
    Error::not_found(format!("Invalid path: {}", path))
}

#[derive(Debug, Clone)]
pub struct Reply<V> {
    status: StatusCode,
    value: Success<V>,
}

impl<V: Serialize> Reply<V> {
    pub fn ok(value: V) -> Reply<V> {
        Reply {
            status: StatusCode::OK,
            value: Success::of(value),
        }
    }

    pub fn created(value: V) -> Reply<V> {
        Reply {
            status: StatusCode::CREATED,
            value: Success::of(value),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

impl<V: Serialize> IntoResponse for Reply<V> {
    fn into_response(self) -> Response {
        (self.status, Json(self.value)).into_response()
    }
}

/// Free-form `{success: true, message}` body for acknowledgements
/// (logout, delete) that carry no record.
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub message: String,
}

impl Note {
    pub fn says<S: Into<String>>(message: S) -> Note {
        Note {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    /// Client-caused: a missing or malformed field. Always a 400.
    Validation { message: String },
    /// Missing, malformed or expired credential. The body never says
    /// which, so the response cannot be used as an oracle.
    Unauthenticated,
    /// Well-formed request, no matching record.
    NotFound { message: String },
    /// Infrastructure failure. Logged with full detail, surfaced as a
    /// generic 500.
    Internal { kind: &'static str, message: String },
}

impl Error {
    pub fn missing_field(field: &str) -> Error {
        Error::Validation {
            message: format!("`{}` is required", field),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Error {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Error {
        Error::NotFound {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(kind: &'static str, message: S) -> Error {
        Error::Internal {
            kind,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Error::Validation { message } | Error::NotFound { message } => message.clone(),
            Error::Unauthenticated => "Not authenticated".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Error::Internal { kind, message } = &self {
            log::error!("{}: {}", kind, message);
        }
        let body = ErrorBody {
            success: false,
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Validation { message } => write!(f, "validation: {}", message),
            Error::Unauthenticated => write!(f, "unauthenticated"),
            Error::NotFound { message } => write!(f, "not found: {}", message),
            Error::Internal { kind, message } => write!(f, "{}: {}", kind, message),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Internal {
            kind: "IOError",
            message: io.to_string(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::Internal {
            kind: "HashError",
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            kind: "InternalError",
            message: format!("{:#}", err),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for Error {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::Validation {
            message: format!("Malformed multipart payload: {}", err),
        }
    }
}

/// Folds an axum `Json` extractor rejection into the uniform response
/// shape instead of the framework's plain-text 400.
pub fn json_body<T>(extracted: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    match extracted {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(Error::validation(format!(
            "Request body must be valid JSON: {}",
            rejection
        ))),
    }
}
