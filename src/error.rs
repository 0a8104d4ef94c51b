//! Application errors and the centralized error responder.
//!
//! Handlers never build error bodies themselves: [`AppError::into_response`]
//! only stamps the status code and an [`ErrorReport`] extension, and
//! [`render_errors`] (layered once over the whole router) turns that report
//! into the JSON body appropriate for the current [`Mode`].

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request, State,
    },
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use crate::{config::Mode, state::AppState};

/// Convenience alias for handler and service return types.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("Too many failed login attempts. Please try again in {minutes} minutes and {seconds} seconds.")]
    Locked { minutes: i64, seconds: i64 },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Duplicate field value for {0}. Please use another value!")]
    Conflict(String),

    #[error("{0}")]
    Delivery(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) | AppError::Locked { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Delivery(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Operational errors are expected failures whose message is safe to show.
    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }
}

/// Everything the responder needs to render an error after the handler returned.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
    pub detail: String,
    pub operational: bool,
}

impl From<&AppError> for ErrorReport {
    fn from(err: &AppError) -> Self {
        let detail = match err {
            AppError::Internal(inner) => format!("{inner:#}"),
            other => format!("{other:?}"),
        };
        Self {
            status: err.status(),
            message: err.to_string(),
            detail,
            operational: err.is_operational(),
        }
    }
}

impl ErrorReport {
    fn status_label(&self) -> &'static str {
        if self.status.is_client_error() {
            "fail"
        } else {
            "error"
        }
    }

    pub fn render(&self, mode: Mode) -> Response {
        if !self.operational {
            tracing::error!(status = %self.status, detail = %self.detail, "unexpected error");
        }
        let body = match mode {
            Mode::Development => json!({
                "status": self.status_label(),
                "message": self.message,
                "error": self.detail,
                "operational": self.operational,
            }),
            Mode::Production if self.operational => json!({
                "status": self.status_label(),
                "message": self.message,
            }),
            Mode::Production => json!({
                "status": "error",
                "message": "Something went very wrong!",
            }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = ErrorReport::from(&self);
        let mut res = report.status.into_response();
        res.extensions_mut().insert(report);
        res
    }
}

/// Outermost middleware: renders every [`ErrorReport`] produced below it.
pub async fn render_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    match res.extensions_mut().remove::<ErrorReport>() {
        Some(report) => report.render(state.config.mode),
        None => res,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("No document found with that ID".into()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(duplicate_field(db.constraint()))
            }
            // The referenced row went away between lookup and write.
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                AppError::NotFound("No document found with that ID".into())
            }
            other => AppError::Internal(other.into()),
        }
    }
}

/// `users_email_key` -> `email`; unnamed constraints fall back to a generic label.
fn duplicate_field(constraint: Option<&str>) -> String {
    let Some(name) = constraint else {
        return "a unique field".into();
    };
    let trimmed = name.strip_suffix("_key").unwrap_or(name);
    match trimmed.split_once('_') {
        Some((_table, field)) if !field.is_empty() => field.to_string(),
        _ => trimmed.to_string(),
    }
}

/// `Json` whose rejection goes through [`AppError`] like every other failure.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(r: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid input data. {}", r.body_text()))
    }
}

/// `Path` with the same treatment; a malformed id is a client error.
pub struct PathParam<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(r: PathRejection) -> Self {
        AppError::Validation(format!("Invalid path parameter. {}", r.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Conflict("email".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Locked { minutes: 1, seconds: 2 }.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Forbidden("no".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("no".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Delivery("smtp".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn only_internal_errors_are_unexpected() {
        assert!(AppError::Delivery("down".into()).is_operational());
        assert!(!AppError::Internal(anyhow::anyhow!("boom")).is_operational());
    }

    #[test]
    fn locked_message_carries_remaining_time() {
        let msg = AppError::Locked { minutes: 9, seconds: 41 }.to_string();
        assert!(msg.contains("9 minutes and 41 seconds"));
    }

    /// A constraint failure named the way Postgres names its constraints.
    #[derive(Debug)]
    struct PgFailure {
        constraint: &'static str,
    }

    impl std::fmt::Display for PgFailure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "violates {}", self.constraint)
        }
    }

    impl std::error::Error for PgFailure {}

    impl sqlx::error::DatabaseError for PgFailure {
        fn message(&self) -> &str {
            self.constraint
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn constraint(&self) -> Option<&str> {
            Some(self.constraint)
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            use sqlx::error::ErrorKind;
            if self.constraint.ends_with("_fkey") {
                ErrorKind::ForeignKeyViolation
            } else if self.constraint.ends_with("_key") {
                ErrorKind::UniqueViolation
            } else {
                ErrorKind::CheckViolation
            }
        }
    }

    fn db_error(constraint: &'static str) -> AppError {
        sqlx::Error::Database(Box::new(PgFailure { constraint })).into()
    }

    #[test]
    fn database_failures_map_by_kind() {
        let err = db_error("tours_name_key");
        assert!(matches!(err, AppError::Conflict(f) if f == "name"));

        let err = db_error("reviews_tour_id_fkey");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = db_error("tours_discount_below_price");
        assert!(!err.is_operational());
        assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound(_)));
    }

    #[test]
    fn duplicate_field_strips_table_and_suffix() {
        assert_eq!(duplicate_field(Some("users_email_key")), "email");
        assert_eq!(duplicate_field(Some("tours_name_key")), "name");
        assert_eq!(duplicate_field(None), "a unique field");
    }

    #[test]
    fn response_carries_report_extension() {
        let res = AppError::NotFound("gone".into()).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let report = res.extensions().get::<ErrorReport>().expect("report attached");
        assert_eq!(report.message, "gone");
        assert!(report.operational);
    }
}
