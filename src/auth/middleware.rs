//! Request gates: bearer authentication and role guard.
//!
//! Routes compose them explicitly, innermost first:
//!
//! ```ignore
//! Router::new()
//!     .route("/tours", post(create_tour))
//!     .route_layer(from_fn(require_role(&[Role::Admin, Role::LeadGuide])))
//!     .route_layer(from_fn_with_state(state.clone(), require_auth))
//! ```

use std::{future::Future, pin::Pin};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use thiserror::Error;
use tracing::warn;

use crate::{
    auth::jwt::JwtKeys,
    error::AppError,
    state::AppState,
    users::repo_types::{Role, User},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("You are not logged in! Please log in to get access.")]
    MissingToken,
    #[error("Invalid or expired token. Please log in again.")]
    InvalidToken,
    #[error("The user belonging to this token no longer exists.")]
    UserNoLongerExists,
    #[error("User recently changed password! Please log in again.")]
    PasswordChangedSinceIssue,
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Authentication(e.to_string())
    }
}

/// The authenticated user, attached to request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AuthError::MissingToken.into())
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Token, signature, live user, password freshness. Each failure is distinct.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;

    let claims = JwtKeys::from(&state.config.jwt).verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AuthError::InvalidToken
    })?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::UserNoLongerExists)?;

    if changed_after(&user, claims.iat) {
        warn!(user_id = %user.id, "token predates password change");
        return Err(AuthError::PasswordChangedSinceIssue.into());
    }
    Ok(user)
}

/// True when the password was changed at or after `issued_at` (epoch seconds).
pub fn changed_after(user: &User, issued_at: i64) -> bool {
    user.password_changed_at
        .is_some_and(|changed| changed.unix_timestamp() >= issued_at)
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

pub fn permits(allowed: &[Role], role: Role) -> bool {
    allowed.contains(&role)
}

type GateFuture = Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>;

/// Role guard for `axum::middleware::from_fn`. Must sit inside [`require_auth`].
pub fn require_role(
    allowed: &'static [Role],
) -> impl Fn(Request, Next) -> GateFuture + Clone + Send + Sync + 'static {
    move |request: Request, next: Next| {
        Box::pin(async move {
            let role = request
                .extensions()
                .get::<CurrentUser>()
                .map(|u| u.0.role)
                .ok_or(AuthError::MissingToken)?;
            if !permits(allowed, role) {
                warn!(%role, "role not permitted");
                return Err(AppError::Forbidden(
                    "You do not have permission to perform this action".into(),
                ));
            }
            Ok(next.run(request).await)
        })
    }
}
