use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{patch, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse,
            ResetPasswordRequest, SignupRequest, UpdatePasswordRequest,
        },
        middleware::{require_auth, CurrentUser},
        services::{self, Session},
    },
    error::{AppResult, JsonBody, PathParam},
    state::AppState,
    users::dto::UserData,
};

pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/reset-password/:token", patch(reset_password));

    let protected = Router::new()
        .route("/users/update-password", patch(update_password))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    public.merge(protected)
}

fn respond((user, token): Session) -> Json<AuthResponse> {
    Json(AuthResponse {
        status: "success",
        token,
        data: UserData { user: user.into() },
    })
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let session = services::signup(&state, payload).await?;
    Ok((StatusCode::CREATED, respond(session)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let session = services::login(&state, &payload.email, &payload.password).await?;
    Ok(respond(session))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    services::forgot_password(&state, &payload.email).await?;
    Ok(Json(MessageResponse {
        status: "success",
        message: "Token sent to email!".into(),
    }))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    PathParam(token): PathParam<String>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> AppResult<Json<AuthResponse>> {
    let session =
        services::reset_password(&state, &token, &payload.password, &payload.password_confirm)
            .await?;
    Ok(respond(session))
}

#[instrument(skip(state, user, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<UpdatePasswordRequest>,
) -> AppResult<Json<AuthResponse>> {
    let session = services::update_password(&state, user, payload).await?;
    Ok(respond(session))
}
