use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        middleware::{require_auth, require_role, CurrentUser},
        password::{is_valid_email, normalize_email},
    },
    error::{AppError, AppResult, JsonBody, PathParam},
    query::{self, DocResponse, ListQuery, ListResponse},
    state::AppState,
    users::{
        dto::{AdminUpdateRequest, UpdateMeRequest, UserResponse},
        repo::{self, USERS},
        repo_types::{ProfilePatch, Role},
    },
};

pub fn user_routes(state: &AppState) -> Router<AppState> {
    let me = Router::new()
        .route("/users/me", get(get_me))
        .route("/users/update-me", patch(update_me))
        .route("/users/delete-me", delete(delete_me))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route_layer(from_fn(require_role(&[Role::Admin])))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    me.merge(admin)
}

fn not_found() -> AppError {
    AppError::NotFound("No user found with that ID".into())
}

#[instrument(skip(user))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<UpdateMeRequest>,
) -> AppResult<Json<UserResponse>> {
    if payload.password.is_some() || payload.password_confirm.is_some() {
        return Err(AppError::Validation(
            "This route is not for password updates. Please use /update-password.".into(),
        ));
    }
    let patch = ProfilePatch {
        name: checked_name(payload.name)?,
        email: checked_email(payload.email)?,
        ..ProfilePatch::default()
    };
    let updated = state
        .users
        .update_profile(user.id, &patch)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(updated.into()))
}

#[instrument(skip(state, user))]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<StatusCode> {
    state.users.deactivate(user.id).await?;
    info!(user_id = %user.id, "user deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<ListResponse>> {
    let q = ListQuery::from_params(&params)?;
    let docs = repo::list(&state.db, &q).await?;
    Ok(Json(docs.into()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<DocResponse>> {
    let doc = query::fetch_document(&state.db, &USERS, id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(doc.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<AdminUpdateRequest>,
) -> AppResult<Json<UserResponse>> {
    let patch = ProfilePatch {
        name: checked_name(payload.name)?,
        email: checked_email(payload.email)?,
        photo: payload.photo,
        role: payload.role,
    };
    let updated = state
        .users
        .update_profile(id, &patch)
        .await?
        .ok_or_else(not_found)?;
    info!(user_id = %id, "user updated by admin");
    Ok(Json(updated.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<StatusCode> {
    if !state.users.delete(id).await? {
        return Err(not_found());
    }
    info!(user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn checked_name(name: Option<String>) -> AppResult<Option<String>> {
    match name.map(|n| n.trim().to_string()) {
        Some(n) if n.is_empty() => Err(AppError::Validation("Please tell us your name!".into())),
        other => Ok(other),
    }
}

fn checked_email(email: Option<String>) -> AppResult<Option<String>> {
    match email.map(|e| normalize_email(&e)) {
        Some(e) if !is_valid_email(&e) => {
            Err(AppError::Validation("Please provide a valid email".into()))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_fields_are_normalized() {
        assert_eq!(
            checked_email(Some(" Ana@Mail.IO ".into())).unwrap().as_deref(),
            Some("ana@mail.io")
        );
        assert!(checked_email(Some("nope".into())).is_err());
        assert_eq!(checked_email(None).unwrap(), None);
        assert_eq!(checked_name(Some(" Ana ".into())).unwrap().as_deref(), Some("Ana"));
        assert!(checked_name(Some("   ".into())).is_err());
    }
}
