use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::middleware::{require_auth, require_role, CurrentUser},
    error::{AppError, AppResult, JsonBody, PathParam},
    query::{DocResponse, ListQuery, ListResponse},
    reviews::{
        repo::{self, Review},
        services::{self, ReviewInput},
    },
    state::AppState,
    users::repo_types::Role,
};

pub fn read_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/reviews", get(list_reviews))
        .route("/reviews/:id", get(get_review))
        .route("/tours/:id/reviews", get(list_tour_reviews))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

pub fn author_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/reviews", post(create_review))
        .route("/tours/:id/reviews", post(create_tour_review))
        .route_layer(from_fn(require_role(&[Role::User])))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

pub fn edit_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/reviews/:id", patch(update_review).delete(delete_review))
        .route_layer(from_fn(require_role(&[Role::User, Role::Admin])))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

#[derive(Debug, Serialize)]
pub struct ReviewData {
    pub review: Review,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub status: &'static str,
    pub data: ReviewData,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        Self {
            status: "success",
            data: ReviewData { review },
        }
    }
}

#[instrument(skip(state))]
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<ListResponse>> {
    let q = ListQuery::from_params(&params)?;
    Ok(Json(repo::list(&state.db, &q).await?.into()))
}

#[instrument(skip(state))]
pub async fn list_tour_reviews(
    State(state): State<AppState>,
    PathParam(tour_id): PathParam<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<ListResponse>> {
    let q = ListQuery::from_params(&params)?.pinned("tour", tour_id);
    Ok(Json(repo::list(&state.db, &q).await?.into()))
}

#[instrument(skip(state))]
pub async fn get_review(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<DocResponse>> {
    let doc = repo::get_document(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".into()))?;
    Ok(Json(doc.into()))
}

#[instrument(skip(state, user, payload))]
pub async fn create_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<ReviewInput>,
) -> AppResult<(StatusCode, Json<ReviewResponse>)> {
    let review = services::create(&state, &user, None, payload).await?;
    Ok((StatusCode::CREATED, Json(review.into())))
}

#[instrument(skip(state, user, payload))]
pub async fn create_tour_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(tour_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<ReviewInput>,
) -> AppResult<(StatusCode, Json<ReviewResponse>)> {
    let review = services::create(&state, &user, Some(tour_id), payload).await?;
    Ok((StatusCode::CREATED, Json(review.into())))
}

#[instrument(skip(state, user, payload))]
pub async fn update_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<ReviewInput>,
) -> AppResult<Json<ReviewResponse>> {
    let review = services::update(&state, &user, id, payload).await?;
    Ok(Json(review.into()))
}

#[instrument(skip(state, user))]
pub async fn delete_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<StatusCode> {
    services::delete(&state, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
