use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::middleware::{require_auth, require_role},
    error::{AppError, AppResult, JsonBody, PathParam},
    query::{DocResponse, ListQuery, ListResponse},
    reviews,
    state::AppState,
    tours::{
        dto::{PlanData, PlanResponse, StatsData, StatsResponse, TourInput, TourResponse},
        repo,
    },
    users::repo_types::Role,
};

const TOP_CHEAP: [(&str, &str); 3] = [
    ("limit", "5"),
    ("sort", "-ratingsAverage,price"),
    ("fields", "name,price,ratingsAverage,summary,difficulty"),
];

// --- routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/tours", get(list_tours))
        .route("/tours/top-5-cheap", get(top_cheap_tours))
        .route("/tours/tour-stats", get(tour_stats))
        .route("/tours/:id", get(get_tour))
}

pub fn staff_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/tours/monthly-plan/:year", get(monthly_plan))
        .route_layer(from_fn(require_role(&[
            Role::Admin,
            Role::LeadGuide,
            Role::Guide,
        ])))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

pub fn write_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/tours", post(create_tour))
        .route("/tours/:id", patch(update_tour).delete(delete_tour))
        .route_layer(from_fn(require_role(&[Role::Admin, Role::LeadGuide])))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

fn not_found() -> AppError {
    AppError::NotFound("No tour found with that ID".into())
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_tours(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<ListResponse>> {
    let q = ListQuery::from_params(&params)?;
    let docs = repo::list(&state.db, &q).await?;
    Ok(Json(docs.into()))
}

/// Best rated, cheapest first. Caller params cannot override the preset.
#[instrument(skip(state))]
pub async fn top_cheap_tours(
    State(state): State<AppState>,
    Query(mut params): Query<HashMap<String, String>>,
) -> AppResult<Json<ListResponse>> {
    for (k, v) in TOP_CHEAP {
        params.insert(k.to_string(), v.to_string());
    }
    list_tours(State(state), Query(params)).await
}

#[instrument(skip(state))]
pub async fn tour_stats(State(state): State<AppState>) -> AppResult<Json<StatsResponse>> {
    let stats = repo::stats(&state.db).await?;
    Ok(Json(StatsResponse {
        status: "success",
        data: StatsData { stats },
    }))
}

#[instrument(skip(state))]
pub async fn monthly_plan(
    State(state): State<AppState>,
    PathParam(year): PathParam<i32>,
) -> AppResult<Json<PlanResponse>> {
    let plan = repo::monthly_plan(&state.db, year).await?;
    Ok(Json(PlanResponse {
        status: "success",
        results: plan.len(),
        data: PlanData { plan },
    }))
}

/// Single tour with its guides and reviews embedded.
#[instrument(skip(state))]
pub async fn get_tour(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<DocResponse>> {
    let mut doc = repo::get_document(&state.db, id)
        .await?
        .ok_or_else(not_found)?;

    let guide_ids: Vec<Uuid> = doc
        .get("guides")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str()?.parse().ok())
                .collect()
        })
        .unwrap_or_default();
    let guides = repo::guides(&state.db, &guide_ids).await?;
    let reviews = reviews::repo::list_for_tour(&state.db, id).await?;

    if let Some(obj) = doc.as_object_mut() {
        obj.insert("guides".into(), Value::Array(guides));
        obj.insert("reviews".into(), Value::Array(reviews));
    }
    Ok(Json(doc.into()))
}

#[instrument(skip(state, payload))]
pub async fn create_tour(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<TourInput>,
) -> AppResult<(StatusCode, Json<TourResponse>)> {
    let fields = payload.validate()?;
    let tour = repo::insert(&state.db, &fields).await?;
    info!(tour_id = %tour.id, slug = %tour.slug, "tour created");
    Ok((StatusCode::CREATED, Json(tour.into())))
}

#[instrument(skip(state, payload))]
pub async fn update_tour(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<TourInput>,
) -> AppResult<Json<TourResponse>> {
    let current = repo::find(&state.db, id).await?.ok_or_else(not_found)?;
    let fields = TourInput::from(&current).merge(payload).validate()?;
    let tour = repo::update(&state.db, id, &fields)
        .await?
        .ok_or_else(not_found)?;
    info!(tour_id = %id, version = tour.version, "tour updated");
    Ok(Json(tour.into()))
}

#[instrument(skip(state))]
pub async fn delete_tour(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<StatusCode> {
    if !repo::delete(&state.db, id).await? {
        return Err(not_found());
    }
    info!(tour_id = %id, "tour deleted");
    Ok(StatusCode::NO_CONTENT)
}
