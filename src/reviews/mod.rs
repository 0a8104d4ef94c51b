pub mod handlers;
pub mod repo;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes(state))
        .merge(handlers::author_routes(state))
        .merge(handlers::edit_routes(state))
}
