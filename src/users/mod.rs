use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;

#[cfg(test)]
pub mod memory;

pub fn router(state: &AppState) -> Router<AppState> {
    handlers::user_routes(state)
}
