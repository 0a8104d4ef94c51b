use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod lockout;
pub mod middleware;
pub mod password;
pub mod reset;
pub mod services;


pub fn router(state: &AppState) -> Router<AppState> {
    handlers::auth_routes(state)
}
