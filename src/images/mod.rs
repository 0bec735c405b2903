mod dto;
pub mod handlers;
pub mod multipart;
pub mod remote;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::image_routes()
}
