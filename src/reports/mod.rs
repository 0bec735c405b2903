mod dto;
pub mod handlers;
pub mod pdf;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::report_routes()
}
