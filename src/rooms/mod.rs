pub mod msg;
pub mod room;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::room_ws))
}
