use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::hub::socket;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(socket::ws_handler))
        .nest("/assignments", assignment_routes())
        .nest("/submissions", submission_routes())
}

fn assignment_routes() -> Router<AppState> {
    Router::new().route(
        "/{id}/submissions",
        post(handlers::submission::create_submission),
    )
}

fn submission_routes() -> Router<AppState> {
    Router::new().route("/{id}", get(handlers::submission::get_submission))
}
