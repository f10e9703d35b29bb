use axum::routing::{get, post};
use axum::Router;

use crate::blog::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::post_list))
        .route(
            "/{year}/{month}/{day}/{slug}",
            get(handlers::post_detail).post(handlers::add_comment),
        )
        .route(
            "/post/create/",
            get(handlers::create_page).post(handlers::create_post),
        )
        .route(
            "/post/update/{id}",
            get(handlers::update_page).post(handlers::update_post),
        )
        .route("/post/delete/{id}", post(handlers::delete_post))
        .route("/comment-like/{id}", get(handlers::toggle_like))
        .route("/comment-like/admin/{id}", get(handlers::toggle_active))
}
