use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/accounts/login/",
            get(handlers::login_page).post(handlers::login),
        )
        .route("/accounts/logout/", post(handlers::logout))
        .route(
            "/accounts/register/",
            get(handlers::register_page).post(handlers::register),
        )
        .route(
            "/accounts/activate/{token}/{user_id}",
            get(handlers::activate),
        )
        .route(
            "/accounts/reactivation_sent/",
            get(handlers::reactivation_page).post(handlers::reactivate),
        )
}
