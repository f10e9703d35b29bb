pub mod accounts;
pub mod blog;

use askama::Template;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::extractors::CurrentUser;
use crate::flash::{Flash, FlashMessage};
use crate::state::AppState;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => AppError::Template(e).into_response(),
        }
    }
}

/// Per-request values every page layout needs: who is logged in and the
/// pending flash message.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub user: Option<CurrentUser>,
    pub flash: Option<FlashMessage>,
}

impl PageContext {
    pub fn new(user: Option<CurrentUser>, flash: &Flash) -> Self {
        Self {
            user,
            flash: flash.0.clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn username(&self) -> &str {
        self.user.as_ref().map(|u| u.username.as_str()).unwrap_or("")
    }

    pub fn is_superuser(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_superuser)
    }

    pub fn has_flash(&self) -> bool {
        self.flash.is_some()
    }

    pub fn flash_text(&self) -> &str {
        self.flash.as_ref().map(|f| f.text.as_str()).unwrap_or("")
    }

    pub fn flash_level(&self) -> &str {
        self.flash.as_ref().map(|f| f.level.as_str()).unwrap_or("")
    }
}

async fn not_found() -> AppError {
    AppError::NotFound
}

/// The full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(blog::router())
        .merge(accounts::router())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
