use askama::Template;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::db::RepositoryError;
use crate::routes::PageContext;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Login required")]
    LoginRequired { next: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => AppError::NotFound,
            RepositoryError::Conflict(msg) => AppError::BadRequest(msg),
            other => AppError::Repository(other),
        }
    }
}

#[derive(Template)]
#[template(path = "errors/error.html")]
pub struct ErrorTemplate {
    pub ctx: PageContext,
    pub title: String,
    pub message: String,
}

pub fn login_redirect(next: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("/accounts/login/?next={}", encoded)
}

fn error_page(status: StatusCode, title: &str, message: String) -> Response {
    let page = ErrorTemplate {
        ctx: PageContext::default(),
        title: title.to_string(),
        message,
    };
    match page.render() {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Template render error: {}", e);
            (status, title.to_string()).into_response()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => error_page(
                StatusCode::NOT_FOUND,
                "Not Found 404",
                "The page you requested does not exist.".to_string(),
            ),
            AppError::LoginRequired { next } => (
                StatusCode::SEE_OTHER,
                [(header::LOCATION, login_redirect(&next))],
            )
                .into_response(),
            AppError::Forbidden(msg) => error_page(StatusCode::FORBIDDEN, "Forbidden 403", msg),
            AppError::BadRequest(msg) => error_page(StatusCode::BAD_REQUEST, "Bad Request 400", msg),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                internal_error()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                internal_error()
            }
            AppError::Repository(e) => {
                tracing::error!("Repository error: {}", e);
                internal_error()
            }
            AppError::Template(e) => {
                tracing::error!("Template render error: {}", e);
                internal_error()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    error_page(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Server Error 500",
        "Something went wrong on our side.".to_string(),
    )
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn response_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(response_status(AppError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn forbidden_returns_403() {
        assert_eq!(
            response_status(AppError::Forbidden("nope".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn login_required_redirects_with_next() {
        let response = AppError::LoginRequired {
            next: "/post/create/".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/accounts/login/?next=%2Fpost%2Fcreate%2F"
        );
    }

    #[test]
    fn repository_not_found_maps_to_404() {
        let err: AppError = RepositoryError::NotFound("post 1".into()).into();
        assert_eq!(response_status(err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
