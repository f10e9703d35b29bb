//! One-shot notices carried across a redirect in a short-lived cookie.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use std::convert::Infallible;

use crate::extractors::cookie_value;

pub const FLASH_COOKIE: &str = "quill_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashLevel {
    Success,
    Warning,
    Error,
}

impl FlashLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Warning => "warning",
            FlashLevel::Error => "error",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(FlashLevel::Success),
            "warning" => Some(FlashLevel::Warning),
            "error" => Some(FlashLevel::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

impl FlashMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            text: text.into(),
        }
    }

    /// Hex keeps the cookie value inside the RFC 6265 character set.
    pub fn encode(&self) -> String {
        hex::encode(format!("{}:{}", self.level.as_str(), self.text))
    }

    pub fn decode(value: &str) -> Option<Self> {
        let bytes = hex::decode(value).ok()?;
        let raw = String::from_utf8(bytes).ok()?;
        let (level, text) = raw.split_once(':')?;
        Some(Self {
            level: FlashLevel::parse(level)?,
            text: text.to_string(),
        })
    }
}

fn flash_cookie(message: &FlashMessage) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age=300",
        FLASH_COOKIE,
        message.encode()
    )
}

fn clear_flash_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", FLASH_COOKIE)
}

/// The pending flash message for this request, if any.
#[derive(Debug, Clone, Default)]
pub struct Flash(pub Option<FlashMessage>);

impl<S: Send + Sync> FromRequestParts<S> for Flash {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Flash(
            cookie_value(parts, FLASH_COOKIE).and_then(FlashMessage::decode),
        ))
    }
}

/// 303 redirect that leaves a message for the next page.
pub fn redirect_with(to: &str, message: FlashMessage) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, to.to_string()),
            (header::SET_COOKIE, flash_cookie(&message)),
        ],
    )
        .into_response()
}

/// Render `page`, expiring the flash cookie if a message was shown.
pub fn consume(flash: &Flash, page: impl IntoResponse) -> Response {
    if flash.0.is_some() {
        (AppendHeaders([(header::SET_COOKIE, clear_flash_cookie())]), page).into_response()
    } else {
        page.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode() {
        let message = FlashMessage::warning("This account is already active; log in");
        let encoded = message.encode();
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(FlashMessage::decode(&encoded), Some(message));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(FlashMessage::decode("zz"), None);
        assert_eq!(FlashMessage::decode(&hex::encode("nolevel")), None);
        assert_eq!(FlashMessage::decode(&hex::encode("shout:hi")), None);
    }

    #[test]
    fn redirect_sets_location_and_cookie() {
        let response = redirect_with("/accounts/login/", FlashMessage::success("Done"));
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/accounts/login/");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("quill_flash="));
    }
}
