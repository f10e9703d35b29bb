#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use chrono::{NaiveDateTime, Utc};
use tempfile::TempDir;
use tower::ServiceExt;

use quill::auth::password::hash_password;
use quill::auth::repository::NewUser;
use quill::blog::domain::{slugify, PostStatus};
use quill::blog::repository::NewPost;
use quill::config::Config;
use quill::db;
use quill::db::models::{Post, User};
use quill::flash::{FlashMessage, FLASH_COOKIE};
use quill::mail::{MailError, Mailer, OutgoingEmail};
use quill::routes;
use quill::state::AppState;

pub const PASSWORD: &str = "correct-horse-battery";

/// Keeps every message instead of sending it. Can be told to fail.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            let err = "not an address".parse::<lettre::Address>().unwrap_err();
            return Err(MailError::Address(err));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = Some(dir.path().join("test.db"));
        config.auth.bcrypt_cost = 4;
        customize(&mut config);

        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(pool, config, mailer.clone());
        Self {
            state,
            mailer,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        routes::app(self.state.clone())
            .oneshot(request)
            .await
            .unwrap()
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(
        &self,
        path: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
    ) -> Response<Body> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    pub async fn create_user(&self, username: &str, active: bool, superuser: bool) -> User {
        let password_hash = hash_password(PASSWORD.into(), 4).await.unwrap();
        self.state
            .accounts
            .create_user(
                &NewUser {
                    username: username.into(),
                    email: format!("{username}@example.com"),
                    password_hash,
                    is_active: active,
                    is_superuser: superuser,
                },
                now(),
            )
            .await
            .unwrap()
    }

    /// Log in through the form and return the `name=value` session cookie.
    pub async fn login(&self, username: &str) -> String {
        let response = self
            .post_form(
                "/accounts/login/",
                None,
                &[("username", username), ("password", PASSWORD)],
            )
            .await;
        assert_eq!(response.status(), 303, "login for {username} failed");
        cookie_pair(&response, &self.state.config.auth.cookie_name)
            .expect("login did not set a session cookie")
    }

    pub async fn insert_post(
        &self,
        author: &User,
        title: &str,
        status: PostStatus,
        publish: NaiveDateTime,
    ) -> Post {
        self.state
            .blog
            .create_post(
                &NewPost {
                    title: title.into(),
                    slug: slugify(title),
                    body: format!("Body of {title}"),
                    author_id: author.id,
                    status,
                    publish,
                    image_url: None,
                },
                publish,
            )
            .await
            .unwrap()
    }
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// `name=value` from the response's Set-Cookie headers.
pub fn cookie_pair(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub fn flash(response: &Response<Body>) -> Option<FlashMessage> {
    let pair = cookie_pair(response, FLASH_COOKIE)?;
    FlashMessage::decode(pair.split_once('=')?.1)
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Path part of the activation link in an email body.
pub fn activation_path(email: &OutgoingEmail) -> String {
    let start = email
        .body
        .find("/accounts/activate/")
        .expect("email has no activation link");
    email.body[start..]
        .split_whitespace()
        .next()
        .unwrap()
        .to_string()
}
