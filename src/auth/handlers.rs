use askama::Template;
use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;

use crate::auth::forms::{LoginForm, ReactivationForm, RegisterForm};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repository::NewUser;
use crate::auth::session;
use crate::auth::tokens::Activation;
use crate::db::models::{RegistrationToken, User};
use crate::db::RepositoryError;
use crate::error::{AppError, AppResult};
use crate::extractors::{cookie_value, MaybeUser};
use crate::flash::{self, Flash, FlashMessage};
use crate::forms::FormErrors;
use crate::mail::activation_email;
use crate::routes::{Html, PageContext};
use crate::state::AppState;

const LOGIN_PATH: &str = "/accounts/login/";
const REACTIVATION_PATH: &str = "/accounts/reactivation_sent/";

// -- Templates --

#[derive(Template)]
#[template(path = "accounts/login.html")]
pub struct LoginTemplate {
    pub ctx: PageContext,
    pub form: LoginForm,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "accounts/register.html")]
pub struct RegisterTemplate {
    pub ctx: PageContext,
    pub form: RegisterForm,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "accounts/reactivation_sent.html")]
pub struct ReactivationTemplate {
    pub ctx: PageContext,
    pub form: ReactivationForm,
    pub errors: FormErrors,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct NextParam {
    pub next: String,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn anonymous() -> PageContext {
    PageContext::default()
}

/// Send the activation email. Delivery problems are logged, never surfaced:
/// the account exists either way and the link can be requested again.
async fn send_activation(state: &AppState, user: &User, token: &RegistrationToken) {
    let email = activation_email(
        &state.config.server.base_url,
        user,
        token,
        state.config.auth.activation_ttl(),
    );
    match state.mailer.send(email).await {
        Ok(()) => tracing::info!(user_id = user.id, "Activation email sent"),
        Err(e) => tracing::error!(user_id = user.id, error = %e, "Activation email failed"),
    }
}

// -- Login / logout --

/// GET /accounts/login/
pub async fn login_page(
    MaybeUser(user): MaybeUser,
    flash: Flash,
    Query(params): Query<NextParam>,
) -> AppResult<Response> {
    let template = LoginTemplate {
        ctx: PageContext::new(user, &flash),
        form: LoginForm {
            next: params.next,
            ..LoginForm::default()
        },
        errors: FormErrors::default(),
    };
    Ok(flash::consume(&flash, Html(template)))
}

/// POST /accounts/login/
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let (username, password) = match form.clean() {
        Ok(credentials) => credentials,
        Err(errors) => {
            return Ok(Html(LoginTemplate {
                ctx: anonymous(),
                form: LoginForm {
                    password: String::new(),
                    ..form
                },
                errors,
            })
            .into_response())
        }
    };

    let user = match state.accounts.find_user_by_username(&username).await? {
        Some(user) => verify_password(password, user.password_hash.clone())
            .await
            .then_some(user),
        None => None,
    };

    let user = match user {
        Some(user) => user,
        None => {
            tracing::info!(username = %username, "Failed login");
            let mut errors = FormErrors::default();
            errors.add_general(
                "Please enter a correct username and password. Note that both fields may be case-sensitive.",
            );
            return Ok(Html(LoginTemplate {
                ctx: anonymous(),
                form: LoginForm {
                    password: String::new(),
                    ..form
                },
                errors,
            })
            .into_response());
        }
    };

    if !user.is_active {
        tracing::info!(user_id = user.id, "Login refused for inactive account");
        return Ok(flash::redirect_with(
            LOGIN_PATH,
            FlashMessage::error("Activate your account"),
        ));
    }

    let hours = state.config.auth.session_hours;
    let token = session::create_session(&state.db, user.id, hours)?;
    match session::purge_expired(&state.db) {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "Purged expired sessions"),
        Err(e) => tracing::warn!(error = %e, "Could not purge expired sessions"),
    }
    tracing::info!(user_id = user.id, username = %user.username, "User logged in");

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, form.redirect_target().to_string()),
            (
                header::SET_COOKIE,
                session::session_cookie(&state.config.auth.cookie_name, &token, hours),
            ),
        ],
    )
        .into_response())
}

/// POST /accounts/logout/: delete session and redirect
pub async fn logout(State(state): State<AppState>, request: Request<Body>) -> AppResult<Response> {
    let (parts, _body) = request.into_parts();
    let cookie_name = &state.config.auth.cookie_name;

    if let Some(token) = cookie_value(&parts, cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, LOGIN_PATH.to_string()),
            (header::SET_COOKIE, session::clear_session_cookie(cookie_name)),
        ],
    )
        .into_response())
}

// -- Registration and activation --

/// GET /accounts/register/
pub async fn register_page(MaybeUser(user): MaybeUser, flash: Flash) -> AppResult<Response> {
    let template = RegisterTemplate {
        ctx: PageContext::new(user, &flash),
        form: RegisterForm::default(),
        errors: FormErrors::default(),
    };
    Ok(flash::consume(&flash, Html(template)))
}

fn register_errors(form: RegisterForm, errors: FormErrors) -> Response {
    Html(RegisterTemplate {
        ctx: anonymous(),
        form: RegisterForm {
            password1: String::new(),
            password2: String::new(),
            ..form
        },
        errors,
    })
    .into_response()
}

/// POST /accounts/register/
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let registration = match form.clean() {
        Ok(registration) => registration,
        Err(errors) => return Ok(register_errors(form, errors)),
    };

    let mut errors = FormErrors::default();
    if state
        .accounts
        .find_user_by_username(&registration.username)
        .await?
        .is_some()
    {
        errors.add("username", "A user with that username already exists.");
    }
    if state
        .accounts
        .find_user_by_email(&registration.email)
        .await?
        .is_some()
    {
        errors.add("email", "A user with that email already exists.");
    }
    if !errors.is_empty() {
        return Ok(register_errors(form, errors));
    }

    let password_hash = hash_password(registration.password, state.config.auth.bcrypt_cost).await?;
    let new_user = NewUser {
        username: registration.username,
        email: registration.email,
        password_hash,
        is_active: false,
        is_superuser: false,
    };

    let (user, token) = match state
        .accounts
        .register_user(&new_user, &session::generate_token(), now())
        .await
    {
        Ok(created) => created,
        // Lost a race with a concurrent signup for the same name or address.
        Err(RepositoryError::Conflict(msg)) => {
            let mut errors = FormErrors::default();
            errors.add_general(msg);
            return Ok(register_errors(form, errors));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user_id = user.id, username = %user.username, "User registered");

    send_activation(&state, &user, &token).await;

    Ok(flash::redirect_with(
        LOGIN_PATH,
        FlashMessage::success("You have to activate your account"),
    ))
}

/// GET /accounts/activate/{token}/{user_id}
pub async fn activate(
    State(state): State<AppState>,
    Path((token, user_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let user_id: i64 = user_id.parse().map_err(|_| AppError::NotFound)?;
    let user = state
        .accounts
        .find_user(user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let token = state
        .accounts
        .find_token(&token, user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    let message = match state.tokens().activate(&user, &token, now()).await? {
        Activation::Activated => FlashMessage::success("Activation complete"),
        outcome => {
            tracing::info!(user_id = user.id, ?outcome, "Activation refused");
            FlashMessage::error("Token expired")
        }
    };
    Ok(flash::redirect_with(LOGIN_PATH, message))
}

// -- Resend activation --

/// GET /accounts/reactivation_sent/
pub async fn reactivation_page(MaybeUser(user): MaybeUser, flash: Flash) -> AppResult<Response> {
    let template = ReactivationTemplate {
        ctx: PageContext::new(user, &flash),
        form: ReactivationForm::default(),
        errors: FormErrors::default(),
    };
    Ok(flash::consume(&flash, Html(template)))
}

/// POST /accounts/reactivation_sent/
pub async fn reactivate(
    State(state): State<AppState>,
    Form(form): Form<ReactivationForm>,
) -> AppResult<Response> {
    let rerender = |form: ReactivationForm, errors: FormErrors| {
        Html(ReactivationTemplate {
            ctx: anonymous(),
            form,
            errors,
        })
        .into_response()
    };

    let email = match form.clean() {
        Ok(email) => email,
        Err(errors) => return Ok(rerender(form, errors)),
    };

    let Some(user) = state.accounts.find_user_by_email(&email).await? else {
        let mut errors = FormErrors::default();
        errors.add("email", "There is no account with this email address.");
        return Ok(rerender(form, errors));
    };

    if user.is_active {
        return Ok(flash::redirect_with(
            LOGIN_PATH,
            FlashMessage::warning("This account is already active"),
        ));
    }

    let token = state.tokens().reissue(&user, now()).await?;
    send_activation(&state, &user, &token).await;

    Ok(flash::redirect_with(
        REACTIVATION_PATH,
        FlashMessage::success(format!("A new activation link has been sent to {}", user.email)),
    ))
}
