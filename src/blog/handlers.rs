use askama::Template;
use axum::extract::{Path, RawQuery, State};
use axum::http::Uri;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{NaiveDate, NaiveDateTime, Utc};

use crate::blog::domain::{Period, PostFilter};
use crate::blog::forms::{CommentForm, PostForm};
use crate::blog::pagination::{page_url, parse_query, Page};
use crate::blog::repository::{LikeToggle, NewPost, PostChanges};
use crate::db::models::{Comment, Post};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::flash::{self, Flash, FlashMessage};
use crate::forms::FormErrors;
use crate::routes::{Html, PageContext};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "blog/list.html")]
pub struct ListTemplate {
    pub ctx: PageContext,
    pub posts: Vec<Post>,
    pub page: Page,
    pub previous_url: Option<String>,
    pub next_url: Option<String>,
    pub author: Option<String>,
    pub period: String,
}

#[derive(Template)]
#[template(path = "blog/detail.html")]
pub struct DetailTemplate {
    pub ctx: PageContext,
    pub post: Post,
    pub comments: Vec<Comment>,
    pub form: CommentForm,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "blog/new.html")]
pub struct NewPostTemplate {
    pub ctx: PageContext,
    pub form: PostForm,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "blog/edit.html")]
pub struct EditPostTemplate {
    pub ctx: PageContext,
    pub post: Post,
    pub form: PostForm,
    pub errors: FormErrors,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Numeric path ids; anything else is a missing page rather than a 400.
fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse().map_err(|_| AppError::NotFound)
}

fn parse_date(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Where to send someone after touching a post: its detail page when it has
/// one, otherwise the list.
fn post_location(post: &Post) -> String {
    if post.is_published() {
        post.absolute_url()
    } else {
        "/".to_string()
    }
}

async fn load_published(
    state: &AppState,
    year: &str,
    month: &str,
    day: &str,
    slug: &str,
) -> AppResult<Post> {
    let date = parse_date(year, month, day).ok_or(AppError::NotFound)?;
    state
        .blog
        .find_published(date, slug)
        .await?
        .ok_or(AppError::NotFound)
}

async fn render_detail(
    state: &AppState,
    ctx: PageContext,
    post: Post,
    form: CommentForm,
    errors: FormErrors,
) -> AppResult<Html<DetailTemplate>> {
    let viewer = ctx.user.as_ref().map(|u| u.id);
    let comments = state
        .blog
        .comments_for_post(post.id, viewer, ctx.is_superuser())
        .await?;

    Ok(Html(DetailTemplate {
        ctx,
        post,
        comments,
        form,
        errors,
    }))
}

pub async fn post_list(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    flash: Flash,
    uri: Uri,
    RawQuery(raw): RawQuery,
) -> AppResult<Response> {
    let query = parse_query(raw.as_deref());
    let mut filter = PostFilter::default();

    let period = query_value(&query, "period").unwrap_or("").to_string();
    if let Some(period) = Period::parse(&period) {
        filter = filter.with_period(period, now());
    }

    let author = match query_value(&query, "author").filter(|a| !a.is_empty()) {
        Some(username) => {
            let author = state
                .accounts
                .find_user_by_username(username)
                .await?
                .ok_or(AppError::NotFound)?;
            filter = filter.with_author(author.id);
            Some(author.username)
        }
        None => None,
    };

    let total = state.blog.count_published(&filter).await?;
    let page = Page::resolve(
        query_value(&query, "page"),
        total,
        state.config.blog.page_size,
    );
    let posts = state
        .blog
        .list_published(&filter, page.per_page, page.offset())
        .await?;

    let path = uri.path();
    let template = ListTemplate {
        ctx: PageContext::new(user, &flash),
        posts,
        previous_url: page.previous_number().map(|n| page_url(path, &query, n)),
        next_url: page.next_number().map(|n| page_url(path, &query, n)),
        page,
        author,
        period,
    };
    Ok(flash::consume(&flash, Html(template)))
}

pub async fn post_detail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    flash: Flash,
    Path((year, month, day, slug)): Path<(String, String, String, String)>,
) -> AppResult<Response> {
    let post = load_published(&state, &year, &month, &day, &slug).await?;
    let page = render_detail(
        &state,
        PageContext::new(user, &flash),
        post,
        CommentForm::default(),
        FormErrors::default(),
    )
    .await?;
    Ok(flash::consume(&flash, page))
}

pub async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((year, month, day, slug)): Path<(String, String, String, String)>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let post = load_published(&state, &year, &month, &day, &slug).await?;

    let body = match form.clean() {
        Ok(body) => body,
        Err(errors) => {
            let ctx = PageContext {
                user: Some(user),
                flash: None,
            };
            return Ok(render_detail(&state, ctx, post, form, errors)
                .await?
                .into_response());
        }
    };

    let comment_id = state.blog.add_comment(post.id, user.id, &body, now()).await?;
    tracing::info!(comment_id, post_id = post.id, user_id = user.id, "Comment added");

    Ok(Redirect::to(&post.absolute_url()).into_response())
}

pub async fn create_page(user: CurrentUser, flash: Flash) -> AppResult<Response> {
    let template = NewPostTemplate {
        ctx: PageContext::new(Some(user), &flash),
        form: PostForm::default(),
        errors: FormErrors::default(),
    };
    Ok(flash::consume(&flash, Html(template)))
}

pub async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let clean = match form.clean() {
        Ok(clean) => clean,
        Err(errors) => {
            let template = NewPostTemplate {
                ctx: PageContext {
                    user: Some(user),
                    flash: None,
                },
                form,
                errors,
            };
            return Ok(Html(template).into_response());
        }
    };

    let now = now();
    let post = state
        .blog
        .create_post(
            &NewPost {
                title: clean.title,
                slug: clean.slug,
                body: clean.body,
                author_id: user.id,
                status: clean.status,
                publish: now,
                image_url: clean.image_url,
            },
            now,
        )
        .await?;
    tracing::info!(post_id = post.id, slug = %post.slug, author = %user.username, "Post created");

    Ok(Redirect::to("/").into_response())
}

/// The post `user` wants to edit, provided they are allowed to.
async fn editable_post(state: &AppState, user: &CurrentUser, raw_id: &str) -> AppResult<Post> {
    let post = state
        .blog
        .find_post(parse_id(raw_id)?)
        .await?
        .ok_or(AppError::NotFound)?;

    if post.author_id != user.id && !user.is_superuser {
        return Err(AppError::Forbidden(
            "You don't have permission to edit this post".to_string(),
        ));
    }
    Ok(post)
}

pub async fn update_page(
    State(state): State<AppState>,
    user: CurrentUser,
    flash: Flash,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let post = editable_post(&state, &user, &id).await?;
    let template = EditPostTemplate {
        ctx: PageContext::new(Some(user), &flash),
        form: PostForm::from_post(&post),
        post,
        errors: FormErrors::default(),
    };
    Ok(flash::consume(&flash, Html(template)))
}

pub async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let post = editable_post(&state, &user, &id).await?;

    let clean = match form.clean() {
        Ok(clean) => clean,
        Err(errors) => {
            let template = EditPostTemplate {
                ctx: PageContext {
                    user: Some(user),
                    flash: None,
                },
                post,
                form,
                errors,
            };
            return Ok(Html(template).into_response());
        }
    };

    let updated = state
        .blog
        .update_post(
            post.id,
            &PostChanges {
                title: clean.title,
                slug: clean.slug,
                body: clean.body,
                status: clean.status,
                image_url: clean.image_url,
            },
            now(),
        )
        .await?;
    tracing::info!(post_id = updated.id, slug = %updated.slug, editor = %user.username, "Post updated");

    Ok(Redirect::to(&post_location(&updated)).into_response())
}

pub async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let post = state
        .blog
        .find_post(parse_id(&id)?)
        .await?
        .ok_or(AppError::NotFound)?;

    let is_author = post.author_id == user.id;
    if !state
        .config
        .blog
        .delete_policy
        .allows(is_author, user.is_superuser)
    {
        tracing::warn!(post_id = post.id, user = %user.username, "Delete refused");
        return Err(AppError::Forbidden(
            "You don't have permission to delete this post".to_string(),
        ));
    }

    if !state.blog.delete_post(post.id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(post_id = post.id, title = %post.title, user = %user.username, "Post deleted");

    Ok(flash::redirect_with(
        "/",
        FlashMessage::success(format!("Post deleted {}", post.title)),
    ))
}

/// The post a comment hangs off, for redirecting back after a toggle.
async fn comment_post(state: &AppState, post_id: i64) -> AppResult<Post> {
    state
        .blog
        .find_post(post_id)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let comment = state
        .blog
        .find_comment(parse_id(&id)?)
        .await?
        .ok_or(AppError::NotFound)?;

    let outcome = state.blog.toggle_like(comment.id, user.id).await?;
    let likes = state.blog.like_count(comment.id).await?;
    tracing::info!(
        comment_id = comment.id,
        user_id = user.id,
        liked = outcome == LikeToggle::Liked,
        likes,
        "Like toggled"
    );

    let post = comment_post(&state, comment.post_id).await?;
    Ok(Redirect::to(&post_location(&post)).into_response())
}

pub async fn toggle_active(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let comment = state
        .blog
        .find_comment(parse_id(&id)?)
        .await?
        .ok_or(AppError::NotFound)?;

    if !user.is_superuser {
        return Err(AppError::Forbidden(
            "You don't have permission to admin comments".to_string(),
        ));
    }

    let active = state.blog.toggle_comment_active(comment.id, now()).await?;
    tracing::info!(comment_id = comment.id, active, moderator = %user.username, "Comment moderated");

    let post = comment_post(&state, comment.post_id).await?;
    Ok(Redirect::to(&post_location(&post)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impossible_dates_do_not_parse() {
        assert_eq!(
            parse_date("2024", "2", "29"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(parse_date("2023", "2", "29"), None);
        assert_eq!(parse_date("2024", "13", "1"), None);
        assert_eq!(parse_date("year", "1", "1"), None);
    }

    #[test]
    fn ids_must_be_numeric() {
        assert_eq!(parse_id("12").unwrap(), 12);
        assert!(matches!(parse_id("abc"), Err(AppError::NotFound)));
    }

    #[test]
    fn query_value_takes_first_match() {
        let query = vec![
            ("period".to_string(), "week".to_string()),
            ("period".to_string(), "day".to_string()),
        ];
        assert_eq!(query_value(&query, "period"), Some("week"));
        assert_eq!(query_value(&query, "page"), None);
    }
}
