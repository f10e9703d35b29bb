use serde::Deserialize;

use crate::blog::domain::{slugify, PostStatus};
use crate::db::models::Post;
use crate::forms::{max_chars, required, FormErrors};

pub const TITLE_MAX: usize = 250;
pub const COMMENT_MAX: usize = 255;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostForm {
    pub title: String,
    pub body: String,
    pub status: String,
    pub image_url: String,
}

impl Default for PostForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            body: String::new(),
            status: PostStatus::Draft.as_str().to_string(),
            image_url: String::new(),
        }
    }
}

/// A post form that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanPost {
    pub title: String,
    pub slug: String,
    pub body: String,
    pub status: PostStatus,
    pub image_url: Option<String>,
}

impl PostForm {
    /// Prefilled from an existing post, for the edit page.
    pub fn from_post(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            body: post.body.clone(),
            status: post.status.as_str().to_string(),
            image_url: post.image_url.clone().unwrap_or_default(),
        }
    }

    pub fn clean(&self) -> Result<CleanPost, FormErrors> {
        let mut errors = FormErrors::default();

        let title = required(&mut errors, "title", &self.title);
        max_chars(&mut errors, "title", &title, TITLE_MAX);
        let slug = slugify(&title);
        if !title.is_empty() && slug.is_empty() {
            errors.add("title", "The title needs at least one letter or digit.");
        }

        let body = required(&mut errors, "body", &self.body);

        let status = match self.status.trim().parse::<PostStatus>() {
            Ok(status) => status,
            Err(_) => {
                errors.add(
                    "status",
                    format!(
                        "Select a valid choice. {} is not one of the available choices.",
                        self.status.trim()
                    ),
                );
                PostStatus::Draft
            }
        };

        let image_url = match self.image_url.trim() {
            "" => None,
            raw => {
                if !is_web_url(raw) {
                    errors.add("image_url", "Enter a valid URL.");
                }
                Some(raw.to_string())
            }
        };

        errors.into_result(CleanPost {
            title,
            slug,
            body,
            status,
            image_url,
        })
    }

    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published.as_str()
    }
}

fn is_web_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub body: String,
}

impl CommentForm {
    pub fn clean(&self) -> Result<String, FormErrors> {
        let mut errors = FormErrors::default();
        let body = required(&mut errors, "body", &self.body);
        max_chars(&mut errors, "body", &body, COMMENT_MAX);
        errors.into_result(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(title: &str, body: &str, status: &str, image_url: &str) -> PostForm {
        PostForm {
            title: title.into(),
            body: body.into(),
            status: status.into(),
            image_url: image_url.into(),
        }
    }

    #[test]
    fn valid_post_is_cleaned() {
        let clean = form(" Hello World ", "Body", "published", "")
            .clean()
            .unwrap();
        assert_eq!(clean.title, "Hello World");
        assert_eq!(clean.slug, "hello-world");
        assert_eq!(clean.status, PostStatus::Published);
        assert_eq!(clean.image_url, None);
    }

    #[test]
    fn title_and_body_are_required() {
        let errors = form("", "  ", "draft", "").clean().unwrap_err();
        assert!(errors.has("title"));
        assert!(errors.has("body"));
        assert!(!errors.has("status"));
    }

    #[test]
    fn title_is_capped() {
        let errors = form(&"t".repeat(TITLE_MAX + 1), "b", "draft", "")
            .clean()
            .unwrap_err();
        assert!(errors.has("title"));
    }

    #[test]
    fn punctuation_only_title_has_no_slug() {
        let errors = form("!!!", "b", "draft", "").clean().unwrap_err();
        assert!(errors.has("title"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let errors = form("t", "b", "archived", "").clean().unwrap_err();
        assert!(errors.has("status"));
    }

    #[test]
    fn image_url_must_be_http() {
        assert!(form("t", "b", "draft", "https://img.example.com/a.png")
            .clean()
            .is_ok());
        assert!(form("t", "b", "draft", "ftp://img.example.com/a.png")
            .clean()
            .unwrap_err()
            .has("image_url"));
        assert!(form("t", "b", "draft", "not a url")
            .clean()
            .unwrap_err()
            .has("image_url"));
    }

    #[test]
    fn comment_body_limits() {
        assert!(CommentForm { body: "".into() }.clean().is_err());
        assert!(CommentForm {
            body: "x".repeat(COMMENT_MAX)
        }
        .clean()
        .is_ok());
        assert!(CommentForm {
            body: "x".repeat(COMMENT_MAX + 1)
        }
        .clean()
        .is_err());
    }
}
