// Blog domain types - pure, no I/O
use chrono::{Duration, NaiveDateTime, NaiveTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            other => Err(format!("unknown post status: {other}")),
        }
    }
}

impl ToSql for PostStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PostStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Listing time window, taken from the `period` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    /// Unknown values mean "no window", matching how the list page ignores them.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "day" => Some(Period::Day),
            "week" => Some(Period::Week),
            "month" => Some(Period::Month),
            _ => None,
        }
    }

    /// Start of the window: midnight today, shifted back by 7 or 30 days.
    pub fn window_start(&self, now: NaiveDateTime) -> NaiveDateTime {
        let midnight = now.date().and_time(NaiveTime::MIN);
        match self {
            Period::Day => midnight,
            Period::Week => midnight - Duration::days(7),
            Period::Month => midnight - Duration::days(30),
        }
    }
}

/// Filters for the published post listing. Every field narrows the result set.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub published_after: Option<NaiveDateTime>,
    pub published_before: Option<NaiveDateTime>,
    pub author_id: Option<i64>,
}

impl PostFilter {
    pub fn with_period(mut self, period: Period, now: NaiveDateTime) -> Self {
        self.published_after = Some(period.window_start(now));
        self.published_before = Some(now);
        self
    }

    pub fn with_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }
}

/// Who may delete a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// The author, or any superuser.
    #[default]
    AuthorOrSuperuser,
    /// Only a superuser who is also the author. This is what the legacy
    /// permission check (`!superuser || author != user` => deny) allowed.
    SuperuserAndAuthor,
}

impl DeletePolicy {
    pub fn allows(&self, is_author: bool, is_superuser: bool) -> bool {
        match self {
            DeletePolicy::AuthorOrSuperuser => is_author || is_superuser,
            DeletePolicy::SuperuserAndAuthor => is_author && is_superuser,
        }
    }
}

/// Turn a title into a URL slug.
///
/// The title is NFKD-decomposed and folded to ASCII first, so accented
/// letters keep their base letter. ASCII alphanumerics, `_` and `-` survive;
/// whitespace and dash runs collapse into one `-`; anything else is dropped.
/// Leading and trailing `-`/`_` are trimmed.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.nfkd().filter(char::is_ascii) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c == '-' || c.is_ascii_whitespace() {
            pending_dash = true;
        }
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn slug_from_simple_title() {
        assert_eq!(slugify("Hello World"), "hello-world");
    }

    #[test]
    fn slug_ignores_punctuation() {
        assert_eq!(slugify("Hello World!"), "hello-world");
        assert_eq!(slugify("What's new?"), "whats-new");
    }

    #[test]
    fn slug_collapses_dashes_and_whitespace() {
        assert_eq!(slugify("  a  -  b\t\tc "), "a-b-c");
        assert_eq!(slugify("--rust--"), "rust");
    }

    #[test]
    fn slug_trims_underscores_at_the_edges() {
        assert_eq!(slugify("_private_ notes_"), "private_-notes");
    }

    #[test]
    fn slug_folds_accents_to_ascii() {
        assert_eq!(slugify("Café au lait"), "cafe-au-lait");
        assert_eq!(slugify("Ünïcode 2024"), "unicode-2024");
        assert_eq!(slugify("ﬁne\u{a0}print"), "fine-print");
    }

    #[test]
    fn slug_drops_what_has_no_ascii_form() {
        assert_eq!(slugify("日本 blog"), "blog");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn status_round_trips_through_str() {
        assert_eq!("draft".parse::<PostStatus>().unwrap(), PostStatus::Draft);
        assert_eq!(
            "published".parse::<PostStatus>().unwrap(),
            PostStatus::Published
        );
        assert!("archived".parse::<PostStatus>().is_err());
        assert_eq!(PostStatus::Published.to_string(), "published");
    }

    #[test]
    fn period_parse_ignores_unknown_values() {
        assert_eq!(Period::parse("day"), Some(Period::Day));
        assert_eq!(Period::parse("week"), Some(Period::Week));
        assert_eq!(Period::parse("month"), Some(Period::Month));
        assert_eq!(Period::parse("year"), None);
        assert_eq!(Period::parse(""), None);
    }

    #[test]
    fn period_windows_start_at_midnight() {
        let now = at(2024, 3, 31, 15, 45);
        assert_eq!(Period::Day.window_start(now), at(2024, 3, 31, 0, 0));
        assert_eq!(Period::Week.window_start(now), at(2024, 3, 24, 0, 0));
        assert_eq!(Period::Month.window_start(now), at(2024, 3, 1, 0, 0));
    }

    #[test]
    fn filter_with_period_is_bounded_by_now() {
        let now = at(2024, 3, 31, 15, 45);
        let filter = PostFilter::default().with_period(Period::Week, now);
        assert_eq!(filter.published_after, Some(at(2024, 3, 24, 0, 0)));
        assert_eq!(filter.published_before, Some(now));
        assert_eq!(filter.author_id, None);
    }

    #[test]
    fn author_or_superuser_policy() {
        let policy = DeletePolicy::AuthorOrSuperuser;
        assert!(policy.allows(true, false));
        assert!(policy.allows(false, true));
        assert!(policy.allows(true, true));
        assert!(!policy.allows(false, false));
    }

    #[test]
    fn legacy_policy_needs_both_roles() {
        let policy = DeletePolicy::SuperuserAndAuthor;
        assert!(policy.allows(true, true));
        assert!(!policy.allows(true, false));
        assert!(!policy.allows(false, true));
        assert!(!policy.allows(false, false));
    }
}
