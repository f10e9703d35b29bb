use serde::Deserialize;

use crate::forms::{max_chars, required, FormErrors};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: String,
}

impl LoginForm {
    pub fn clean(&self) -> Result<(String, String), FormErrors> {
        let mut errors = FormErrors::default();
        let username = required(&mut errors, "username", &self.username);
        if self.password.is_empty() {
            errors.add("password", "This field is required.");
        }
        errors.into_result((username, self.password.clone()))
    }

    /// Where to go after login. Only local absolute paths are honoured.
    pub fn redirect_target(&self) -> &str {
        safe_next(&self.next).unwrap_or("/")
    }
}

pub fn safe_next(next: &str) -> Option<&str> {
    let local = next.starts_with('/') && !next.starts_with("//") && !next.contains('\\');
    local.then_some(next)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

fn valid_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')
}

impl RegisterForm {
    /// Field-level checks. Uniqueness is checked against the store by the caller.
    pub fn clean(&self) -> Result<Registration, FormErrors> {
        let mut errors = FormErrors::default();

        let username = required(&mut errors, "username", &self.username);
        max_chars(&mut errors, "username", &username, 150);
        if !username.chars().all(valid_username_char) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        let email = required(&mut errors, "email", &self.email);
        if !email.is_empty() && !email_address::EmailAddress::is_valid(&email) {
            errors.add("email", "Enter a valid email address.");
        }

        if self.password1.is_empty() {
            errors.add("password1", "This field is required.");
        } else if self.password1.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password1",
                format!("This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."),
            );
        }
        if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }

        errors.into_result(Registration {
            username,
            email,
            password: self.password1.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReactivationForm {
    pub email: String,
}

impl ReactivationForm {
    pub fn clean(&self) -> Result<String, FormErrors> {
        let mut errors = FormErrors::default();
        let email = required(&mut errors, "email", &self.email);
        if !email.is_empty() && !email_address::EmailAddress::is_valid(&email) {
            errors.add("email", "Enter a valid email address.");
        }
        errors.into_result(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(username: &str, email: &str, p1: &str, p2: &str) -> RegisterForm {
        RegisterForm {
            username: username.into(),
            email: email.into(),
            password1: p1.into(),
            password2: p2.into(),
        }
    }

    #[test]
    fn valid_registration_is_cleaned() {
        let cleaned = register(" alice ", "alice@example.com", "s3cretpass", "s3cretpass")
            .clean()
            .unwrap();
        assert_eq!(cleaned.username, "alice");
        assert_eq!(cleaned.email, "alice@example.com");
        assert_eq!(cleaned.password, "s3cretpass");
    }

    #[test]
    fn registration_reports_every_bad_field() {
        let errors = register("bad name!", "nope", "short", "other")
            .clean()
            .unwrap_err();
        assert!(errors.has("username"));
        assert!(errors.has("email"));
        assert!(errors.has("password1"));
        assert!(errors.has("password2"));
    }

    #[test]
    fn username_allows_symbol_characters() {
        assert!(register("a.b+c-d_e@f", "x@example.com", "longenough", "longenough")
            .clean()
            .is_ok());
    }

    #[test]
    fn login_requires_both_fields() {
        let errors = LoginForm::default().clean().unwrap_err();
        assert!(errors.has("username"));
        assert!(errors.has("password"));
    }

    #[test]
    fn next_must_be_a_local_path() {
        assert_eq!(safe_next("/post/create/"), Some("/post/create/"));
        assert_eq!(safe_next("//evil.example.com"), None);
        assert_eq!(safe_next("https://evil.example.com"), None);
        assert_eq!(safe_next(""), None);

        let form = LoginForm {
            next: "http://elsewhere".into(),
            ..LoginForm::default()
        };
        assert_eq!(form.redirect_target(), "/");
    }

    #[test]
    fn reactivation_needs_an_email() {
        assert!(ReactivationForm::default().clean().is_err());
        assert_eq!(
            ReactivationForm {
                email: " bob@example.com ".into()
            }
            .clean()
            .unwrap(),
            "bob@example.com"
        );
    }
}
