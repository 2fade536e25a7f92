//! Bearer token handling
//!
//! The raw token only ever leaves this module as an `Authorization` header
//! value. Everything that gets logged goes through [`mask_token`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]{64}$").expect("token pattern is a valid regex")
});

/// Whether `token` has the shape of a personal access token (64 alphanumerics)
pub fn validate_token(token: &str) -> bool {
    TOKEN_PATTERN.is_match(token)
}

/// Mask a token for logging: first 4 and last 4 characters, or `****` when
/// the token is shorter than 8 characters
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// API token that never prints itself in full
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_valid(&self) -> bool {
        validate_token(&self.0)
    }

    pub fn masked(&self) -> String {
        mask_token(&self.0)
    }

    /// Value for the `Authorization` header
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiToken").field(&self.masked()).finish()
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}
