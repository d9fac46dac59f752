//! Parsing of caller-supplied tag input
//!
//! Invalid items are dropped individually; none of these functions fail a
//! whole request.

use crate::models::TagConstraints;

/// Query parameter that carries the caller identity and is never a tag.
pub const USER_ID_PARAM: &str = "userid";

/// A parsed `"tagName,count"` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagToken {
    pub tag: String,
    pub count: u32,
}

/// Parse a `"tagName,count"` token.
///
/// Valid only with exactly one `,`, an alphabetic name and a positive integer
/// count. The name is lower-cased.
pub fn parse_tag_token(token: &str) -> Option<TagToken> {
    let mut parts = token.trim().split(',');
    let (name, count) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(count), None) => (name.trim(), count.trim()),
        _ => return None,
    };

    if name.is_empty() || !name.chars().all(char::is_alphabetic) {
        return None;
    }
    let count = parse_positive_count(count)?;

    Some(TagToken {
        tag: name.to_lowercase(),
        count,
    })
}

/// Parse every token, silently dropping the invalid ones.
pub fn parse_tag_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<TagToken> {
    tokens
        .iter()
        .filter_map(|token| parse_tag_token(token.as_ref()))
        .collect()
}

/// Parse a minimum count from a query parameter value.
///
/// Blank means 1. Non-numeric or non-positive values yield `None` and the tag
/// is dropped from the query.
pub fn parse_min_count(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.is_empty() {
        return Some(1);
    }
    parse_positive_count(value)
}

/// Digits only, no sign, greater than zero.
fn parse_positive_count(value: &str) -> Option<u32> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse::<u32>().ok().filter(|c| *c > 0)
}

/// Build intersection constraints from raw query parameters, in order.
///
/// Keys are lower-cased; the `userID` parameter is skipped.
pub fn constraints_from_params<'a, I>(params: I) -> TagConstraints
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut constraints = TagConstraints::new();
    for (key, value) in params {
        let tag = key.trim().to_lowercase();
        if tag.is_empty() || tag == USER_ID_PARAM {
            continue;
        }
        if let Some(count) = parse_min_count(value) {
            constraints.insert(&tag, count);
        }
    }
    constraints
}
