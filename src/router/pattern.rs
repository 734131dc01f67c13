//! URI patterns.
//!
//! A pattern is a `/`-separated list of segments:
//!
//! - `users` matches the literal text only,
//! - `:id` matches any non-empty segment,
//! - `:id([0-9]+)` matches a non-empty segment the regex fully accepts,
//! - `:rest*` (final segment only) matches one or more remaining segments.
//!
//! Trailing slashes are insignificant on both patterns and paths.

use crate::error::RouteError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param { name: String, constraint: Option<Regex> },
    Wildcard { name: String },
}

impl Segment {
    fn accepts(&self, part: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == part,
            Segment::Param { constraint, .. } => {
                !part.is_empty() && constraint.as_ref().map_or(true, |re| re.is_match(part))
            }
            Segment::Wildcard { .. } => !part.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash {
                pattern: pattern.to_string(),
            });
        }
        let source = normalize(pattern).to_string();
        let body = &source[1..];
        let raw_segments = if body.is_empty() {
            Vec::new()
        } else {
            split_segments(body, pattern)?
        };

        let last = raw_segments.len().saturating_sub(1);
        let mut names = HashSet::new();
        let mut segments = Vec::with_capacity(raw_segments.len());
        for (index, raw) in raw_segments.into_iter().enumerate() {
            let segment = parse_segment(raw, pattern)?;
            match &segment {
                Segment::Wildcard { .. } if index != last => {
                    return Err(RouteError::WildcardNotLast {
                        pattern: pattern.to_string(),
                    });
                }
                Segment::Param { name, .. } | Segment::Wildcard { name } => {
                    if !names.insert(name.clone()) {
                        return Err(RouteError::DuplicateParam {
                            pattern: pattern.to_string(),
                            name: name.clone(),
                        });
                    }
                }
                Segment::Literal(_) => {}
            }
            segments.push(segment);
        }

        Ok(Self { source, segments })
    }

    /// Normalized pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param { name, .. } | Segment::Wildcard { name } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.walk(path, |_, _| {})
    }

    /// Parameter values captured from `path`, or `None` if it does not match.
    pub fn params(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let matched = self.walk(path, |name, value| {
            params.insert(name.to_string(), value.to_string());
        });
        matched.then_some(params)
    }

    fn walk<'p>(&self, path: &'p str, mut capture: impl FnMut(&str, &'p str)) -> bool {
        let Some(rest) = normalize(path).strip_prefix('/') else {
            return false;
        };
        let mut remaining = (!rest.is_empty()).then_some(rest);

        for segment in &self.segments {
            let Some(current) = remaining else {
                return false;
            };
            if let Segment::Wildcard { name } = segment {
                if !segment.accepts(current) {
                    return false;
                }
                capture(name.as_str(), current);
                return true;
            }
            let (part, rest) = match current.split_once('/') {
                Some((part, rest)) => (part, Some(rest)),
                None => (current, None),
            };
            if !segment.accepts(part) {
                return false;
            }
            if let Segment::Param { name, .. } = segment {
                capture(name.as_str(), part);
            }
            remaining = rest;
        }

        remaining.is_none()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Strips trailing slashes, keeping `/` for the root.
pub(crate) fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// Splits on `/` outside of constraint parentheses.
fn split_segments<'a>(body: &'a str, pattern: &str) -> Result<Vec<&'a str>, RouteError> {
    let unbalanced = || RouteError::UnbalancedParens {
        pattern: pattern.to_string(),
    };
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut escaped = false;
    for (index, ch) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or_else(unbalanced)?,
            '/' if depth == 0 => {
                segments.push(&body[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(unbalanced());
    }
    segments.push(&body[start..]);
    Ok(segments)
}

fn parse_segment(raw: &str, pattern: &str) -> Result<Segment, RouteError> {
    if raw.is_empty() {
        return Err(RouteError::EmptySegment {
            pattern: pattern.to_string(),
        });
    }
    let Some(param) = raw.strip_prefix(':') else {
        return Ok(Segment::Literal(raw.to_string()));
    };

    let name_len = param
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(param.len());
    let (name, suffix) = param.split_at(name_len);
    if name.is_empty() {
        return Err(RouteError::InvalidParamName {
            pattern: pattern.to_string(),
        });
    }
    let name = name.to_string();

    match suffix {
        "" => Ok(Segment::Param {
            name,
            constraint: None,
        }),
        "*" => Ok(Segment::Wildcard { name }),
        _ => {
            let Some(expr) = suffix.strip_prefix('(').and_then(|s| s.strip_suffix(')')) else {
                return Err(RouteError::InvalidParamName {
                    pattern: pattern.to_string(),
                });
            };
            if expr.is_empty() {
                return Err(RouteError::InvalidConstraint {
                    pattern: pattern.to_string(),
                    name,
                    reason: "empty expression".to_string(),
                });
            }
            let constraint = Regex::new(&format!("^(?:{expr})$")).map_err(|err| {
                RouteError::InvalidConstraint {
                    pattern: pattern.to_string(),
                    name: name.clone(),
                    reason: err.to_string(),
                }
            })?;
            Ok(Segment::Param {
                name,
                constraint: Some(constraint),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
        Pattern::parse(pattern).unwrap().params(path)
    }

    #[test]
    fn literal_segments_match_exactly() {
        let pattern = Pattern::parse("/users/active").unwrap();
        assert!(pattern.is_static());
        assert!(pattern.is_match("/users/active"));
        assert!(pattern.is_match("/users/active/"));
        assert!(!pattern.is_match("/users/Active"));
        assert!(!pattern.is_match("/users"));
        assert!(!pattern.is_match("/users/active/extra"));
    }

    #[test]
    fn root_pattern_matches_only_root() {
        let pattern = Pattern::parse("/").unwrap();
        assert!(pattern.is_match("/"));
        assert!(!pattern.is_match("/a"));
        assert!(!pattern.is_match(""));
    }

    #[test]
    fn named_params_capture_segments() {
        let got = params("/users/:id/posts/:post_id", "/users/42/posts/abc").unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got["id"], "42");
        assert_eq!(got["post_id"], "abc");
    }

    #[test]
    fn params_reject_empty_segments() {
        assert!(params("/users/:id/posts", "/users//posts").is_none());
    }

    #[test]
    fn regex_constraint_is_anchored() {
        let pattern = Pattern::parse("/items/:id([0-9]+)").unwrap();
        assert!(pattern.is_match("/items/123"));
        assert!(!pattern.is_match("/items/12a"));
        assert!(!pattern.is_match("/items/a12"));
    }

    #[test]
    fn constraint_may_contain_slash_and_escapes() {
        let pattern = Pattern::parse(r"/files/:name([^/]+\.txt)").unwrap();
        assert!(pattern.is_match("/files/notes.txt"));
        assert!(!pattern.is_match("/files/notes.md"));
    }

    #[test]
    fn wildcard_captures_remainder() {
        let got = params("/static/:path*", "/static/css/site/main.css").unwrap();
        assert_eq!(got["path"], "css/site/main.css");
        assert!(params("/static/:path*", "/static").is_none());
        assert!(params("/static/:path*", "/static/").is_none());
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert!(matches!(
            Pattern::parse("users"),
            Err(RouteError::MissingLeadingSlash { .. })
        ));
        assert!(matches!(
            Pattern::parse("/a//b"),
            Err(RouteError::EmptySegment { .. })
        ));
        assert!(matches!(
            Pattern::parse("/a/:"),
            Err(RouteError::InvalidParamName { .. })
        ));
        assert!(matches!(
            Pattern::parse("/a/:id-x"),
            Err(RouteError::InvalidParamName { .. })
        ));
        assert!(matches!(
            Pattern::parse("/a/:id([0-9]+"),
            Err(RouteError::UnbalancedParens { .. })
        ));
        assert!(matches!(
            Pattern::parse("/a/:id([0-9)"),
            Err(RouteError::InvalidConstraint { .. }) | Err(RouteError::UnbalancedParens { .. })
        ));
        assert!(matches!(
            Pattern::parse("/a/:id()"),
            Err(RouteError::InvalidConstraint { .. })
        ));
        assert!(matches!(
            Pattern::parse("/a/:rest*/b"),
            Err(RouteError::WildcardNotLast { .. })
        ));
        assert!(matches!(
            Pattern::parse("/a/:id/b/:id"),
            Err(RouteError::DuplicateParam { .. })
        ));
    }

    #[test]
    fn normalization_trims_trailing_slash() {
        assert_eq!(Pattern::parse("/users/").unwrap().as_str(), "/users");
        assert_eq!(Pattern::parse("/").unwrap().as_str(), "/");
        assert_eq!(normalize("///"), "/");
        assert_eq!(normalize("/a/b//"), "/a/b");
    }
}
